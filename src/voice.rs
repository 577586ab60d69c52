//! A single polyphonic voice
//!
//! One voice is an independent, structurally identical clone of the prototype
//! circuit plus transient note state. Voices never share mutable state with
//! each other, which is what makes per-voice parallel ticking safe.

use crate::circuit::Circuit;
use crate::parameter::ParamAction;
use crate::unit::TickContext;

pub struct Voice {
    circuit: Circuit,
    pitch: u8,
    velocity: f32,
    /// Samples since the last trigger; the steal policies compare this.
    age: u64,
    /// True between note-on and note-off. A released voice keeps ticking its
    /// release tail but counts as free for allocation.
    held: bool,
    /// Per-voice render destination for the parallel path.
    buffer: Vec<f32>,
}

impl Voice {
    pub fn new(circuit: Circuit) -> Self {
        Self {
            circuit,
            pitch: 0,
            velocity: 0.0,
            age: 0,
            held: false,
            buffer: Vec::new(),
        }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn held(&self) -> bool {
        self.held
    }

    /// Start a new note: write note data into the designated input unit and
    /// clear the circuit's runtime state so the stolen-from note does not
    /// bleed into this one.
    pub fn trigger(&mut self, pitch: u8, velocity: f32) {
        self.circuit.reset();
        if let Some(input) = self.circuit.input_unit() {
            self.circuit
                .set_param_by_name(input, "pitch", ParamAction::Set, pitch as f64);
            self.circuit
                .set_param_by_name(input, "velocity", ParamAction::Set, velocity as f64);
            self.circuit
                .set_param_by_name(input, "gate", ParamAction::Set, 1.0);
        }
        self.pitch = pitch;
        self.velocity = velocity;
        self.age = 0;
        self.held = true;
    }

    /// Note-off: drop the gate and free the voice for reallocation. The
    /// circuit keeps ticking so envelopes can play out their release tails.
    pub fn release(&mut self) {
        if let Some(input) = self.circuit.input_unit() {
            self.circuit
                .set_param_by_name(input, "gate", ParamAction::Set, 0.0);
        }
        self.held = false;
    }

    /// Advance by one sample and return the circuit's output.
    pub fn tick(&mut self, ctx: &TickContext) -> f32 {
        self.circuit.tick(ctx);
        self.age += 1;
        self.circuit.output_value(0)
    }

    /// Render `frames` samples into the internal buffer.
    pub fn render(&mut self, ctx: &TickContext, frames: usize) {
        self.buffer.resize(frames, 0.0);
        for i in 0..frames {
            self.buffer[i] = self.tick(ctx);
        }
    }

    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }
}
