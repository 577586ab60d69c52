//! Note input unit: where a voice's note and control data enters the graph
//!
//! The voice manager writes pitch, gate, velocity and mod-wheel state into
//! this unit's parameters; the kernel exposes them as signals so the rest of
//! the patch can consume them like any other source. A circuit designates one
//! of these as its input unit.

use lazy_static::lazy_static;

use crate::parameter::{ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const PARAM_PITCH: usize = 0;
pub const PARAM_GATE: usize = 1;
pub const PARAM_VELOCITY: usize = 2;
pub const PARAM_MOD: usize = 3;

pub const OUT_FREQ: usize = 0;
pub const OUT_GATE: usize = 1;
pub const OUT_VELOCITY: usize = 2;
pub const OUT_MOD: usize = 3;

lazy_static! {
    /// Equal-tempered frequency for every MIDI pitch, A4 = 440 Hz.
    static ref MIDI_FREQ: [f32; 128] = {
        let mut table = [0.0f32; 128];
        for (n, slot) in table.iter_mut().enumerate() {
            *slot = 440.0 * 2.0f32.powf((n as f32 - 69.0) / 12.0);
        }
        table
    };
}

/// Frequency of a MIDI pitch; out-of-range pitches clamp to the table edges.
pub fn midi_to_freq(pitch: u8) -> f32 {
    MIDI_FREQ[(pitch as usize).min(127)]
}

pub struct NoteInputKernel;

impl UnitKernel for NoteInputKernel {
    fn class_name(&self) -> &'static str {
        "NoteInputUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        let pitch = io.params.value(PARAM_PITCH) as usize;
        io.outputs.set(OUT_FREQ, MIDI_FREQ[pitch.min(127)]);
        io.outputs.set(OUT_GATE, io.params.value(PARAM_GATE) as f32);
        io.outputs
            .set(OUT_VELOCITY, io.params.value(PARAM_VELOCITY) as f32);
        io.outputs.set(OUT_MOD, io.params.value(PARAM_MOD) as f32);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(NoteInputKernel)
    }
}

pub fn build() -> UnitHandle {
    let mut outputs = SignalBus::new();
    outputs.add_channel("freq");
    outputs.add_channel("gate");
    outputs.add_channel("velocity");
    outputs.add_channel("mod");

    let mut params = ParamSet::new();
    params.add(Parameter::int("pitch", 69, 0, 127).hidden());
    params.add(Parameter::bool("gate", false).hidden());
    params.add(Parameter::double("velocity", 0.0, 0.0, 1.0).hidden());
    params.add(Parameter::double("mod", 0.0, 0.0, 1.0));

    UnitHandle::new(
        "note in",
        SignalBus::new(),
        outputs,
        params,
        Box::new(NoteInputKernel),
    )
}
