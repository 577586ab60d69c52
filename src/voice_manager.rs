//! Polyphonic voice allocation and block rendering
//!
//! Holds a prototype circuit plus N independent voice clones. Note-on picks
//! a free voice or steals one according to the configured policy; structural
//! edits are applied to the prototype first and then replayed onto every
//! voice so all clones stay structurally identical (clones share unit ids
//! with the prototype, which is what makes replay-by-id work).

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::circuit::Circuit;
use crate::parameter::ParamAction;
use crate::unit::TickContext;
use crate::voice::Voice;
use crate::worker_pool::WorkerPool;

/// Which held voice loses its note when all voices are busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealPolicy {
    /// Steal the voice that has been sounding longest.
    Oldest,
    /// Steal the most recently triggered voice.
    Newest,
    /// Steal the voice playing the highest pitch.
    HighestPitch,
    /// Steal the voice playing the lowest pitch.
    LowestPitch,
}

pub struct VoiceManager {
    prototype: Circuit,
    voices: Vec<Arc<Mutex<Voice>>>,
    policy: StealPolicy,
    /// Last seen value per MIDI controller, normalized to 0..1.
    cc: [f32; 128],
}

impl VoiceManager {
    pub fn new(prototype: Circuit, voice_count: usize) -> Self {
        let voices = (0..voice_count)
            .map(|_| Arc::new(Mutex::new(Voice::new(prototype.clone_circuit()))))
            .collect();
        Self {
            prototype,
            voices,
            policy: StealPolicy::Oldest,
            cc: [0.0; 128],
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn held_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| self.lock_voice(v).held())
            .count()
    }

    pub fn steal_policy(&self) -> StealPolicy {
        self.policy
    }

    pub fn set_steal_policy(&mut self, policy: StealPolicy) {
        self.policy = policy;
    }

    pub fn prototype(&self) -> &Circuit {
        &self.prototype
    }

    fn lock_voice<'a>(&self, voice: &'a Arc<Mutex<Voice>>) -> std::sync::MutexGuard<'a, Voice> {
        match voice.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ------------------------------------------------------------------
    // Note events
    // ------------------------------------------------------------------

    /// Allocate a voice for a note. Free (released) voices are taken first;
    /// when every voice is held, one is stolen per the steal policy.
    pub fn note_on(&mut self, pitch: u8, velocity: f32) {
        let index = match self.find_free() {
            Some(i) => i,
            None => {
                let i = self.find_steal_target();
                warn!(
                    "stealing voice {} (pitch {}) for pitch {}",
                    i,
                    self.lock_voice(&self.voices[i]).pitch(),
                    pitch
                );
                i
            }
        };
        debug!("note on: pitch {} velocity {} -> voice {}", pitch, velocity, index);
        self.lock_voice(&self.voices[index]).trigger(pitch, velocity);
    }

    /// Release every held voice playing `pitch`. Release velocity is part of
    /// the wire contract but nothing downstream consumes it yet.
    pub fn note_off(&mut self, pitch: u8, _velocity: f32) {
        for voice in &self.voices {
            let mut voice = match voice.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if voice.held() && voice.pitch() == pitch {
                voice.release();
            }
        }
    }

    /// Cache a controller value and route the mod wheel (CC 1) to the input
    /// unit's "mod" parameter on the prototype and every voice.
    pub fn control_change(&mut self, controller: u8, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.cc[controller as usize & 127] = value;
        if controller == 1 {
            self.apply_edit(|circuit| {
                if let Some(input) = circuit.input_unit() {
                    circuit.set_param_by_name(input, "mod", ParamAction::Set, value as f64);
                }
            });
        }
    }

    pub fn controller_value(&self, controller: u8) -> f32 {
        self.cc[controller as usize & 127]
    }

    fn find_free(&self) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| !self.lock_voice(v).held())
    }

    fn find_steal_target(&self) -> usize {
        let mut best = 0;
        for i in 1..self.voices.len() {
            let candidate = self.lock_voice(&self.voices[i]);
            let current = self.lock_voice(&self.voices[best]);
            let better = match self.policy {
                StealPolicy::Oldest => candidate.age() > current.age(),
                StealPolicy::Newest => candidate.age() < current.age(),
                StealPolicy::HighestPitch => candidate.pitch() > current.pitch(),
                StealPolicy::LowestPitch => candidate.pitch() < current.pitch(),
            };
            if better {
                best = i;
            }
        }
        best
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Run an edit against the prototype, then replay it onto every voice.
    /// The closure must be deterministic given the circuit it receives;
    /// since all clones share the prototype's structure and ids, replay
    /// produces identical results everywhere. Returns the prototype's result.
    pub fn apply_edit<R, F>(&mut self, edit: F) -> R
    where
        F: Fn(&mut Circuit) -> R,
    {
        let result = edit(&mut self.prototype);
        for voice in &self.voices {
            let mut voice = match voice.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            edit(voice.circuit_mut());
        }
        result
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render one block serially: every voice ticks sample by sample and the
    /// voices' outputs are summed into `out`.
    pub fn render_block(&mut self, ctx: &TickContext, out: &mut [f32]) {
        out.fill(0.0);
        for voice in &self.voices {
            let mut voice = match voice.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            voice.render(ctx, out.len());
            for (sample, rendered) in out.iter_mut().zip(voice.buffer()) {
                *sample += rendered;
            }
        }
    }

    /// Render one block with each voice as a pool job, then sum the voice
    /// buffers serially. Voices share no mutable state, so the per-voice
    /// mutex is uncontended during the batch.
    pub fn render_block_parallel(&mut self, ctx: &TickContext, out: &mut [f32], pool: &WorkerPool) {
        let frames = out.len();
        let ctx = *ctx;
        for voice in &self.voices {
            let voice = Arc::clone(voice);
            pool.submit(move || {
                let mut voice = match voice.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                voice.render(&ctx, frames);
            });
        }
        pool.wait();

        out.fill(0.0);
        for voice in &self.voices {
            let voice = self.lock_voice(voice);
            for (sample, rendered) in out.iter_mut().zip(voice.buffer()) {
                *sample += rendered;
            }
        }
    }
}
