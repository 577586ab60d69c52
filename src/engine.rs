//! Top-level realtime engine
//!
//! Owns the voice manager, the command queue's audio-thread half, and the
//! worker pool. `process_block` is the audio callback's entry point: it
//! drains pending edits at the block boundary (so every voice sees the same
//! structure for a whole block), renders all voices, and soft-limits the mix.

use std::sync::Arc;
use tracing::info;

use crate::circuit::Circuit;
use crate::command_queue::{self, apply_edit, CommandReceiver, CommandSender};
use crate::registry::UnitRegistry;
use crate::unit::TickContext;
use crate::voice_manager::{StealPolicy, VoiceManager};
use crate::worker_pool::WorkerPool;

/// Voice counts below this render serially; parallel dispatch has fixed
/// per-block cost that only pays off with enough voices to spread.
const DEFAULT_PARALLEL_THRESHOLD: usize = 4;

pub struct EngineConfig {
    pub sample_rate: f32,
    pub voice_count: usize,
    pub command_capacity: usize,
    /// Worker threads; 0 means one per available core minus one.
    pub workers: usize,
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            voice_count: 8,
            command_capacity: 256,
            workers: 0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

pub struct PatchEngine {
    voices: VoiceManager,
    commands: CommandReceiver,
    registry: Arc<UnitRegistry>,
    pool: Option<WorkerPool>,
    parallel_threshold: usize,
    ctx: TickContext,
}

impl PatchEngine {
    /// Build an engine around a prototype circuit. Returns the engine plus
    /// the control-thread command handle; the handle's id allocator starts
    /// past every id the prototype already uses.
    pub fn new(
        prototype: Circuit,
        registry: Arc<UnitRegistry>,
        config: EngineConfig,
    ) -> Result<(Self, CommandSender), String> {
        let first_unit_id = prototype.next_unit_id();
        let (sender, receiver) = command_queue::command_queue(config.command_capacity, first_unit_id);

        let pool = if config.voice_count >= config.parallel_threshold {
            Some(WorkerPool::new(config.workers)?)
        } else {
            None
        };

        info!(
            voices = config.voice_count,
            sample_rate = config.sample_rate,
            "engine started"
        );

        let engine = Self {
            voices: VoiceManager::new(prototype, config.voice_count),
            commands: receiver,
            registry,
            pool,
            parallel_threshold: config.parallel_threshold,
            ctx: TickContext::new(config.sample_rate),
        };
        Ok((engine, sender))
    }

    pub fn sample_rate(&self) -> f32 {
        self.ctx.sample_rate
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn set_steal_policy(&mut self, policy: StealPolicy) {
        self.voices.set_steal_policy(policy);
    }

    pub fn note_on(&mut self, pitch: u8, velocity: f32) {
        self.voices.note_on(pitch, velocity);
    }

    pub fn note_off(&mut self, pitch: u8, velocity: f32) {
        self.voices.note_off(pitch, velocity);
    }

    pub fn control_change(&mut self, controller: u8, value: f32) {
        self.voices.control_change(controller, value);
    }

    /// Render one audio block into `out`.
    ///
    /// Edits queued since the previous block are applied first, against the
    /// prototype and every voice, so the structure never changes mid-block.
    pub fn process_block(&mut self, out: &mut [f32]) {
        let Self {
            voices,
            commands,
            registry,
            ..
        } = self;
        commands.drain(|edit| voices.apply_edit(|circuit| apply_edit(circuit, registry, edit)));

        match &self.pool {
            Some(pool) if self.voices.voice_count() >= self.parallel_threshold => {
                self.voices.render_block_parallel(&self.ctx, out, pool);
            }
            _ => self.voices.render_block(&self.ctx, out),
        }

        // Soft limiter on the summed mix; many simultaneous voices can
        // otherwise exceed full scale.
        for sample in out.iter_mut() {
            if sample.abs() > 1.0 {
                *sample = sample.tanh();
            }
        }
    }
}
