//! # Polaron - Modular Polyphonic Synthesis Engine
//!
//! Polaron is a realtime signal-processing engine for instrument plugins and
//! standalone synths. Sound is described as a circuit of units (oscillators,
//! filters, envelopes, math) wired port-to-port; the circuit is cloned per
//! voice for polyphony and edited live from a control thread without ever
//! blocking the audio thread.
//!
//! ## Core Features
//!
//! - **Pull-Based Evaluation**: each sample, the output unit pulls its
//!   dependency cone; every unit runs exactly once regardless of fan-out
//! - **Feedback Loops**: cycles are legal through buffered units (delay
//!   lines), which contribute a one-sample latency; zero-latency cycles are
//!   rejected at connect time
//! - **Polyphony**: one prototype circuit, N independent voice clones, with
//!   configurable voice-steal policies
//! - **Lock-Free Live Editing**: structural edits travel over an SPSC ring
//!   and apply at block boundaries, acked back to the control thread
//! - **Parallel Rendering**: a persistent worker pool ticks voices
//!   concurrently when the voice count makes it worthwhile
//! - **Patch Persistence**: circuits serialize to JSON and rebuild through
//!   the unit registry
//!
//! ## Quick Start
//!
//! ```rust
//! use polaron::circuit::Circuit;
//! use polaron::registry::UnitRegistry;
//! use polaron::engine::{EngineConfig, PatchEngine};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(UnitRegistry::with_builtins());
//!
//! // note input -> oscillator -> gain
//! let mut circuit = Circuit::new();
//! let input = circuit.add_unit(registry.create_by_name("NoteInputUnit").unwrap());
//! let osc = circuit.add_unit(registry.create_by_name("OscillatorUnit").unwrap());
//! let amp = circuit.add_unit(registry.create_by_name("GainUnit").unwrap());
//! circuit.connect_by_name(input, "freq", osc, "freq_mod").unwrap();
//! circuit.connect_by_name(osc, "out", amp, "in").unwrap();
//! circuit.set_input_unit(input);
//! circuit.set_output_unit(amp);
//!
//! let (mut engine, _commands) =
//!     PatchEngine::new(circuit, registry, EngineConfig::default()).unwrap();
//!
//! engine.note_on(69, 0.8);
//! let mut block = vec![0.0f32; 256];
//! engine.process_block(&mut block);
//! ```

pub mod circuit;
pub mod command_queue;
pub mod connection;
pub mod engine;
pub mod parameter;
pub mod patch;
pub mod registry;
pub mod signal;
pub mod unit;
pub mod units;
pub mod voice;
pub mod voice_manager;
pub mod worker_pool;

pub use circuit::Circuit;
pub use command_queue::{command_queue, Ack, AckStatus, Command, CommandReceiver, CommandSender, Edit};
pub use engine::{EngineConfig, PatchEngine};
pub use parameter::{ControlShape, ParamAction, ParamKind, ParamSet, Parameter};
pub use patch::{build as build_patch, describe as describe_patch, PatchDescription};
pub use registry::UnitRegistry;
pub use signal::{CombineOp, Signal, SignalBus};
pub use unit::{class_id, ClassId, TickContext, UnitHandle, UnitId, UnitKernel};
pub use voice_manager::{StealPolicy, VoiceManager};
pub use worker_pool::WorkerPool;
