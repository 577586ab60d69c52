//! ADSR envelope unit
//!
//! Gate-driven attack/decay/sustain/release envelope. The `in` port is scaled
//! by the envelope (VCA form); the raw envelope is also exposed on its own
//! output for modulation routing. A rising edge on the `gate` port triggers
//! attack from zero, a falling edge enters release from the current level.

use crate::parameter::{ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN: usize = 0;
pub const IN_GATE: usize = 1;
pub const OUT: usize = 0;
pub const OUT_ENV: usize = 1;

pub const PARAM_ATTACK: usize = 0;
pub const PARAM_DECAY: usize = 1;
pub const PARAM_SUSTAIN: usize = 2;
pub const PARAM_RELEASE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

pub struct AdsrKernel {
    phase: Phase,
    level: f32,
    time_in_phase: f32,
    release_start_level: f32,
    prev_gate: f32,
}

impl AdsrKernel {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            level: 0.0,
            time_in_phase: 0.0,
            release_start_level: 0.0,
            prev_gate: 0.0,
        }
    }

    pub fn idle(&self) -> bool {
        self.phase == Phase::Idle
    }
}

impl Default for AdsrKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitKernel for AdsrKernel {
    fn class_name(&self) -> &'static str {
        "AdsrUnit"
    }

    fn process(&mut self, io: &mut UnitIo, ctx: &TickContext) {
        let gate = io.inputs.value(IN_GATE);
        let attack = io.params.value(PARAM_ATTACK) as f32;
        let decay = io.params.value(PARAM_DECAY) as f32;
        let sustain = io.params.value(PARAM_SUSTAIN) as f32;
        let release = io.params.value(PARAM_RELEASE) as f32;

        // Edge detection on the gate port.
        if gate >= 0.5 && self.prev_gate < 0.5 {
            self.phase = Phase::Attack;
            self.level = 0.0;
            self.time_in_phase = 0.0;
        } else if gate < 0.5 && self.prev_gate >= 0.5 {
            if !matches!(self.phase, Phase::Idle) {
                self.release_start_level = self.level;
                self.phase = Phase::Release;
                self.time_in_phase = 0.0;
            }
        }
        self.prev_gate = gate;

        let dt = 1.0 / ctx.sample_rate;
        self.time_in_phase += dt;

        match self.phase {
            Phase::Attack => {
                if attack > 0.0 {
                    self.level = (self.time_in_phase / attack).min(1.0);
                    if self.level >= 1.0 {
                        self.phase = Phase::Decay;
                        self.time_in_phase = 0.0;
                    }
                } else {
                    self.level = 1.0;
                    self.phase = Phase::Decay;
                    self.time_in_phase = 0.0;
                }
            }
            Phase::Decay => {
                if decay > 0.0 {
                    self.level = 1.0 - (1.0 - sustain) * (self.time_in_phase / decay);
                    if self.level <= sustain {
                        self.level = sustain;
                        self.phase = Phase::Sustain;
                        self.time_in_phase = 0.0;
                    }
                } else {
                    self.level = sustain;
                    self.phase = Phase::Sustain;
                    self.time_in_phase = 0.0;
                }
            }
            Phase::Sustain => {
                self.level = sustain;
            }
            Phase::Release => {
                if release > 0.0 {
                    let progress = (self.time_in_phase / release).min(1.0);
                    self.level = self.release_start_level * (1.0 - progress);
                    if progress >= 1.0 {
                        self.level = 0.0;
                        self.phase = Phase::Idle;
                    }
                } else {
                    self.level = 0.0;
                    self.phase = Phase::Idle;
                }
            }
            Phase::Idle => {
                self.level = 0.0;
            }
        }

        io.outputs.set(OUT, io.inputs.value(IN) * self.level);
        io.outputs.set(OUT_ENV, self.level);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(AdsrKernel::new())
    }

    fn reset_state(&mut self) {
        *self = AdsrKernel::new();
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("in");
    inputs.add_channel("gate");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");
    outputs.add_channel("env");

    let mut params = ParamSet::new();
    params.add(Parameter::double("attack", 0.01, 0.0, 10.0).with_step(0.001));
    params.add(Parameter::double("decay", 0.1, 0.0, 10.0).with_step(0.001));
    params.add(Parameter::double("sustain", 0.7, 0.0, 1.0).with_step(0.01));
    params.add(Parameter::double("release", 0.2, 0.0, 10.0).with_step(0.001));

    UnitHandle::new(
        "adsr",
        inputs,
        outputs,
        params,
        Box::new(AdsrKernel::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Circuit;
    use crate::parameter::ParamAction;
    use crate::units::constant;

    /// One constant feeding `in`, a second constant driving `gate`.
    fn env_circuit() -> (Circuit, u64, u64) {
        let mut circuit = Circuit::new();
        let src = circuit.add_unit(constant::build());
        circuit.set_param(src, constant::PARAM_VALUE, ParamAction::Set, 1.0);
        let gate = circuit.add_unit(constant::build());
        let env = circuit.add_unit(build());
        circuit.connect(src, constant::OUT, env, IN).unwrap();
        circuit.connect(gate, constant::OUT, env, IN_GATE).unwrap();
        circuit.set_output_unit(env);
        (circuit, gate, env)
    }

    #[test]
    fn test_attack_reaches_full_level() {
        let (mut circuit, gate, env) = env_circuit();
        circuit.set_param(env, PARAM_ATTACK, ParamAction::Set, 0.01);
        circuit.set_param(env, PARAM_DECAY, ParamAction::Set, 0.0);
        circuit.set_param(env, PARAM_SUSTAIN, ParamAction::Set, 1.0);
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 1.0);

        let ctx = TickContext::new(48000.0);
        for _ in 0..600 {
            circuit.tick(&ctx);
        }
        assert!((circuit.output_value(OUT) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_decay_settles_on_sustain() {
        let (mut circuit, gate, env) = env_circuit();
        circuit.set_param(env, PARAM_ATTACK, ParamAction::Set, 0.0);
        circuit.set_param(env, PARAM_DECAY, ParamAction::Set, 0.01);
        circuit.set_param(env, PARAM_SUSTAIN, ParamAction::Set, 0.5);
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 1.0);

        let ctx = TickContext::new(48000.0);
        for _ in 0..1000 {
            circuit.tick(&ctx);
        }
        assert!((circuit.output_value(OUT_ENV) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_release_decays_to_idle() {
        let (mut circuit, gate, env) = env_circuit();
        circuit.set_param(env, PARAM_ATTACK, ParamAction::Set, 0.0);
        circuit.set_param(env, PARAM_DECAY, ParamAction::Set, 0.0);
        circuit.set_param(env, PARAM_SUSTAIN, ParamAction::Set, 1.0);
        circuit.set_param(env, PARAM_RELEASE, ParamAction::Set, 0.005);
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 1.0);

        let ctx = TickContext::new(48000.0);
        for _ in 0..100 {
            circuit.tick(&ctx);
        }
        assert!(circuit.output_value(OUT_ENV) > 0.9);

        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 0.0);
        for _ in 0..500 {
            circuit.tick(&ctx);
        }
        assert_eq!(circuit.output_value(OUT_ENV), 0.0);
        assert_eq!(circuit.output_value(OUT), 0.0);
    }

    #[test]
    fn test_retrigger_restarts_attack() {
        let (mut circuit, gate, env) = env_circuit();
        circuit.set_param(env, PARAM_ATTACK, ParamAction::Set, 1.0);
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 1.0);

        let ctx = TickContext::new(48000.0);
        for _ in 0..4800 {
            circuit.tick(&ctx);
        }
        let partway = circuit.output_value(OUT_ENV);
        assert!(partway > 0.05 && partway < 0.2);

        // Gate off then on again: envelope restarts from zero.
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 0.0);
        circuit.tick(&ctx);
        circuit.set_param(gate, constant::PARAM_VALUE, ParamAction::Set, 1.0);
        circuit.tick(&ctx);
        assert!(circuit.output_value(OUT_ENV) < partway);
    }
}
