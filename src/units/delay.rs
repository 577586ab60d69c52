//! Delay line unit
//!
//! Fixed-rate circular buffer with feedback. This is a buffered unit: its
//! output at sample N is drawn entirely from samples written before N, which
//! makes it the legal way to close a feedback loop in a circuit.
//!
//! The buffer is persisted feedback state, so it sanitizes itself: any NaN or
//! infinite value is flushed to zero on write, preventing a transient
//! corruption from circulating indefinitely.

use crate::parameter::{ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN: usize = 0;
pub const OUT: usize = 0;

pub const PARAM_TIME: usize = 0;
pub const PARAM_FEEDBACK: usize = 1;

/// Upper bound on the delay time; sets the buffer size.
pub const MAX_DELAY_SECS: f32 = 2.0;

pub struct DelayKernel {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayKernel {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            write_pos: 0,
        }
    }
}

impl Default for DelayKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

impl UnitKernel for DelayKernel {
    fn class_name(&self) -> &'static str {
        "DelayUnit"
    }

    fn process(&mut self, io: &mut UnitIo, ctx: &TickContext) {
        // Sized on first use, once the sample rate is known.
        if self.buffer.is_empty() {
            let len = (MAX_DELAY_SECS * ctx.sample_rate).max(1.0) as usize;
            self.buffer = vec![0.0; len];
            self.write_pos = 0;
        }
        let len = self.buffer.len();

        let time = io.params.value(PARAM_TIME) as f32;
        let feedback = io.params.value(PARAM_FEEDBACK) as f32;
        let delay_samples = ((time * ctx.sample_rate) as usize).clamp(1, len - 1);

        let read_pos = (self.write_pos + len - delay_samples) % len;
        let delayed = sanitize(self.buffer[read_pos]);

        let input = io.inputs.value(IN);
        self.buffer[self.write_pos] = sanitize(input + delayed * feedback);
        self.write_pos = (self.write_pos + 1) % len;

        io.outputs.set(OUT, delayed);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(DelayKernel::new())
    }

    fn buffered(&self) -> bool {
        true
    }

    fn reset_state(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("in");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(Parameter::double("time", 0.25, 0.0, MAX_DELAY_SECS as f64).with_step(0.001));
    params.add(Parameter::double("feedback", 0.0, 0.0, 0.95).with_step(0.01));

    UnitHandle::new(
        "delay",
        inputs,
        outputs,
        params,
        Box::new(DelayKernel::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Circuit;
    use crate::parameter::ParamAction;

    #[test]
    fn test_impulse_reappears_after_delay_time() {
        let mut circuit = Circuit::new();
        let delay = circuit.add_unit(build());
        // 10 samples at 1 kHz sample rate for an easily countable test.
        circuit.set_param(delay, PARAM_TIME, ParamAction::Set, 0.010);
        circuit.set_output_unit(delay);

        let ctx = TickContext::new(1000.0);
        circuit.push_to(delay, IN, 1.0);

        let mut seen_at = None;
        for n in 0..32 {
            circuit.tick(&ctx);
            if circuit.output_value(OUT) == 1.0 {
                seen_at = Some(n);
                break;
            }
        }
        assert_eq!(seen_at, Some(10));
    }

    #[test]
    fn test_feedback_produces_decaying_echoes() {
        let mut circuit = Circuit::new();
        let delay = circuit.add_unit(build());
        circuit.set_param(delay, PARAM_TIME, ParamAction::Set, 0.004);
        circuit.set_param(delay, PARAM_FEEDBACK, ParamAction::Set, 0.5);
        circuit.set_output_unit(delay);

        let ctx = TickContext::new(1000.0);
        circuit.push_to(delay, IN, 1.0);

        let mut echoes = Vec::new();
        for _ in 0..20 {
            circuit.tick(&ctx);
            let v = circuit.output_value(OUT);
            if v != 0.0 {
                echoes.push(v);
            }
        }
        assert_eq!(echoes, vec![1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_nan_input_is_flushed_not_circulated() {
        let mut circuit = Circuit::new();
        let delay = circuit.add_unit(build());
        circuit.set_param(delay, PARAM_TIME, ParamAction::Set, 0.002);
        circuit.set_param(delay, PARAM_FEEDBACK, ParamAction::Set, 0.9);
        circuit.set_output_unit(delay);

        let ctx = TickContext::new(1000.0);
        circuit.push_to(delay, IN, f32::NAN);
        for _ in 0..16 {
            circuit.tick(&ctx);
            assert!(circuit.output_value(OUT).is_finite());
        }
    }
}
