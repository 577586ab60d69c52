//! State-variable lowpass filter
//!
//! Chamberlin-style SVF with tan-warped cutoff, the same topology the voice
//! filter uses in the classic two-integrator form. Cutoff is the `cutoff`
//! parameter plus the `cutoff_mod` port (Hz), so an envelope can sweep the
//! filter. Integrator state is sanitized every sample: a NaN or infinity in
//! feedback memory is flushed to zero instead of ringing forever.

use std::f32::consts::PI;

use crate::parameter::{ControlShape, ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN: usize = 0;
pub const IN_CUTOFF_MOD: usize = 1;
pub const OUT: usize = 0;

pub const PARAM_CUTOFF: usize = 0;
pub const PARAM_RESONANCE: usize = 1;

pub struct SvfFilterKernel {
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfFilterKernel {
    pub fn new() -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }
}

impl Default for SvfFilterKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitKernel for SvfFilterKernel {
    fn class_name(&self) -> &'static str {
        "SvfFilterUnit"
    }

    fn process(&mut self, io: &mut UnitIo, ctx: &TickContext) {
        let input = io.inputs.value(IN);
        let modulated = io.params.value(PARAM_CUTOFF) as f32 + io.inputs.value(IN_CUTOFF_MOD);
        let cutoff = modulated.clamp(20.0, ctx.sample_rate * 0.45);
        // Resonance 0..1 maps to Q 0.5..20.
        let q = 0.5 + io.params.value(PARAM_RESONANCE) as f32 * 19.5;

        let g = (PI * cutoff / ctx.sample_rate).tan();
        let k = 1.0 / q;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;

        let v3 = input - self.ic2eq;
        let v1 = a1 * self.ic1eq + a2 * v3;
        let v2 = self.ic2eq + a2 * self.ic1eq + a3 * v3;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        if !self.ic1eq.is_finite() || !self.ic2eq.is_finite() {
            self.ic1eq = 0.0;
            self.ic2eq = 0.0;
        }

        io.outputs.set(OUT, if v2.is_finite() { v2 } else { 0.0 });
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(SvfFilterKernel::new())
    }

    fn reset_state(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("in");
    inputs.add_channel("cutoff_mod");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(
        Parameter::double("cutoff", 1000.0, 20.0, 20000.0)
            .with_shape(ControlShape::Unbounded)
            .with_step(1.0),
    );
    params.add(Parameter::double("resonance", 0.0, 0.0, 1.0).with_step(0.05));

    UnitHandle::new(
        "filter",
        inputs,
        outputs,
        params,
        Box::new(SvfFilterKernel::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Circuit;
    use crate::parameter::ParamAction;
    use crate::units::{constant, noise, oscillator};

    #[test]
    fn test_dc_passes_through_lowpass() {
        let mut circuit = Circuit::new();
        let source = circuit.add_unit(constant::build());
        circuit.set_param(source, constant::PARAM_VALUE, ParamAction::Set, 1.0);
        let filter = circuit.add_unit(build());
        circuit.connect(source, constant::OUT, filter, IN).unwrap();
        circuit.set_output_unit(filter);

        let ctx = TickContext::new(48000.0);
        let mut last = 0.0;
        for _ in 0..4000 {
            circuit.tick(&ctx);
            last = circuit.output_value(OUT);
        }
        assert!((last - 1.0).abs() < 0.01, "settled at {}", last);
    }

    #[test]
    fn test_low_cutoff_attenuates_high_frequency() {
        let mut circuit = Circuit::new();
        let osc = circuit.add_unit(oscillator::build());
        circuit.set_param(osc, oscillator::PARAM_FREQ, ParamAction::Set, 8000.0);
        let filter = circuit.add_unit(build());
        circuit.set_param(filter, PARAM_CUTOFF, ParamAction::Set, 100.0);
        circuit.connect(osc, oscillator::OUT, filter, IN).unwrap();
        circuit.set_output_unit(filter);

        let ctx = TickContext::new(48000.0);
        let mut peak: f32 = 0.0;
        for _ in 0..4800 {
            circuit.tick(&ctx);
            peak = peak.max(circuit.output_value(OUT).abs());
        }
        assert!(peak < 0.05, "8 kHz through 100 Hz lowpass peaked at {}", peak);
    }

    #[test]
    fn test_state_recovers_from_injected_nan() {
        let mut circuit = Circuit::new();
        let src = circuit.add_unit(noise::build());
        let filter = circuit.add_unit(build());
        circuit.connect(src, noise::OUT, filter, IN).unwrap();
        circuit.set_output_unit(filter);

        let ctx = TickContext::new(48000.0);
        circuit.tick(&ctx);

        // Corrupt the input for one sample; output must never go NaN for good.
        circuit.push_to(filter, IN, f32::NAN);
        circuit.tick(&ctx);
        for _ in 0..16 {
            circuit.tick(&ctx);
        }
        assert!(circuit.output_value(OUT).is_finite());
    }
}
