//! Gain unit: out = in * gain * level
//!
//! The `level` port is multiplicative with a bias of 1.0, so it sits
//! transparent until something modulates it (VCA-style amplitude control);
//! the `gain` parameter is the static control-surface value.

use crate::parameter::{ParamSet, Parameter};
use crate::signal::{CombineOp, SignalBus};
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN: usize = 0;
pub const IN_LEVEL: usize = 1;
pub const OUT: usize = 0;
pub const PARAM_GAIN: usize = 0;

pub struct GainKernel;

impl UnitKernel for GainKernel {
    fn class_name(&self) -> &'static str {
        "GainUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        let gain = io.params.value(PARAM_GAIN) as f32;
        let out = io.inputs.value(IN) * gain * io.inputs.value(IN_LEVEL);
        io.outputs.set(OUT, out);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(GainKernel)
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("in");
    inputs.add_channel_with("level", 1.0, CombineOp::Multiply);

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(Parameter::double("gain", 1.0, 0.0, 4.0).with_step(0.05));

    UnitHandle::new(
        "gain",
        inputs,
        outputs,
        params,
        Box::new(GainKernel),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Circuit;
    use crate::parameter::ParamAction;
    use crate::units::constant;

    #[test]
    fn test_gain_chain_halves_per_stage() {
        // Chain of N gains at 0.5 fed 1.0 yields 0.5^N.
        for n in [1usize, 3] {
            let mut circuit = Circuit::new();
            let source = circuit.add_unit(constant::build());
            circuit.set_param(source, constant::PARAM_VALUE, ParamAction::Set, 1.0);

            let mut prev = source;
            let mut prev_port = constant::OUT;
            let mut last = source;
            for _ in 0..n {
                let g = circuit.add_unit(build());
                circuit.set_param(g, PARAM_GAIN, ParamAction::Set, 0.5);
                circuit.connect(prev, prev_port, g, IN).unwrap();
                prev = g;
                prev_port = OUT;
                last = g;
            }
            circuit.set_output_unit(last);

            circuit.tick(&TickContext::new(48000.0));
            let expected = 0.5f32.powi(n as i32);
            assert_eq!(circuit.output_value(OUT), expected);
        }
    }

    #[test]
    fn test_level_port_multiplies_on_top() {
        let mut circuit = Circuit::new();
        let source = circuit.add_unit(constant::build());
        circuit.set_param(source, constant::PARAM_VALUE, ParamAction::Set, 1.0);
        let g = circuit.add_unit(build());
        circuit.connect(source, constant::OUT, g, IN).unwrap();
        circuit.set_output_unit(g);

        // Unmodulated level is transparent.
        circuit.tick(&TickContext::new(48000.0));
        assert_eq!(circuit.output_value(OUT), 1.0);

        // A pushed level contribution scales one sample.
        circuit.push_to(g, IN_LEVEL, 0.25);
        circuit.tick(&TickContext::new(48000.0));
        assert_eq!(circuit.output_value(OUT), 0.25);
    }
}
