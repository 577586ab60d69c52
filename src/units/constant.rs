//! Constant unit: emits a fixed, parameter-controlled value

use crate::parameter::{ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const PARAM_VALUE: usize = 0;
pub const OUT: usize = 0;

pub struct ConstantKernel;

impl UnitKernel for ConstantKernel {
    fn class_name(&self) -> &'static str {
        "ConstantUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        io.outputs.set(OUT, io.params.value(PARAM_VALUE) as f32);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(ConstantKernel)
    }
}

pub fn build() -> UnitHandle {
    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(Parameter::double("value", 0.0, -1.0e6, 1.0e6));

    UnitHandle::new(
        "constant",
        SignalBus::new(),
        outputs,
        params,
        Box::new(ConstantKernel),
    )
}
