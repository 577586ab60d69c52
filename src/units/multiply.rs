//! Multiplication unit: out = a * b (ring modulation, amplitude control)

use crate::parameter::ParamSet;
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN_A: usize = 0;
pub const IN_B: usize = 1;
pub const OUT: usize = 0;

pub struct MultiplyKernel;

impl UnitKernel for MultiplyKernel {
    fn class_name(&self) -> &'static str {
        "MultiplyUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        io.outputs
            .set(OUT, io.inputs.value(IN_A) * io.inputs.value(IN_B));
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(MultiplyKernel)
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("a");
    inputs.add_channel("b");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    UnitHandle::new(
        "multiply",
        inputs,
        outputs,
        ParamSet::new(),
        Box::new(MultiplyKernel),
    )
}
