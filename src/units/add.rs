//! Addition unit: out = a + b

use crate::parameter::ParamSet;
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN_A: usize = 0;
pub const IN_B: usize = 1;
pub const OUT: usize = 0;

pub struct AddKernel;

impl UnitKernel for AddKernel {
    fn class_name(&self) -> &'static str {
        "AddUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        io.outputs
            .set(OUT, io.inputs.value(IN_A) + io.inputs.value(IN_B));
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(AddKernel)
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("a");
    inputs.add_channel("b");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    UnitHandle::new("add", inputs, outputs, ParamSet::new(), Box::new(AddKernel))
}
