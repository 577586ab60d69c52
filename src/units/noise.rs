//! White noise unit

use crate::parameter::{ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const OUT: usize = 0;
pub const PARAM_AMP: usize = 0;

pub struct NoiseKernel {
    rng: fastrand::Rng,
}

impl NoiseKernel {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }
}

impl Default for NoiseKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitKernel for NoiseKernel {
    fn class_name(&self) -> &'static str {
        "NoiseUnit"
    }

    fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
        let amp = io.params.value(PARAM_AMP) as f32;
        io.outputs.set(OUT, (self.rng.f32() * 2.0 - 1.0) * amp);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        // Each clone gets its own generator so voices decorrelate.
        Box::new(NoiseKernel::new())
    }
}

pub fn build() -> UnitHandle {
    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(Parameter::double("amp", 1.0, 0.0, 1.0).with_step(0.05));

    UnitHandle::new(
        "noise",
        SignalBus::new(),
        outputs,
        params,
        Box::new(NoiseKernel::new()),
    )
}
