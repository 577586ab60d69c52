//! Oscillator unit: sine, saw, square and triangle waveforms
//!
//! Effective frequency is the `freq` parameter plus whatever arrives on the
//! `freq_mod` port, so an LFO or envelope can bend pitch without touching the
//! parameter itself.

use std::f32::consts::PI;

use crate::parameter::{ControlShape, ParamSet, Parameter};
use crate::signal::SignalBus;
use crate::unit::{TickContext, UnitHandle, UnitIo, UnitKernel};

pub const IN_FREQ_MOD: usize = 0;
pub const OUT: usize = 0;

pub const PARAM_FREQ: usize = 0;
pub const PARAM_WAVEFORM: usize = 1;
pub const PARAM_AMP: usize = 2;

pub const WAVE_SINE: usize = 0;
pub const WAVE_SAW: usize = 1;
pub const WAVE_SQUARE: usize = 2;
pub const WAVE_TRIANGLE: usize = 3;

pub struct OscillatorKernel {
    phase: f32,
}

impl OscillatorKernel {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }
}

impl Default for OscillatorKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitKernel for OscillatorKernel {
    fn class_name(&self) -> &'static str {
        "OscillatorUnit"
    }

    fn process(&mut self, io: &mut UnitIo, ctx: &TickContext) {
        let freq = (io.params.value(PARAM_FREQ) as f32 + io.inputs.value(IN_FREQ_MOD)).max(0.0);
        let amp = io.params.value(PARAM_AMP) as f32;
        let p = self.phase;

        let sample = match io.params.value(PARAM_WAVEFORM) as usize {
            WAVE_SINE => (2.0 * PI * p).sin(),
            WAVE_SAW => 2.0 * p - 1.0,
            WAVE_SQUARE => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            _ => {
                if p < 0.5 {
                    4.0 * p - 1.0
                } else {
                    3.0 - 4.0 * p
                }
            }
        };
        io.outputs.set(OUT, sample * amp);

        self.phase += freq / ctx.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(OscillatorKernel::new())
    }

    fn reset_state(&mut self) {
        self.phase = 0.0;
    }
}

pub fn build() -> UnitHandle {
    let mut inputs = SignalBus::new();
    inputs.add_channel("freq_mod");

    let mut outputs = SignalBus::new();
    outputs.add_channel("out");

    let mut params = ParamSet::new();
    params.add(
        Parameter::double("freq", 440.0, 20.0, 20000.0)
            .with_shape(ControlShape::Unbounded)
            .with_step(1.0),
    );
    params.add(Parameter::choice(
        "waveform",
        WAVE_SINE,
        &["sine", "saw", "square", "triangle"],
    ));
    params.add(Parameter::double("amp", 1.0, 0.0, 1.0).with_step(0.05));

    UnitHandle::new(
        "oscillator",
        inputs,
        outputs,
        params,
        Box::new(OscillatorKernel::new()),
    )
}
