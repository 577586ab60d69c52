//! The processing unit abstraction
//!
//! A unit is one node in the circuit graph: an input bus, an output bus, a
//! parameter set and a kernel implementing the per-sample computation step.
//! Kernels are trait objects so a circuit can hold a heterogeneous graph and
//! clone it per voice without knowing concrete types.

use crate::connection::ConnectionBus;
use crate::parameter::ParamSet;
use crate::signal::SignalBus;

/// Unique identifier of a unit within its owning circuit.
pub type UnitId = u64;

/// Stable type tag: a hash of the concrete kernel's class name, used for
/// factory lookup and persistence.
pub type ClassId = u64;

/// FNV-1a over the class name.
///
/// Collisions between distinct class names are an accepted, documented risk;
/// they are not detected beyond a registration-time warning.
pub fn class_id(name: &str) -> ClassId {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Timing state passed to every kernel during a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub sample_rate: f32,
}

impl TickContext {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }
}

/// Borrowed view of a unit's buses and parameters handed to the kernel.
///
/// The kernel reads the input bus and parameters and writes the output bus;
/// it must not reach anywhere else and must be free of unbounded-time work.
pub struct UnitIo<'a> {
    pub inputs: &'a SignalBus,
    pub outputs: &'a mut SignalBus,
    pub params: &'a ParamSet,
}

/// Per-sample computation step of a concrete unit type.
pub trait UnitKernel: Send {
    /// Stable class name; hashed into the persistence/factory type tag.
    fn class_name(&self) -> &'static str;

    /// Compute one sample: read `io.inputs` and `io.params`, write `io.outputs`.
    fn process(&mut self, io: &mut UnitIo, ctx: &TickContext);

    /// Deep-clone into an independently owned kernel (per-voice duplication).
    fn clone_kernel(&self) -> Box<dyn UnitKernel>;

    /// True if the output at sample N depends only on inputs from samples < N.
    /// Buffered units are the only legal way to close a feedback loop.
    fn buffered(&self) -> bool {
        false
    }

    /// Clear transient DSP state (phases, filter memory, delay lines).
    fn reset_state(&mut self) {}
}

/// A unit as owned by its circuit: kernel plus the shared runtime surface.
///
/// The owning circuit is reachable only through the arena id this handle is
/// keyed by; there is no back-pointer, so removal can never dangle.
pub struct UnitHandle {
    name: String,
    pub(crate) inputs: SignalBus,
    pub(crate) outputs: SignalBus,
    pub(crate) params: ParamSet,
    pub(crate) bus: ConnectionBus,
    pub(crate) ticked: bool,
    pub(crate) kernel: Box<dyn UnitKernel>,
}

impl UnitHandle {
    pub fn new(
        name: &str,
        inputs: SignalBus,
        outputs: SignalBus,
        params: ParamSet,
        kernel: Box<dyn UnitKernel>,
    ) -> Self {
        let bus = ConnectionBus::new(inputs.len());
        Self {
            name: name.to_string(),
            inputs,
            outputs,
            params,
            bus,
            ticked: false,
            kernel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn class_name(&self) -> &'static str {
        self.kernel.class_name()
    }

    pub fn class_id(&self) -> ClassId {
        class_id(self.kernel.class_name())
    }

    pub fn inputs(&self) -> &SignalBus {
        &self.inputs
    }

    /// Mutable input bus access for the control surface (port biases).
    pub fn inputs_mut(&mut self) -> &mut SignalBus {
        &mut self.inputs
    }

    pub fn outputs(&self) -> &SignalBus {
        &self.outputs
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    pub fn connection_bus(&self) -> &ConnectionBus {
        &self.bus
    }

    pub fn buffered(&self) -> bool {
        self.kernel.buffered()
    }

    pub fn ticked(&self) -> bool {
        self.ticked
    }

    /// Clear the ticked flag and restore input biases for the next sample.
    /// Output values persist between samples: they are the cache a buffered
    /// feedback loop reads while its producer has not run yet this sample.
    pub fn begin_tick(&mut self) {
        self.ticked = false;
        self.inputs.reset_all();
    }

    /// Clear all runtime state, including kernel DSP memory.
    pub fn reset(&mut self) {
        self.ticked = false;
        self.inputs.reset_all();
        self.outputs.reset_all();
        self.kernel.reset_state();
    }

    /// Independently owned copy with identical configuration (port layout,
    /// parameters, connection records) and default, non-ticked runtime state.
    pub fn clone_unit(&self) -> UnitHandle {
        let mut clone = UnitHandle {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            params: self.params.clone(),
            bus: self.bus.clone(),
            ticked: false,
            kernel: self.kernel.clone_kernel(),
        };
        clone.reset();
        clone
    }
}

impl std::fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitHandle")
            .field("name", &self.name)
            .field("class", &self.kernel.class_name())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("ticked", &self.ticked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_id_is_stable_and_distinct() {
        assert_eq!(class_id("GainUnit"), class_id("GainUnit"));
        assert_ne!(class_id("GainUnit"), class_id("DelayUnit"));
        assert_ne!(class_id(""), class_id("a"));
    }

    struct CountingKernel {
        runs: u32,
    }

    impl UnitKernel for CountingKernel {
        fn class_name(&self) -> &'static str {
            "CountingKernel"
        }

        fn process(&mut self, io: &mut UnitIo, _ctx: &TickContext) {
            self.runs += 1;
            io.outputs.set(0, self.runs as f32);
        }

        fn clone_kernel(&self) -> Box<dyn UnitKernel> {
            Box::new(CountingKernel { runs: 0 })
        }

        fn reset_state(&mut self) {
            self.runs = 0;
        }
    }

    fn counting_unit() -> UnitHandle {
        let mut outputs = SignalBus::new();
        outputs.add_channel("out");
        UnitHandle::new(
            "counter",
            SignalBus::new(),
            outputs,
            ParamSet::new(),
            Box::new(CountingKernel { runs: 0 }),
        )
    }

    #[test]
    fn test_clone_unit_starts_fresh() {
        let mut unit = counting_unit();
        let ctx = TickContext::new(48000.0);
        let mut io = UnitIo {
            inputs: &unit.inputs,
            outputs: &mut unit.outputs,
            params: &unit.params,
        };
        unit.kernel.process(&mut io, &ctx);
        unit.ticked = true;

        let clone = unit.clone_unit();
        assert!(!clone.ticked());
        assert_eq!(clone.outputs().value(0), 0.0);
        assert_eq!(unit.outputs().value(0), 1.0);
    }
}
