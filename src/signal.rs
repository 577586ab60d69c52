//! Signal values and per-unit signal buses
//!
//! A `Signal` is one scalar flowing through a port. A `SignalBus` is the ordered
//! set of ports a unit exposes on its input or output side. Ports are registered
//! once at construction time and addressed by a small stable integer id after
//! that; the hot path never allocates and never errors on a stale id.

/// Stable per-bus port index, assigned at registration time.
pub type PortId = usize;

/// How combining writes land on a port.
///
/// Fan-in from multiple sources accumulates with the port's operator. Additive
/// ports start from their bias each sample; multiplicative ports (modulation
/// amounts, VCA-style level ports) usually start from a bias of 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Add,
    Multiply,
}

/// A single scalar channel with a combine operator and a restorable bias.
///
/// `value` carries the live per-sample signal; `base` is the static bias the
/// channel returns to when the owning unit resets at the tick boundary. This
/// lets a port hold a parameter-level offset and live contributions at once.
#[derive(Debug, Clone)]
pub struct Signal {
    value: f32,
    base: f32,
    op: CombineOp,
}

impl Signal {
    pub fn new(base: f32, op: CombineOp) -> Self {
        Self {
            value: base,
            base,
            op,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set(&mut self, value: f32) {
        self.value = value;
    }

    /// Set the static bias restored on every reset. Structural-edit path only.
    pub fn set_base(&mut self, base: f32) {
        self.base = base;
    }

    pub fn op(&self) -> CombineOp {
        self.op
    }

    /// Fold an incoming contribution on top of whatever the port already holds.
    pub fn combine(&mut self, incoming: f32) {
        match self.op {
            CombineOp::Add => self.value += incoming,
            CombineOp::Multiply => self.value *= incoming,
        }
    }

    /// Restore the bias value for the next sample's accumulation.
    pub fn reset(&mut self) {
        self.value = self.base;
    }
}

/// Ordered mapping from `PortId` to `Signal`.
///
/// Insertion order defines iteration order but carries no meaning beyond
/// lookup-by-id. Out-of-range reads return 0.0 and out-of-range writes are
/// dropped: this path runs on the audio thread and must not panic.
#[derive(Debug, Clone, Default)]
pub struct SignalBus {
    channels: Vec<Signal>,
    names: Vec<String>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new additive channel. Construction time only.
    pub fn add_channel(&mut self, name: &str) -> PortId {
        self.add_channel_with(name, 0.0, CombineOp::Add)
    }

    /// Register a channel with an explicit bias and combine operator.
    pub fn add_channel_with(&mut self, name: &str, base: f32, op: CombineOp) -> PortId {
        self.channels.push(Signal::new(base, op));
        self.names.push(name.to_string());
        self.channels.len() - 1
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn value(&self, port: PortId) -> f32 {
        self.channels.get(port).map(Signal::value).unwrap_or(0.0)
    }

    pub fn set(&mut self, port: PortId, value: f32) {
        if let Some(ch) = self.channels.get_mut(port) {
            ch.set(value);
        }
    }

    pub fn set_base(&mut self, port: PortId, base: f32) {
        if let Some(ch) = self.channels.get_mut(port) {
            ch.set_base(base);
        }
    }

    pub fn combine(&mut self, port: PortId, incoming: f32) {
        if let Some(ch) = self.channels.get_mut(port) {
            ch.combine(incoming);
        }
    }

    /// Restore every channel to its bias. Called once per tick boundary.
    pub fn reset_all(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
    }

    pub fn name(&self, port: PortId) -> Option<&str> {
        self.names.get(port).map(String::as_str)
    }

    pub fn port_by_name(&self, name: &str) -> Option<PortId> {
        self.names.iter().position(|n| n == name)
    }
}
