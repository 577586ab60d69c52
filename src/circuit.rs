//! The circuit: a graph of units and the per-tick evaluation algorithm
//!
//! A circuit owns its child units in an arena keyed by stable integer ids;
//! every cross-reference (connection endpoint, designated input/output) is an
//! id resolved through that map, so removing a unit can never leave a dangling
//! pointer behind.
//!
//! Evaluation is a recursive pull: `tick` clears every unit's ticked flag,
//! then pulls from the designated output unit, which transitively ticks its
//! fan-in. A unit marks itself ticked on entry, so diamond fan-in computes each
//! producer exactly once and a feedback loop broken by a buffered unit reads
//! the producer's cached previous-sample output instead of recursing.
//!
//! Zero-latency cycles are rejected at connect time by a reachability check;
//! the evaluator never has to defend against them.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::connection::SourceRef;
use crate::parameter::ParamAction;
use crate::signal::PortId;
use crate::unit::{TickContext, UnitHandle, UnitId, UnitIo};

/// A connection record as seen by the control surface and the serializer.
/// Derived from the per-unit connection buses, which are the single source of
/// truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub source: UnitId,
    pub source_port: PortId,
    pub target: UnitId,
    pub target_port: PortId,
}

/// A unit graph that is itself tickable.
pub struct Circuit {
    units: HashMap<UnitId, UnitHandle>,
    next_id: UnitId,
    input_unit: Option<UnitId>,
    output_unit: Option<UnitId>,
    /// Side-channel writes queued by `push_to`, folded in on the next tick
    /// after the boundary reset. Capacity is retained across ticks.
    pending_pushes: Vec<(UnitId, PortId, f32)>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            next_id: 1,
            input_unit: None,
            output_unit: None,
            pending_pushes: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Structural operations: control thread / tick boundary only
    // ------------------------------------------------------------------

    /// Add a unit under a freshly allocated id.
    pub fn add_unit(&mut self, unit: UnitHandle) -> UnitId {
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, class = unit.class_name(), "add unit");
        self.units.insert(id, unit);
        id
    }

    /// Add a unit under an explicit id (command replay keeps prototype and
    /// voice clones id-identical). Fails on an id already in use.
    pub fn insert_unit(&mut self, id: UnitId, unit: UnitHandle) -> Result<(), String> {
        if self.units.contains_key(&id) {
            return Err(format!("unit id {} already in use", id));
        }
        debug!(id, class = unit.class_name(), "insert unit");
        self.units.insert(id, unit);
        self.next_id = self.next_id.max(id + 1);
        Ok(())
    }

    /// Remove a unit and purge every connection that names it, in both
    /// directions. False if the id is unknown.
    pub fn remove_unit(&mut self, id: UnitId) -> bool {
        if self.units.remove(&id).is_none() {
            return false;
        }
        for unit in self.units.values_mut() {
            unit.bus.disconnect_unit(id);
        }
        if self.input_unit == Some(id) {
            self.input_unit = None;
        }
        if self.output_unit == Some(id) {
            self.output_unit = None;
        }
        debug!(id, "remove unit");
        true
    }

    /// Wire `source:source_port -> target:target_port`.
    ///
    /// Ok(false) on an exact duplicate (state unchanged), Err on an unknown
    /// endpoint, an out-of-range port, or an edge that would close a
    /// zero-latency cycle.
    pub fn connect(
        &mut self,
        source: UnitId,
        source_port: PortId,
        target: UnitId,
        target_port: PortId,
    ) -> Result<bool, String> {
        let source_ok = self
            .units
            .get(&source)
            .map(|u| source_port < u.outputs.len())
            .ok_or_else(|| format!("unknown source unit {}", source))?;
        if !source_ok {
            return Err(format!("unit {} has no output port {}", source, source_port));
        }
        let target_ok = self
            .units
            .get(&target)
            .map(|u| target_port < u.inputs.len())
            .ok_or_else(|| format!("unknown target unit {}", target))?;
        if !target_ok {
            return Err(format!("unit {} has no input port {}", target, target_port));
        }

        if self.closes_zero_latency_cycle(source, target) {
            return Err("connection would close a zero-latency cycle".to_string());
        }

        let record = SourceRef {
            unit: source,
            port: source_port,
        };
        let added = self
            .units
            .get_mut(&target)
            .map(|u| u.bus.connect(record, target_port))
            .unwrap_or(false);
        if added {
            debug!(source, source_port, target, target_port, "connect");
        }
        Ok(added)
    }

    /// Wire by port names instead of ids; convenience for the control surface.
    pub fn connect_by_name(
        &mut self,
        source: UnitId,
        source_port: &str,
        target: UnitId,
        target_port: &str,
    ) -> Result<bool, String> {
        let sp = self
            .units
            .get(&source)
            .and_then(|u| u.outputs.port_by_name(source_port))
            .ok_or_else(|| format!("unknown output port '{}' on unit {}", source_port, source))?;
        let tp = self
            .units
            .get(&target)
            .and_then(|u| u.inputs.port_by_name(target_port))
            .ok_or_else(|| format!("unknown input port '{}' on unit {}", target_port, target))?;
        self.connect(source, sp, target, tp)
    }

    /// Remove exactly one matching edge; false if it does not exist.
    pub fn disconnect(
        &mut self,
        source: UnitId,
        source_port: PortId,
        target: UnitId,
        target_port: PortId,
    ) -> bool {
        let record = SourceRef {
            unit: source,
            port: source_port,
        };
        let removed = self
            .units
            .get_mut(&target)
            .map(|u| u.bus.disconnect(record, target_port))
            .unwrap_or(false);
        if removed {
            debug!(source, source_port, target, target_port, "disconnect");
        }
        removed
    }

    /// Designate the unit that receives external note/control data.
    pub fn set_input_unit(&mut self, id: UnitId) -> bool {
        if self.units.contains_key(&id) {
            self.input_unit = Some(id);
            true
        } else {
            false
        }
    }

    /// Designate the unit whose output is the circuit's output.
    pub fn set_output_unit(&mut self, id: UnitId) -> bool {
        if self.units.contains_key(&id) {
            self.output_unit = Some(id);
            true
        } else {
            false
        }
    }

    pub fn input_unit(&self) -> Option<UnitId> {
        self.input_unit
    }

    pub fn output_unit(&self) -> Option<UnitId> {
        self.output_unit
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitHandle> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut UnitHandle> {
        self.units.get_mut(&id)
    }

    /// The id the next `add_unit` call would allocate. Callers that insert
    /// under explicit ids (command replay) read this to stay in step.
    pub fn next_unit_id(&self) -> UnitId {
        self.next_id
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// All connection records, derived from the per-unit buses.
    pub fn connections(&self) -> Vec<Connection> {
        let mut records = Vec::new();
        for (&target, unit) in &self.units {
            for (target_port, sources) in unit.bus.iter() {
                for s in sources {
                    records.push(Connection {
                        source: s.unit,
                        source_port: s.port,
                        target,
                        target_port,
                    });
                }
            }
        }
        records
    }

    /// Connection records that name `id` on either end.
    pub fn connections_to(&self, id: UnitId) -> Vec<Connection> {
        self.connections()
            .into_iter()
            .filter(|c| c.source == id || c.target == id)
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.units.values().map(|u| u.bus.total_connections()).sum()
    }

    // ------------------------------------------------------------------
    // Parameter surface
    // ------------------------------------------------------------------

    /// Apply a clamping parameter action; false for unknown unit or parameter.
    pub fn set_param(
        &mut self,
        unit: UnitId,
        param: usize,
        action: ParamAction,
        value: f64,
    ) -> bool {
        self.units
            .get_mut(&unit)
            .map(|u| u.params.apply(param, action, value))
            .unwrap_or(false)
    }

    pub fn set_param_by_name(
        &mut self,
        unit: UnitId,
        name: &str,
        action: ParamAction,
        value: f64,
    ) -> bool {
        let id = match self.units.get(&unit).and_then(|u| u.params.by_name(name)) {
            Some(id) => id,
            None => return false,
        };
        self.set_param(unit, id, action, value)
    }

    /// Additive side-channel write into a unit's input port without ticking it.
    /// The value is folded onto the port (with the port's combine operator)
    /// after the next tick's boundary reset, so it reaches exactly one sample
    /// and never forces premature evaluation of anything.
    pub fn push_to(&mut self, target: UnitId, port: PortId, value: f32) {
        self.pending_pushes.push((target, port, value));
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Advance the circuit by one sample.
    ///
    /// Resets every unit's ticked flag and input biases, then pulls from the
    /// designated output unit. Each unit's kernel runs exactly once regardless
    /// of fan-out; units outside the output's fan-in are skipped entirely.
    pub fn tick(&mut self, ctx: &TickContext) {
        for unit in self.units.values_mut() {
            unit.begin_tick();
        }
        for i in 0..self.pending_pushes.len() {
            let (target, port, value) = self.pending_pushes[i];
            if let Some(unit) = self.units.get_mut(&target) {
                unit.inputs.combine(port, value);
            }
        }
        self.pending_pushes.clear();
        if let Some(out) = self.output_unit {
            self.tick_unit(out, ctx);
        }
    }

    /// Pull one unit: idempotent per sample.
    ///
    /// The ticked flag is set on entry, before inputs are pulled. Re-entering
    /// the same unit through a buffered feedback path then reads its cached
    /// previous-sample output instead of recursing, which is exactly the
    /// one-sample delay the buffering unit promises.
    pub fn tick_unit(&mut self, id: UnitId, ctx: &TickContext) {
        let already = match self.units.get_mut(&id) {
            Some(unit) => std::mem::replace(&mut unit.ticked, true),
            None => return,
        };
        if already {
            return;
        }

        let port_count = self
            .units
            .get(&id)
            .map(|u| u.bus.port_count())
            .unwrap_or(0);

        for port in 0..port_count {
            let mut idx = 0;
            // Walk producers by index: SourceRef is Copy, so no borrow is held
            // across the recursive call and no allocation happens per sample.
            while let Some(source) = self
                .units
                .get(&id)
                .and_then(|u| u.bus.source_at(port, idx))
            {
                idx += 1;
                self.tick_unit(source.unit, ctx);
                let contribution = self
                    .units
                    .get(&source.unit)
                    .map(|u| u.outputs.value(source.port))
                    .unwrap_or(0.0);
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.inputs.combine(port, contribution);
                }
            }
        }

        if let Some(unit) = self.units.get_mut(&id) {
            let mut io = UnitIo {
                inputs: &unit.inputs,
                outputs: &mut unit.outputs,
                params: &unit.params,
            };
            unit.kernel.process(&mut io, ctx);
        }
    }

    /// Value on the designated output unit's given port after a tick.
    pub fn output_value(&self, port: PortId) -> f32 {
        self.output_unit
            .and_then(|id| self.units.get(&id))
            .map(|u| u.outputs.value(port))
            .unwrap_or(0.0)
    }

    /// Clear all runtime state (ticked flags, port values, kernel DSP memory).
    pub fn reset(&mut self) {
        for unit in self.units.values_mut() {
            unit.reset();
        }
    }

    /// Structurally identical copy with fresh runtime state; ids, connections
    /// and designations carry over so edits replay identically on the clone.
    pub fn clone_circuit(&self) -> Circuit {
        let units = self
            .units
            .iter()
            .map(|(&id, unit)| (id, unit.clone_unit()))
            .collect();
        Circuit {
            units,
            next_id: self.next_id,
            input_unit: self.input_unit,
            output_unit: self.output_unit,
            pending_pushes: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Cycle safety
    // ------------------------------------------------------------------

    /// True if adding `source -> target` would close a loop containing no
    /// buffered unit. Such a loop would make the current sample depend on
    /// itself, so it must never reach the evaluator.
    fn closes_zero_latency_cycle(&self, source: UnitId, target: UnitId) -> bool {
        let unbuffered = |id: UnitId| self.units.get(&id).map(|u| !u.buffered()).unwrap_or(false);

        // A buffered endpoint breaks any loop through the new edge.
        if !unbuffered(source) || !unbuffered(target) {
            return false;
        }
        if source == target {
            return true;
        }

        // Downstream DFS from target through unbuffered units only: if it
        // reaches source, the loop target -> ... -> source -> target would be
        // all same-sample dependencies.
        let mut stack = vec![target];
        let mut seen: HashSet<UnitId> = HashSet::new();
        seen.insert(target);

        while let Some(current) = stack.pop() {
            for (&consumer, unit) in &self.units {
                let feeds_consumer = unit
                    .bus
                    .iter()
                    .any(|(_, sources)| sources.iter().any(|s| s.unit == current));
                if !feeds_consumer {
                    continue;
                }
                if consumer == source {
                    return true;
                }
                if unbuffered(consumer) && seen.insert(consumer) {
                    stack.push(consumer);
                }
            }
        }
        false
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("units", &self.units.len())
            .field("connections", &self.connection_count())
            .field("input_unit", &self.input_unit)
            .field("output_unit", &self.output_unit)
            .finish()
    }
}
