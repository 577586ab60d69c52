//! Per-unit connection bus
//!
//! Each unit carries one `ConnectionBus`: for every local input port, the list
//! of upstream (unit, port) producers feeding it. The circuit evaluator walks
//! these records during the recursive pull; structural edits are the only
//! writers.

use crate::signal::PortId;
use crate::unit::UnitId;

/// One upstream producer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRef {
    pub unit: UnitId,
    pub port: PortId,
}

/// Per-input-port lists of upstream producers.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBus {
    ports: Vec<Vec<SourceRef>>,
}

impl ConnectionBus {
    pub fn new(port_count: usize) -> Self {
        Self {
            ports: vec![Vec::new(); port_count],
        }
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Append a producer unless the identical record already exists.
    /// Returns false (and leaves state unchanged) on a duplicate or an
    /// out-of-range local port.
    pub fn connect(&mut self, source: SourceRef, local_port: PortId) -> bool {
        match self.ports.get_mut(local_port) {
            Some(sources) => {
                if sources.contains(&source) {
                    false
                } else {
                    sources.push(source);
                    true
                }
            }
            None => false,
        }
    }

    /// Remove a single matching record; false if it was not present.
    pub fn disconnect(&mut self, source: SourceRef, local_port: PortId) -> bool {
        match self.ports.get_mut(local_port) {
            Some(sources) => match sources.iter().position(|s| *s == source) {
                Some(idx) => {
                    sources.remove(idx);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Remove every record referencing `unit`. Mandatory during unit removal.
    /// Returns the number of records purged.
    pub fn disconnect_unit(&mut self, unit: UnitId) -> usize {
        let mut removed = 0;
        for sources in &mut self.ports {
            let before = sources.len();
            sources.retain(|s| s.unit != unit);
            removed += before - sources.len();
        }
        removed
    }

    pub fn sources(&self, local_port: PortId) -> &[SourceRef] {
        self.ports.get(local_port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indexed access so the evaluator can walk sources without borrowing the
    /// list across a recursive call (SourceRef is Copy).
    pub fn source_at(&self, local_port: PortId, idx: usize) -> Option<SourceRef> {
        self.ports.get(local_port).and_then(|s| s.get(idx)).copied()
    }

    pub fn total_connections(&self) -> usize {
        self.ports.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortId, &[SourceRef])> {
        self.ports.iter().enumerate().map(|(p, s)| (p, s.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(unit: UnitId, port: PortId) -> SourceRef {
        SourceRef { unit, port }
    }

    #[test]
    fn test_duplicate_connect_is_rejected() {
        let mut bus = ConnectionBus::new(2);

        assert!(bus.connect(src(1, 0), 0));
        assert!(!bus.connect(src(1, 0), 0));
        assert_eq!(bus.total_connections(), 1);

        // Same endpoint into a different local port is a distinct record.
        assert!(bus.connect(src(1, 0), 1));
        assert_eq!(bus.total_connections(), 2);
    }

    #[test]
    fn test_disconnect_semantics() {
        let mut bus = ConnectionBus::new(1);
        bus.connect(src(1, 0), 0);

        assert!(!bus.disconnect(src(2, 0), 0));
        assert_eq!(bus.total_connections(), 1);

        assert!(bus.disconnect(src(1, 0), 0));
        assert_eq!(bus.total_connections(), 0);
        assert!(!bus.disconnect(src(1, 0), 0));
    }

    #[test]
    fn test_bulk_disconnect_purges_all_ports() {
        let mut bus = ConnectionBus::new(3);
        bus.connect(src(1, 0), 0);
        bus.connect(src(1, 1), 1);
        bus.connect(src(2, 0), 1);
        bus.connect(src(1, 0), 2);

        assert_eq!(bus.disconnect_unit(1), 3);
        assert_eq!(bus.total_connections(), 1);
        assert_eq!(bus.sources(1), &[src(2, 0)]);
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let mut bus = ConnectionBus::new(1);
        assert!(!bus.connect(src(1, 0), 5));
        assert!(bus.source_at(5, 0).is_none());
    }
}
