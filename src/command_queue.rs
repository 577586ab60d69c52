//! Lock-free command channel between the control thread and the audio thread
//!
//! Structural edits never run on the audio thread directly. The control side
//! queues `Command`s into a bounded SPSC ring; the audio thread drains the
//! ring at a block boundary, applies each edit, and sends an `Ack` back on a
//! second ring. Neither side ever blocks or allocates on push/pop.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};

use crate::circuit::Circuit;
use crate::parameter::ParamAction;
use crate::registry::UnitRegistry;
use crate::signal::PortId;
use crate::unit::{ClassId, UnitId};

/// One structural or parameter edit, self-contained so it can be replayed
/// onto every voice clone.
#[derive(Debug, Clone)]
pub enum Edit {
    AddUnit {
        unit: UnitId,
        class: ClassId,
    },
    RemoveUnit {
        unit: UnitId,
    },
    Connect {
        source: UnitId,
        source_port: PortId,
        target: UnitId,
        target_port: PortId,
    },
    Disconnect {
        source: UnitId,
        source_port: PortId,
        target: UnitId,
        target_port: PortId,
    },
    SetInputUnit {
        unit: UnitId,
    },
    SetOutputUnit {
        unit: UnitId,
    },
    SetParam {
        unit: UnitId,
        param: usize,
        action: ParamAction,
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Command {
    pub seq: u64,
    pub edit: Edit,
}

/// How the audio thread disposed of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// The edit changed the circuit.
    Applied,
    /// Harmless no-op: duplicate connection, already-removed unit, and so on.
    Ignored,
    /// The edit was invalid and nothing changed (bad port, zero-latency cycle).
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub struct Ack {
    pub seq: u64,
    pub status: AckStatus,
}

/// Control-thread half: queues commands, collects acks, allocates unit ids.
///
/// Ids are allocated here rather than by the audio thread so the control
/// surface can refer to a unit (connect it, set its params) before the
/// AddUnit command has even been applied.
pub struct CommandSender {
    commands: HeapProd<Command>,
    acks: HeapCons<Ack>,
    next_seq: u64,
    next_unit_id: UnitId,
}

impl CommandSender {
    /// Reserve a unit id for a future `Edit::AddUnit`.
    pub fn allocate_unit_id(&mut self) -> UnitId {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        id
    }

    /// Queue an edit. When the ring is full the edit is handed back unchanged
    /// so the caller can retry after the audio thread drains; nothing is
    /// silently dropped.
    pub fn send(&mut self, edit: Edit) -> Result<u64, Edit> {
        let seq = self.next_seq;
        match self.commands.try_push(Command { seq, edit }) {
            Ok(()) => {
                self.next_seq += 1;
                Ok(seq)
            }
            Err(rejected) => {
                warn!("command ring full, edit {} deferred", seq);
                Err(rejected.edit)
            }
        }
    }

    pub fn pending_capacity(&self) -> usize {
        self.commands.vacant_len()
    }

    /// Pop every ack the audio thread has produced so far.
    pub fn drain_acks(&mut self) -> Vec<Ack> {
        let mut acks = Vec::new();
        while let Some(ack) = self.acks.try_pop() {
            acks.push(ack);
        }
        acks
    }
}

/// Audio-thread half: drains commands at the block boundary.
pub struct CommandReceiver {
    commands: HeapCons<Command>,
    acks: HeapProd<Ack>,
}

impl CommandReceiver {
    /// Pop and apply every queued command, acking each. `apply` is the
    /// caller's executor (typically [`apply_edit`] replayed across voices).
    pub fn drain<F>(&mut self, mut apply: F) -> usize
    where
        F: FnMut(&Edit) -> AckStatus,
    {
        let mut applied = 0;
        while let Some(command) = self.commands.try_pop() {
            let status = apply(&command.edit);
            applied += 1;
            if self
                .acks
                .try_push(Ack {
                    seq: command.seq,
                    status,
                })
                .is_err()
            {
                // Control side stopped draining; the edit still took effect.
                warn!("ack ring full, ack {} dropped", command.seq);
            }
        }
        applied
    }
}

/// Build a connected sender/receiver pair. `first_unit_id` seeds the sender's
/// id allocator past any ids the initial patch already uses.
pub fn command_queue(capacity: usize, first_unit_id: UnitId) -> (CommandSender, CommandReceiver) {
    let (cmd_tx, cmd_rx) = HeapRb::<Command>::new(capacity).split();
    let (ack_tx, ack_rx) = HeapRb::<Ack>::new(capacity).split();
    (
        CommandSender {
            commands: cmd_tx,
            acks: ack_rx,
            next_seq: 0,
            next_unit_id: first_unit_id,
        },
        CommandReceiver {
            commands: cmd_rx,
            acks: ack_tx,
        },
    )
}

/// Apply one edit to one circuit.
///
/// Outcome mapping follows the live-editing contract: edits naming a unit
/// that no longer exists are harmless no-ops (Ignored), duplicates are
/// Ignored, and structurally invalid edits are Rejected with the circuit
/// untouched.
pub fn apply_edit(circuit: &mut Circuit, registry: &UnitRegistry, edit: &Edit) -> AckStatus {
    match edit {
        Edit::AddUnit { unit, class } => match registry.create(*class) {
            Some(handle) => match circuit.insert_unit(*unit, handle) {
                Ok(()) => AckStatus::Applied,
                Err(_) => AckStatus::Ignored,
            },
            None => {
                warn!(class = *class, "add unit: unknown class");
                AckStatus::Rejected
            }
        },
        Edit::RemoveUnit { unit } => {
            if circuit.remove_unit(*unit) {
                AckStatus::Applied
            } else {
                AckStatus::Ignored
            }
        }
        Edit::Connect {
            source,
            source_port,
            target,
            target_port,
        } => {
            // Missing endpoints mean the unit was removed after this command
            // was queued; treat as stale rather than invalid.
            if circuit.unit(*source).is_none() || circuit.unit(*target).is_none() {
                return AckStatus::Ignored;
            }
            match circuit.connect(*source, *source_port, *target, *target_port) {
                Ok(true) => AckStatus::Applied,
                Ok(false) => AckStatus::Ignored,
                Err(reason) => {
                    debug!(%reason, "connect rejected");
                    AckStatus::Rejected
                }
            }
        }
        Edit::Disconnect {
            source,
            source_port,
            target,
            target_port,
        } => {
            if circuit.disconnect(*source, *source_port, *target, *target_port) {
                AckStatus::Applied
            } else {
                AckStatus::Ignored
            }
        }
        Edit::SetInputUnit { unit } => {
            if circuit.set_input_unit(*unit) {
                AckStatus::Applied
            } else {
                AckStatus::Ignored
            }
        }
        Edit::SetOutputUnit { unit } => {
            if circuit.set_output_unit(*unit) {
                AckStatus::Applied
            } else {
                AckStatus::Ignored
            }
        }
        Edit::SetParam {
            unit,
            param,
            action,
            value,
        } => {
            if circuit.set_param(*unit, *param, *action, *value) {
                AckStatus::Applied
            } else {
                AckStatus::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::class_id;

    #[test]
    fn test_send_drain_ack_roundtrip() {
        let registry = UnitRegistry::with_builtins();
        let mut circuit = Circuit::new();
        let (mut tx, mut rx) = command_queue(8, 1);

        let id = tx.allocate_unit_id();
        tx.send(Edit::AddUnit {
            unit: id,
            class: class_id("GainUnit"),
        })
        .unwrap();
        tx.send(Edit::SetOutputUnit { unit: id }).unwrap();

        let applied = rx.drain(|edit| apply_edit(&mut circuit, &registry, edit));
        assert_eq!(applied, 2);
        assert!(circuit.unit(id).is_some());
        assert_eq!(circuit.output_unit(), Some(id));

        let acks = tx.drain_acks();
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|a| a.status == AckStatus::Applied));
        assert_eq!(acks[0].seq, 0);
        assert_eq!(acks[1].seq, 1);
    }

    #[test]
    fn test_full_ring_hands_edit_back() {
        let (mut tx, mut rx) = command_queue(2, 1);
        let unit = tx.allocate_unit_id();

        tx.send(Edit::RemoveUnit { unit }).unwrap();
        tx.send(Edit::RemoveUnit { unit }).unwrap();
        let deferred = tx.send(Edit::RemoveUnit { unit });
        assert!(deferred.is_err());

        // After the audio side drains there is room again.
        let registry = UnitRegistry::with_builtins();
        let mut circuit = Circuit::new();
        rx.drain(|edit| apply_edit(&mut circuit, &registry, edit));
        let edit = deferred.unwrap_err();
        assert!(tx.send(edit).is_ok());
    }

    #[test]
    fn test_stale_and_invalid_edits() {
        let registry = UnitRegistry::with_builtins();
        let mut circuit = Circuit::new();
        let gain = circuit.add_unit(registry.create_by_name("GainUnit").unwrap());

        // Unknown target: stale, Ignored.
        let status = apply_edit(
            &mut circuit,
            &registry,
            &Edit::Connect {
                source: gain,
                source_port: 0,
                target: 999,
                target_port: 0,
            },
        );
        assert_eq!(status, AckStatus::Ignored);

        // Out-of-range port on existing units: Rejected.
        let status = apply_edit(
            &mut circuit,
            &registry,
            &Edit::Connect {
                source: gain,
                source_port: 7,
                target: gain,
                target_port: 0,
            },
        );
        assert_eq!(status, AckStatus::Rejected);

        // Unknown class: Rejected.
        let status = apply_edit(
            &mut circuit,
            &registry,
            &Edit::AddUnit {
                unit: 42,
                class: class_id("NoSuchUnit"),
            },
        );
        assert_eq!(status, AckStatus::Rejected);

        assert_eq!(circuit.connection_count(), 0);
    }

    #[test]
    fn test_id_allocation_is_monotonic() {
        let (mut tx, _rx) = command_queue(4, 10);
        assert_eq!(tx.allocate_unit_id(), 10);
        assert_eq!(tx.allocate_unit_id(), 11);
        assert_eq!(tx.allocate_unit_id(), 12);
    }
}
