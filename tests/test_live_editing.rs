//! Live-editing integration: commands sent through the lock-free queue must
//! leave the circuit in exactly the state direct edits would.

use polaron::circuit::Circuit;
use polaron::command_queue::{apply_edit, command_queue, AckStatus, Edit};
use polaron::parameter::ParamAction;
use polaron::patch;
use polaron::registry::UnitRegistry;
use polaron::unit::{class_id, TickContext};
use polaron::units::{gain, oscillator};

/// Route edit tracing through the test harness; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Build the reference circuit with direct calls.
fn build_direct(registry: &UnitRegistry) -> Circuit {
    let mut circuit = Circuit::new();
    let osc = circuit.add_unit(registry.create_by_name("OscillatorUnit").unwrap());
    let amp = circuit.add_unit(registry.create_by_name("GainUnit").unwrap());
    circuit.connect(osc, oscillator::OUT, amp, gain::IN).unwrap();
    circuit.set_output_unit(amp);
    circuit.set_param(osc, oscillator::PARAM_FREQ, ParamAction::Set, 110.0);
    circuit.set_param(amp, gain::PARAM_GAIN, ParamAction::Set, 0.5);
    circuit
}

/// The same construction expressed as queued edits.
fn edit_script(osc: u64, amp: u64) -> Vec<Edit> {
    vec![
        Edit::AddUnit {
            unit: osc,
            class: class_id("OscillatorUnit"),
        },
        Edit::AddUnit {
            unit: amp,
            class: class_id("GainUnit"),
        },
        Edit::Connect {
            source: osc,
            source_port: oscillator::OUT,
            target: amp,
            target_port: gain::IN,
        },
        Edit::SetOutputUnit { unit: amp },
        Edit::SetParam {
            unit: osc,
            param: oscillator::PARAM_FREQ,
            action: ParamAction::Set,
            value: 110.0,
        },
        Edit::SetParam {
            unit: amp,
            param: gain::PARAM_GAIN,
            action: ParamAction::Set,
            value: 0.5,
        },
    ]
}

fn assert_same_structure_and_sound(reference: &Circuit, queued: &mut Circuit) {
    let ref_patch = patch::describe(reference);
    let queued_patch = patch::describe(queued);
    assert_eq!(
        serde_json::to_string(&ref_patch).unwrap(),
        serde_json::to_string(&queued_patch).unwrap()
    );

    let registry = UnitRegistry::with_builtins();
    let mut reference = patch::build(&ref_patch, &registry).unwrap();
    let ctx = TickContext::new(48000.0);
    for _ in 0..64 {
        reference.tick(&ctx);
        queued.tick(&ctx);
        assert!((reference.output_value(0) - queued.output_value(0)).abs() < 1e-6);
    }
}

#[test]
fn test_queued_edits_match_direct_edits() {
    init_tracing();
    let registry = UnitRegistry::with_builtins();
    let reference = build_direct(&registry);

    let mut circuit = Circuit::new();
    let (mut tx, mut rx) = command_queue(16, circuit.next_unit_id());
    let osc = tx.allocate_unit_id();
    let amp = tx.allocate_unit_id();

    for edit in edit_script(osc, amp) {
        tx.send(edit).unwrap();
    }
    rx.drain(|edit| apply_edit(&mut circuit, &registry, edit));

    let acks = tx.drain_acks();
    assert_eq!(acks.len(), 6);
    assert!(acks.iter().all(|a| a.status == AckStatus::Applied));

    assert_same_structure_and_sound(&reference, &mut circuit);
}

#[test]
fn test_script_longer_than_ring_capacity() {
    init_tracing();
    let registry = UnitRegistry::with_builtins();
    let reference = build_direct(&registry);

    let mut circuit = Circuit::new();
    // Capacity 2 forces several full-ring rejections mid-script.
    let (mut tx, mut rx) = command_queue(2, circuit.next_unit_id());
    let osc = tx.allocate_unit_id();
    let amp = tx.allocate_unit_id();

    for edit in edit_script(osc, amp) {
        let mut pending = Some(edit);
        while let Some(edit) = pending.take() {
            if let Err(rejected) = tx.send(edit) {
                // Ring full: drain on the "audio" side, then retry.
                rx.drain(|e| apply_edit(&mut circuit, &registry, e));
                pending = Some(rejected);
            }
        }
    }
    rx.drain(|edit| apply_edit(&mut circuit, &registry, edit));

    let acks = tx.drain_acks();
    assert_eq!(acks.len(), 6);
    assert!(acks.iter().all(|a| a.status == AckStatus::Applied));

    assert_same_structure_and_sound(&reference, &mut circuit);
}

#[test]
fn test_commands_referencing_removed_unit_are_ignored() {
    init_tracing();
    let registry = UnitRegistry::with_builtins();
    let mut circuit = Circuit::new();
    let (mut tx, mut rx) = command_queue(8, 1);

    let osc = tx.allocate_unit_id();
    let amp = tx.allocate_unit_id();
    tx.send(Edit::AddUnit {
        unit: osc,
        class: class_id("OscillatorUnit"),
    })
    .unwrap();
    tx.send(Edit::AddUnit {
        unit: amp,
        class: class_id("GainUnit"),
    })
    .unwrap();
    tx.send(Edit::RemoveUnit { unit: osc }).unwrap();
    // These race against the removal above; both must be harmless.
    tx.send(Edit::Connect {
        source: osc,
        source_port: oscillator::OUT,
        target: amp,
        target_port: gain::IN,
    })
    .unwrap();
    tx.send(Edit::SetParam {
        unit: osc,
        param: oscillator::PARAM_FREQ,
        action: ParamAction::Set,
        value: 220.0,
    })
    .unwrap();

    rx.drain(|edit| apply_edit(&mut circuit, &registry, edit));
    let acks = tx.drain_acks();
    assert_eq!(acks[2].status, AckStatus::Applied); // remove
    assert_eq!(acks[3].status, AckStatus::Ignored); // stale connect
    assert_eq!(acks[4].status, AckStatus::Ignored); // stale set param

    assert!(circuit.unit(osc).is_none());
    assert!(circuit.unit(amp).is_some());
    assert_eq!(circuit.connection_count(), 0);
}
