//! Patch persistence
//!
//! A patch is a structural snapshot of a circuit: units by class id,
//! visible parameter values, connections, and the io designations. Runtime
//! state (note data, envelope phases, delay lines) is deliberately not part
//! of a patch; loading one always yields a silent circuit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit::Circuit;
use crate::parameter::ParamAction;
use crate::registry::UnitRegistry;
use crate::signal::PortId;
use crate::unit::{ClassId, UnitId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchUnit {
    pub id: UnitId,
    /// Stable type tag (hash of the class name); factory lookup goes
    /// through this, not the readable name.
    pub class: ClassId,
    /// Readable annex for hand-editing and diagnostics.
    pub class_name: String,
    /// Display name of the instance.
    pub name: String,
    /// Visible parameters only, by name; hidden note-state params are
    /// runtime data and are reinitialized on load.
    pub params: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConnection {
    pub source: UnitId,
    pub source_port: PortId,
    pub target: UnitId,
    pub target_port: PortId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDescription {
    pub units: Vec<PatchUnit>,
    pub connections: Vec<PatchConnection>,
    pub input_unit: Option<UnitId>,
    pub output_unit: Option<UnitId>,
}

/// Snapshot a circuit's structure.
pub fn describe(circuit: &Circuit) -> PatchDescription {
    let mut units: Vec<PatchUnit> = circuit
        .unit_ids()
        .filter_map(|id| circuit.unit(id).map(|u| (id, u)))
        .map(|(id, unit)| PatchUnit {
            id,
            class: unit.class_id(),
            class_name: unit.class_name().to_string(),
            name: unit.name().to_string(),
            params: unit
                .params()
                .iter()
                .filter(|(_, p)| p.visible())
                .map(|(_, p)| (p.name().to_string(), p.get()))
                .collect(),
        })
        .collect();
    // HashMap order is arbitrary; sort for stable output.
    units.sort_by_key(|u| u.id);

    let connections = circuit
        .connections()
        .into_iter()
        .map(|c| PatchConnection {
            source: c.source,
            source_port: c.source_port,
            target: c.target,
            target_port: c.target_port,
        })
        .collect();

    PatchDescription {
        units,
        connections,
        input_unit: circuit.input_unit(),
        output_unit: circuit.output_unit(),
    }
}

/// Rebuild a circuit from a patch, preserving the stored unit ids so saved
/// command references stay meaningful.
pub fn build(patch: &PatchDescription, registry: &UnitRegistry) -> Result<Circuit, String> {
    let mut circuit = Circuit::new();

    for unit in &patch.units {
        let mut handle = registry.create(unit.class).ok_or_else(|| {
            format!(
                "unknown unit class {:#x} ('{}')",
                unit.class, unit.class_name
            )
        })?;
        handle.set_name(&unit.name);
        for (name, value) in &unit.params {
            let id = handle.params().by_name(name).ok_or_else(|| {
                format!(
                    "unknown parameter '{}' on class '{}'",
                    name, unit.class_name
                )
            })?;
            handle.params_mut().apply(id, ParamAction::Set, *value);
        }
        circuit.insert_unit(unit.id, handle)?;
    }

    for conn in &patch.connections {
        circuit.connect(conn.source, conn.source_port, conn.target, conn.target_port)?;
    }

    if let Some(id) = patch.input_unit {
        if !circuit.set_input_unit(id) {
            return Err(format!("input unit {} not present in patch", id));
        }
    }
    if let Some(id) = patch.output_unit {
        if !circuit.set_output_unit(id) {
            return Err(format!("output unit {} not present in patch", id));
        }
    }

    debug!(
        units = patch.units.len(),
        connections = patch.connections.len(),
        "patch built"
    );
    Ok(circuit)
}
