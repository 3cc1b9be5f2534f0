//! Serializable circuit description.
//!
//! A circuit file is JSON of the form
//!
//! ```json
//! {
//!   "simulation": { "timestep": 5e-6 },
//!   "components": [
//!     { "id": 0, "type": "voltage_source", "nodes": [0, 1], "voltage": 5.0 },
//!     { "id": 1, "type": "resistor", "nodes": [1, 2], "resistance": 1000 },
//!     { "id": 2, "type": "capacitor", "nodes": [2, 0], "capacitance": 1e-6 }
//!   ]
//! }
//! ```
//!
//! Node 0 is ground. The `simulation` block is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{Component, DiodeParams, Fault, MosfetParams, MosfetType, DEFAULT_OPAMP_GAIN};
use crate::error::{Result, SimError};
use crate::solver::SimulatorConfig;

use super::graph::CircuitGraph;
use super::types::{ComponentId, NodeId};

fn default_gain() -> f64 {
    DEFAULT_OPAMP_GAIN
}

/// Kind-specific parameters of a component, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentKind {
    Resistor {
        resistance: f64,
        #[serde(default)]
        fault: Fault,
    },
    Wire,
    /// DC when `frequency` is absent, sine otherwise
    VoltageSource {
        voltage: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frequency: Option<f64>,
        #[serde(default)]
        zero_time: f64,
    },
    CurrentSource {
        current: f64,
    },
    Capacitor {
        capacitance: f64,
    },
    Inductor {
        inductance: f64,
    },
    #[serde(alias = "opamp")]
    OpAmp {
        #[serde(default = "default_gain")]
        gain: f64,
    },
    Diode {
        #[serde(default)]
        params: DiodeParams,
    },
    Mosfet {
        #[serde(default)]
        channel: MosfetType,
        #[serde(default)]
        params: MosfetParams,
    },
}

impl ComponentKind {
    /// Reference-designator prefix used for unnamed components.
    pub fn designator(&self) -> &'static str {
        match self {
            ComponentKind::Resistor { .. } => "R",
            ComponentKind::Wire => "W",
            ComponentKind::VoltageSource { .. } => "V",
            ComponentKind::CurrentSource { .. } => "I",
            ComponentKind::Capacitor { .. } => "C",
            ComponentKind::Inductor { .. } => "L",
            ComponentKind::OpAmp { .. } => "U",
            ComponentKind::Diode { .. } => "D",
            ComponentKind::Mosfet { .. } => "M",
        }
    }

    /// The `"type"` tag of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentKind::Resistor { .. } => "resistor",
            ComponentKind::Wire => "wire",
            ComponentKind::VoltageSource { .. } => "voltage_source",
            ComponentKind::CurrentSource { .. } => "current_source",
            ComponentKind::Capacitor { .. } => "capacitor",
            ComponentKind::Inductor { .. } => "inductor",
            ComponentKind::OpAmp { .. } => "op_amp",
            ComponentKind::Diode { .. } => "diode",
            ComponentKind::Mosfet { .. } => "mosfet",
        }
    }
}

/// One component entry of a circuit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub id: ComponentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<NodeId>,
    #[serde(flatten)]
    pub kind: ComponentKind,
}

/// A complete circuit file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitDescription {
    #[serde(default)]
    pub simulation: SimulatorConfig,
    #[serde(default)]
    pub components: Vec<ComponentDescription>,
}

impl CircuitDescription {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a description file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SimError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Build the component models.
    pub fn to_components(&self) -> Result<Vec<Component>> {
        self.components
            .iter()
            .map(Component::from_description)
            .collect()
    }

    /// Build the circuit graph. Structural validity is checked later, when
    /// the static equation is built.
    pub fn to_graph(&self) -> Result<CircuitGraph> {
        CircuitGraph::new(self.to_components()?)
    }
}
