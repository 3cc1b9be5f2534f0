//! Linear passive components: Resistor, Wire, Capacitor, Inductor.

use serde::{Deserialize, Serialize};

use crate::circuit::{BranchId, ComponentId, NodeId};
use crate::error::{Result, SimError};
use crate::solver::{Companion, ComponentState, CurrentRecovery, Equation, Solution};

use super::{require_branch, require_positive, Stampable};

/// Resistance of a shorted resistor.
pub const SHORT_RESISTANCE: f64 = 1e-6;

/// Resistance of an open resistor.
pub const OPEN_RESISTANCE: f64 = 1e12;

/// Injected resistor fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fault {
    #[default]
    None,
    Short,
    Open,
}

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// Nominal resistance (ohms)
    pub resistance: f64,
    pub fault: Fault,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], resistance: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
            fault: Fault::None,
        }
    }

    /// Set the injected fault.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Resistance actually stamped, after applying the fault.
    pub fn effective_resistance(&self) -> f64 {
        match self.fault {
            Fault::None => self.resistance,
            Fault::Short => SHORT_RESISTANCE,
            Fault::Open => OPEN_RESISTANCE,
        }
    }
}

impl Stampable for Resistor {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn stamp(&self, equation: &mut Equation) -> Result<()> {
        let r = self.effective_resistance();
        if !(r > 0.0 && r.is_finite()) {
            return Err(SimError::invalid_parameter(
                &self.name,
                "resistance",
                format!("must be > 0, was: {r}"),
            ));
        }
        equation.stamp_resistor(r, self.nodes[0], self.nodes[1])
    }

    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        let v = solution.voltage(self.nodes[0]) - solution.voltage(self.nodes[1]);
        vec![v / self.effective_resistance()]
    }
}

/// An ideal wire, stamped as a 0 V source so its current is observable.
#[derive(Debug, Clone)]
pub struct Wire {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub branch: Option<BranchId>,
}

impl Wire {
    /// Create a new wire.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2]) -> Self {
        Self {
            id,
            name,
            nodes,
            branch: None,
        }
    }
}

impl Stampable for Wire {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn num_vsources(&self) -> usize {
        1
    }

    fn stamp(&self, equation: &mut Equation) -> Result<()> {
        let branch = require_branch(self.branch, &self.name)?;
        equation.stamp_voltage_source(0.0, self.nodes[0], self.nodes[1], branch)?;
        Ok(())
    }

    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        vec![self
            .branch
            .map_or(0.0, |branch| solution.branch_current(branch))]
    }
}

/// A capacitor component, discretized with the trapezoidal rule each tick.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// Capacitance (farads)
    pub capacitance: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], capacitance: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            capacitance,
        }
    }
}

impl Stampable for Capacitor {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    // Nothing static besides the parameter check
    fn stamp(&self, _equation: &mut Equation) -> Result<()> {
        require_positive(&self.name, "capacitance", self.capacitance)
    }

    fn stamp_dynamic(
        &self,
        equation: &mut Equation,
        timestep: f64,
        _sim_time: f64,
        previous: &ComponentState,
    ) -> Result<Option<CurrentRecovery>> {
        let companion = Companion::capacitor(&self.name, self.capacitance, timestep, previous)?;
        companion.stamp(equation, self.nodes[0], self.nodes[1]);
        let recovery: CurrentRecovery =
            Box::new(move |v: &[f64]| vec![companion.current(v[0], v[1])]);
        Ok(Some(recovery))
    }

    // Recovered from the companion model
    fn currents(&self, _solution: &Solution<'_>) -> Vec<f64> {
        vec![0.0]
    }
}

/// An inductor component, discretized with the trapezoidal rule each tick.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// Inductance (henries)
    pub inductance: f64,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], inductance: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            inductance,
        }
    }
}

impl Stampable for Inductor {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    // Nothing static besides the parameter check
    fn stamp(&self, _equation: &mut Equation) -> Result<()> {
        require_positive(&self.name, "inductance", self.inductance)
    }

    fn stamp_dynamic(
        &self,
        equation: &mut Equation,
        timestep: f64,
        _sim_time: f64,
        previous: &ComponentState,
    ) -> Result<Option<CurrentRecovery>> {
        let companion = Companion::inductor(&self.name, self.inductance, timestep, previous)?;
        companion.stamp(equation, self.nodes[0], self.nodes[1]);
        let recovery: CurrentRecovery =
            Box::new(move |v: &[f64]| vec![companion.current(v[0], v[1])]);
        Ok(Some(recovery))
    }

    // Recovered from the companion model
    fn currents(&self, _solution: &Solution<'_>) -> Vec<f64> {
        vec![0.0]
    }
}
