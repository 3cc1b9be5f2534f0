//! Voltage and current sources.

use std::f64::consts::PI;

use crate::circuit::{BranchId, ComponentId, NodeId};
use crate::error::Result;
use crate::solver::{ComponentState, CurrentRecovery, Equation, Solution};

use super::{require_branch, Stampable};

/// Output of a voltage source over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Constant voltage
    Dc { voltage: f64 },
    /// `voltage * sin(2π * frequency * (t - zero_time))`
    Sine {
        voltage: f64,
        frequency: f64,
        zero_time: f64,
    },
}

impl Waveform {
    /// Source voltage at simulated time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            Waveform::Dc { voltage } => voltage,
            Waveform::Sine {
                voltage,
                frequency,
                zero_time,
            } => voltage * (2.0 * PI * frequency * (t - zero_time)).sin(),
        }
    }

    /// Whether the value changes with time.
    pub fn is_time_varying(&self) -> bool {
        matches!(self, Waveform::Sine { .. })
    }
}

/// A voltage source component.
///
/// Enforces `V(nodes[1]) - V(nodes[0]) = v`. The branch current flows from
/// `nodes[0]` to `nodes[1]` through the source.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [from, to]
    pub waveform: Waveform,
    pub branch: Option<BranchId>,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], waveform: Waveform) -> Self {
        Self {
            id,
            name,
            nodes,
            waveform,
            branch: None,
        }
    }

    /// Create a constant voltage source.
    pub fn dc(id: ComponentId, name: String, nodes: [NodeId; 2], voltage: f64) -> Self {
        Self::new(id, name, nodes, Waveform::Dc { voltage })
    }

    fn stamp_value(&self, equation: &mut Equation, value: f64) -> Result<()> {
        let branch = require_branch(self.branch, &self.name)?;
        equation.stamp_voltage_source(value, self.nodes[0], self.nodes[1], branch)?;
        Ok(())
    }
}

impl Stampable for VoltageSource {
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
        if self.waveform.is_time_varying() {
            return Ok(());
        }
        self.stamp_value(equation, self.waveform.value_at(0.0))
    }

    fn stamp_dynamic(
        &self,
        equation: &mut Equation,
        _timestep: f64,
        sim_time: f64,
        _previous: &ComponentState,
    ) -> Result<Option<CurrentRecovery>> {
        if self.waveform.is_time_varying() {
            self.stamp_value(equation, self.waveform.value_at(sim_time))?;
        }
        Ok(None)
    }

    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        vec![self
            .branch
            .map_or(0.0, |branch| solution.branch_current(branch))]
    }
}

/// A current source component.
///
/// Draws `current` out of `nodes[0]` and pushes it into `nodes[1]`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [from, to]
    pub current: f64,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], current: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            current,
        }
    }
}

impl Stampable for CurrentSource {
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
        equation.stamp_current_source(self.current, self.nodes[0], self.nodes[1]);
        Ok(())
    }

    fn currents(&self, _solution: &Solution<'_>) -> Vec<f64> {
        vec![self.current]
    }
}
