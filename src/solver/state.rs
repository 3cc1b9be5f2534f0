//! Per-component results of a solved tick.

use std::collections::BTreeMap;

use crate::circuit::{BranchId, ComponentId, NodeId, VarIndex};

/// Read-only view of a solved tick: the solution vector with the 0 V ground
/// entry prepended, so index `k` is node `k`.
#[derive(Debug, Clone, Copy)]
pub struct Solution<'a> {
    values: &'a [f64],
    num_nodes: usize,
}

impl<'a> Solution<'a> {
    /// Wrap a ground-prefixed solution of a circuit with `num_nodes` nodes.
    pub fn new(values: &'a [f64], num_nodes: usize) -> Self {
        Self { values, num_nodes }
    }

    /// Voltage at a node, 0 for ground or unknown nodes.
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.values.get(node.0).copied().unwrap_or(0.0)
    }

    /// Branch current of a voltage source.
    pub fn branch_current(&self, branch: BranchId) -> f64 {
        let index = VarIndex::Current(branch).to_index(self.num_nodes) + 1;
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// The raw ground-prefixed values.
    pub fn values(&self) -> &'a [f64] {
        self.values
    }
}

/// Voltages and currents of one component after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentState {
    /// One voltage per node, aligned to the component's node list
    pub voltages: Vec<f64>,
    /// One current per current path
    pub currents: Vec<f64>,
}

impl ComponentState {
    /// All-zero state for a component with the given shape.
    pub fn zeroed(num_voltages: usize, num_currents: usize) -> Self {
        Self {
            voltages: vec![0.0; num_voltages],
            currents: vec![0.0; num_currents],
        }
    }

    /// Voltage across the first two nodes.
    pub fn voltage_across(&self) -> f64 {
        match self.voltages.as_slice() {
            [v0, v1, ..] => v0 - v1,
            _ => 0.0,
        }
    }

    /// First current path, 0 when the component has none.
    pub fn current(&self) -> f64 {
        self.currents.first().copied().unwrap_or(0.0)
    }
}

/// State of every component, keyed by id.
pub type CircuitState = BTreeMap<ComponentId, ComponentState>;

/// Computes a component's currents from its node voltages.
pub type CurrentRecovery = Box<dyn Fn(&[f64]) -> Vec<f64>>;

/// Current recoveries produced by the dynamic stamp of one tick.
pub type CurrentRecoveries = BTreeMap<ComponentId, CurrentRecovery>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_state() {
        let s = ComponentState::zeroed(3, 2);
        assert_eq!(s.voltages, vec![0.0; 3]);
        assert_eq!(s.currents, vec![0.0; 2]);
        assert_eq!(s.current(), 0.0);
    }

    #[test]
    fn test_solution_indexing() {
        // Ground, N1, N2, then two branch currents
        let values = [0.0, 5.0, 2.5, 1e-3, -2e-3];
        let sol = Solution::new(&values, 3);
        assert_eq!(sol.voltage(NodeId::GROUND), 0.0);
        assert_eq!(sol.voltage(NodeId(2)), 2.5);
        assert_eq!(sol.branch_current(BranchId(0)), 1e-3);
        assert_eq!(sol.branch_current(BranchId(1)), -2e-3);
        assert_eq!(sol.voltage(NodeId(9)), 0.0);
    }

    #[test]
    fn test_voltage_across() {
        let s = ComponentState {
            voltages: vec![5.0, 1.5],
            currents: vec![],
        };
        assert_eq!(s.voltage_across(), 3.5);
        assert_eq!(ComponentState::default().voltage_across(), 0.0);
    }
}
