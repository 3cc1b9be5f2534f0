//! Circuit graph structure.

use std::collections::BTreeMap;

use super::types::{BranchId, ComponentId, NodeId};
use crate::components::Component;
use crate::error::{Result, SimError};
use crate::solver::NonlinearElement;

/// A circuit ready for simulation.
///
/// Components are keyed and iterated by id. Voltage-source indices are handed
/// out in that order when the graph is built.
#[derive(Debug, Clone, Default)]
pub struct CircuitGraph {
    models: BTreeMap<ComponentId, Component>,
    num_nodes: usize,
    num_vsources: usize,
}

impl CircuitGraph {
    /// Build a graph, assigning voltage-source indices.
    ///
    /// The node count is the highest referenced node plus one (ground
    /// included). Fails on duplicate component ids.
    pub fn new(components: Vec<Component>) -> Result<Self> {
        let mut models = BTreeMap::new();
        for component in components {
            let id = component.id();
            if models.insert(id, component).is_some() {
                return Err(SimError::topology(format!("duplicate component id {id}")));
            }
        }

        let mut num_vsources = 0;
        for component in models.values_mut() {
            for _ in 0..component.num_vsources() {
                component.assign_branch(BranchId(num_vsources));
                num_vsources += 1;
            }
        }

        let num_nodes = models
            .values()
            .flat_map(|c| c.nodes().iter())
            .map(|n| n.0 + 1)
            .max()
            .unwrap_or(1);

        Ok(Self {
            models,
            num_nodes,
            num_vsources,
        })
    }

    /// Number of nodes, ground included.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of voltage-source rows.
    pub fn num_vsources(&self) -> usize {
        self.num_vsources
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Components in id order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.models.values()
    }

    /// Look up a component.
    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.models.get(&id)
    }

    /// Nodes `1..num_nodes`.
    pub fn non_ground_nodes(&self) -> impl Iterator<Item = NodeId> {
        (1..self.num_nodes).map(NodeId)
    }

    /// Nonlinear parts of all components.
    pub fn nonlinear_elements(&self) -> Vec<&dyn NonlinearElement> {
        self.models.values().filter_map(|c| c.nonlinear()).collect()
    }

    /// Whether solving needs Newton-Raphson.
    pub fn has_nonlinear(&self) -> bool {
        self.models.values().any(|c| c.is_nonlinear())
    }
}
