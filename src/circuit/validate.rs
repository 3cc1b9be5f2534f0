//! Circuit validation.

use std::collections::VecDeque;

use crate::error::{Result, SimError};
use crate::solver::MIN_NUM_OF_NODES;

use super::{CircuitGraph, NodeId};

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component
/// - There is at least one node besides ground
/// - Every node has a path to ground through some component
pub fn validate_circuit(graph: &CircuitGraph) -> Result<()> {
    if graph.is_empty() {
        return Err(SimError::NoCircuit);
    }

    if graph.num_nodes() < MIN_NUM_OF_NODES {
        return Err(SimError::topology(format!(
            "Number of nodes must be >= {MIN_NUM_OF_NODES}, was: {}",
            graph.num_nodes()
        )));
    }

    if let Some(node) = find_floating_node(graph) {
        return Err(SimError::FloatingNode { node });
    }

    Ok(())
}

/// First node (by id) that cannot be reached from ground.
fn find_floating_node(graph: &CircuitGraph) -> Option<NodeId> {
    let n = graph.num_nodes();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for component in graph.components() {
        let nodes = component.nodes();
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                adjacency[a.0].push(b.0);
                adjacency[b.0].push(a.0);
            }
        }
    }

    let mut reached = vec![false; n];
    let mut queue = VecDeque::from([NodeId::GROUND.0]);
    reached[NodeId::GROUND.0] = true;
    while let Some(node) = queue.pop_front() {
        for &next in &adjacency[node] {
            if !reached[next] {
                reached[next] = true;
                queue.push_back(next);
            }
        }
    }

    graph.non_ground_nodes().find(|node| !reached[node.0])
}
