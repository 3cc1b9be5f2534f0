//! Core identifier types for circuit representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a node in the circuit.
/// Node 0 is always ground.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    /// Row/column of this node in the MNA system, `None` for ground.
    pub fn matrix_index(&self) -> Option<usize> {
        if self.is_ground() {
            None
        } else {
            Some(self.0 - 1)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// A unique identifier for a component in the circuit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Voltage-source number: selects the extra MNA row holding that source's
/// branch current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Variable index in the MNA solution vector.
/// Can be either a node voltage or a branch current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarIndex {
    /// Node voltage variable
    Voltage(NodeId),
    /// Branch current variable (voltage sources, wires, op-amp outputs)
    Current(BranchId),
}

impl VarIndex {
    /// Get the raw index into the unknown vector (ground excluded).
    /// Node voltages come first, then branch currents.
    pub fn to_index(&self, num_nodes: usize) -> usize {
        match self {
            // Node 0 (ground) is not in the matrix, so subtract 1
            VarIndex::Voltage(NodeId(n)) => {
                debug_assert!(*n > 0, "Ground node should not be in solution vector");
                n - 1
            }
            // Branch currents come after node voltages
            VarIndex::Current(BranchId(b)) => (num_nodes - 1) + b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_index_layout() {
        assert_eq!(VarIndex::Voltage(NodeId(1)).to_index(4), 0);
        assert_eq!(VarIndex::Voltage(NodeId(3)).to_index(4), 2);
        assert_eq!(VarIndex::Current(BranchId(0)).to_index(4), 3);
        assert_eq!(VarIndex::Current(BranchId(2)).to_index(4), 5);
    }

    #[test]
    fn test_ground_has_no_row() {
        assert_eq!(NodeId::GROUND.matrix_index(), None);
        assert_eq!(NodeId(5).matrix_index(), Some(4));
        assert_eq!(NodeId::GROUND.to_string(), "GND");
    }
}
