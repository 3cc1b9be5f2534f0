//! Circuit graph representation and validation.
//!
//! A [`CircuitGraph`] holds all components keyed by id, the node count and the
//! number of voltage-source rows. It is usually built from a
//! [`CircuitDescription`] read from JSON.

mod description;
mod graph;
mod types;
mod validate;

pub use description::{CircuitDescription, ComponentDescription, ComponentKind};
pub use graph::CircuitGraph;
pub use types::*;
pub use validate::validate_circuit;
