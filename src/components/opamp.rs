//! Operational Amplifier model.
//!
//! The op-amp is a voltage-controlled voltage source from its output to
//! ground: `V(out) = gain * (V+ - V-)`. With the default gain of 1e6 and
//! negative feedback this behaves as an ideal op-amp (V+ = V-).

use crate::circuit::{BranchId, ComponentId, NodeId};
use crate::error::{Result, SimError};
use crate::solver::{Equation, Solution};

use super::{require_branch, Stampable};

/// Open-loop gain used when none is given.
pub const DEFAULT_OPAMP_GAIN: f64 = 1e6;

/// An operational amplifier component.
#[derive(Debug, Clone)]
pub struct OpAmp {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [non-inverting (+), inverting (-), output]
    /// Open-loop gain
    pub gain: f64,
    pub branch: Option<BranchId>,
}

impl OpAmp {
    /// Create a new op-amp.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 3], gain: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            gain,
            branch: None,
        }
    }

    /// Get the non-inverting input node.
    pub fn input_pos(&self) -> NodeId {
        self.nodes[0]
    }

    /// Get the inverting input node.
    pub fn input_neg(&self) -> NodeId {
        self.nodes[1]
    }

    /// Get the output node.
    pub fn output(&self) -> NodeId {
        self.nodes[2]
    }
}

impl Stampable for OpAmp {
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

    fn num_currents(&self) -> usize {
        2
    }

    fn stamp(&self, equation: &mut Equation) -> Result<()> {
        if !self.gain.is_finite() {
            return Err(SimError::invalid_parameter(
                &self.name,
                "gain",
                format!("must be finite, was: {}", self.gain),
            ));
        }
        let branch = require_branch(self.branch, &self.name)?;
        equation.stamp_vcvs(
            self.gain,
            self.output(),
            NodeId::GROUND,
            self.input_pos(),
            self.input_neg(),
            branch,
        )?;
        Ok(())
    }

    /// Inputs draw no current; the output current is the source branch current.
    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        let i_out = self
            .branch
            .map_or(0.0, |branch| solution.branch_current(branch));
        vec![0.0, i_out]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_opamp_stamps_vcvs_to_ground() {
        let mut op = OpAmp::new(
            ComponentId(0),
            "U1".to_string(),
            [NodeId(1), NodeId(2), NodeId(3)],
            DEFAULT_OPAMP_GAIN,
        );
        op.branch = Some(BranchId(0));

        let mut eq = Equation::new(4, 1).unwrap();
        op.stamp(&mut eq).unwrap();
        assert_eq!(eq.admittances.get(3, 2), 1.0);
        assert_eq!(eq.admittances.get(2, 3), -1.0);
        assert_eq!(eq.admittances.get(3, 0), -DEFAULT_OPAMP_GAIN);
        assert_eq!(eq.admittances.get(3, 1), DEFAULT_OPAMP_GAIN);
    }

    #[test]
    fn test_non_inverting_amplifier() {
        // 1V into V+, feedback divider 9k/1k on V-: gain ~10
        let mut op = OpAmp::new(
            ComponentId(0),
            "U1".to_string(),
            [NodeId(1), NodeId(2), NodeId(3)],
            DEFAULT_OPAMP_GAIN,
        );
        op.branch = Some(BranchId(1));

        let mut eq = Equation::new(4, 2).unwrap();
        eq.stamp_voltage_source(1.0, NodeId(0), NodeId(1), BranchId(0))
            .unwrap();
        op.stamp(&mut eq).unwrap();
        eq.stamp_resistor(9e3, NodeId(3), NodeId(2)).unwrap();
        eq.stamp_resistor(1e3, NodeId(2), NodeId(0)).unwrap();

        let x = eq.solve_linear().unwrap();
        assert_abs_diff_eq!(x[2], 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rejects_infinite_gain() {
        let mut op = OpAmp::new(
            ComponentId(0),
            "U1".to_string(),
            [NodeId(1), NodeId(2), NodeId(3)],
            f64::INFINITY,
        );
        op.branch = Some(BranchId(0));
        let mut eq = Equation::new(4, 1).unwrap();
        assert!(matches!(
            op.stamp(&mut eq),
            Err(SimError::InvalidParameter { .. })
        ));
    }
}
