//! The MNA linear system and the stamp operations that write into it.
//!
//! An [`Equation`] holds the nodal admittance matrix and the input vector for
//! a circuit with `num_nodes` nodes (ground included) and `num_vsources`
//! voltage sources. Row/column `k` corresponds to node `k + 1`; ground is never
//! represented. The extra rows after the node rows hold the branch currents of
//! voltage sources:
//!
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! Every stamp accumulates into existing cells, so the order in which
//! components are stamped does not affect the result.

use crate::circuit::{BranchId, NodeId, VarIndex};
use crate::error::{Result, SimError};

use super::linear::solve_linear;
use super::matrix::Matrix;

/// Smallest circuit that can be solved: ground plus one node.
pub const MIN_NUM_OF_NODES: usize = 2;

/// MNA system `A x = b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    /// Nodal admittance matrix `A`
    pub admittances: Matrix,
    /// Input vector `b`
    pub inputs: Vec<f64>,
    num_nodes: usize,
    num_vsources: usize,
    num_vsources_stamped: usize,
}

impl Equation {
    /// Create a blank equation sized for the given node and source counts.
    pub fn new(num_nodes: usize, num_vsources: usize) -> Result<Self> {
        if num_nodes < MIN_NUM_OF_NODES {
            return Err(SimError::topology(format!(
                "Number of nodes must be >= {MIN_NUM_OF_NODES}, was: {num_nodes}"
            )));
        }
        let size = num_nodes - 1 + num_vsources;
        Ok(Self {
            admittances: Matrix::zeros(size),
            inputs: vec![0.0; size],
            num_nodes,
            num_vsources,
            num_vsources_stamped: 0,
        })
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.inputs.len()
    }

    /// Number of nodes, ground included.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Declared number of voltage sources.
    pub fn num_vsources(&self) -> usize {
        self.num_vsources
    }

    /// Voltage sources stamped so far.
    pub fn num_vsources_stamped(&self) -> usize {
        self.num_vsources_stamped
    }

    /// Number of node-voltage unknowns (the KCL rows).
    pub fn num_node_rows(&self) -> usize {
        self.num_nodes - 1
    }

    /// Row of the branch current belonging to a voltage source.
    pub fn branch_row(&self, branch: BranchId) -> usize {
        VarIndex::Current(branch).to_index(self.num_nodes)
    }

    fn add(&mut self, row: Option<usize>, col: Option<usize>, value: f64) {
        if let (Some(r), Some(c)) = (row, col) {
            self.admittances.add(r, c, value);
        }
    }

    fn add_input(&mut self, row: Option<usize>, value: f64) {
        if let Some(r) = row {
            self.inputs[r] += value;
        }
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   A[n1,n1] += G
    ///   A[n2,n2] += G
    ///   A[n1,n2] -= G
    ///   A[n2,n1] -= G
    pub fn stamp_conductance(&mut self, g: f64, n1: NodeId, n2: NodeId) {
        let (i, j) = (n1.matrix_index(), n2.matrix_index());
        self.add(i, i, g);
        self.add(j, j, g);
        self.add(i, j, -g);
        self.add(j, i, -g);
    }

    /// Stamp a resistor. The resistance must be finite and strictly positive.
    pub fn stamp_resistor(&mut self, r: f64, n1: NodeId, n2: NodeId) -> Result<()> {
        if !(r > 0.0 && r.is_finite()) {
            return Err(SimError::invalid_parameter(
                "resistor",
                "resistance",
                format!("Resistance must be > 0, was: {r}"),
            ));
        }
        self.stamp_conductance(1.0 / r, n1, n2);
        Ok(())
    }

    fn claim_vsource(&mut self, branch: BranchId) -> Result<usize> {
        if self.num_vsources_stamped >= self.num_vsources || branch.0 >= self.num_vsources {
            return Err(SimError::VoltageSourceOverflow {
                declared: self.num_vsources,
            });
        }
        self.num_vsources_stamped += 1;
        Ok(self.branch_row(branch))
    }

    fn stamp_branch_coupling(&mut self, row: usize, from: NodeId, to: NodeId) {
        let br = Some(row);
        self.add(br, from.matrix_index(), -1.0);
        self.add(br, to.matrix_index(), 1.0);
        self.add(from.matrix_index(), br, 1.0);
        self.add(to.matrix_index(), br, -1.0);
    }

    /// Stamp an ideal voltage source enforcing `V(to) - V(from) = v`.
    ///
    /// The branch unknown is the current flowing from `from` to `to` through
    /// the source. Returns the row allocated for it.
    pub fn stamp_voltage_source(
        &mut self,
        v: f64,
        from: NodeId,
        to: NodeId,
        branch: BranchId,
    ) -> Result<usize> {
        let row = self.claim_vsource(branch)?;
        self.stamp_branch_coupling(row, from, to);
        self.inputs[row] += v;
        Ok(row)
    }

    /// Stamp a current source. Current `i` is drawn out of `from` and pushed
    /// into `to`.
    pub fn stamp_current_source(&mut self, i: f64, from: NodeId, to: NodeId) {
        self.add_input(from.matrix_index(), -i);
        self.add_input(to.matrix_index(), i);
    }

    /// Stamp a voltage-controlled voltage source:
    /// `V(out_a) - V(out_b) = gain * (V(in_a) - V(in_b))`.
    ///
    /// The output is stamped like [`Self::stamp_voltage_source`] with `out_b`
    /// as the negative terminal. Returns the allocated row.
    pub fn stamp_vcvs(
        &mut self,
        gain: f64,
        out_a: NodeId,
        out_b: NodeId,
        in_a: NodeId,
        in_b: NodeId,
        branch: BranchId,
    ) -> Result<usize> {
        let row = self.claim_vsource(branch)?;
        self.stamp_branch_coupling(row, out_b, out_a);

        // Control voltage contribution
        self.add(Some(row), in_a.matrix_index(), -gain);
        self.add(Some(row), in_b.matrix_index(), gain);
        Ok(row)
    }

    /// Solve `A x = b` directly. Suitable when no nonlinear element is present.
    pub fn solve_linear(&self) -> Result<Vec<f64>> {
        solve_linear(&self.admittances, &self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: usize) -> NodeId {
        NodeId(id)
    }

    #[test]
    fn test_blank_equation_dimensions() {
        let eq = Equation::new(3, 2).unwrap();
        assert_eq!(eq.size(), 4);
        assert_eq!(eq.num_node_rows(), 2);
        assert_eq!(eq.branch_row(BranchId(1)), 3);
        assert!(eq.inputs.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_requires_two_nodes() {
        assert!(matches!(
            Equation::new(1, 0),
            Err(SimError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_conductance_stamp() {
        let mut eq = Equation::new(3, 0).unwrap();
        eq.stamp_conductance(0.5, n(1), n(2));
        assert_eq!(eq.admittances.get(0, 0), 0.5);
        assert_eq!(eq.admittances.get(1, 1), 0.5);
        assert_eq!(eq.admittances.get(0, 1), -0.5);
        assert_eq!(eq.admittances.get(1, 0), -0.5);
    }

    #[test]
    fn test_ground_referenced_conductance() {
        let mut eq = Equation::new(3, 0).unwrap();
        eq.stamp_conductance(2.0, n(0), n(2));
        assert_eq!(eq.admittances.get(1, 1), 2.0);
        assert_eq!(eq.admittances.get(0, 0), 0.0);
        assert_eq!(eq.admittances.get(0, 1), 0.0);
        assert_eq!(eq.admittances.get(1, 0), 0.0);
    }

    #[test]
    fn test_stamps_accumulate() {
        let mut eq = Equation::new(2, 0).unwrap();
        eq.stamp_resistor(2.0, n(1), n(0)).unwrap();
        eq.stamp_resistor(2.0, n(1), n(0)).unwrap();
        assert_eq!(eq.admittances.get(0, 0), 1.0);
    }

    #[test]
    fn test_resistor_rejects_non_positive() {
        let mut eq = Equation::new(2, 0).unwrap();
        assert!(matches!(
            eq.stamp_resistor(0.0, n(1), n(0)),
            Err(SimError::InvalidParameter { .. })
        ));
        assert!(eq.stamp_resistor(-5.0, n(1), n(0)).is_err());
        assert!(eq.stamp_resistor(f64::NAN, n(1), n(0)).is_err());
        assert_eq!(eq, Equation::new(2, 0).unwrap());
    }

    #[test]
    fn test_voltage_source_stamp() {
        let mut eq = Equation::new(3, 1).unwrap();
        let row = eq.stamp_voltage_source(5.0, n(2), n(1), BranchId(0)).unwrap();
        assert_eq!(row, 2);
        assert_eq!(eq.admittances.get(2, 1), -1.0);
        assert_eq!(eq.admittances.get(2, 0), 1.0);
        assert_eq!(eq.admittances.get(1, 2), 1.0);
        assert_eq!(eq.admittances.get(0, 2), -1.0);
        assert_eq!(eq.inputs[2], 5.0);
        assert_eq!(eq.num_vsources_stamped(), 1);
    }

    #[test]
    fn test_voltage_source_overflow() {
        let mut eq = Equation::new(2, 1).unwrap();
        eq.stamp_voltage_source(1.0, n(0), n(1), BranchId(0)).unwrap();
        let err = eq
            .stamp_voltage_source(1.0, n(0), n(1), BranchId(0))
            .unwrap_err();
        assert!(matches!(err, SimError::VoltageSourceOverflow { declared: 1 }));

        let mut eq = Equation::new(2, 0).unwrap();
        assert!(eq
            .stamp_vcvs(10.0, n(1), n(0), n(1), n(0), BranchId(0))
            .is_err());
    }

    #[test]
    fn test_current_source_stamp() {
        let mut eq = Equation::new(3, 0).unwrap();
        eq.stamp_current_source(1e-3, n(1), n(2));
        assert_eq!(eq.inputs, vec![-1e-3, 1e-3]);
        // Matrix is untouched
        assert_eq!(eq.admittances, Matrix::zeros(2));
    }

    #[test]
    fn test_vcvs_stamp() {
        let mut eq = Equation::new(4, 1).unwrap();
        let row = eq
            .stamp_vcvs(100.0, n(3), n(0), n(1), n(2), BranchId(0))
            .unwrap();
        assert_eq!(row, 3);
        assert_eq!(eq.admittances.get(3, 2), 1.0);
        assert_eq!(eq.admittances.get(2, 3), -1.0);
        assert_eq!(eq.admittances.get(3, 0), -100.0);
        assert_eq!(eq.admittances.get(3, 1), 100.0);
        assert_eq!(eq.inputs[3], 0.0);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut stat = Equation::new(2, 0).unwrap();
        stat.stamp_resistor(1.0, n(1), n(0)).unwrap();
        let mut tick = stat.clone();
        tick.stamp_conductance(1.0, n(1), n(0));
        assert_eq!(stat.admittances.get(0, 0), 1.0);
        assert_eq!(tick.admittances.get(0, 0), 2.0);
    }

    #[test]
    fn test_voltage_divider() {
        // 5V source on node 1, two 1k resistors in series to ground
        let mut eq = Equation::new(3, 1).unwrap();
        eq.stamp_voltage_source(5.0, n(0), n(1), BranchId(0)).unwrap();
        eq.stamp_resistor(1e3, n(1), n(2)).unwrap();
        eq.stamp_resistor(1e3, n(2), n(0)).unwrap();

        let x = eq.solve_linear().unwrap();
        approx::assert_abs_diff_eq!(x[0], 5.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(x[1], 2.5, epsilon = 0.01);
        // 2.5mA delivered by the source
        approx::assert_abs_diff_eq!(x[2], 2.5e-3, epsilon = 1e-9);
    }

    #[test]
    fn test_voltage_source_constraint_holds() {
        let mut eq = Equation::new(4, 1).unwrap();
        eq.stamp_voltage_source(5.0, n(0), n(1), BranchId(0)).unwrap();
        eq.stamp_resistor(470.0, n(1), n(2)).unwrap();
        eq.stamp_resistor(2.2e3, n(2), n(3)).unwrap();
        eq.stamp_resistor(10e3, n(3), n(0)).unwrap();
        eq.stamp_resistor(3.3e3, n(2), n(0)).unwrap();
        eq.stamp_current_source(1e-3, n(0), n(3));

        let x = eq.solve_linear().unwrap();
        approx::assert_abs_diff_eq!(x[0], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vcvs_gain() {
        // 1V on node 1, VCVS gain 3 drives node 2 relative to ground
        let mut eq = Equation::new(3, 2).unwrap();
        eq.stamp_voltage_source(1.0, n(0), n(1), BranchId(0)).unwrap();
        eq.stamp_vcvs(3.0, n(2), n(0), n(1), n(0), BranchId(1)).unwrap();
        eq.stamp_resistor(1e3, n(2), n(0)).unwrap();

        let x = eq.solve_linear().unwrap();
        approx::assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-9);
        // Output delivers 3mA into the load
        approx::assert_abs_diff_eq!(x[3], 3e-3, epsilon = 1e-12);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Stamp {
        Resistor(f64, usize, usize),
        Current(f64, usize, usize),
        Voltage(f64, usize, usize, usize),
    }

    fn apply(eq: &mut Equation, stamp: &Stamp) {
        match *stamp {
            Stamp::Resistor(r, a, b) => eq.stamp_resistor(r, NodeId(a), NodeId(b)).unwrap(),
            Stamp::Current(i, a, b) => eq.stamp_current_source(i, NodeId(a), NodeId(b)),
            Stamp::Voltage(v, a, b, k) => {
                eq.stamp_voltage_source(v, NodeId(a), NodeId(b), BranchId(k))
                    .unwrap();
            }
        }
    }

    // Values are powers of two so every partial sum is exact and any
    // permutation must give the same bits.
    fn stamps() -> impl Strategy<Value = Vec<Stamp>> {
        let value = prop::sample::select(vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0]);
        let node = 0usize..4;
        let resistors = prop::collection::vec(
            (value.clone(), node.clone(), node.clone())
                .prop_map(|(r, a, b)| Stamp::Resistor(r, a, b)),
            1..8,
        );
        let currents = prop::collection::vec(
            (value.clone(), node.clone(), node.clone())
                .prop_map(|(i, a, b)| Stamp::Current(i, a, b)),
            0..4,
        );
        let voltages = prop::collection::vec((value, node.clone(), node), 0..3).prop_map(|vs| {
            vs.into_iter()
                .enumerate()
                .map(|(k, (v, a, b))| Stamp::Voltage(v, a, b, k))
                .collect::<Vec<_>>()
        });
        (resistors, currents, voltages).prop_map(|(mut r, c, v)| {
            r.extend(c);
            r.extend(v);
            r
        })
    }

    proptest! {
        #[test]
        fn stamp_order_does_not_matter(
            (ordered, shuffled) in stamps().prop_flat_map(|s| (Just(s.clone()), Just(s).prop_shuffle()))
        ) {
            let num_vsources = ordered
                .iter()
                .filter(|s| matches!(s, Stamp::Voltage(..)))
                .count();

            let mut a = Equation::new(4, num_vsources).unwrap();
            let mut b = Equation::new(4, num_vsources).unwrap();
            for s in &ordered {
                apply(&mut a, s);
            }
            for s in &shuffled {
                apply(&mut b, s);
            }
            prop_assert_eq!(a, b);
        }
    }
}
