//! MOSFET model.
//!
//! Level-1 square law with channel-length modulation, bulk tied to source:
//!
//! ```text
//! cutoff   Vgs <= Vth:          Id = 0
//! triode   Vds <  Vgs - Vth:    Id = k * ((Vgs - Vth) * Vds - Vds^2 / 2) * (1 + λ Vds)
//! saturate Vds >= Vgs - Vth:    Id = k / 2 * (Vgs - Vth)^2 * (1 + λ Vds)
//! ```
//!
//! with `k = mobility * Cox * W / L`. PMOS devices evaluate the same curve on
//! negated voltages and negate the current. When `Vds` is negative the drain
//! and source swap roles.

use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentId, NodeId};
use crate::error::{Result, SimError};
use crate::solver::{Equation, Matrix, NonlinearElement, Solution};

use super::{node_voltage, require_positive, Stampable};

/// Channel type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MosfetType {
    #[default]
    Nmos,
    Pmos,
}

impl MosfetType {
    fn polarity(self) -> f64 {
        match self {
            MosfetType::Nmos => 1.0,
            MosfetType::Pmos => -1.0,
        }
    }
}

/// Parameters for a MOSFET model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosfetParams {
    /// Channel width (m)
    pub width: f64,
    /// Channel length (m)
    pub length: f64,
    /// Gate oxide capacitance per area (F/m²)
    pub cox: f64,
    /// Carrier mobility (m²/(V·s))
    pub mobility: f64,
    /// Threshold voltage magnitude (V)
    pub vth: f64,
    /// Channel-length modulation (1/V)
    pub lambda: f64,
}

impl Default for MosfetParams {
    fn default() -> Self {
        Self {
            width: 10e-6,
            length: 1e-6,
            cox: 2e-3,
            mobility: 0.06,
            vth: 0.7,
            lambda: 0.01,
        }
    }
}

impl MosfetParams {
    /// Transconductance parameter `mobility * Cox * W / L`.
    pub fn k(&self) -> f64 {
        self.mobility * self.cox * self.width / self.length
    }

    /// Check the parameters of the MOSFET called `name`.
    pub fn validate(&self, name: &str) -> Result<()> {
        require_positive(name, "width", self.width)?;
        require_positive(name, "length", self.length)?;
        require_positive(name, "cox", self.cox)?;
        require_positive(name, "mobility", self.mobility)?;
        if !self.vth.is_finite() {
            return Err(SimError::invalid_parameter(
                name,
                "vth",
                format!("must be finite, was: {}", self.vth),
            ));
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(SimError::invalid_parameter(
                name,
                "lambda",
                format!("must be >= 0, was: {}", self.lambda),
            ));
        }
        Ok(())
    }
}

/// Drain current and its partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    /// Current into the drain (A)
    pub id: f64,
    /// dId/dVd
    pub d_vd: f64,
    /// dId/dVg
    pub d_vg: f64,
    /// dId/dVs
    pub d_vs: f64,
}

/// A MOSFET component.
#[derive(Debug, Clone)]
pub struct Mosfet {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [drain, gate, source]
    pub mosfet_type: MosfetType,
    pub params: MosfetParams,
}

impl Mosfet {
    /// Create a new MOSFET.
    pub fn new(
        id: ComponentId,
        name: String,
        nodes: [NodeId; 3],
        mosfet_type: MosfetType,
        params: MosfetParams,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            mosfet_type,
            params,
        }
    }

    pub fn drain(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn gate(&self) -> NodeId {
        self.nodes[1]
    }

    pub fn source(&self) -> NodeId {
        self.nodes[2]
    }

    /// NMOS-normalized current for `vds >= 0`, with `(gm, gds)`.
    fn forward(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        let k = self.params.k();
        let lambda = self.params.lambda;
        let vov = vgs - self.params.vth;
        if vov <= 0.0 {
            return (0.0, 0.0, 0.0);
        }

        let clm = 1.0 + lambda * vds;
        if vds < vov {
            let base = vov * vds - 0.5 * vds * vds;
            let id = k * base * clm;
            let gm = k * vds * clm;
            let gds = k * ((vov - vds) * clm + base * lambda);
            (id, gm, gds)
        } else {
            let id = 0.5 * k * vov * vov * clm;
            let gm = k * vov * clm;
            let gds = 0.5 * k * vov * vov * lambda;
            (id, gm, gds)
        }
    }

    /// Evaluate the drain current at the given terminal voltages.
    pub fn operating_point(&self, vd: f64, vg: f64, vs: f64) -> OperatingPoint {
        let p = self.mosfet_type.polarity();
        let vds = p * (vd - vs);

        if vds >= 0.0 {
            let (i, gm, gds) = self.forward(p * (vg - vs), vds);
            OperatingPoint {
                id: p * i,
                d_vd: gds,
                d_vg: gm,
                d_vs: -(gm + gds),
            }
        } else {
            // Source acts as the drain
            let (i, gm, gds) = self.forward(p * (vg - vd), -vds);
            OperatingPoint {
                id: -p * i,
                d_vd: gm + gds,
                d_vg: -gm,
                d_vs: -gds,
            }
        }
    }

    fn operating_point_at(&self, x: &[f64]) -> OperatingPoint {
        self.operating_point(
            node_voltage(x, self.drain()),
            node_voltage(x, self.gate()),
            node_voltage(x, self.source()),
        )
    }
}

impl NonlinearElement for Mosfet {
    fn evaluate(&self, x: &[f64], residual: &mut [f64]) {
        let op = self.operating_point_at(x);
        if let Some(d) = self.drain().matrix_index() {
            residual[d] += op.id;
        }
        if let Some(s) = self.source().matrix_index() {
            residual[s] -= op.id;
        }
    }

    fn jacobian(&self, x: &[f64], jacobian: &mut Matrix) {
        let op = self.operating_point_at(x);
        let columns = [
            (self.drain().matrix_index(), op.d_vd),
            (self.gate().matrix_index(), op.d_vg),
            (self.source().matrix_index(), op.d_vs),
        ];
        for (col, g) in columns {
            let Some(col) = col else { continue };
            if let Some(d) = self.drain().matrix_index() {
                jacobian.add(d, col, g);
            }
            if let Some(s) = self.source().matrix_index() {
                jacobian.add(s, col, -g);
            }
        }
    }
}

impl Stampable for Mosfet {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn stamp(&self, _equation: &mut Equation) -> Result<()> {
        self.params.validate(&self.name)
    }

    fn nonlinear(&self) -> Option<&dyn NonlinearElement> {
        Some(self)
    }

    /// Drain-to-source channel current.
    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        let op = self.operating_point(
            solution.voltage(self.drain()),
            solution.voltage(self.gate()),
            solution.voltage(self.source()),
        );
        vec![op.id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn nmos() -> Mosfet {
        Mosfet::new(
            ComponentId(0),
            "M1".to_string(),
            [NodeId(1), NodeId(2), NodeId(0)],
            MosfetType::Nmos,
            MosfetParams::default(),
        )
    }

    fn pmos() -> Mosfet {
        Mosfet {
            mosfet_type: MosfetType::Pmos,
            ..nmos()
        }
    }

    #[test]
    fn test_static_stamp_validates_params() {
        let mut eq = Equation::new(3, 0).unwrap();
        assert!(nmos().stamp(&mut eq).is_ok());

        let cases: [(&str, fn(&mut MosfetParams)); 5] = [
            ("length", |p| p.length = 0.0),
            ("width", |p| p.width = -1e-6),
            ("cox", |p| p.cox = f64::INFINITY),
            ("mobility", |p| p.mobility = 0.0),
            ("lambda", |p| p.lambda = -0.1),
        ];
        for (param, edit) in cases {
            let mut m = nmos();
            edit(&mut m.params);
            match m.stamp(&mut eq) {
                Err(SimError::InvalidParameter { param: p, .. }) => assert_eq!(p, param),
                other => panic!("{param}: unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_cutoff() {
        let m = nmos();
        let op = m.operating_point(5.0, 0.5, 0.0);
        assert_eq!(op.id, 0.0);
        assert_eq!(op.d_vg, 0.0);
    }

    #[test]
    fn test_saturation_current() {
        let m = nmos();
        let k = m.params.k();
        let op = m.operating_point(5.0, 1.7, 0.0);
        assert_relative_eq!(op.id, 0.5 * k * (1.0 + 0.01 * 5.0), max_relative = 1e-12);
    }

    #[test]
    fn test_triode_current() {
        let m = nmos();
        let k = m.params.k();
        let op = m.operating_point(0.5, 2.7, 0.0);
        let expected = k * (2.0 * 0.5 - 0.125) * (1.0 + 0.01 * 0.5);
        assert_relative_eq!(op.id, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_reversed_drain_source() {
        let m = nmos();
        // Mirror image of a forward bias: same magnitude, opposite sign
        let fwd = m.operating_point(1.0, 3.0, 0.0);
        let rev = m.operating_point(0.0, 3.0, 1.0);
        assert_relative_eq!(rev.id, -fwd.id, max_relative = 1e-12);
    }

    #[test]
    fn test_pmos_mirrors_nmos() {
        let n = nmos().operating_point(3.0, 2.0, 0.0);
        let p = pmos().operating_point(-3.0, -2.0, 0.0);
        assert_relative_eq!(p.id, -n.id, max_relative = 1e-12);
        assert!(p.id < 0.0);
    }

    #[test]
    fn test_partials_match_finite_difference() {
        let h = 1e-6;
        for m in [nmos(), pmos()] {
            let s = m.mosfet_type.polarity();
            for (vd, vg, vs) in [
                (s * 3.0, s * 2.0, 0.0),
                (s * 0.3, s * 2.5, 0.0),
                (0.0, s * 2.5, s * 0.4),
                (s * 0.2, s * 3.0, s * 1.5),
            ] {
                let op = m.operating_point(vd, vg, vs);
                let dd = (m.operating_point(vd + h, vg, vs).id
                    - m.operating_point(vd - h, vg, vs).id)
                    / (2.0 * h);
                let dg = (m.operating_point(vd, vg + h, vs).id
                    - m.operating_point(vd, vg - h, vs).id)
                    / (2.0 * h);
                let ds = (m.operating_point(vd, vg, vs + h).id
                    - m.operating_point(vd, vg, vs - h).id)
                    / (2.0 * h);
                assert_abs_diff_eq!(op.d_vd, dd, epsilon = 1e-7);
                assert_abs_diff_eq!(op.d_vg, dg, epsilon = 1e-7);
                assert_abs_diff_eq!(op.d_vs, ds, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_kcl_contributions_cancel() {
        let m = Mosfet::new(
            ComponentId(0),
            "M1".to_string(),
            [NodeId(1), NodeId(2), NodeId(3)],
            MosfetType::Nmos,
            MosfetParams::default(),
        );
        let x = [5.0, 2.0, 0.5];
        let mut residual = vec![0.0; 3];
        m.evaluate(&x, &mut residual);
        assert!(residual[0] > 0.0);
        assert_eq!(residual[1], 0.0);
        assert_eq!(residual[0], -residual[2]);

        let mut jac = Matrix::zeros(3);
        m.jacobian(&x, &mut jac);
        // Gate row untouched, drain and source rows opposite
        assert!(jac.row(1).iter().all(|&g| g == 0.0));
        for col in 0..3 {
            assert_eq!(jac.get(0, col), -jac.get(2, col));
        }
    }
}
