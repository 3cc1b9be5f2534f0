//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! Above the critical voltage `v_crit = n*Vt * ln(n*Vt / (sqrt(2) * Is))` the
//! exponential is continued linearly with the slope at `v_crit`, so large
//! Newton-Raphson trial voltages cannot overflow.

use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentId, NodeId};
use crate::error::Result;
use crate::solver::{Equation, Matrix, NonlinearElement, Solution};
use crate::THERMAL_VOLTAGE;

use super::{node_voltage, require_positive, stamp_jacobian_pair, Stampable};

/// Parameters for a diode model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub saturation_current: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub ideality: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            saturation_current: 1e-14,
            ideality: 1.0,
        }
    }
}

impl DiodeParams {
    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.ideality * THERMAL_VOLTAGE
    }

    /// Check the parameters of the diode called `name`.
    pub fn validate(&self, name: &str) -> Result<()> {
        require_positive(name, "saturation_current", self.saturation_current)?;
        require_positive(name, "ideality", self.ideality)
    }

    /// Voltage above which the exponential is linearized.
    pub fn v_crit(&self) -> f64 {
        let n_vt = self.n_vt();
        n_vt * (n_vt / (std::f64::consts::SQRT_2 * self.saturation_current)).ln()
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    pub params: DiodeParams,
}

impl Diode {
    /// Create a new diode.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], params: DiodeParams) -> Self {
        Self {
            id,
            name,
            nodes,
            params,
        }
    }

    /// Calculate the diode current at a given voltage.
    pub fn current(&self, v: f64) -> f64 {
        let is = self.params.saturation_current;
        let n_vt = self.params.n_vt();
        let v_crit = self.params.v_crit();

        if v > v_crit {
            // Linear extrapolation for high forward bias
            let e = (v_crit / n_vt).exp();
            is * (e - 1.0) + is / n_vt * e * (v - v_crit)
        } else {
            is * ((v / n_vt).exp() - 1.0)
        }
    }

    /// Calculate the conductance (dI/dV) at a given voltage.
    pub fn conductance(&self, v: f64) -> f64 {
        let is = self.params.saturation_current;
        let n_vt = self.params.n_vt();
        let v = v.min(self.params.v_crit());
        is / n_vt * (v / n_vt).exp()
    }

    fn voltage(&self, x: &[f64]) -> f64 {
        node_voltage(x, self.nodes[0]) - node_voltage(x, self.nodes[1])
    }
}

impl NonlinearElement for Diode {
    fn evaluate(&self, x: &[f64], residual: &mut [f64]) {
        let i = self.current(self.voltage(x));
        if let Some(a) = self.nodes[0].matrix_index() {
            residual[a] += i;
        }
        if let Some(c) = self.nodes[1].matrix_index() {
            residual[c] -= i;
        }
    }

    fn jacobian(&self, x: &[f64], jacobian: &mut Matrix) {
        let g = self.conductance(self.voltage(x));
        stamp_jacobian_pair(jacobian, self.nodes[0], self.nodes[1], g);
    }
}

impl Stampable for Diode {
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

    fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        let v = solution.voltage(self.nodes[0]) - solution.voltage(self.nodes[1]);
        vec![self.current(v)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use approx::assert_relative_eq;

    fn diode() -> Diode {
        Diode::new(
            ComponentId(0),
            "D1".to_string(),
            [NodeId(1), NodeId(0)],
            DiodeParams::default(),
        )
    }

    #[test]
    fn test_diode_forward_bias() {
        let d = diode();

        assert_eq!(d.current(0.0), 0.0);
        // 0.3 V more is about five decades at n = 1
        assert!(d.current(0.6) > d.current(0.3) * 1e4);
    }

    #[test]
    fn test_diode_reverse_bias() {
        let d = diode();

        // Saturates at -Is
        assert_relative_eq!(d.current(-1.0), -d.params.saturation_current, max_relative = 1e-9);
    }

    #[test]
    fn test_static_stamp_validates_params() {
        let mut eq = Equation::new(2, 0).unwrap();
        assert!(diode().stamp(&mut eq).is_ok());

        let mut d = diode();
        d.params.ideality = 0.0;
        match d.stamp(&mut eq) {
            Err(SimError::InvalidParameter { component, param, .. }) => {
                assert_eq!(component, "D1");
                assert_eq!(param, "ideality");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let mut d = diode();
        d.params.saturation_current = -1e-14;
        assert!(d.stamp(&mut eq).is_err());
    }

    #[test]
    fn test_linear_beyond_critical_voltage() {
        let d = diode();
        let v_crit = d.params.v_crit();
        assert!(v_crit > 0.6 && v_crit < 0.8);

        // Continuous at v_crit, constant slope above it
        assert_relative_eq!(d.current(v_crit), d.current(v_crit - 1e-12), max_relative = 1e-9);
        let g = d.conductance(v_crit);
        assert_relative_eq!(d.current(v_crit + 1.0) - d.current(v_crit), g, max_relative = 1e-9);
        assert_relative_eq!(d.conductance(100.0), g);
        assert!(d.current(100.0).is_finite());
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let d = diode();
        for v in [0.0, 0.2, 0.55, 0.65] {
            let h = 1e-7;
            let numeric = (d.current(v + h) - d.current(v - h)) / (2.0 * h);
            assert_relative_eq!(d.conductance(v), numeric, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_kcl_contributions_cancel() {
        let d = Diode::new(
            ComponentId(0),
            "D1".to_string(),
            [NodeId(1), NodeId(2)],
            DiodeParams::default(),
        );
        let mut residual = vec![0.0; 2];
        d.evaluate(&[0.65, 0.0], &mut residual);
        assert!(residual[0] > 0.0);
        assert_eq!(residual[0], -residual[1]);

        let mut jac = Matrix::zeros(2);
        d.jacobian(&[0.65, 0.0], &mut jac);
        assert_eq!(jac.get(0, 0), jac.get(1, 1));
        assert_eq!(jac.get(0, 1), -jac.get(0, 0));
    }
}
