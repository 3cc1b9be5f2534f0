//! Trapezoidal companion models for reactive elements.
//!
//! Over one timestep a capacitor or inductor is replaced by a conductance `g`
//! in parallel with a history current source. The current through the
//! element, from its first node to its second, is then
//!
//! ```text
//! i = g * (v0 - v1) - i_hist
//! ```
//!
//! Capacitor: `g = 2C/dt`, `i_hist = i_prev + g * v_prev`.
//! Inductor:  `g = dt/2L`, `i_hist = -(i_prev + g * v_prev)`.

use crate::circuit::NodeId;
use crate::components::require_positive;
use crate::error::Result;

use super::equation::Equation;
use super::state::ComponentState;

/// Norton equivalent of a reactive element for a single timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Companion {
    /// Equivalent conductance
    pub conductance: f64,
    /// History current source value
    pub history: f64,
}

impl Companion {
    /// Companion of a capacitor given its state after the previous tick.
    pub fn capacitor(
        name: &str,
        capacitance: f64,
        timestep: f64,
        previous: &ComponentState,
    ) -> Result<Self> {
        require_positive(name, "capacitance", capacitance)?;
        require_positive(name, "timestep", timestep)?;

        let conductance = 2.0 * capacitance / timestep;
        let history = previous.current() + conductance * previous.voltage_across();
        Ok(Self {
            conductance,
            history,
        })
    }

    /// Companion of an inductor given its state after the previous tick.
    pub fn inductor(
        name: &str,
        inductance: f64,
        timestep: f64,
        previous: &ComponentState,
    ) -> Result<Self> {
        require_positive(name, "inductance", inductance)?;
        require_positive(name, "timestep", timestep)?;

        let conductance = timestep / (2.0 * inductance);
        let history = -(previous.current() + conductance * previous.voltage_across());
        Ok(Self {
            conductance,
            history,
        })
    }

    /// Stamp the conductance and history source between `n0` and `n1`.
    pub fn stamp(&self, equation: &mut Equation, n0: NodeId, n1: NodeId) {
        equation.stamp_conductance(self.conductance, n0, n1);
        equation.stamp_current_source(self.history, n1, n0);
    }

    /// Current from `n0` to `n1` through the element.
    pub fn current(&self, v0: f64, v1: f64) -> f64 {
        (v0 - v1) * self.conductance - self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use approx::assert_relative_eq;

    fn state(v: f64, i: f64) -> ComponentState {
        ComponentState {
            voltages: vec![v, 0.0],
            currents: vec![i],
        }
    }

    #[test]
    fn test_capacitor_companion() {
        let c = Companion::capacitor("C1", 1e-6, 5e-6, &state(1.0, 2e-3)).unwrap();
        assert_relative_eq!(c.conductance, 0.4);
        assert_relative_eq!(c.history, 2e-3 + 0.4);
        // Holding the same voltage reverses the current
        assert_relative_eq!(c.current(1.0, 0.0), -2e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_inductor_companion() {
        let l = Companion::inductor("L1", 1e-3, 2e-6, &state(0.5, 1e-2)).unwrap();
        assert_relative_eq!(l.conductance, 1e-3);
        // i_n = i_prev + g * (v_n + v_prev)
        assert_relative_eq!(l.current(0.5, 0.0), 1e-2 + 1e-3 * 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_stamp_matches_conductance_and_history() {
        let mut eq = Equation::new(2, 0).unwrap();
        let c = Companion::capacitor("C1", 1e-6, 5e-6, &state(2.0, 0.0)).unwrap();
        c.stamp(&mut eq, NodeId(1), NodeId::GROUND);
        assert_relative_eq!(eq.admittances.get(0, 0), 0.4);
        // History pushed into node 1
        assert_relative_eq!(eq.inputs[0], 0.8);
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero = ComponentState::zeroed(2, 1);
        assert!(matches!(
            Companion::capacitor("C1", 0.0, 5e-6, &zero),
            Err(SimError::InvalidParameter { .. })
        ));
        assert!(Companion::inductor("L1", -1.0, 5e-6, &zero).is_err());
        assert!(Companion::capacitor("C1", 1e-6, 0.0, &zero).is_err());
    }
}
