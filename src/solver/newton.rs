//! Damped Newton-Raphson with backtracking, stall escape and restarts.
//!
//! Circuit Newton-Raphson tends to diverge near diode and MOSFET turn-on, so
//! each attempt clamps its steps, backtracks on the step scale `alpha` while
//! the residual does not improve, and jitters the iterate when `alpha`
//! collapses. Attempts are repeated from perturbed starting points. All
//! randomness comes from the injected [`RandomSource`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, SimError};

use super::linear::solve_linear;
use super::matrix::{norm, Matrix};
use super::rng::{RandomSource, SplitMix64};
use super::{CONVERGENCE_TOLERANCE, DEFAULT_SEED, MAX_ITERATIONS, MAX_RESTARTS};

/// What an unknown measures. Step clamping uses a separate cap for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKind {
    Voltage,
    Current,
}

/// A square nonlinear system `F(x) = 0`.
pub trait NonlinearSystem {
    /// Number of unknowns.
    fn len(&self) -> usize;

    /// Residual vector `F(x)`.
    fn residual(&self, x: &[f64]) -> Vec<f64>;

    /// Jacobian `dF/dx` at `x`.
    fn jacobian(&self, x: &[f64]) -> Matrix;

    /// Kind of unknown `index`.
    fn unknown_kind(&self, _index: usize) -> UnknownKind {
        UnknownKind::Voltage
    }

    /// Starting point of the first attempt.
    fn initial_guess(&self) -> Vec<f64> {
        vec![0.0; self.len()]
    }
}

/// A circuit element whose current is a nonlinear function of the unknowns.
///
/// Both methods accumulate into the buffers they are given and only touch
/// KCL (node voltage) rows.
pub trait NonlinearElement {
    /// Add the element's currents leaving each node to `residual`.
    fn evaluate(&self, x: &[f64], residual: &mut [f64]);

    /// Add the element's partial derivatives to `jacobian`.
    fn jacobian(&self, x: &[f64], jacobian: &mut Matrix);
}

/// Newton-Raphson configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Iterations per attempt
    pub max_iterations: usize,
    /// Residual 2-norm that counts as converged
    pub tolerance: f64,
    /// Attempts, the first one included
    pub max_restarts: usize,
    /// Step scale at the start of an attempt and upper bound afterwards
    pub initial_alpha: f64,
    /// Growth of `alpha` after an accepted step
    pub alpha_growth: f64,
    /// Shrink factor while backtracking
    pub alpha_shrink: f64,
    /// Below this `alpha` the iterate is considered stalled
    pub min_alpha: f64,
    /// Relative size of random perturbations
    pub random_scale: f64,
    /// Smallest magnitude allowed on the Jacobian diagonal
    pub stability_eps: f64,
    /// Per-iteration cap on voltage unknowns (V)
    pub max_voltage_step: f64,
    /// Per-iteration cap on current unknowns (A)
    pub max_current_step: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            tolerance: CONVERGENCE_TOLERANCE,
            max_restarts: MAX_RESTARTS,
            initial_alpha: 1.0,
            alpha_growth: 1.1,
            alpha_shrink: 0.5,
            min_alpha: 1e-6,
            random_scale: 0.05,
            stability_eps: 1e-9,
            max_voltage_step: 0.5,
            max_current_step: 0.05,
        }
    }
}

impl NewtonConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iterations per attempt.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance on the residual norm.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the number of attempts.
    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Set the per-iteration step caps for voltage and current unknowns.
    pub fn with_step_limits(mut self, max_voltage_step: f64, max_current_step: f64) -> Self {
        self.max_voltage_step = max_voltage_step;
        self.max_current_step = max_current_step;
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("tolerance", self.tolerance),
            ("initial_alpha", self.initial_alpha),
            ("min_alpha", self.min_alpha),
            ("stability_eps", self.stability_eps),
            ("max_voltage_step", self.max_voltage_step),
            ("max_current_step", self.max_current_step),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SimError::invalid_simulation_param(format!(
                    "{name} must be > 0, was: {value}"
                )));
            }
        }
        if !(self.alpha_shrink > 0.0 && self.alpha_shrink < 1.0) {
            return Err(SimError::invalid_simulation_param(format!(
                "alpha_shrink must be in (0, 1), was: {}",
                self.alpha_shrink
            )));
        }
        if self.max_iterations == 0 || self.max_restarts == 0 {
            return Err(SimError::invalid_simulation_param(
                "max_iterations and max_restarts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A converged Newton-Raphson solve.
#[derive(Debug, Clone)]
pub struct NewtonSolution {
    /// Solution vector
    pub x: Vec<f64>,
    /// Residual norm at `x`
    pub residual: f64,
    /// Iterations used by the successful attempt
    pub iterations: usize,
    /// Failed attempts before the successful one
    pub restarts: usize,
}

enum Attempt {
    Converged {
        x: Vec<f64>,
        residual: f64,
        iterations: usize,
    },
    Failed {
        best_residual: f64,
    },
}

/// Newton-Raphson solver for nonlinear systems.
#[derive(Debug, Clone)]
pub struct NewtonRaphson<R = SplitMix64> {
    config: NewtonConfig,
    rng: R,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new()
    }
}

impl NewtonRaphson {
    /// Create a solver with default settings and the default seed.
    pub fn new() -> Self {
        Self::with_config(NewtonConfig::default(), DEFAULT_SEED)
    }

    /// Create a solver with custom settings, seeded for reproducible restarts.
    pub fn with_config(config: NewtonConfig, seed: u64) -> Self {
        Self::with_rng(config, SplitMix64::new(seed))
    }
}

impl<R: RandomSource> NewtonRaphson<R> {
    /// Create a solver drawing its perturbations from `rng`.
    pub fn with_rng(config: NewtonConfig, rng: R) -> Self {
        Self { config, rng }
    }

    /// The active configuration.
    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Solve `system` starting from its initial guess.
    pub fn solve<S: NonlinearSystem + ?Sized>(&mut self, system: &S) -> Result<NewtonSolution> {
        let x0 = system.initial_guess();
        debug_assert_eq!(x0.len(), system.len());
        let mut best_residual = f64::INFINITY;

        for restart in 0..self.config.max_restarts {
            let start = if restart == 0 {
                x0.clone()
            } else {
                let mut x = x0.clone();
                self.perturb(&mut x);
                x
            };

            match self.attempt(system, start) {
                Attempt::Converged {
                    x,
                    residual,
                    iterations,
                } => {
                    trace!(restart, iterations, residual, "newton converged");
                    return Ok(NewtonSolution {
                        x,
                        residual,
                        iterations,
                        restarts: restart,
                    });
                }
                Attempt::Failed { best_residual: r } => {
                    debug!(restart, best_residual = r, "newton attempt failed, restarting");
                    if r < best_residual {
                        best_residual = r;
                    }
                }
            }
        }

        Err(SimError::convergence_failure(
            self.config.max_restarts,
            best_residual,
        ))
    }

    fn attempt<S: NonlinearSystem + ?Sized>(&mut self, system: &S, start: Vec<f64>) -> Attempt {
        let cfg = self.config.clone();
        let mut x = start;
        let mut alpha = cfg.initial_alpha;
        let mut best_x = x.clone();
        let mut best_residual = f64::INFINITY;

        for iter in 0..cfg.max_iterations {
            let fx = system.residual(&x);
            let error = norm(&fx);
            trace!(iter, error, alpha, "newton iteration");

            if error < best_residual {
                best_residual = error;
                best_x.clone_from(&x);
            }

            if error < cfg.tolerance {
                return Attempt::Converged {
                    x,
                    residual: error,
                    iterations: iter,
                };
            }

            if !error.is_finite() {
                debug!(iter, "residual is not finite");
                break;
            }

            let mut jacobian = system.jacobian(&x);
            stabilize_diagonal(&mut jacobian, cfg.stability_eps);

            let neg_f: Vec<f64> = fx.iter().map(|f| -f).collect();
            let mut dx = match solve_linear(&jacobian, &neg_f) {
                Ok(dx) => dx,
                Err(err) => {
                    debug!(iter, %err, "jacobian solve failed");
                    break;
                }
            };

            for (i, d) in dx.iter_mut().enumerate() {
                let cap = match system.unknown_kind(i) {
                    UnknownKind::Voltage => cfg.max_voltage_step,
                    UnknownKind::Current => cfg.max_current_step,
                };
                *d = d.clamp(-cap, cap);
            }

            // Line search with backtracking
            let mut trial = scaled_step(&x, &dx, alpha);
            let mut trial_error = norm(&system.residual(&trial));
            while !(trial_error < error) && alpha > cfg.min_alpha {
                alpha *= cfg.alpha_shrink;
                trial = scaled_step(&x, &dx, alpha);
                trial_error = norm(&system.residual(&trial));
            }

            if !(trial_error < error) {
                debug!(iter, error, alpha, "no improving step, perturbing iterate");
                self.perturb(&mut x);
                alpha = cfg.initial_alpha;
            } else {
                x = trial;
                alpha = cfg.initial_alpha.min(alpha * cfg.alpha_growth);
            }
        }

        // Exhausted iterations: a near miss is still usable
        if best_residual < cfg.tolerance * 10.0 {
            return Attempt::Converged {
                x: best_x,
                residual: best_residual,
                iterations: cfg.max_iterations,
            };
        }

        Attempt::Failed { best_residual }
    }

    /// Jitter every component by `±0.5 * scale * random_scale`, where the
    /// scale is the component's magnitude (0.1 for exact zeros).
    fn perturb(&mut self, x: &mut [f64]) {
        let random_scale = self.config.random_scale;
        for xi in x.iter_mut() {
            let scale = if *xi == 0.0 { 0.1 } else { xi.abs() };
            *xi += self.rng.jitter() * scale * random_scale;
        }
    }
}

fn stabilize_diagonal(jacobian: &mut Matrix, eps: f64) {
    for i in 0..jacobian.size() {
        let d = jacobian.get(i, i);
        if d.abs() < eps {
            jacobian.set(i, i, if d < 0.0 { -eps } else { eps });
        }
    }
}

fn scaled_step(x: &[f64], dx: &[f64], alpha: f64) -> Vec<f64> {
    x.iter().zip(dx).map(|(xi, di)| xi + alpha * di).collect()
}
