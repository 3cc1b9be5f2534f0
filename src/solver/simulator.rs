//! Main simulator interface.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::circuit::{CircuitDescription, CircuitGraph, ComponentId, NodeId};
use crate::components::Component;
use crate::error::{Result, SimError};

use super::mna::{build_static_equation, derive_component_state, solve, stamp_dynamic_equation};
use super::state::{CircuitState, ComponentState};
use super::{
    Equation, NewtonConfig, NewtonRaphson, DEFAULT_SEED, DEFAULT_SIM_TIME_PER_SEC,
    DEFAULT_TIMESTEP,
};

/// Relative tolerance when comparing accumulated time against the timestep.
const STEP_SLACK: f64 = 1e-9;

/// Configuration for the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fixed simulation timestep in seconds.
    pub timestep: f64,
    /// Simulated seconds per real second of `advance` input.
    pub sim_time_per_sec: f64,
    /// Seed for the Newton-Raphson restart perturbations.
    pub seed: u64,
    /// Newton-Raphson settings.
    pub newton: NewtonConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            timestep: DEFAULT_TIMESTEP,
            sim_time_per_sec: DEFAULT_SIM_TIME_PER_SEC,
            seed: DEFAULT_SEED,
            newton: NewtonConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestep (seconds).
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set how many simulated seconds pass per real second.
    ///
    /// - 1e-3 (default): one real second shows 1 ms of circuit time
    /// - 1.0: real time
    pub fn with_sim_time_per_sec(mut self, sim_time_per_sec: f64) -> Self {
        self.sim_time_per_sec = sim_time_per_sec;
        self
    }

    /// Set the Newton-Raphson RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the Newton-Raphson configuration.
    pub fn with_newton(mut self, newton: NewtonConfig) -> Self {
        self.newton = newton;
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep > 0.0 && self.timestep.is_finite()) {
            return Err(SimError::invalid_simulation_param(format!(
                "timestep must be > 0, was: {}",
                self.timestep
            )));
        }
        if !(self.sim_time_per_sec > 0.0 && self.sim_time_per_sec.is_finite()) {
            return Err(SimError::invalid_simulation_param(format!(
                "sim_time_per_sec must be > 0, was: {}",
                self.sim_time_per_sec
            )));
        }
        self.newton.validate()
    }
}

/// The main circuit simulator.
///
/// Holds a circuit graph, its static equation and the state derived from the
/// last solved tick. Real time passed to [`Simulator::advance`] is scaled to
/// simulated time and consumed in fixed timesteps; the remainder carries over
/// to the next call.
pub struct Simulator {
    config: SimulatorConfig,
    /// The circuit being simulated
    graph: CircuitGraph,
    /// Static equation, `None` while the graph is structurally invalid
    equation: Option<Equation>,
    /// Per-component state after the last tick
    state: CircuitState,
    /// Ground-prefixed solution of the last tick
    solution: Vec<f64>,
    /// Simulated time not yet consumed by a whole timestep
    remaining_delta: f64,
    sim_time: f64,
    running: bool,
    last_error: Option<SimError>,
    newton: NewtonRaphson,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Create an empty, stopped simulator with default configuration.
    pub fn new() -> Self {
        let config = SimulatorConfig::default();
        let newton = NewtonRaphson::with_config(config.newton.clone(), config.seed);
        Self {
            config,
            graph: CircuitGraph::default(),
            equation: None,
            state: CircuitState::new(),
            solution: vec![0.0],
            remaining_delta: 0.0,
            sim_time: 0.0,
            running: false,
            last_error: None,
            newton,
        }
    }

    /// Create an empty, stopped simulator with custom configuration.
    pub fn with_config(config: SimulatorConfig) -> Result<Self> {
        let mut sim = Self::new();
        sim.set_config(config)?;
        Ok(sim)
    }

    /// Replace the configuration. The loaded circuit and its state are kept.
    pub fn set_config(&mut self, config: SimulatorConfig) -> Result<()> {
        config.validate()?;
        self.newton = NewtonRaphson::with_config(config.newton.clone(), config.seed);
        self.config = config;
        Ok(())
    }

    /// The active configuration.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Replace the circuit.
    ///
    /// All state is reset to zero. A structural or component-parameter error
    /// is stored in [`Simulator::last_error`] and blocks solving until the
    /// next load.
    pub fn load_graph(&mut self, graph: CircuitGraph) {
        self.graph = graph;
        self.remaining_delta = 0.0;
        self.sim_time = 0.0;
        self.reset_state();

        match build_static_equation(&self.graph) {
            Ok(equation) => {
                info!(
                    components = self.graph.len(),
                    nodes = self.graph.num_nodes(),
                    vsources = self.graph.num_vsources(),
                    nonlinear = self.graph.has_nonlinear(),
                    "circuit loaded"
                );
                self.equation = Some(equation);
                self.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, "circuit rejected");
                self.equation = None;
                self.last_error = Some(e);
            }
        }
    }

    /// Build a graph from components and load it.
    pub fn load_components(&mut self, components: Vec<Component>) {
        match CircuitGraph::new(components) {
            Ok(graph) => self.load_graph(graph),
            Err(e) => {
                warn!(error = %e, "circuit rejected");
                self.load_graph(CircuitGraph::default());
                self.last_error = Some(e);
            }
        }
    }

    /// Apply a description's simulation settings and load its circuit.
    pub fn load_description(&mut self, description: &CircuitDescription) -> Result<()> {
        self.set_config(description.simulation.clone())?;
        let components = description.to_components()?;
        self.load_components(components);
        Ok(())
    }

    /// Resume advancing time.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Pause. [`Simulator::advance`] does nothing until restarted.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a circuit is loaded and its static equation was built.
    pub fn is_ready(&self) -> bool {
        self.equation.is_some()
    }

    /// Advance by `delta_ms` milliseconds of real time.
    ///
    /// Returns the number of whole timesteps solved. A failing tick zeroes
    /// the state, drops the remaining time and is retried on the next call.
    pub fn advance(&mut self, delta_ms: f64) -> usize {
        if !self.running || self.equation.is_none() {
            return 0;
        }

        self.remaining_delta += delta_ms / 1000.0 * self.config.sim_time_per_sec;
        let threshold = self.config.timestep * (1.0 - STEP_SLACK);

        let mut steps = 0;
        while self.remaining_delta >= threshold {
            match self.step() {
                Ok(()) => {
                    self.remaining_delta -= self.config.timestep;
                    steps += 1;
                }
                Err(e) => {
                    warn!(error = %e, sim_time = self.sim_time, "tick failed, state reset");
                    self.reset_state();
                    self.remaining_delta = 0.0;
                    self.last_error = Some(e);
                    return steps;
                }
            }
        }

        if steps > 0 {
            self.last_error = None;
            debug!(steps, sim_time = self.sim_time, "advanced");
        }
        steps
    }

    /// Solve one timestep ending at `sim_time + timestep`.
    fn step(&mut self) -> Result<()> {
        let static_equation = self.equation.as_ref().ok_or(SimError::NoCircuit)?;
        let time = self.sim_time + self.config.timestep;

        let mut equation = static_equation.clone();
        let recoveries = stamp_dynamic_equation(
            &self.graph,
            &mut equation,
            self.config.timestep,
            time,
            &self.state,
        )?;

        let elements = self.graph.nonlinear_elements();
        let x = solve(&equation, &elements, &mut self.newton)?;

        let mut solution = Vec::with_capacity(x.len() + 1);
        solution.push(0.0);
        solution.extend(x);

        self.state = derive_component_state(&self.graph, &solution, &recoveries);
        self.solution = solution;
        self.sim_time = time;
        Ok(())
    }

    fn reset_state(&mut self) {
        self.state = self
            .graph
            .components()
            .map(|c| {
                (
                    c.id(),
                    ComponentState::zeroed(c.nodes().len(), c.num_currents()),
                )
            })
            .collect();
        let size = self.graph.num_nodes() + self.graph.num_vsources();
        self.solution = vec![0.0; size];
    }

    /// Simulated time of the last solved tick, in seconds.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Simulated time waiting for the next whole timestep, in seconds.
    pub fn remaining_delta(&self) -> f64 {
        self.remaining_delta
    }

    /// Voltage at a node after the last tick.
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        self.solution.get(node.0).copied().unwrap_or(0.0)
    }

    /// Largest node voltage magnitude after the last tick.
    pub fn max_abs_voltage(&self) -> f64 {
        self.graph
            .non_ground_nodes()
            .map(|node| self.node_voltage(node).abs())
            .fold(0.0, f64::max)
    }

    /// State of one component after the last tick.
    pub fn component_state(&self, id: ComponentId) -> Option<&ComponentState> {
        self.state.get(&id)
    }

    /// State of every component after the last tick.
    pub fn state(&self) -> &CircuitState {
        &self.state
    }

    /// The error that stopped the last load or tick, if any.
    pub fn last_error(&self) -> Option<&SimError> {
        self.last_error.as_ref()
    }

    /// Get a reference to the circuit.
    pub fn graph(&self) -> &CircuitGraph {
        &self.graph
    }
}
