//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit components:
//! - Linear: Resistor, Wire, Capacitor, Inductor
//! - Sources: Voltage Source (DC or sine), Current Source
//! - Controlled: Op-Amp
//! - Nonlinear: Diode, MOSFET
//!
//! Each component implements [`Stampable`]: static stamps go into the
//! equation built once per topology, dynamic stamps into the per-tick copy,
//! and nonlinear components expose a [`NonlinearElement`] for Newton-Raphson.

mod diode;
mod linear;
mod mosfet;
mod opamp;
mod sources;

pub use diode::{Diode, DiodeParams};
pub use linear::{Capacitor, Fault, Inductor, Resistor, Wire, OPEN_RESISTANCE, SHORT_RESISTANCE};
pub use mosfet::{Mosfet, MosfetParams, MosfetType, OperatingPoint};
pub use opamp::{OpAmp, DEFAULT_OPAMP_GAIN};
pub use sources::{CurrentSource, VoltageSource, Waveform};

use crate::circuit::{BranchId, ComponentDescription, ComponentId, ComponentKind, NodeId};
use crate::error::{Result, SimError};
use crate::solver::{ComponentState, CurrentRecovery, Equation, Matrix, NonlinearElement, Solution};

/// Behaviour shared by every component kind.
pub trait Stampable {
    fn id(&self) -> ComponentId;

    fn name(&self) -> &str;

    /// Connected nodes in the component's fixed order.
    fn nodes(&self) -> &[NodeId];

    /// Voltage-source rows this component needs.
    fn num_vsources(&self) -> usize {
        0
    }

    /// Number of current paths reported in [`ComponentState::currents`].
    fn num_currents(&self) -> usize {
        1
    }

    /// Stamp the time-independent part into the static equation.
    fn stamp(&self, _equation: &mut Equation) -> Result<()> {
        Ok(())
    }

    /// Stamp the per-tick part given the previous tick's state. Returns a
    /// current recovery when currents cannot be read off the solution.
    fn stamp_dynamic(
        &self,
        _equation: &mut Equation,
        _timestep: f64,
        _sim_time: f64,
        _previous: &ComponentState,
    ) -> Result<Option<CurrentRecovery>> {
        Ok(None)
    }

    /// The nonlinear part, if any.
    fn nonlinear(&self) -> Option<&dyn NonlinearElement> {
        None
    }

    /// Currents read from a solved tick.
    fn currents(&self, solution: &Solution<'_>) -> Vec<f64>;
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Wire(Wire),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Capacitor(Capacitor),
    Inductor(Inductor),
    OpAmp(OpAmp),
    Diode(Diode),
    Mosfet(Mosfet),
}

impl Component {
    /// Create a component from its description.
    pub fn from_description(desc: &ComponentDescription) -> Result<Self> {
        let id = desc.id;
        let name = desc
            .name
            .clone()
            .unwrap_or_else(|| format!("{}{}", desc.kind.designator(), id.0));

        let component = match &desc.kind {
            ComponentKind::Resistor { resistance, fault } => Component::Resistor(
                Resistor::new(id, name, expect_nodes(desc)?, *resistance).with_fault(*fault),
            ),
            ComponentKind::Wire => Component::Wire(Wire::new(id, name, expect_nodes(desc)?)),
            ComponentKind::VoltageSource {
                voltage,
                frequency,
                zero_time,
            } => {
                let waveform = match frequency {
                    Some(frequency) => Waveform::Sine {
                        voltage: *voltage,
                        frequency: *frequency,
                        zero_time: *zero_time,
                    },
                    None => Waveform::Dc { voltage: *voltage },
                };
                Component::VoltageSource(VoltageSource::new(
                    id,
                    name,
                    expect_nodes(desc)?,
                    waveform,
                ))
            }
            ComponentKind::CurrentSource { current } => Component::CurrentSource(
                CurrentSource::new(id, name, expect_nodes(desc)?, *current),
            ),
            ComponentKind::Capacitor { capacitance } => Component::Capacitor(Capacitor::new(
                id,
                name,
                expect_nodes(desc)?,
                *capacitance,
            )),
            ComponentKind::Inductor { inductance } => Component::Inductor(Inductor::new(
                id,
                name,
                expect_nodes(desc)?,
                *inductance,
            )),
            ComponentKind::OpAmp { gain } => {
                Component::OpAmp(OpAmp::new(id, name, expect_nodes(desc)?, *gain))
            }
            ComponentKind::Diode { params } => {
                Component::Diode(Diode::new(id, name, expect_nodes(desc)?, *params))
            }
            ComponentKind::Mosfet { channel, params } => Component::Mosfet(Mosfet::new(
                id,
                name,
                expect_nodes(desc)?,
                *channel,
                *params,
            )),
        };

        Ok(component)
    }

    fn as_stampable(&self) -> &dyn Stampable {
        match self {
            Component::Resistor(r) => r,
            Component::Wire(w) => w,
            Component::VoltageSource(v) => v,
            Component::CurrentSource(i) => i,
            Component::Capacitor(c) => c,
            Component::Inductor(l) => l,
            Component::OpAmp(o) => o,
            Component::Diode(d) => d,
            Component::Mosfet(m) => m,
        }
    }

    /// Get the component ID.
    pub fn id(&self) -> ComponentId {
        self.as_stampable().id()
    }

    /// Get the component name.
    pub fn name(&self) -> &str {
        self.as_stampable().name()
    }

    /// Short lowercase name of the component kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Resistor(_) => "resistor",
            Component::Wire(_) => "wire",
            Component::VoltageSource(_) => "voltage_source",
            Component::CurrentSource(_) => "current_source",
            Component::Capacitor(_) => "capacitor",
            Component::Inductor(_) => "inductor",
            Component::OpAmp(_) => "op_amp",
            Component::Diode(_) => "diode",
            Component::Mosfet(_) => "mosfet",
        }
    }

    /// Connected nodes.
    pub fn nodes(&self) -> &[NodeId] {
        self.as_stampable().nodes()
    }

    /// Voltage-source rows this component needs.
    pub fn num_vsources(&self) -> usize {
        self.as_stampable().num_vsources()
    }

    /// Number of reported current paths.
    pub fn num_currents(&self) -> usize {
        self.as_stampable().num_currents()
    }

    /// Assign the voltage-source index for components that need one.
    pub fn assign_branch(&mut self, branch: BranchId) {
        match self {
            Component::Wire(w) => w.branch = Some(branch),
            Component::VoltageSource(v) => v.branch = Some(branch),
            Component::OpAmp(o) => o.branch = Some(branch),
            _ => {}
        }
    }

    /// Stamp the static part.
    pub fn stamp(&self, equation: &mut Equation) -> Result<()> {
        self.as_stampable().stamp(equation)
    }

    /// Stamp the per-tick part.
    pub fn stamp_dynamic(
        &self,
        equation: &mut Equation,
        timestep: f64,
        sim_time: f64,
        previous: &ComponentState,
    ) -> Result<Option<CurrentRecovery>> {
        self.as_stampable()
            .stamp_dynamic(equation, timestep, sim_time, previous)
    }

    /// Check if this component is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear().is_some()
    }

    /// The nonlinear part, if any.
    pub fn nonlinear(&self) -> Option<&dyn NonlinearElement> {
        self.as_stampable().nonlinear()
    }

    /// Currents read from a solved tick.
    pub fn currents(&self, solution: &Solution<'_>) -> Vec<f64> {
        self.as_stampable().currents(solution)
    }
}

fn expect_nodes<const N: usize>(desc: &ComponentDescription) -> Result<[NodeId; N]> {
    <[NodeId; N]>::try_from(desc.nodes.as_slice()).map_err(|_| {
        SimError::topology(format!(
            "component {} ({}) needs {} nodes, got {}",
            desc.id,
            desc.kind.type_name(),
            N,
            desc.nodes.len()
        ))
    })
}

/// Fail unless `value` is finite and strictly positive.
pub(crate) fn require_positive(component: &str, param: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(
            component,
            param,
            format!("must be > 0, was: {value}"),
        ))
    }
}

pub(crate) fn require_branch(branch: Option<BranchId>, name: &str) -> Result<BranchId> {
    branch.ok_or_else(|| {
        SimError::topology(format!("no voltage source index assigned to '{name}'"))
    })
}

/// Voltage of `node` in a solution vector without the ground entry.
pub(crate) fn node_voltage(x: &[f64], node: NodeId) -> f64 {
    node.matrix_index().map_or(0.0, |i| x[i])
}

/// Add a two-terminal conductance `g` to a Jacobian.
pub(crate) fn stamp_jacobian_pair(jacobian: &mut Matrix, n1: NodeId, n2: NodeId, g: f64) {
    let (i, j) = (n1.matrix_index(), n2.matrix_index());
    if let Some(i) = i {
        jacobian.add(i, i, g);
    }
    if let Some(j) = j {
        jacobian.add(j, j, g);
    }
    if let (Some(i), Some(j)) = (i, j) {
        jacobian.add(i, j, -g);
        jacobian.add(j, i, -g);
    }
}
