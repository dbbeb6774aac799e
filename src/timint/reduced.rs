//! A lumped (0D) compartment attached to one node of the field.
use super::participant::{StepParticipant, StepView};
use crate::comm::{sum_all, sum_all_usize};
use crate::config::ReducedModelConfig;
use crate::error::{Error, Result};
use crate::Gid;
use log::debug;
use mpfe_pack::{PackBuffer, UnpackBuffer};
use std::any::Any;

/// Two-element windkessel `C dp/dt = Q - p / R`, integrated with backward Euler.
///
/// The inflow is `Q = coupling * phi`, where `phi` is the first DOF of the coupling node at the
/// end of the step. The compartment does not feed back into the field.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedModel {
    node: Gid,
    resistance: f64,
    compliance: f64,
    coupling: f64,
    pressure_n: f64,
    pressure_np: f64,
    flow: f64,
    step: usize,
}

impl ReducedModel {
    pub fn new(config: &ReducedModelConfig) -> Self {
        Self {
            node: config.node,
            resistance: config.resistance,
            compliance: config.compliance,
            coupling: config.coupling,
            pressure_n: config.initial_pressure,
            pressure_np: config.initial_pressure,
            flow: 0.0,
            step: 0,
        }
    }

    /// Pressure at the end of the last accepted step.
    pub fn pressure(&self) -> f64 {
        self.pressure_n
    }

    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// Field value at the coupling node, replicated on all ranks. Collective.
    fn coupling_value(&self, view: &StepView) -> Result<f64> {
        let mut local = 0.0;
        if view.dis.is_node_gid_on_this_proc(self.node) {
            let dof = view.dis.dofs_of_node(self.node)?.start;
            local = view.state.phinp.get(dof).ok_or_else(|| {
                Error::Connectivity(format!("DOF {} of coupling node {} is not owned", dof, self.node))
            })?;
        }
        sum_all(view.dis.comm().as_ref(), local)
    }
}

impl StepParticipant for ReducedModel {
    fn name(&self) -> &str {
        "reduced_model"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn step(&self) -> Option<usize> {
        Some(self.step)
    }

    fn init(&mut self, view: &StepView) -> Result<()> {
        let owners = sum_all_usize(view.dis.comm().as_ref(), view.dis.is_node_gid_on_this_proc(self.node) as usize)?;
        if owners != 1 {
            return Err(Error::Configuration(format!(
                "Reduced model is attached to node {}, which does not exist in {}",
                self.node,
                view.dis.name()
            )));
        }
        self.step = view.step;
        Ok(())
    }

    fn prepare_time_step(&mut self, view: &StepView) -> Result<()> {
        self.step = view.step;
        Ok(())
    }

    fn post_solve(&mut self, view: &StepView) -> Result<()> {
        self.flow = self.coupling * self.coupling_value(view)?;
        let rc = self.resistance * self.compliance;
        self.pressure_np = (self.pressure_n + view.dt / self.compliance * self.flow) / (1.0 + view.dt / rc);
        Ok(())
    }

    fn update(&mut self, _view: &StepView) -> Result<()> {
        self.pressure_n = self.pressure_np;
        Ok(())
    }

    fn output(&self, view: &StepView) -> Result<()> {
        if view.dis.rank() == 0 {
            debug!(
                "Reduced model at step {}: p = {:.6e}, Q = {:.6e}",
                self.step, self.pressure_n, self.flow
            );
        }
        Ok(())
    }

    fn write_restart(&self, buffer: &mut PackBuffer) -> Result<()> {
        buffer.add_pod(self.step)?;
        buffer.add_pod(self.pressure_n)?;
        buffer.add_pod(self.flow)?;
        Ok(())
    }

    fn read_restart(&mut self, view: &StepView, buffer: &mut UnpackBuffer) -> Result<()> {
        let step: usize = buffer.extract_pod()?;
        if step != view.step {
            return Err(Error::Configuration(format!(
                "Reduced model restart is from step {} but the field restarts at step {}",
                step, view.step
            )));
        }
        self.step = step;
        self.pressure_n = buffer.extract_pod()?;
        self.pressure_np = self.pressure_n;
        self.flow = buffer.extract_pod()?;
        Ok(())
    }
}
