use super::state::TimeState;
use crate::discretization::Discretization;
use crate::error::Result;
use mpfe_pack::{PackBuffer, UnpackBuffer};
use std::any::Any;
use std::fmt::Debug;

/// Read-only view of the integrator handed to participants.
#[derive(Debug, Clone, Copy)]
pub struct StepView<'a> {
    pub dis: &'a Discretization,
    pub state: &'a TimeState,
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub theta: f64,
}

/// Behavior layered on top of a time integrator.
///
/// Participants are called in registration order, always after the integrator has done its own
/// part of the same stage. Hooks that are called on every rank may use collectives.
pub trait StepParticipant: Debug + Send {
    /// Identifies the participant's section in restart data.
    fn name(&self) -> &str;

    /// Gives access to the concrete participant, see [`TimeIntegrator::participant`].
    ///
    /// [`TimeIntegrator::participant`]: super::TimeIntegrator::participant
    fn as_any(&self) -> &dyn Any;

    /// Step counter kept by the participant itself, if any.
    fn step(&self) -> Option<usize> {
        None
    }

    fn init(&mut self, _view: &StepView) -> Result<()> {
        Ok(())
    }

    /// Whether the explicit predictor may be applied to the field.
    fn allows_explicit_predictor(&self) -> bool {
        true
    }

    fn prepare_time_step(&mut self, _view: &StepView) -> Result<()> {
        Ok(())
    }

    /// Called after the field of the current step has been solved and its time derivative is
    /// known.
    fn post_solve(&mut self, _view: &StepView) -> Result<()> {
        Ok(())
    }

    /// Called after the integrator rotated its state.
    fn update(&mut self, _view: &StepView) -> Result<()> {
        Ok(())
    }

    fn output(&self, _view: &StepView) -> Result<()> {
        Ok(())
    }

    fn write_restart(&self, _buffer: &mut PackBuffer) -> Result<()> {
        Ok(())
    }

    /// Reads the section written by [`StepParticipant::write_restart`]. The integrator state of
    /// `view` has already been restored.
    fn read_restart(&mut self, _view: &StepView, _buffer: &mut UnpackBuffer) -> Result<()> {
        Ok(())
    }
}
