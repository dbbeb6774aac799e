//! Time discretization schemes.
//!
//! A scheme writes the discrete time derivative of step `n+1` as
//! `dx/dt_{n+1} ~ (x_{n+1} - hist) / timefac`, where `hist` collects the known part. Kernels
//! assemble `M (x_{n+1} - hist) + timefac K x_{n+1}` accordingly.
use super::state::TimeState;
use crate::config::SchemeConfig;
use crate::params::TimeFactors;
use nalgebra::DVector;
use std::fmt::Debug;

pub trait TimeScheme: Debug + Send + Sync {
    fn name(&self) -> String;

    fn is_stationary(&self) -> bool {
        false
    }

    /// Whether `x_{n-1}` must be kept.
    fn uses_previous_step(&self) -> bool {
        false
    }

    /// Factors of step `step` (counting from 1).
    fn time_factors(&self, dt: f64, step: usize) -> TimeFactors;

    /// Owned values of the history vector of step `step`.
    fn history(&self, state: &TimeState, dt: f64, step: usize) -> DVector<f64>;

    /// Owned values of `dx/dt_{n+1}` after `x_{n+1}` has been solved for.
    fn time_derivative(&self, state: &TimeState, dt: f64, step: usize) -> DVector<f64>;
}

/// `x_{n+1} = x_n + dt ((1 - theta) dx/dt_n + theta dx/dt_{n+1})`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OneStepTheta {
    pub theta: f64,
}

impl TimeScheme for OneStepTheta {
    fn name(&self) -> String {
        format!("OneStepTheta(theta = {})", self.theta)
    }

    fn time_factors(&self, dt: f64, _step: usize) -> TimeFactors {
        TimeFactors {
            timefac: self.theta * dt,
            theta: self.theta,
            stationary: false,
        }
    }

    fn history(&self, state: &TimeState, dt: f64, _step: usize) -> DVector<f64> {
        state.phin.owned() + state.phidtn.owned() * ((1.0 - self.theta) * dt)
    }

    fn time_derivative(&self, state: &TimeState, dt: f64, _step: usize) -> DVector<f64> {
        let theta = self.theta;
        (state.phinp.owned() - state.phin.owned()) / (theta * dt) - state.phidtn.owned() * ((1.0 - theta) / theta)
    }
}

/// Second order backward differences. The first step is a backward Euler step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Bdf2;

impl TimeScheme for Bdf2 {
    fn name(&self) -> String {
        "BDF2".to_string()
    }

    fn uses_previous_step(&self) -> bool {
        true
    }

    fn time_factors(&self, dt: f64, step: usize) -> TimeFactors {
        let timefac = if step <= 1 { dt } else { 2.0 / 3.0 * dt };
        TimeFactors {
            timefac,
            theta: 1.0,
            stationary: false,
        }
    }

    fn history(&self, state: &TimeState, _dt: f64, step: usize) -> DVector<f64> {
        match (&state.phinm, step) {
            (Some(phinm), step) if step > 1 => state.phin.owned() * (4.0 / 3.0) - phinm.owned() * (1.0 / 3.0),
            _ => state.phin.owned().clone(),
        }
    }

    fn time_derivative(&self, state: &TimeState, dt: f64, step: usize) -> DVector<f64> {
        match (&state.phinm, step) {
            (Some(phinm), step) if step > 1 => {
                (state.phinp.owned() * 3.0 - state.phin.owned() * 4.0 + phinm.owned()) / (2.0 * dt)
            }
            _ => (state.phinp.owned() - state.phin.owned()) / dt,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Stationary;

impl TimeScheme for Stationary {
    fn name(&self) -> String {
        "Stationary".to_string()
    }

    fn is_stationary(&self) -> bool {
        true
    }

    fn time_factors(&self, _dt: f64, _step: usize) -> TimeFactors {
        TimeFactors::stationary()
    }

    fn history(&self, state: &TimeState, _dt: f64, _step: usize) -> DVector<f64> {
        DVector::zeros(state.phin.owned().len())
    }

    fn time_derivative(&self, state: &TimeState, _dt: f64, _step: usize) -> DVector<f64> {
        DVector::zeros(state.phin.owned().len())
    }
}

/// Integrator for particle-laden fields. Collision handling hooks in here; the time
/// discretization itself is that of the wrapped scheme.
#[derive(Debug)]
pub struct Hybrid {
    inner: Box<dyn TimeScheme>,
}

impl Hybrid {
    pub fn new(inner: Box<dyn TimeScheme>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &dyn TimeScheme {
        self.inner.as_ref()
    }
}

impl TimeScheme for Hybrid {
    fn name(&self) -> String {
        format!("Hybrid({})", self.inner.name())
    }

    fn is_stationary(&self) -> bool {
        self.inner.is_stationary()
    }

    fn uses_previous_step(&self) -> bool {
        self.inner.uses_previous_step()
    }

    fn time_factors(&self, dt: f64, step: usize) -> TimeFactors {
        self.inner.time_factors(dt, step)
    }

    fn history(&self, state: &TimeState, dt: f64, step: usize) -> DVector<f64> {
        self.inner.history(state, dt, step)
    }

    fn time_derivative(&self, state: &TimeState, dt: f64, step: usize) -> DVector<f64> {
        self.inner.time_derivative(state, dt, step)
    }
}

/// The scheme described by a configuration, wrapped in [`Hybrid`] if requested.
pub fn scheme_from_config(config: &SchemeConfig, hybrid: bool) -> Box<dyn TimeScheme> {
    let scheme: Box<dyn TimeScheme> = match *config {
        SchemeConfig::OneStepTheta { theta } => Box::new(OneStepTheta { theta }),
        SchemeConfig::Bdf2 => Box::new(Bdf2),
        SchemeConfig::Stationary => Box::new(Stationary),
    };
    if hybrid {
        Box::new(Hybrid::new(scheme))
    } else {
        scheme
    }
}
