//! The channel through which a time integrator passes step data to element kernels.
use crate::function::FunctionManager;
use serde::{Deserialize, Serialize};

/// What an evaluation sweep computes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Jacobian in `matrix1`, residual in `vector1`.
    CalcSystem,
    /// Mass (capacity) matrix in `matrix1`.
    CalcMassMatrix,
    /// Mass matrix in `matrix1` and the right-hand side for the initial time derivative in `vector1`.
    CalcInitialTimeDerivative,
    HomogenizeDensity,
    MultiReadRestart,
    MultiInvanaInit,
}

/// Factors of the active time integration scheme.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFactors {
    /// Factor multiplying the stationary operator in the discrete time derivative.
    pub timefac: f64,
    pub theta: f64,
    pub stationary: bool,
}

impl TimeFactors {
    pub fn stationary() -> Self {
        Self {
            timefac: 1.0,
            theta: 1.0,
            stationary: true,
        }
    }

    /// Factor applied to external loads in the residual of a transient field.
    pub fn load_factor(&self) -> f64 {
        if self.stationary {
            1.0
        } else {
            self.timefac
        }
    }
}

/// Per-sweep snapshot of the integrator data kernels may read.
///
/// Kernels receive a shared borrow; only the owning integrator can change it.
#[derive(Debug, Clone)]
pub struct ParameterInterface<'a> {
    action: Action,
    total_time: f64,
    delta_time: f64,
    step: usize,
    factors: TimeFactors,
    functions: &'a FunctionManager,
}

impl<'a> ParameterInterface<'a> {
    pub fn new(action: Action, functions: &'a FunctionManager) -> Self {
        Self {
            action,
            total_time: 0.0,
            delta_time: 0.0,
            step: 0,
            factors: TimeFactors::stationary(),
            functions,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn time_factors(&self) -> &TimeFactors {
        &self.factors
    }

    pub fn functions(&self) -> &'a FunctionManager {
        self.functions
    }

    pub fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub fn set_time(&mut self, total_time: f64, delta_time: f64, step: usize) {
        self.total_time = total_time;
        self.delta_time = delta_time;
        self.step = step;
    }

    pub fn set_time_factors(&mut self, factors: TimeFactors) {
        self.factors = factors;
    }
}
