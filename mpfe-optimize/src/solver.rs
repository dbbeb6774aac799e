use crate::direction::Direction;
use crate::group::AbstractGroup;
use crate::line_search::LineSearch;
use crate::linear::LinearSolver;
use log::{debug, info};
use nalgebra::DVector;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusType {
    Unconverged,
    Converged,
    Failed,
}

/// Convergence test on the norm of `F` combined with an iteration limit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StatusTest {
    /// Absolute tolerance on `||F(x)||_2`.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for StatusTest {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 20,
        }
    }
}

impl StatusTest {
    pub fn check(&self, group: &dyn AbstractGroup, iteration: usize) -> StatusType {
        if group.is_f() && group.f_norm() <= self.tolerance {
            StatusType::Converged
        } else if iteration >= self.max_iterations {
            StatusType::Failed
        } else {
            StatusType::Unconverged
        }
    }
}

#[derive(Debug)]
pub enum SolverError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// Evaluating the function or its Jacobian failed.
    GroupError(Box<dyn Error>),
    /// Computing the search direction failed.
    DirectionError(Box<dyn Error>),
    /// The line search failed to produce a valid step.
    LineSearchError(Box<dyn Error>),
}

impl Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            SolverError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            SolverError::GroupError(err) => write!(f, "Failed to evaluate nonlinear system. Error: {}", err),
            SolverError::DirectionError(err) => write!(f, "Failed to compute search direction. Error: {}", err),
            SolverError::LineSearchError(err) => {
                write!(f, "Line search failed to produce valid step. Error: {}", err)
            }
        }
    }
}

impl Error for SolverError {}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolveSummary {
    pub iterations: usize,
    pub f_norm: f64,
}

/// Line-search based nonlinear solver: `x_{k+1} = x_k + alpha_k d_k`.
pub struct LineSearchBased {
    pub direction: Box<dyn Direction>,
    pub line_search: Box<dyn LineSearch>,
    pub linear_solver: Box<dyn LinearSolver>,
    pub status_test: StatusTest,
}

impl fmt::Debug for LineSearchBased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSearchBased")
            .field("direction", &self.direction.name())
            .field("status_test", &self.status_test)
            .finish()
    }
}

impl LineSearchBased {
    pub fn new(
        direction: Box<dyn Direction>,
        line_search: Box<dyn LineSearch>,
        linear_solver: Box<dyn LinearSolver>,
        status_test: StatusTest,
    ) -> Self {
        Self {
            direction,
            line_search,
            linear_solver,
            status_test,
        }
    }

    /// Iterates until the status test reports convergence or failure.
    pub fn solve(&mut self, group: &mut dyn AbstractGroup) -> Result<SolveSummary, SolverError> {
        self.line_search.reset();
        group.compute_f().map_err(SolverError::GroupError)?;
        let mut direction = DVector::zeros(group.dimension());
        let mut iteration = 0;

        loop {
            match self.status_test.check(group, iteration) {
                StatusType::Converged => {
                    info!(
                        "{} solver converged after {} iterations (|F| = {:e})",
                        self.direction.name(),
                        iteration,
                        group.f_norm()
                    );
                    return Ok(SolveSummary {
                        iterations: iteration,
                        f_norm: group.f_norm(),
                    });
                }
                StatusType::Failed => return Err(SolverError::MaximumIterationsReached(iteration)),
                StatusType::Unconverged => {}
            }

            self.direction
                .compute(&mut direction, group, self.linear_solver.as_mut())
                .map_err(SolverError::DirectionError)?;
            let step_length = self
                .line_search
                .step(group, &direction)
                .map_err(SolverError::LineSearchError)?;
            iteration += 1;
            debug!(
                "Iteration {}: step length {}, |F| = {:e}",
                iteration,
                step_length,
                group.f_norm()
            );
        }
    }
}
