use crate::group::AbstractGroup;
use itertools::iterate;
use log::debug;
use nalgebra::{DVector, DVectorView};
use std::error::Error;

/// Chooses a step length along a direction.
///
/// On entry, the group holds `x_k` with a valid function value. On successful return, the group
/// holds `x_k + alpha * d` with a valid function value, and `alpha` is returned.
pub trait LineSearch {
    fn step(&mut self, group: &mut dyn AbstractGroup, direction: &DVector<f64>) -> Result<f64, Box<dyn Error>>;

    /// Called by the solver at the start of every nonlinear solve.
    fn reset(&mut self) {}
}

fn move_to(group: &mut dyn AbstractGroup, x0: &DVector<f64>, direction: &DVector<f64>, alpha: f64) -> Result<(), Box<dyn Error>> {
    let x = x0 + direction * alpha;
    group.set_x(DVectorView::from(&x));
    group.compute_f()
}

/// Trivial line search. Equivalent to a single, full step.
#[derive(Clone, Debug, Default)]
pub struct FullStep;

impl LineSearch for FullStep {
    fn step(&mut self, group: &mut dyn AbstractGroup, direction: &DVector<f64>) -> Result<f64, Box<dyn Error>> {
        let x0 = group.x().clone();
        move_to(group, &x0, direction, 1.0)?;
        Ok(1.0)
    }
}

/// Standard backtracking line search using the Armijo condition.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct Backtracking {
    pub sufficient_decrease: f64,
    pub min_step: f64,
}

impl Default for Backtracking {
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step: 1e-6,
        }
    }
}

impl LineSearch for Backtracking {
    fn step(&mut self, group: &mut dyn AbstractGroup, direction: &DVector<f64>) -> Result<f64, Box<dyn Error>> {
        // We seek to solve
        //  F(x) = 0
        // by minimizing
        //  g(x) = (1/2) || F(x) ||^2
        // and with p_k the Newton direction, the sufficient decrease condition becomes
        //  g(x_k + alpha * p_k) <= (1 - c * alpha) * g(x_k).
        let c = self.sufficient_decrease;
        let x0 = group.x().clone();
        let g_initial = 0.5 * group.f().norm_squared();

        // Decrease slowly at first, then much faster if the first few steps are rejected
        let mut alphas = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha| 0.25 * alpha));

        loop {
            let alpha = alphas.next().ok_or("Step length sequence exhausted")?;
            move_to(group, &x0, direction, alpha)?;
            let g = 0.5 * group.f().norm_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < self.min_step {
                return Err(Box::from(format!(
                    "Failed to produce valid step. Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, self.min_step
                )));
            }
        }
    }
}

/// Aitken's dynamic relaxation for fixed-point iterations.
///
/// With `d_k` the current and `d_{k-1}` the previous direction, the relaxation factor is updated as
/// `omega_k = -omega_{k-1} * d_{k-1}^T (d_k - d_{k-1}) / ||d_k - d_{k-1}||^2`.
/// The first step of every solve uses the initial relaxation.
#[derive(Clone, Debug)]
pub struct Aitken {
    pub initial_relaxation: f64,
    pub max_relaxation: f64,
    omega: f64,
    previous_direction: Option<DVector<f64>>,
}

impl Aitken {
    pub fn new(initial_relaxation: f64, max_relaxation: f64) -> Self {
        assert!(max_relaxation > 0.0, "Maximum relaxation must be positive");
        Self {
            initial_relaxation,
            max_relaxation,
            omega: initial_relaxation,
            previous_direction: None,
        }
    }

    pub fn relaxation(&self) -> f64 {
        self.omega
    }
}

impl Default for Aitken {
    fn default() -> Self {
        Self::new(1.0, 1e6)
    }
}

impl LineSearch for Aitken {
    fn step(&mut self, group: &mut dyn AbstractGroup, direction: &DVector<f64>) -> Result<f64, Box<dyn Error>> {
        match &self.previous_direction {
            Some(previous) => {
                let difference = direction - previous;
                let denominator = difference.norm_squared();
                if denominator > 0.0 {
                    self.omega = -self.omega * previous.dot(&difference) / denominator;
                }
            }
            None => self.omega = self.initial_relaxation,
        }
        if self.omega.abs() > self.max_relaxation {
            self.omega = self.max_relaxation.copysign(self.omega);
        }
        debug!("Aitken relaxation factor: {}", self.omega);
        self.previous_direction = Some(direction.clone());

        let x0 = group.x().clone();
        move_to(group, &x0, direction, self.omega)?;
        Ok(self.omega)
    }

    fn reset(&mut self) {
        self.omega = self.initial_relaxation;
        self.previous_direction = None;
    }
}
