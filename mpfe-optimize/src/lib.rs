//! Nonlinear solver building blocks.
//!
//! The design follows the "group" model of Newton-type solver libraries: a [`group::Group`]
//! holds the current iterate together with its function value, Jacobian and Newton direction,
//! each tagged with a validity flag. [`direction::Direction`]s and
//! [`line_search::LineSearch`]es operate on groups through the [`group::AbstractGroup`] trait,
//! and [`solver::LineSearchBased`] drives the iteration.
use nalgebra::RealField;

/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// Search directions and the by-name direction factory
pub mod direction;
/// Solver state with validity flags
pub mod group;
/// Linear solvers for the Jacobian system
pub mod linear;
/// Step length strategies
pub mod line_search;
/// Nonlinear solver driver and status tests
pub mod solver;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
