//! Element evaluation, assembly and time-stepping core for multiphysics finite element codes.
//!
//! A [`Discretization`](discretization::Discretization) owns nodes, elements and the DOF map of one
//! field, distributed over the ranks of a [`Communicator`](comm::Communicator). Elements dispatch
//! through the [`ElementRegistry`](element::ElementRegistry) to shape-specialized kernels, whose
//! local contributions are scattered by the [`assembly`] engine into distributed residuals and
//! Jacobians. A [`TimeIntegrator`](timint::TimeIntegrator) drives the evaluation sweeps step by step
//! and hands the assembled system to the nonlinear solvers of [`optimize`].
pub mod assembly;
pub mod clone;
pub mod comm;
pub mod condition;
pub mod config;
pub mod coupling;
pub mod discretization;
pub mod driver;
pub mod element;
pub mod error;
pub mod function;
pub mod io;
pub mod linalg;
pub mod linedef;
pub mod material;
pub mod nonlinear;
pub mod params;
pub mod procedural;
pub mod quadrature;
pub mod timint;
pub mod validate;

pub mod pack {
    pub use mpfe_pack::*;
}

pub mod optimize {
    pub use mpfe_optimize::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Global identifier of a node, element or degree of freedom.
pub type Gid = usize;

pub use error::{Error, Result};
