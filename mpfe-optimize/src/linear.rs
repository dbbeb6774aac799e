use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum LinearSolverError {
    /// The matrix is singular (or not positive definite for solvers that require it).
    SingularMatrix,
    /// An iterative solver did not reach its tolerance.
    NotConverged { iterations: usize, residual_norm: f64 },
    /// Matrix and vector dimensions are incompatible.
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
}

impl Display for LinearSolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularMatrix => write!(f, "Matrix is singular"),
            Self::NotConverged {
                iterations,
                residual_norm,
            } => write!(
                f,
                "Iterative solver did not converge within {} iterations (residual norm {:e})",
                iterations, residual_norm
            ),
            Self::DimensionMismatch { rows, cols, rhs } => write!(
                f,
                "Dimension mismatch: {}x{} matrix with right-hand side of length {}",
                rows, cols, rhs
            ),
        }
    }
}

impl Error for LinearSolverError {}

/// Solves `A x = b`.
pub trait LinearSolver {
    fn solve(&mut self, a: &CsrMatrix<f64>, b: DVectorView<f64>, x: DVectorViewMut<f64>) -> Result<(), LinearSolverError>;
}

fn check_dimensions(a: &CsrMatrix<f64>, b: &DVectorView<f64>) -> Result<(), LinearSolverError> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        Err(LinearSolverError::DimensionMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        })
    } else {
        Ok(())
    }
}

/// Dense LU decomposition with partial pivoting. Intended for small systems and tests.
#[derive(Debug, Clone, Default)]
pub struct DenseLu;

impl LinearSolver for DenseLu {
    fn solve(
        &mut self,
        a: &CsrMatrix<f64>,
        b: DVectorView<f64>,
        mut x: DVectorViewMut<f64>,
    ) -> Result<(), LinearSolverError> {
        check_dimensions(a, &b)?;
        let dense = DMatrix::from(a);
        let solution = dense
            .lu()
            .solve(&b)
            .ok_or(LinearSolverError::SingularMatrix)?;
        x.copy_from(&solution);
        Ok(())
    }
}

/// Sparse Cholesky factorization for symmetric positive definite systems.
#[derive(Debug, Clone, Default)]
pub struct SparseCholesky;

impl LinearSolver for SparseCholesky {
    fn solve(
        &mut self,
        a: &CsrMatrix<f64>,
        b: DVectorView<f64>,
        mut x: DVectorViewMut<f64>,
    ) -> Result<(), LinearSolverError> {
        check_dimensions(a, &b)?;
        let csc = CscMatrix::from(a);
        let factorization = CscCholesky::factor(&csc).map_err(|_| LinearSolverError::SingularMatrix)?;
        let solution = factorization.solve(&b);
        x.copy_from(&solution.column(0));
        Ok(())
    }
}

/// Unpreconditioned conjugate gradient with a relative residual criterion `||r|| <= tol ||b||`.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 10_000,
        }
    }
}

impl LinearSolver for ConjugateGradient {
    #[allow(non_snake_case)]
    fn solve(
        &mut self,
        a: &CsrMatrix<f64>,
        b: DVectorView<f64>,
        mut x: DVectorViewMut<f64>,
    ) -> Result<(), LinearSolverError> {
        check_dimensions(a, &b)?;
        let n = b.len();
        let b_norm = b.norm();
        x.fill(0.0);
        if b_norm == 0.0 {
            return Ok(());
        }

        let mut r = b.clone_owned();
        let mut p = r.clone();
        let mut Ap = DVector::zeros(n);
        let mut r_dot_r = r.dot(&r);

        for iteration in 0..self.max_iterations {
            if r_dot_r.sqrt() <= self.tolerance * b_norm {
                debug!("CG converged after {} iterations", iteration);
                return Ok(());
            }
            spmm_csr_dense(0.0, &mut Ap, 1.0, Op::NoOp(a), Op::NoOp(&p));
            let p_dot_Ap = p.dot(&Ap);
            if p_dot_Ap <= 0.0 {
                return Err(LinearSolverError::SingularMatrix);
            }
            let alpha = r_dot_r / p_dot_Ap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &Ap, 1.0);
            let r_dot_r_new = r.dot(&r);
            let beta = r_dot_r_new / r_dot_r;
            r_dot_r = r_dot_r_new;
            p *= beta;
            p += &r;
        }

        let residual_norm = r_dot_r.sqrt();
        if residual_norm <= self.tolerance * b_norm {
            Ok(())
        } else {
            Err(LinearSolverError::NotConverged {
                iterations: self.max_iterations,
                residual_norm,
            })
        }
    }
}
