use mpfe_optimize::direction::DirectionFactory;
use mpfe_optimize::group::{Group, SystemInterface};
use mpfe_optimize::line_search::{Aitken, Backtracking, FullStep};
use mpfe_optimize::linear::DenseLu;
use mpfe_optimize::solver::{LineSearchBased, SolverError, StatusTest};
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::error::Error;

/// F(x) = (x_0^2 - 4, x_1^3 - 8), root at (2, 2)
struct Polynomial;

impl SystemInterface for Polynomial {
    fn dimension(&self) -> usize {
        2
    }

    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> Result<(), Box<dyn Error>> {
        f[0] = x[0] * x[0] - 4.0;
        f[1] = x[1] * x[1] * x[1] - 8.0;
        Ok(())
    }

    fn compute_jacobian(&mut self, x: DVectorView<f64>) -> Result<CsrMatrix<f64>, Box<dyn Error>> {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 2.0 * x[0]);
        coo.push(1, 1, 3.0 * x[1] * x[1]);
        Ok(CsrMatrix::from(&coo))
    }
}

/// F(x) = G(x) - x with the linear contraction G(x) = A x + c.
/// The fixed point iteration with full steps converges slowly since A has an eigenvalue near 1.
struct Contraction;

impl SystemInterface for Contraction {
    fn dimension(&self) -> usize {
        2
    }

    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> Result<(), Box<dyn Error>> {
        let g0 = 0.95 * x[0] + 1.0;
        let g1 = 0.95 * x[1] - 2.0;
        f[0] = g0 - x[0];
        f[1] = g1 - x[1];
        Ok(())
    }

    fn compute_jacobian(&mut self, _x: DVectorView<f64>) -> Result<CsrMatrix<f64>, Box<dyn Error>> {
        Err(Box::from("Jacobian is not available for the fixed-point problem"))
    }
}

#[test]
fn newton_with_backtracking_converges_quadratically() {
    let factory = DirectionFactory::default();
    let mut solver = LineSearchBased::new(
        factory.build("Newton").unwrap(),
        Box::new(Backtracking::default()),
        Box::new(DenseLu),
        StatusTest {
            tolerance: 1e-12,
            max_iterations: 30,
        },
    );
    let mut group = Group::new(Polynomial, DVector::from_column_slice(&[1.0, 1.0]));
    let summary = solver.solve(&mut group).unwrap();
    assert!(summary.f_norm <= 1e-12);
    assert!(summary.iterations < 10);
    let (_, x) = group.into_parts();
    assert!((x - DVector::from_column_slice(&[2.0, 2.0])).norm() < 1e-10);
}

#[test]
fn fixpoint_with_aitken_converges_for_linear_contraction() {
    let factory = DirectionFactory::default();
    let mut solver = LineSearchBased::new(
        factory.build("FixPoint").unwrap(),
        Box::new(Aitken::new(1.0, 100.0)),
        Box::new(DenseLu),
        StatusTest {
            tolerance: 1e-10,
            max_iterations: 10,
        },
    );
    let mut group = Group::new(Contraction, DVector::zeros(2));
    let summary = solver.solve(&mut group).unwrap();
    // Aitken recovers the exact relaxation for a scalar contraction after one step
    assert!(summary.iterations <= 3);
    let (_, x) = group.into_parts();
    assert!((x - DVector::from_column_slice(&[20.0, -40.0])).norm() < 1e-8);
}

#[test]
fn fixpoint_without_relaxation_hits_iteration_limit() {
    let factory = DirectionFactory::default();
    let mut solver = LineSearchBased::new(
        factory.build("FixPoint").unwrap(),
        Box::new(FullStep),
        Box::new(DenseLu),
        StatusTest {
            tolerance: 1e-10,
            max_iterations: 10,
        },
    );
    let mut group = Group::new(Contraction, DVector::zeros(2));
    let err = solver.solve(&mut group).unwrap_err();
    assert!(matches!(err, SolverError::MaximumIterationsReached(10)));
}

#[test]
fn unknown_direction_name_is_rejected() {
    let factory = DirectionFactory::default();
    assert!(factory.build("Broyden").is_err());
    assert_eq!(factory.names().collect::<Vec<_>>(), vec!["FixPoint", "Newton"]);
}
