use mpfe_optimize::group::{AbstractGroup, Group, SystemInterface};
use mpfe_optimize::linear::DenseLu;
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::error::Error;

/// F(x) = A x - b, counting evaluations
#[derive(Default)]
struct CountingLinearSystem {
    residual_evaluations: usize,
    jacobian_evaluations: usize,
}

fn matrix() -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(2, 2);
    coo.push(0, 0, 4.0);
    coo.push(0, 1, 1.0);
    coo.push(1, 0, 1.0);
    coo.push(1, 1, 3.0);
    CsrMatrix::from(&coo)
}

impl SystemInterface for CountingLinearSystem {
    fn dimension(&self) -> usize {
        2
    }

    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> Result<(), Box<dyn Error>> {
        self.residual_evaluations += 1;
        f[0] = 4.0 * x[0] + x[1] - 1.0;
        f[1] = x[0] + 3.0 * x[1] - 2.0;
        Ok(())
    }

    fn compute_jacobian(&mut self, _x: DVectorView<f64>) -> Result<CsrMatrix<f64>, Box<dyn Error>> {
        self.jacobian_evaluations += 1;
        Ok(matrix())
    }
}

#[test]
fn valid_quantities_are_not_recomputed() {
    let mut group = Group::new(CountingLinearSystem::default(), DVector::zeros(2));
    assert!(!group.is_f() && !group.is_jacobian() && !group.is_newton());

    group.compute_f().unwrap();
    group.compute_f().unwrap();
    group.compute_jacobian().unwrap();
    group.compute_newton(&mut DenseLu).unwrap();
    assert_eq!(group.system().residual_evaluations, 1);
    assert_eq!(group.system().jacobian_evaluations, 1);

    // J d = -F with F(0) = -b gives the exact solution
    let expected = DVector::from_column_slice(&[1.0 / 11.0, 7.0 / 11.0]);
    assert!((group.newton() - expected).norm() < 1e-12);
}

#[test]
fn set_x_invalidates_everything() {
    let mut group = Group::new(CountingLinearSystem::default(), DVector::zeros(2));
    group.compute_newton(&mut DenseLu).unwrap();
    assert!(group.is_f() && group.is_jacobian() && group.is_newton());

    group.set_x(DVectorView::from(&DVector::from_column_slice(&[1.0, 1.0])));
    assert!(!group.is_f() && !group.is_jacobian() && !group.is_newton());
}

#[test]
fn captured_state_is_accepted_without_evaluation() {
    let mut group = Group::new(CountingLinearSystem::default(), DVector::zeros(2));
    group.capture_system_state(DVector::from_column_slice(&[-1.0, -2.0]), matrix());
    assert!(group.is_f() && group.is_jacobian());
    group.compute_newton(&mut DenseLu).unwrap();
    assert_eq!(group.system().residual_evaluations, 0);
    assert_eq!(group.system().jacobian_evaluations, 0);
    assert!(group.jacobian().is_some());
}
