use matrixcompare::assert_matrix_eq;
use mpfe_optimize::calculus::*;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

#[test]
fn approximate_jacobian_fd_simple_function() {
    let f = |x: DVectorView<f64>, mut f: DVectorViewMut<f64>| {
        let (x1, x2) = (x[0], x[1]);
        f[0] = x1 * x2 + 3.0;
        f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian_fd(2, f, &mut x, 1e-6);

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);
    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
    // x is restored
    assert_eq!(x, DVector::from_column_slice(&[3.0, 4.0]));
}

#[test]
fn test_approximate_gradient_fd() {
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let expected = DVector::from_column_slice(&[9.0 * 9.0 + 3.0 * 4.0, 3.0 * 3.0, -10.0 * 5.0]);

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let grad = approximate_gradient_fd(f, &mut x, 1e-6);
    assert_matrix_eq!(grad, expected, comp = abs, tol = 1e-5);
}
