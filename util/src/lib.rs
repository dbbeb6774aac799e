//! Assertion helpers shared by the test suites of the workspace.

/// Asserts that two matrices agree entrywise up to an absolute tolerance. Both operands are
/// borrowed, so owned temporaries work as well as bindings.
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y) = (&$x, &$y);
        let diff = x - y;
        let max_absdiff = diff.abs().max();
        if !(max_absdiff <= $tol) {
            panic!(
                "assert_approx_matrix_eq!({}, {}) failed: max abs diff {:e} (abstol {:e})\nleft: {}\nright: {}",
                stringify!($x),
                stringify!($y),
                max_absdiff,
                $tol,
                x,
                y
            );
        }
    }};
}

/// Asserts that two scalars agree up to an absolute tolerance.
#[macro_export]
macro_rules! assert_approx_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y): (f64, f64) = ($x, $y);
        if (x - y).abs() > $tol {
            panic!("assert_approx_eq!({}, {}) failed: {:e} vs {:e} (abstol {:e})", stringify!($x), stringify!($y), x, y, $tol);
        }
    }};
}

/// Asserts that evaluating the expression panics.
#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        if std::panic::catch_unwind(|| $e).is_ok() {
            panic!("assert_panics!({}) did not panic", stringify!($e));
        }
    }};
}
