use crate::linear::LinearSolver;
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// A nonlinear system `F(x) = 0` with a sparse Jacobian `J = dF/dx`.
pub trait SystemInterface {
    fn dimension(&self) -> usize;

    /// Evaluates `F(x)` into `f`.
    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> Result<(), Box<dyn Error>>;

    /// Evaluates the Jacobian at `x`.
    fn compute_jacobian(&mut self, x: DVectorView<f64>) -> Result<CsrMatrix<f64>, Box<dyn Error>>;
}

impl<S: SystemInterface + ?Sized> SystemInterface for &mut S {
    fn dimension(&self) -> usize {
        S::dimension(self)
    }

    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> Result<(), Box<dyn Error>> {
        S::compute_residual(self, x, f)
    }

    fn compute_jacobian(&mut self, x: DVectorView<f64>) -> Result<CsrMatrix<f64>, Box<dyn Error>> {
        S::compute_jacobian(self, x)
    }
}

/// Solver state seen by directions, line searches and status tests.
pub trait AbstractGroup {
    fn dimension(&self) -> usize;

    fn x(&self) -> &DVector<f64>;

    /// Replaces the current iterate. Invalidates every derived quantity.
    fn set_x(&mut self, x: DVectorView<f64>);

    /// Computes `F(x)` unless it is already valid.
    fn compute_f(&mut self) -> Result<(), Box<dyn Error>>;

    /// Computes the Jacobian unless it is already valid.
    fn compute_jacobian(&mut self) -> Result<(), Box<dyn Error>>;

    /// Solves `J d = -F` for the Newton direction unless it is already valid.
    fn compute_newton(&mut self, linear_solver: &mut dyn LinearSolver) -> Result<(), Box<dyn Error>>;

    /// The function value. Only meaningful if [`AbstractGroup::is_f`] holds.
    fn f(&self) -> &DVector<f64>;

    /// The Newton direction. Only meaningful if [`AbstractGroup::is_newton`] holds.
    fn newton(&self) -> &DVector<f64>;

    fn is_f(&self) -> bool;
    fn is_jacobian(&self) -> bool;
    fn is_newton(&self) -> bool;

    fn f_norm(&self) -> f64 {
        self.f().norm()
    }
}

/// Default group over a [`SystemInterface`].
#[derive(Debug)]
pub struct Group<S> {
    system: S,
    x: DVector<f64>,
    f: DVector<f64>,
    jacobian: Option<CsrMatrix<f64>>,
    newton: DVector<f64>,
    valid_f: bool,
    valid_jacobian: bool,
    valid_newton: bool,
}

impl<S: SystemInterface> Group<S> {
    pub fn new(system: S, x0: DVector<f64>) -> Self {
        let n = system.dimension();
        assert_eq!(x0.len(), n, "Initial guess must match system dimension");
        Self {
            system,
            x: x0,
            f: DVector::zeros(n),
            jacobian: None,
            newton: DVector::zeros(n),
            valid_f: false,
            valid_jacobian: false,
            valid_newton: false,
        }
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    pub fn into_parts(self) -> (S, DVector<f64>) {
        (self.system, self.x)
    }

    pub fn jacobian(&self) -> Option<&CsrMatrix<f64>> {
        self.jacobian.as_ref().filter(|_| self.valid_jacobian)
    }

    /// Installs an externally computed function value and marks it valid.
    pub fn set_f(&mut self, f: DVector<f64>) {
        assert_eq!(f.len(), self.x.len());
        self.f = f;
        self.valid_f = true;
        self.valid_newton = false;
    }

    /// Installs an externally computed Jacobian and marks it valid.
    pub fn set_jacobian(&mut self, jacobian: CsrMatrix<f64>) {
        assert_eq!(jacobian.nrows(), self.x.len());
        self.jacobian = Some(jacobian);
        self.valid_jacobian = true;
        self.valid_newton = false;
    }

    /// Accepts both the function value and the Jacobian as valid in one go.
    pub fn capture_system_state(&mut self, f: DVector<f64>, jacobian: CsrMatrix<f64>) {
        self.set_f(f);
        self.set_jacobian(jacobian);
    }
}

impl<S: SystemInterface> AbstractGroup for Group<S> {
    fn dimension(&self) -> usize {
        self.x.len()
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }

    fn set_x(&mut self, x: DVectorView<f64>) {
        self.x.copy_from(&x);
        self.valid_f = false;
        self.valid_jacobian = false;
        self.valid_newton = false;
    }

    fn compute_f(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.valid_f {
            self.system
                .compute_residual(DVectorView::from(&self.x), &mut self.f)?;
            self.valid_f = true;
        }
        Ok(())
    }

    fn compute_jacobian(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.valid_jacobian {
            let jacobian = self.system.compute_jacobian(DVectorView::from(&self.x))?;
            self.jacobian = Some(jacobian);
            self.valid_jacobian = true;
        }
        Ok(())
    }

    fn compute_newton(&mut self, linear_solver: &mut dyn LinearSolver) -> Result<(), Box<dyn Error>> {
        if self.valid_newton {
            return Ok(());
        }
        self.compute_f()?;
        self.compute_jacobian()?;
        let jacobian = self
            .jacobian
            .as_ref()
            .ok_or("Jacobian unavailable after computation")?;
        let minus_f = -&self.f;
        linear_solver.solve(jacobian, DVectorView::from(&minus_f), (&mut self.newton).into())?;
        self.valid_newton = true;
        Ok(())
    }

    fn f(&self) -> &DVector<f64> {
        &self.f
    }

    fn newton(&self) -> &DVector<f64> {
        &self.newton
    }

    fn is_f(&self) -> bool {
        self.valid_f
    }

    fn is_jacobian(&self) -> bool {
        self.valid_jacobian
    }

    fn is_newton(&self) -> bool {
        self.valid_newton
    }
}
