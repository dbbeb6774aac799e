//! Bridge between the assembly engine and the nonlinear solvers of [`mpfe_optimize`].
//!
//! The nonlinear system is posed on replicated global vectors: every rank holds the full iterate
//! and runs the solver redundantly, while residual and Jacobian are assembled in parallel and
//! gathered. All ranks therefore issue the same sequence of collective calls.
use crate::assembly::{apply_dirichlet_csr, assemble_system, SweepTargets};
use crate::config::{LineSearchConfig, LinearSolverConfig, NonlinearSolverConfig};
use crate::discretization::{Discretization, STATE_PHINP};
use crate::error::{Error, Result};
use crate::linalg::DistributedVector;
use crate::params::ParameterInterface;
use crate::Gid;
use log::debug;
use mpfe_optimize::direction::DirectionFactory;
use mpfe_optimize::group::{AbstractGroup, Group, SystemInterface};
use mpfe_optimize::line_search::{Aitken, Backtracking, FullStep, LineSearch};
use mpfe_optimize::linear::{ConjugateGradient, DenseLu, LinearSolver, SparseCholesky};
use mpfe_optimize::solver::{LineSearchBased, SolveSummary, StatusTest};
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;
use std::error::Error as StdError;

/// A system whose residual and Jacobian are produced together by one evaluation sweep.
pub trait SharedSystem: SystemInterface {
    /// Computes `F(x)` and its Jacobian in a single sweep.
    fn compute_system(&mut self, x: DVectorView<f64>) -> Result<(DVector<f64>, CsrMatrix<f64>)>;
}

#[derive(Debug, Clone)]
struct SweepCache {
    x: DVector<f64>,
    f: DVector<f64>,
    jacobian: CsrMatrix<f64>,
}

/// The discretized field as a nonlinear system `F(x) = -r(x) = 0`.
///
/// Rows of Dirichlet DOFs are replaced by `x_i - g_i` with a unit row in the Jacobian.
pub struct DiscreteProblem<'a, 'p> {
    dis: &'a mut Discretization,
    params: &'a ParameterInterface<'p>,
    dirichlet: &'a BTreeMap<Gid, f64>,
    cache: Option<SweepCache>,
    num_sweeps: usize,
}

impl<'a, 'p> DiscreteProblem<'a, 'p> {
    pub fn new(
        dis: &'a mut Discretization,
        params: &'a ParameterInterface<'p>,
        dirichlet: &'a BTreeMap<Gid, f64>,
    ) -> Result<Self> {
        dis.dof_row_map()?;
        Ok(Self {
            dis,
            params,
            dirichlet,
            cache: None,
            num_sweeps: 0,
        })
    }

    /// Number of assembly sweeps performed so far.
    pub fn num_sweeps(&self) -> usize {
        self.num_sweeps
    }

    fn sweep(&mut self, x: DVectorView<f64>) -> Result<&SweepCache> {
        let cached = matches!(&self.cache, Some(cache) if cache.x == x);
        if !cached {
            let map = self.dis.dof_row_map()?.clone();
            self.dis
                .set_state(STATE_PHINP, &DistributedVector::from_global(map, x))?;
            let system = assemble_system(self.dis, self.params, SweepTargets::full())?;
            let comm = self.dis.comm().as_ref();
            let residual = system.vector.gather_global(comm)?;
            let matrix = system
                .matrix
                .ok_or_else(|| Error::Configuration("Sweep produced no matrix".to_string()))?;
            let mut jacobian = matrix.gather_global(comm)?;

            let mut f = -residual;
            let constrained: Vec<Gid> = self.dirichlet.keys().copied().collect();
            for (&dof, &value) in self.dirichlet {
                f[dof] = x[dof] - value;
            }
            apply_dirichlet_csr(&mut jacobian, &constrained)?;
            self.num_sweeps += 1;
            self.cache = Some(SweepCache {
                x: x.clone_owned(),
                f,
                jacobian,
            });
        }
        self.cache
            .as_ref()
            .ok_or_else(|| Error::Configuration("Sweep cache is empty".to_string()))
    }
}

impl SystemInterface for DiscreteProblem<'_, '_> {
    fn dimension(&self) -> usize {
        self.dis
            .dof_row_map()
            .map(|map| map.num_global())
            .unwrap_or(0)
    }

    fn compute_residual(&mut self, x: DVectorView<f64>, f: &mut DVector<f64>) -> std::result::Result<(), Box<dyn StdError>> {
        f.copy_from(&self.sweep(x)?.f);
        Ok(())
    }

    fn compute_jacobian(&mut self, x: DVectorView<f64>) -> std::result::Result<CsrMatrix<f64>, Box<dyn StdError>> {
        Ok(self.sweep(x)?.jacobian.clone())
    }
}

impl SharedSystem for DiscreteProblem<'_, '_> {
    fn compute_system(&mut self, x: DVectorView<f64>) -> Result<(DVector<f64>, CsrMatrix<f64>)> {
        let cache = self.sweep(x)?;
        Ok((cache.f.clone(), cache.jacobian.clone()))
    }
}

/// A group whose residual and Jacobian come from one shared sweep.
///
/// Computing either quantity while the other is invalid rebuilds both, and both are captured as
/// valid at once.
#[derive(Debug)]
pub struct CoupledGroup<S> {
    group: Group<S>,
    num_captures: usize,
}

impl<S: SharedSystem> CoupledGroup<S> {
    pub fn new(system: S, x0: DVector<f64>) -> Self {
        Self {
            group: Group::new(system, x0),
            num_captures: 0,
        }
    }

    pub fn system(&self) -> &S {
        self.group.system()
    }

    pub fn into_parts(self) -> (S, DVector<f64>) {
        self.group.into_parts()
    }

    /// How often residual and Jacobian were accepted together.
    pub fn num_captures(&self) -> usize {
        self.num_captures
    }

    fn rebuild(&mut self) -> Result<()> {
        let x = self.group.x().clone();
        let (f, jacobian) = self.group.system_mut().compute_system(DVectorView::from(&x))?;
        if self.num_captures == 0 {
            debug!("Capturing the first linear system");
        }
        self.group.capture_system_state(f, jacobian);
        self.num_captures += 1;
        Ok(())
    }
}

impl<S: SharedSystem> AbstractGroup for CoupledGroup<S> {
    fn dimension(&self) -> usize {
        self.group.dimension()
    }

    fn x(&self) -> &DVector<f64> {
        self.group.x()
    }

    fn set_x(&mut self, x: DVectorView<f64>) {
        self.group.set_x(x)
    }

    fn compute_f(&mut self) -> std::result::Result<(), Box<dyn StdError>> {
        if self.group.is_f() {
            return Ok(());
        }
        if self.group.is_jacobian() {
            self.group.compute_f()
        } else {
            Ok(self.rebuild()?)
        }
    }

    fn compute_jacobian(&mut self) -> std::result::Result<(), Box<dyn StdError>> {
        if self.group.is_jacobian() {
            return Ok(());
        }
        if self.group.is_f() {
            self.group.compute_jacobian()
        } else {
            Ok(self.rebuild()?)
        }
    }

    fn compute_newton(&mut self, linear_solver: &mut dyn LinearSolver) -> std::result::Result<(), Box<dyn StdError>> {
        self.compute_f()?;
        self.compute_jacobian()?;
        self.group.compute_newton(linear_solver)
    }

    fn f(&self) -> &DVector<f64> {
        self.group.f()
    }

    fn newton(&self) -> &DVector<f64> {
        self.group.newton()
    }

    fn is_f(&self) -> bool {
        self.group.is_f()
    }

    fn is_jacobian(&self) -> bool {
        self.group.is_jacobian()
    }

    fn is_newton(&self) -> bool {
        self.group.is_newton()
    }
}

pub fn build_linear_solver(config: LinearSolverConfig) -> Box<dyn LinearSolver> {
    match config {
        LinearSolverConfig::DenseLu => Box::new(DenseLu),
        LinearSolverConfig::SparseCholesky => Box::new(SparseCholesky),
        LinearSolverConfig::ConjugateGradient => Box::new(ConjugateGradient::default()),
    }
}

/// Builds the solver described by `config`, with the direction looked up by name.
///
/// A fixed-point direction carries no damping of its own and is rejected without a relaxing
/// line search.
pub fn build_solver(config: &NonlinearSolverConfig) -> Result<LineSearchBased> {
    let direction = DirectionFactory::default()
        .build(&config.direction)
        .map_err(|err| Error::Configuration(err.to_string()))?;
    if direction.name() == "FixPoint" && config.line_search == LineSearchConfig::FullStep {
        return Err(Error::Configuration(
            "The FixPoint direction needs a relaxing line search such as Aitken".to_string(),
        ));
    }
    let line_search: Box<dyn LineSearch> = match config.line_search {
        LineSearchConfig::FullStep => Box::new(FullStep),
        LineSearchConfig::Backtracking {
            sufficient_decrease,
            min_step,
        } => Box::new(Backtracking {
            sufficient_decrease,
            min_step,
        }),
        LineSearchConfig::Aitken {
            initial_relaxation,
            max_relaxation,
        } => {
            if !(max_relaxation > 0.0) {
                return Err(Error::Configuration(format!(
                    "Maximum Aitken relaxation must be positive, got {}",
                    max_relaxation
                )));
            }
            Box::new(Aitken::new(initial_relaxation, max_relaxation))
        }
    };
    Ok(LineSearchBased::new(
        direction,
        line_search,
        build_linear_solver(config.linear_solver),
        StatusTest {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        },
    ))
}

/// Solves `F(x) = 0` for the field of `dis`, starting from the replicated global vector `x0`.
/// Collective.
///
/// Failure to converge is reported as [`Error::SolverDivergence`].
pub fn solve_nonlinear(
    dis: &mut Discretization,
    params: &ParameterInterface,
    dirichlet: &BTreeMap<Gid, f64>,
    x0: DVector<f64>,
    config: &NonlinearSolverConfig,
) -> Result<(DVector<f64>, SolveSummary)> {
    let mut solver = build_solver(config)?;
    let problem = DiscreteProblem::new(dis, params, dirichlet)?;
    let mut group = CoupledGroup::new(problem, x0);
    let summary = solver
        .solve(&mut group)
        .map_err(|err| Error::SolverDivergence(err.to_string()))?;
    debug!(
        "Nonlinear solve: {} iterations, {} sweeps",
        summary.iterations,
        group.system().num_sweeps()
    );
    let (_, x) = group.into_parts();
    Ok((x, summary))
}
