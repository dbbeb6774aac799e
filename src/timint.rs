//! Time integration of a single field.
//!
//! A [`TimeIntegrator`] owns the discretization and the state vectors of its field and advances
//! them step by step:
//!
//! ```text
//! setup -> init -> (prepare_time_step -> solve -> update -> output)*
//! ```
//!
//! Additional behavior, such as a coupled reduced model or level-set bookkeeping, is layered on
//! top through [`StepParticipant`]s, which run after the integrator in registration order.
use crate::assembly::{apply_dirichlet_csr, apply_dirichlet_rhs, assemble_system, collect_dirichlet, read_restart_multi, SweepTargets};
use crate::config::{NonlinearSolverConfig, TimeIntegrationConfig};
use crate::discretization::{Discretization, STATE_HIST, STATE_PHINP};
use crate::error::{Error, Result};
use crate::function::FunctionManager;
use crate::linalg::DistributedVector;
use crate::nonlinear::{build_linear_solver, solve_nonlinear};
use crate::params::{Action, ParameterInterface, TimeFactors};
use crate::Gid;
use log::{debug, info};
use mpfe_optimize::solver::SolveSummary;
use mpfe_pack::{Pack, PackBuffer, Unpack, UnpackBuffer};
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::sync::Arc;

mod levelset;
mod participant;
mod reduced;
mod scheme;
mod state;

pub use levelset::{signed_distance, LevelSet};
pub use participant::{StepParticipant, StepView};
pub use reduced::ReducedModel;
pub use scheme::{scheme_from_config, Bdf2, Hybrid, OneStepTheta, Stationary, TimeScheme};
pub use state::TimeState;

const DISCRETIZATION_SECTION: &str = "discretization";
const INTEGRATOR_SECTION: &str = "integrator";

#[derive(Debug)]
pub struct TimeIntegrator {
    dis: Discretization,
    scheme: Box<dyn TimeScheme>,
    functions: Arc<FunctionManager>,
    solver_config: NonlinearSolverConfig,
    dt: f64,
    initial_time_derivative: bool,
    explicit_predictor: bool,
    participants: Vec<Box<dyn StepParticipant>>,
    state: Option<TimeState>,
    dirichlet: BTreeMap<Gid, f64>,
    step: usize,
    time: f64,
    solved: bool,
    last_summary: Option<SolveSummary>,
}

impl TimeIntegrator {
    pub fn new(
        dis: Discretization,
        scheme: Box<dyn TimeScheme>,
        dt: f64,
        functions: Arc<FunctionManager>,
        solver_config: NonlinearSolverConfig,
    ) -> Self {
        Self {
            dis,
            scheme,
            functions,
            solver_config,
            dt,
            initial_time_derivative: true,
            explicit_predictor: false,
            participants: Vec::new(),
            state: None,
            dirichlet: BTreeMap::new(),
            step: 0,
            time: 0.0,
            solved: false,
            last_summary: None,
        }
    }

    pub fn from_config(
        dis: Discretization,
        config: &TimeIntegrationConfig,
        functions: Arc<FunctionManager>,
        solver_config: NonlinearSolverConfig,
    ) -> Self {
        let scheme = scheme_from_config(&config.scheme, config.hybrid);
        let mut integrator = Self::new(dis, scheme, config.time_step, functions, solver_config);
        integrator.initial_time_derivative = config.initial_time_derivative;
        integrator.explicit_predictor = config.explicit_predictor;
        integrator
    }

    pub fn set_initial_time_derivative(&mut self, compute: bool) {
        self.initial_time_derivative = compute;
    }

    pub fn set_explicit_predictor(&mut self, predict: bool) {
        self.explicit_predictor = predict;
    }

    /// Registers a participant. Participants are called in registration order.
    pub fn add_participant(&mut self, participant: Box<dyn StepParticipant>) {
        self.participants.push(participant);
    }

    pub fn participants(&self) -> &[Box<dyn StepParticipant>] {
        &self.participants
    }

    pub fn participants_mut(&mut self) -> &mut [Box<dyn StepParticipant>] {
        &mut self.participants
    }

    /// The first registered participant of type `P`.
    pub fn participant<P: StepParticipant + 'static>(&self) -> Option<&P> {
        self.participants
            .iter()
            .find_map(|participant| participant.as_any().downcast_ref::<P>())
    }

    pub fn scheme(&self) -> &dyn TimeScheme {
        self.scheme.as_ref()
    }

    pub fn dis(&self) -> &Discretization {
        &self.dis
    }

    pub fn dis_mut(&mut self) -> &mut Discretization {
        &mut self.dis
    }

    pub fn into_discretization(self) -> Discretization {
        self.dis
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn last_summary(&self) -> Option<&SolveSummary> {
        self.last_summary.as_ref()
    }

    pub fn state(&self) -> Result<&TimeState> {
        self.state.as_ref().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::state",
        })
    }

    /// Prescribed Dirichlet values of the current step.
    pub fn dirichlet(&self) -> &BTreeMap<Gid, f64> {
        &self.dirichlet
    }

    /// Whether the explicit predictor is used for the next step.
    pub fn uses_explicit_predictor(&self) -> bool {
        self.explicit_predictor
            && !self.scheme.is_stationary()
            && self.participants.iter().all(|p| p.allows_explicit_predictor())
    }

    /// Completes the discretization and allocates the state with Dirichlet values at `t = 0`.
    /// Collective.
    pub fn setup(&mut self) -> Result<()> {
        self.dis.fill_complete()?;
        let map = self.dis.dof_row_map()?.clone();
        let mut state = TimeState::new(map.clone(), self.scheme.uses_previous_step());

        let functions = Arc::clone(&self.functions);
        let mut params = ParameterInterface::new(Action::CalcSystem, &functions);
        params.set_time(self.time, self.dt, self.step);
        self.dirichlet = collect_dirichlet(&self.dis, &params)?;
        for (&dof, &value) in &self.dirichlet {
            state.phinp.set(dof, value);
            state.phin.set(dof, value);
            if let Some(phinm) = &mut state.phinm {
                phinm.set(dof, value);
            }
        }
        self.dis.set_state(STATE_PHINP, &state.phinp)?;
        self.dis.set_state(STATE_HIST, &DistributedVector::zeros(map))?;
        info!(
            "Set up {} on {} with {} DOFs",
            self.scheme.name(),
            self.dis.name(),
            state.phinp.map().num_global()
        );
        self.state = Some(state);
        Ok(())
    }

    /// Computes the initial time derivative if requested and initializes the participants.
    /// Collective.
    pub fn init(&mut self) -> Result<()> {
        if self.initial_time_derivative && !self.scheme.is_stationary() {
            self.compute_initial_time_derivative()?;
        }
        let theta = self.scheme.time_factors(self.dt, self.step.max(1)).theta;
        let state = self.state.as_ref().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::init",
        })?;
        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta,
        };
        for participant in &mut self.participants {
            participant.init(&view)?;
        }
        Ok(())
    }

    /// Solves `M dx/dt_0 = f - K x_0`, with zero derivative on Dirichlet DOFs. Collective.
    pub fn compute_initial_time_derivative(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::compute_initial_time_derivative",
        })?;
        let map = state.phin.map().clone();
        self.dis.set_state(STATE_PHINP, &state.phin)?;

        let functions = Arc::clone(&self.functions);
        let mut params = ParameterInterface::new(Action::CalcInitialTimeDerivative, &functions);
        params.set_time(self.time, self.dt, self.step);
        params.set_time_factors(TimeFactors {
            timefac: 1.0,
            theta: 1.0,
            stationary: false,
        });
        let system = assemble_system(&self.dis, &params, SweepTargets::full())?;
        let comm = self.dis.comm().as_ref();
        let mut rhs = system.vector.gather_global(comm)?;
        let mut mass = system
            .matrix
            .ok_or_else(|| Error::Configuration("Initial time derivative sweep produced no matrix".to_string()))?
            .gather_global(comm)?;

        let constrained: Vec<Gid> = self.dirichlet.keys().copied().collect();
        apply_dirichlet_csr(&mut mass, &constrained)?;
        apply_dirichlet_rhs(&mut rhs, &constrained);

        let mut phidt = DVector::zeros(rhs.len());
        build_linear_solver(self.solver_config.linear_solver)
            .solve(&mass, rhs.as_view(), phidt.as_view_mut())
            .map_err(|err| Error::SolverDivergence(format!("Initial time derivative: {}", err)))?;

        state.phidtn = DistributedVector::from_global(map, phidt.as_view());
        state.phidtnp = state.phidtn.clone();
        self.dis.set_state(STATE_PHINP, &state.phinp)?;
        debug!("Computed initial time derivative of {}", self.dis.name());
        Ok(())
    }

    /// Advances time, predicts `x_{n+1}`, applies the Dirichlet values of the new time and
    /// provides the history vector to the kernels. Collective.
    pub fn prepare_time_step(&mut self) -> Result<()> {
        let predict = self.uses_explicit_predictor();
        self.step += 1;
        self.time += self.dt;
        self.solved = false;

        let factors = self.scheme.time_factors(self.dt, self.step);
        let state = self.state.as_mut().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::prepare_time_step",
        })?;
        let map = state.phin.map().clone();

        if predict {
            *state.phinp.owned_mut() = state.phin.owned() + state.phidtn.owned() * self.dt;
        } else {
            state.phinp.owned_mut().copy_from(state.phin.owned());
        }

        let functions = Arc::clone(&self.functions);
        let mut params = ParameterInterface::new(Action::CalcSystem, &functions);
        params.set_time(self.time, self.dt, self.step);
        params.set_time_factors(factors);
        self.dirichlet = collect_dirichlet(&self.dis, &params)?;
        for (&dof, &value) in &self.dirichlet {
            state.phinp.set(dof, value);
        }

        let hist = self.scheme.history(state, self.dt, self.step);
        self.dis
            .set_state(STATE_HIST, &DistributedVector::from_owned(map, hist))?;
        self.dis.set_state(STATE_PHINP, &state.phinp)?;

        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta: factors.theta,
        };
        for participant in &mut self.participants {
            participant.prepare_time_step(&view)?;
        }
        debug!("Step {}: t = {}, predictor: {}", self.step, self.time, predict);
        Ok(())
    }

    /// Solves for `x_{n+1}` and computes `dx/dt_{n+1}`. Collective.
    pub fn solve(&mut self) -> Result<SolveSummary> {
        let factors = self.scheme.time_factors(self.dt, self.step);
        let state = self.state.as_mut().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::solve",
        })?;
        let map = state.phinp.map().clone();
        let x0 = state.phinp.gather_global(self.dis.comm().as_ref())?;

        let functions = Arc::clone(&self.functions);
        let mut params = ParameterInterface::new(Action::CalcSystem, &functions);
        params.set_time(self.time, self.dt, self.step);
        params.set_time_factors(factors);
        let (x, summary) = solve_nonlinear(&mut self.dis, &params, &self.dirichlet, x0, &self.solver_config)?;

        state.phinp = DistributedVector::from_global(map.clone(), x.as_view());
        let phidt = self.scheme.time_derivative(state, self.dt, self.step);
        state.phidtnp = DistributedVector::from_owned(map, phidt);
        self.dis.set_state(STATE_PHINP, &state.phinp)?;
        self.solved = true;

        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta: factors.theta,
        };
        for participant in &mut self.participants {
            participant.post_solve(&view)?;
        }
        self.last_summary = Some(summary);
        Ok(summary)
    }

    /// Accepts the solved step and rotates the state.
    pub fn update(&mut self) -> Result<()> {
        if !self.solved {
            return Err(Error::Configuration(format!(
                "Step {} has not been solved and cannot be accepted",
                self.step
            )));
        }
        let theta = self.scheme.time_factors(self.dt, self.step).theta;
        let state = self.state.as_mut().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::update",
        })?;
        state.rotate();
        self.solved = false;

        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta,
        };
        for participant in &mut self.participants {
            participant.update(&view)?;
        }
        Ok(())
    }

    /// Logs the state of the last accepted step. Collective.
    pub fn output(&self) -> Result<()> {
        let state = self.state()?;
        let norm = state.phin.norm(self.dis.comm().as_ref())?;
        if self.dis.rank() == 0 {
            info!(
                "{}: step {:>5}, t = {:.6e}, |x| = {:.6e}",
                self.dis.name(),
                self.step,
                self.time,
                norm
            );
        }
        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta: self.scheme.time_factors(self.dt, self.step.max(1)).theta,
        };
        for participant in &self.participants {
            participant.output(&view)?;
        }
        Ok(())
    }

    fn pack_restart(&self, buffer: &mut PackBuffer) -> Result<()> {
        let state = self.state()?;
        {
            let mut object = buffer.begin_object()?;
            DISCRETIZATION_SECTION.pack(&mut object)?;
            self.dis.name().pack(&mut object)?;
            object.add_pod(state.phin.map().num_global())?;
        }
        {
            let mut object = buffer.begin_object()?;
            INTEGRATOR_SECTION.pack(&mut object)?;
            object.add_pod(self.step)?;
            object.add_pod(self.time)?;
            state.pack(&mut object)?;
        }
        for participant in &self.participants {
            let mut object = buffer.begin_object()?;
            participant.name().pack(&mut object)?;
            participant.write_restart(&mut object)?;
        }
        Ok(())
    }

    /// Restart data of this rank: the discretization section, the integrator section and one
    /// section per participant, in registration order.
    pub fn write_restart(&self) -> Result<Vec<u8>> {
        let mut buffer = PackBuffer::new();
        self.pack_restart(&mut buffer)?;
        buffer.start_packing();
        self.pack_restart(&mut buffer)?;
        Ok(buffer.finish()?)
    }

    /// Restores the state written by [`TimeIntegrator::write_restart`] on the same rank layout.
    ///
    /// The integrator is restored first, then the participants in registration order.
    pub fn read_restart(&mut self, data: &[u8]) -> Result<()> {
        let mut buffer = UnpackBuffer::new(data);

        let mut section = open_section(&mut buffer, DISCRETIZATION_SECTION)?;
        let name = String::unpack(&mut section)?;
        let num_global: usize = section.extract_pod()?;
        let expected = self.state()?.phin.map().num_global();
        if name != self.dis.name() || num_global != expected {
            return Err(Error::Configuration(format!(
                "Restart of {} with {} DOFs does not match {} with {} DOFs",
                name,
                num_global,
                self.dis.name(),
                expected
            )));
        }

        let mut section = open_section(&mut buffer, INTEGRATOR_SECTION)?;
        let step: usize = section.extract_pod()?;
        let time: f64 = section.extract_pod()?;
        let state = self.state.as_mut().ok_or(Error::NotFilled {
            operation: "TimeIntegrator::read_restart",
        })?;
        state.unpack_into(&mut section)?;
        state.phinp.owned_mut().copy_from(state.phin.owned());
        self.step = step;
        self.time = time;
        self.solved = false;
        self.dis.set_state(STATE_PHINP, &state.phinp)?;
        read_restart_multi(&self.dis)?;

        let view = StepView {
            dis: &self.dis,
            state,
            step: self.step,
            time: self.time,
            dt: self.dt,
            theta: self.scheme.time_factors(self.dt, self.step.max(1)).theta,
        };
        for participant in &mut self.participants {
            let mut section = open_section(&mut buffer, participant.name())?;
            participant.read_restart(&view, &mut section)?;
        }
        info!("Restarted {} at step {}, t = {}", self.dis.name(), self.step, self.time);
        Ok(())
    }
}

/// Extracts the next framed section and checks its name.
fn open_section<'a>(buffer: &mut UnpackBuffer<'a>, expected: &str) -> Result<UnpackBuffer<'a>> {
    let mut section = buffer.extract_object()?;
    let name = String::unpack(&mut section)?;
    if name != expected {
        return Err(Error::Configuration(format!(
            "Expected restart section \"{}\", found \"{}\"",
            expected, name
        )));
    }
    Ok(section)
}
