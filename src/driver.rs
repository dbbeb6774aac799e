//! Runs a complete problem described by a [`ProblemConfig`].
use crate::clone::{clone_discretization, ScatraThermoCloneStrategy};
use crate::comm::Communicator;
use crate::config::ProblemConfig;
use crate::discretization::Discretization;
use crate::element::{ElementRegistry, ProblemVariant};
use crate::io::restart::{read_restart_file, write_restart_file};
use crate::material::MaterialTable;
use crate::procedural::create_discretization;
use crate::result_test::{FieldResultTest, ResultTestReport};
use crate::timint::{LevelSet, ReducedModel, TimeIntegrator};
use crate::validate::{validate_element_jacobian_strict, CheckPoints};
use eyre::{eyre, WrapErr};
use log::info;
use std::sync::Arc;

/// What a completed run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub final_step: usize,
    pub final_time: f64,
    pub results: ResultTestReport,
    /// Number of global elements of the cloned discretization, if one was created.
    pub cloned_elements: Option<usize>,
}

/// Creates, fills and validates the discretization of `config`. Collective.
pub fn build_discretization(config: &ProblemConfig, comm: Arc<dyn Communicator>) -> eyre::Result<Discretization> {
    let materials = Arc::new(MaterialTable::from_records(config.materials.iter().cloned())?);
    let registry = Arc::new(ElementRegistry::with_defaults());
    let mut dis = create_discretization(&config.name, &config.mesh, &config.element, comm, registry, materials)
        .wrap_err("failed to create discretization")?;
    for condition in &config.conditions {
        dis.add_condition(condition.clone());
    }
    dis.fill_complete().wrap_err("fill_complete failed")?;
    validate_element_jacobian_strict(&mut dis, CheckPoints::Center)?;
    Ok(dis)
}

/// Runs `config` to its last step, starting from the restart written at step `restart` if it is
/// non-zero. Collective.
pub fn run(config: &ProblemConfig, restart: usize, comm: Arc<dyn Communicator>) -> eyre::Result<RunSummary> {
    config.validate()?;
    let dis = build_discretization(config, comm)?;
    let rank = dis.rank();

    let ti = &config.time_integration;
    let mut integrator = TimeIntegrator::from_config(
        dis,
        ti,
        Arc::new(config.functions.clone()),
        config.nonlinear_solver.clone(),
    );
    if let Some(reduced) = &config.reduced_model {
        integrator.add_participant(Box::new(ReducedModel::new(reduced)));
    }
    if config.element.variant == ProblemVariant::LevelSet {
        integrator.add_participant(Box::new(LevelSet::from_config(&config.level_set)));
    }

    integrator.setup()?;
    integrator.init()?;
    if restart > 0 {
        let data = read_restart_file(&config.output.restart_dir, restart, rank)?;
        integrator
            .read_restart(&data)
            .wrap_err_with(|| format!("failed to restart from step {}", restart))?;
    }

    while integrator.step() < ti.num_steps {
        integrator.prepare_time_step()?;
        integrator
            .solve()
            .wrap_err_with(|| format!("step {} failed", integrator.step()))?;
        integrator.update()?;
        integrator.output()?;

        let every = config.output.restart_every;
        if every > 0 && integrator.step() % every == 0 {
            let data = integrator.write_restart()?;
            write_restart_file(&config.output.restart_dir, integrator.step(), rank, &data)?;
        }
    }

    let cloned_elements = match &config.clone {
        Some(clone) => {
            let target = clone_discretization(
                integrator.dis(),
                &clone.target_name,
                clone.material,
                &ScatraThermoCloneStrategy,
            )?;
            Some(target.num_global_elements()?)
        }
        None => None,
    };

    let results = FieldResultTest::new(integrator.dis()).run(&config.result_tests)?;
    if !results.passed() {
        return Err(eyre!("{} of {} result tests failed", results.nerr, results.test_count));
    }
    info!(
        "Finished {} at step {} (t = {}), {} result tests passed",
        config.name,
        integrator.step(),
        integrator.time(),
        results.test_count
    );
    Ok(RunSummary {
        final_step: integrator.step(),
        final_time: integrator.time(),
        results,
        cloned_elements,
    })
}
