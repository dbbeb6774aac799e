//! Small end-to-end problems exercising several modules at once.
use crate::{element_config, mesh_discretization, mesh_discretization_with, standard_materials};
use mpfe::comm::{ChannelCommunicator, Communicator, SerialCommunicator};
use mpfe::condition::{BoundaryCell, Condition, GeometryKind};
use mpfe::config::{ElementConfig, NonlinearSolverConfig, ProblemConfig, ReducedModelConfig};
use mpfe::discretization::Discretization;
use mpfe::driver;
use mpfe::element::{CellShape, PhysicsKind, ProblemVariant};
use mpfe::function::FunctionManager;
use mpfe::material::{MaterialKind, MaterialRecord, MaterialTable};
use mpfe::procedural::{create_box_mesh, create_line_mesh};
use mpfe::result_test::{FieldResultTest, ResultExpectation, ResultTestReport};
use mpfe::timint::{Bdf2, OneStepTheta, ReducedModel, Stationary, TimeIntegrator, TimeScheme};
use std::sync::Arc;
use util::assert_approx_eq;

/// Newton with an absolute residual tolerance, scaled to the stiffness of the problem.
///
/// The residual of the diffusing bar is about `4e3` times the nodal error and carries roundoff
/// of a few `1e-12`, so `1e-10` bounds the error well below `1e-12` without stalling.
fn solver_config(tolerance: f64) -> NonlinearSolverConfig {
    NonlinearSolverConfig {
        tolerance,
        ..NonlinearSolverConfig::default()
    }
}

fn run_steps(integrator: &mut TimeIntegrator, num_steps: usize) {
    for _ in 0..num_steps {
        integrator.prepare_time_step().unwrap();
        integrator.solve().unwrap();
        integrator.update().unwrap();
        integrator.output().unwrap();
    }
}

/// A fast-diffusing bar of two elements, held at 1 and 3 on its ends.
fn diffusing_bar(comm: Arc<dyn Communicator>) -> Discretization {
    let materials = MaterialTable::from_records([
        MaterialRecord::new(1, MaterialKind::Scatra).with_real("DIFFUSIVITY", 1e4)
    ])
    .unwrap();
    let element = ElementConfig {
        physics: PhysicsKind::Transport,
        variant: ProblemVariant::Standard,
        linedef: "MAT 1".to_string(),
    };
    let mesh = create_line_mesh(1.0, 2, CellShape::Line2).unwrap();
    let mut dis = mesh_discretization_with("scatra", &mesh, &element, Arc::new(materials), comm);
    dis.add_condition(Condition::dirichlet(vec![0], vec![true], vec![1.0]));
    dis.add_condition(Condition::dirichlet(vec![2], vec![true], vec![3.0]));
    dis
}

#[test]
fn transient_diffusion_reaches_the_linear_profile() {
    let dis = diffusing_bar(SerialCommunicator::shared());
    let mut integrator = TimeIntegrator::new(
        dis,
        Box::new(OneStepTheta { theta: 1.0 }),
        0.1,
        Arc::new(FunctionManager::new()),
        solver_config(1e-10),
    );
    integrator.setup().unwrap();
    integrator.init().unwrap();
    run_steps(&mut integrator, 5);

    let phi = integrator.state().unwrap().phin.owned().clone();
    assert_approx_eq!(phi[0], 1.0, abstol = 1e-12);
    assert_approx_eq!(phi[1], 2.0, abstol = 1e-12);
    assert_approx_eq!(phi[2], 3.0, abstol = 1e-12);
    assert_approx_eq!(integrator.time(), 0.5, abstol = 1e-14);
}

#[test]
fn transient_diffusion_is_independent_of_the_partition() {
    let reports = ChannelCommunicator::run(2, |comm| {
        let mut integrator = TimeIntegrator::new(
            diffusing_bar(comm),
            Box::new(OneStepTheta { theta: 1.0 }),
            0.1,
            Arc::new(FunctionManager::new()),
            solver_config(1e-10),
        );
        integrator.setup().unwrap();
        integrator.init().unwrap();
        run_steps(&mut integrator, 5);
        let expectations = [ResultExpectation::node("scatra", 1, "phi", 2.0, 1e-12)];
        FieldResultTest::new(integrator.dis()).run(&expectations).unwrap()
    });
    for report in reports {
        assert_eq!(report, ResultTestReport { nerr: 0, test_count: 1 });
    }
}

#[test]
fn unit_cube_under_uniaxial_tension() {
    let mesh = create_box_mesh([1.0, 1.0, 1.0], [1, 1, 1]);
    let mut dis = mesh_discretization("structure", &mesh, PhysicsKind::Solid, SerialCommunicator::shared());
    // Symmetry on x = 0, with just enough additional supports to remove the rigid body modes
    dis.add_condition(Condition::dirichlet(vec![0, 2, 4, 6], vec![true, false, false], vec![0.0; 3]));
    dis.add_condition(Condition::dirichlet(vec![0], vec![true, true, true], vec![0.0; 3]));
    dis.add_condition(Condition::dirichlet(vec![4], vec![true, true, false], vec![0.0; 3]));
    dis.add_condition(Condition::neumann(
        GeometryKind::Surface,
        vec![BoundaryCell::new(CellShape::Quad4, vec![1, 3, 7, 5])],
        vec![true, true, true],
        vec![1.0, 0.0, 0.0],
    ));

    let mut integrator = TimeIntegrator::new(
        dis,
        Box::new(Stationary),
        1.0,
        Arc::new(FunctionManager::new()),
        solver_config(1e-10),
    );
    integrator.setup().unwrap();
    integrator.init().unwrap();
    run_steps(&mut integrator, 1);

    // Unit traction on a unit cross section with E = 100 and nu = 0.3
    let u = integrator.state().unwrap().phin.owned().clone();
    let dis = integrator.dis();
    for node in dis.nodes() {
        let dofs = dis.dofs_of_node(node.gid()).unwrap();
        let x = node.coords();
        assert_approx_eq!(u[dofs.start], 0.01 * x.x, abstol = 1e-10);
        assert_approx_eq!(u[dofs.start + 1], -0.003 * x.y, abstol = 1e-10);
        assert_approx_eq!(u[dofs.start + 2], -0.003 * x.z, abstol = 1e-10);
    }
}

fn bar_with_compartment() -> TimeIntegrator {
    let mesh = create_line_mesh(1.0, 4, CellShape::Line2).unwrap();
    let mut dis = mesh_discretization_with(
        "scatra",
        &mesh,
        &element_config(PhysicsKind::Transport),
        standard_materials(),
        SerialCommunicator::shared(),
    );
    dis.add_condition(Condition::dirichlet(vec![0], vec![true], vec![1.0]));
    let scheme: Box<dyn TimeScheme> = Box::new(Bdf2);
    let mut integrator = TimeIntegrator::new(dis, scheme, 0.05, Arc::new(FunctionManager::new()), solver_config(1e-12));
    integrator.add_participant(Box::new(ReducedModel::new(&ReducedModelConfig {
        node: 4,
        resistance: 1.0,
        compliance: 0.5,
        coupling: 2.0,
        initial_pressure: 0.0,
    })));
    integrator
}

#[test]
fn multistep_restart_restores_field_and_compartment() {
    let mut original = bar_with_compartment();
    original.setup().unwrap();
    original.init().unwrap();
    run_steps(&mut original, 3);
    let restart = original.write_restart().unwrap();

    let mut restarted = bar_with_compartment();
    restarted.setup().unwrap();
    restarted.init().unwrap();
    restarted.read_restart(&restart).unwrap();
    assert_eq!(restarted.step(), 3);
    assert_eq!(restarted.participants()[0].step(), Some(3));
    assert_eq!(
        restarted.state().unwrap().phinm.as_ref().unwrap().owned(),
        original.state().unwrap().phinm.as_ref().unwrap().owned()
    );

    run_steps(&mut original, 2);
    run_steps(&mut restarted, 2);
    assert_eq!(restarted.participants()[0].step(), Some(5));
    let expected = original.state().unwrap().phin.owned();
    let actual = restarted.state().unwrap().phin.owned();
    for (a, b) in actual.iter().zip(expected.iter()) {
        assert_approx_eq!(*a, *b, abstol = 1e-13);
    }
}

const DRIVER_PROBLEM: &str = r#"{
    "name": "scatra",
    "mesh": { "type": "Line", "length": 1.0, "cells": 4, "shape": "line2" },
    "element": { "physics": "Transport", "linedef": "MAT 1" },
    "materials": [
        { "id": 1, "kind": "Scatra", "params": { "DIFFUSIVITY": 10000.0 } },
        { "id": 2, "kind": "Fourier", "params": { "CONDUCT": 1.0, "CAPA": 1.0 } }
    ],
    "conditions": [
        { "name": "Dirichlet", "kind": "Point", "node_ids": [0], "onoff": [true], "values": [1.0] },
        { "name": "Dirichlet", "kind": "Point", "node_ids": [4], "onoff": [true], "values": [0.0] }
    ],
    "time_integration": { "scheme": { "type": "OneStepTheta", "theta": 1.0 }, "time_step": 0.1, "num_steps": 4 },
    "nonlinear_solver": { "tolerance": 1e-8 },
    "reduced_model": { "node": 2, "resistance": 1.0, "compliance": 1.0, "coupling": 1.0 },
    "clone": { "target_name": "thermo", "material": 2 },
    "result_tests": [
        { "field": "scatra", "source": { "Node": 2 }, "quantity": "phi", "value": 0.5, "tolerance": 1e-8 },
        { "field": "scatra", "source": { "Element": 0 }, "quantity": "volume", "value": 0.25 }
    ]
}"#;

#[test]
fn driver_runs_and_restarts_a_problem() {
    let restart_dir = std::env::temp_dir().join(format!("mpfe-driver-{}", std::process::id()));
    let mut config = ProblemConfig::from_json_str(DRIVER_PROBLEM).unwrap();
    config.output.restart_dir = restart_dir.clone();
    config.output.restart_every = 2;

    let summary = driver::run(&config, 0, SerialCommunicator::shared()).unwrap();
    assert_eq!(summary.final_step, 4);
    assert_approx_eq!(summary.final_time, 0.4, abstol = 1e-14);
    assert_eq!(summary.results, ResultTestReport { nerr: 0, test_count: 2 });
    assert_eq!(summary.cloned_elements, Some(4));
    assert!(mpfe::io::restart::restart_file_path(&restart_dir, 2, 0).exists());

    config.time_integration.num_steps = 6;
    let restarted = driver::run(&config, 4, SerialCommunicator::shared()).unwrap();
    assert_eq!(restarted.final_step, 6);
    assert_approx_eq!(restarted.final_time, 0.6, abstol = 1e-14);
    assert!(restarted.results.passed());

    // A restart that was never written
    assert!(driver::run(&config, 3, SerialCommunicator::shared()).is_err());
    std::fs::remove_dir_all(&restart_dir).unwrap();
}

#[test]
fn driver_reports_failed_result_tests() {
    let mut config = ProblemConfig::from_json_str(DRIVER_PROBLEM).unwrap();
    config.clone = None;
    config.result_tests[0].value = 0.75;
    assert!(driver::run(&config, 0, SerialCommunicator::shared()).is_err());
}
