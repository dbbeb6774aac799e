use mpfe::config::{
    BeamToSolidConfig, LineSearchConfig, LinearSolverConfig, MeshConfig, ProblemConfig, ReducedModelConfig,
    SchemeConfig,
};
use mpfe::element::{CellShape, PhysicsKind, ProblemVariant};
use mpfe::material::MaterialKind;
use mpfe::Error;

const MINIMAL: &str = r#"{
    "name": "bar",
    "mesh": { "type": "Line", "length": 1.0, "cells": 2, "shape": "line2" },
    "element": { "physics": "Transport", "linedef": "MAT 1" },
    "materials": [ { "id": 1, "kind": "Scatra", "params": { "DIFFUSIVITY": 1.0 } } ],
    "time_integration": { "scheme": { "type": "OneStepTheta", "theta": 0.5 }, "time_step": 0.1, "num_steps": 3 }
}"#;

fn minimal() -> ProblemConfig {
    ProblemConfig::from_json_str(MINIMAL).unwrap()
}

#[test]
fn minimal_configuration_gets_defaults() {
    let config = minimal();
    assert_eq!(config.name, "bar");
    assert_eq!(
        config.mesh,
        MeshConfig::Line {
            length: 1.0,
            cells: 2,
            shape: CellShape::Line2
        }
    );
    assert_eq!(config.element.physics, PhysicsKind::Transport);
    assert_eq!(config.element.variant, ProblemVariant::Standard);
    assert_eq!(config.materials[0].kind, MaterialKind::Scatra);

    let ti = &config.time_integration;
    assert_eq!(ti.scheme, SchemeConfig::OneStepTheta { theta: 0.5 });
    assert!(ti.initial_time_derivative);
    assert!(!ti.explicit_predictor);
    assert!(!ti.hybrid);

    let solver = &config.nonlinear_solver;
    assert_eq!(solver.direction, "Newton");
    assert_eq!(solver.line_search, LineSearchConfig::FullStep);
    assert_eq!(solver.linear_solver, LinearSolverConfig::DenseLu);
    assert_eq!(solver.max_iterations, 20);

    assert!(config.conditions.is_empty());
    assert!(config.functions.is_empty());
    assert!(config.reduced_model.is_none());
    assert_eq!(config.level_set.reinit_interval, 0);
    assert!(config.result_tests.is_empty());
    assert_eq!(config.output.restart_every, 0);
}

#[test]
fn tagged_sections_are_parsed() {
    let json = MINIMAL.replace(
        r#""num_steps": 3 }"#,
        r#""num_steps": 3 },
    "nonlinear_solver": {
        "direction": "FixPoint",
        "line_search": { "type": "Aitken", "initial_relaxation": 0.5, "max_relaxation": 1.0 },
        "linear_solver": "ConjugateGradient"
    },
    "reduced_model": { "node": 2, "resistance": 1.0, "compliance": 2.0, "coupling": 1.0 },
    "level_set": { "reinit_interval": 4 },
    "functions": { "functions": [ { "type": "LinearInTime", "offset": 0.0, "slope": 2.0 } ] }"#,
    );
    let config = ProblemConfig::from_json_str(&json).unwrap();
    assert_eq!(config.nonlinear_solver.direction, "FixPoint");
    assert_eq!(
        config.nonlinear_solver.line_search,
        LineSearchConfig::Aitken {
            initial_relaxation: 0.5,
            max_relaxation: 1.0
        }
    );
    assert_eq!(config.nonlinear_solver.linear_solver, LinearSolverConfig::ConjugateGradient);
    assert_eq!(config.level_set.reinit_interval, 4);
    // Unspecified solver fields fall back to their defaults
    assert_eq!(config.nonlinear_solver.tolerance, 1e-10);
    assert_eq!(config.reduced_model.unwrap().initial_pressure, 0.0);
    assert_eq!(config.functions.len(), 1);
}

#[test]
fn malformed_json_is_a_configuration_error() {
    assert!(matches!(
        ProblemConfig::from_json_str("{ \"name\": \"bar\" }"),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        ProblemConfig::from_json_file("/nonexistent/problem.json"),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn time_integration_parameters_are_validated() {
    let mut config = minimal();
    config.time_integration.time_step = 0.0;
    assert!(matches!(config.validate(), Err(Error::Configuration(_))));

    for (theta, valid) in [(0.0, false), (1.5, false), (1.0, true), (0.5, true)] {
        let mut config = minimal();
        config.time_integration.scheme = SchemeConfig::OneStepTheta { theta };
        assert_eq!(config.validate().is_ok(), valid, "theta = {}", theta);
    }
}

#[test]
fn reduced_model_parameters_are_validated() {
    let mut config = minimal();
    let mut reduced = ReducedModelConfig {
        node: 2,
        resistance: 1.0,
        compliance: 1.0,
        coupling: 0.0,
        initial_pressure: 0.0,
    };
    config.reduced_model = Some(reduced);
    assert!(config.validate().is_ok());

    reduced.compliance = 0.0;
    config.reduced_model = Some(reduced);
    assert!(matches!(config.validate(), Err(Error::Configuration(_))));
}

#[test]
fn negative_penalty_parameters_are_rejected() {
    let negative = BeamToSolidConfig {
        penalty_parameter: -1.0,
        rotational_penalty_parameter: None,
    };
    assert!(matches!(negative.validate(), Err(Error::Configuration(_))));

    let rotational = BeamToSolidConfig {
        penalty_parameter: 1.0,
        rotational_penalty_parameter: Some(-1e-3),
    };
    assert!(matches!(rotational.validate(), Err(Error::Configuration(_))));

    let mut config = minimal();
    config.beam_to_solid = Some(BeamToSolidConfig {
        penalty_parameter: 0.0,
        rotational_penalty_parameter: Some(10.0),
    });
    assert!(config.validate().is_ok());
    config.beam_to_solid = Some(negative);
    assert!(matches!(config.validate(), Err(Error::Configuration(_))));
}

#[test]
fn empty_meshes_are_rejected() {
    for mesh in [
        MeshConfig::Line {
            length: 1.0,
            cells: 0,
            shape: CellShape::Line2,
        },
        MeshConfig::Rectangle {
            size: [1.0, 1.0],
            cells: [2, 0],
        },
        MeshConfig::Box {
            size: [1.0, 1.0, 1.0],
            cells: [0, 1, 1],
        },
    ] {
        let mut config = minimal();
        config.mesh = mesh;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
