use crate::{filled_serial, mesh_discretization};
use mpfe::comm::ChannelCommunicator;
use mpfe::discretization::{Discretization, STATE_PHINP};
use mpfe::element::{CellShape, PhysicsKind};
use mpfe::linalg::DistributedVector;
use mpfe::procedural::create_line_mesh;
use mpfe::result_test::{FieldResultTest, ResultExpectation, ResultTestReport};
use mpfe::Error;

/// Sets `phinp` to the x-coordinate of each node.
fn set_linear_field(dis: &mut Discretization) {
    let mut phi = DistributedVector::zeros(dis.dof_row_map().unwrap().clone());
    for node in dis.owned_nodes() {
        let dof = dis.dofs_of_node(node.gid()).unwrap().start;
        phi.set(dof, node.coords().x);
    }
    dis.set_state(STATE_PHINP, &phi).unwrap();
}

#[test]
fn failures_and_tests_are_counted() {
    let mut dis = filled_serial(&create_line_mesh(1.0, 2, CellShape::Line2).unwrap(), PhysicsKind::Transport);
    set_linear_field(&mut dis);

    let expectations = [
        ResultExpectation::node("field", 1, "phi", 0.5, 1e-12),
        ResultExpectation::node("field", 2, "phi", 5.0, 1e-12),
        ResultExpectation::element("field", 0, "volume", 0.5, 1e-12),
        // Addressed to another field
        ResultExpectation::node("structure", 99, "dispx", 0.0, 1e-12),
    ];
    let report = FieldResultTest::new(&dis).run(&expectations).unwrap();
    assert_eq!(report, ResultTestReport { nerr: 1, test_count: 3 });
    assert!(!report.passed());
}

#[test]
fn unknown_quantities_are_rejected() {
    let mut dis = filled_serial(&create_line_mesh(1.0, 2, CellShape::Line2).unwrap(), PhysicsKind::Transport);
    set_linear_field(&mut dis);
    let test = FieldResultTest::new(&dis);

    for expectation in [
        ResultExpectation::node("field", 0, "pressure", 0.0, 1e-12),
        ResultExpectation::element("field", 0, "stress", 0.0, 1e-12),
        // Transport nodes have a single DOF
        ResultExpectation::node("field", 0, "dispy", 0.0, 1e-12),
    ] {
        match test.run(&[expectation]) {
            Err(Error::UnknownQuantity { field, .. }) => assert_eq!(field, "field"),
            other => panic!("Expected an unknown quantity, got {:?}", other),
        }
    }
}

#[test]
fn expectations_on_missing_nodes_are_reported() {
    let mut dis = filled_serial(&create_line_mesh(1.0, 2, CellShape::Line2).unwrap(), PhysicsKind::Transport);
    set_linear_field(&mut dis);
    let expectations = [ResultExpectation::node("field", 17, "phi", 0.0, 1e-12)];
    assert!(matches!(
        FieldResultTest::new(&dis).run(&expectations),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn every_expectation_is_tested_once_across_ranks() {
    let mesh = create_line_mesh(4.0, 4, CellShape::Line2).unwrap();
    let mut expectations: Vec<_> = (0..5)
        .map(|node| ResultExpectation::node("field", node, "phi", node as f64, 1e-12))
        .collect();
    expectations.extend((0..4).map(|element| ResultExpectation::element("field", element, "volume", 1.0, 1e-12)));

    let reports = ChannelCommunicator::run(2, |comm| {
        let mut dis = mesh_discretization("field", &mesh, PhysicsKind::Transport, comm);
        dis.fill_complete().unwrap();
        set_linear_field(&mut dis);
        FieldResultTest::new(&dis).run(&expectations).unwrap()
    });
    for report in reports {
        assert_eq!(report, ResultTestReport { nerr: 0, test_count: 9 });
    }
}

#[test]
fn tolerances_are_inclusive() {
    let expectation = ResultExpectation::node("field", 0, "phi", 1.0, 0.5);
    assert!(expectation.matches(1.5));
    assert!(expectation.matches(0.5));
    assert!(!expectation.matches(1.6));
}
