use crate::{set_zero_states, standard_materials};
use matrixcompare::assert_matrix_eq;
use mpfe::assembly::{apply_dirichlet_csr, apply_dirichlet_rhs, assemble_system, SweepTargets};
use mpfe::comm::SerialCommunicator;
use mpfe::condition::{Condition, CouplingSide, GeometryKind};
use mpfe::coupling::{InterfaceNode, MortarOperatorProvider, MultiFieldCoupling, NodeMatchingMortar};
use mpfe::discretization::{Discretization, Node};
use mpfe::element::{CellShape, ElementRegistry, PhysicsKind, ProblemVariant};
use mpfe::function::FunctionManager;
use mpfe::nalgebra::{DMatrix, DVector, Point3};
use mpfe::params::{Action, ParameterInterface};
use mpfe::Error;
use std::sync::Arc;
use util::assert_approx_matrix_eq;

/// Two unit bars, `0-1` and `2-3`, whose nodes 1 and 2 coincide at `x = 1`.
///
/// Node 2 is the slave of the interface, node 1 its master.
fn split_bar(slave: usize, master: usize) -> Discretization {
    let mut dis = Discretization::new(
        "field",
        SerialCommunicator::shared(),
        Arc::new(ElementRegistry::with_defaults()),
        standard_materials(),
    );
    for (gid, x) in [(0, 0.0), (1, 1.0), (2, 1.0), (3, 2.0)] {
        dis.add_node(Node::new(gid, 0, Point3::new(x, 0.0, 0.0))).unwrap();
    }
    for (gid, nodes) in [(0, vec![0, 1]), (1, vec![2, 3])] {
        dis.create_element(
            gid,
            0,
            PhysicsKind::Transport,
            ProblemVariant::Standard,
            CellShape::Line2,
            nodes,
            "MAT 1",
        )
        .unwrap();
    }
    dis.add_condition(Condition::new("Interface", GeometryKind::Point, vec![slave]).with_side(CouplingSide::Slave));
    dis.add_condition(Condition::new("Interface", GeometryKind::Point, vec![master]).with_side(CouplingSide::Master));
    dis.fill_complete().unwrap();
    set_zero_states(&mut dis);
    dis
}

#[test]
fn condensed_system_glues_the_bars() {
    let dis = split_bar(2, 1);
    let functions = FunctionManager::new();
    let params = ParameterInterface::new(Action::CalcSystem, &functions);
    let system = assemble_system(&dis, &params, SweepTargets::full()).unwrap();
    let k = system.matrix.unwrap().local().clone();

    let mut coupling = MultiFieldCoupling::default();
    coupling.push_back_coupling(&dis, "Interface", &[0]).unwrap();
    assert_eq!(coupling.num_projections(), 1);

    let mut condensed = coupling.condense_matrix(&[vec![k]]).unwrap();
    let mut a = condensed.remove(0).remove(0);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        1.0, -1.0, 0.0, 0.0,
        -1.0, 2.0, 0.0, -1.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, -1.0, 0.0, 1.0,
    ]);
    assert_approx_matrix_eq!(DMatrix::from(&a), expected, abstol = 1e-13);

    // Fix x = 0 at the left end and pull on the right end
    apply_dirichlet_csr(&mut a, &[0]).unwrap();
    let mut b = coupling
        .condense_rhs(&[DVector::from_column_slice(&[0.0, 0.0, 0.0, 1.0])])
        .unwrap()
        .remove(0);
    apply_dirichlet_rhs(&mut b, &[0]);

    let x = DMatrix::from(&a).lu().solve(&b).unwrap();
    let mut blocks = vec![x];
    coupling.recover_incr(&mut blocks).unwrap();
    let x = &blocks[0];
    assert_approx_matrix_eq!(x.clone(), DVector::from_column_slice(&[0.0, 1.0, 1.0, 2.0]), abstol = 1e-12);
    assert_eq!(x[1], x[2]);
}

#[test]
fn slave_loads_move_to_the_master() {
    let dis = split_bar(2, 1);
    let mut coupling = MultiFieldCoupling::default();
    coupling.push_back_coupling(&dis, "Interface", &[0]).unwrap();
    let k = DMatrix::<f64>::identity(4, 4);
    coupling
        .condense_matrix(&[vec![mpfe::nalgebra_sparse::CsrMatrix::from(&k)]])
        .unwrap();
    let b = coupling
        .condense_rhs(&[DVector::from_column_slice(&[1.0, 2.0, 5.0, 3.0])])
        .unwrap();
    assert_eq!(b[0].as_slice(), &[1.0, 7.0, 0.0, 3.0]);
}

#[test]
fn projections_must_match_the_condensed_matrix() {
    let dis = split_bar(2, 1);
    let mut coupling = MultiFieldCoupling::default();
    coupling.push_back_coupling(&dis, "Interface", &[0]).unwrap();

    let rhs = vec![DVector::zeros(4)];
    assert!(matches!(
        coupling.condense_rhs(&rhs),
        Err(Error::CouplingOrderMismatch { ref expected, ref found }) if expected.is_empty() && *found == vec![0]
    ));

    let identity = mpfe::nalgebra_sparse::CsrMatrix::from(&DMatrix::<f64>::identity(4, 4));
    coupling.condense_matrix(&[vec![identity]]).unwrap();
    assert!(coupling.condense_rhs(&rhs).is_ok());

    coupling.push_back_coupling(&dis, "Interface", &[0]).unwrap();
    let mut blocks = vec![DVector::zeros(4), DVector::zeros(4)];
    match coupling.recover_incr(&mut blocks) {
        Err(Error::CouplingOrderMismatch { expected, found }) => {
            assert_eq!(expected, vec![0]);
            assert_eq!(found, vec![0, 1]);
        }
        other => panic!("Expected a coupling order mismatch, got {:?}", other),
    }
}

#[test]
fn interfaces_need_both_sides() {
    let dis = split_bar(2, 1);
    let mut coupling = MultiFieldCoupling::default();
    assert!(matches!(
        coupling.push_back_coupling(&dis, "Unknown", &[0]),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        coupling.push_back_coupling(&dis, "Interface", &[1]),
        Err(Error::Configuration(_))
    ));
    assert_eq!(coupling.num_projections(), 0);
}

#[test]
fn non_matching_interfaces_are_rejected() {
    let dis = split_bar(3, 1);
    let mut coupling = MultiFieldCoupling::default();
    assert!(matches!(
        coupling.push_back_coupling(&dis, "Interface", &[0]),
        Err(Error::Connectivity(_))
    ));
}

#[test]
fn node_matching_mortar_pairs_nearest_nodes() {
    let node = |gid, x, dofs: Vec<usize>| InterfaceNode {
        gid,
        coords: Point3::new(x, 0.0, 0.0),
        dofs,
    };
    let slave = [node(10, 2.0, vec![20, 21]), node(11, 0.0, vec![22, 23])];
    let master = [node(0, 0.0, vec![0, 1]), node(1, 2.0, vec![2, 3])];
    let operators = NodeMatchingMortar::default()
        .mortar_operators(&slave, &master)
        .unwrap();
    assert_matrix_eq!(DMatrix::from(&operators.d), DMatrix::<f64>::identity(4, 4));
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
    ]);
    assert_matrix_eq!(DMatrix::from(&operators.m), expected);

    let loose = NodeMatchingMortar { tolerance: 1e-3 };
    let shifted = [node(10, 2.0005, vec![20, 21])];
    assert!(loose.mortar_operators(&shifted, &master).is_ok());
    assert!(matches!(
        NodeMatchingMortar::default().mortar_operators(&shifted, &master),
        Err(Error::Connectivity(_))
    ));
}
