use crate::{mesh_discretization, standard_materials};
use mpfe::comm::{ChannelCommunicator, SerialCommunicator};
use mpfe::discretization::{Discretization, MeshfreeBin, Node, STATE_PHINP};
use mpfe::element::{CellShape, ElementRegistry, PhysicsKind, ProblemVariant};
use mpfe::linalg::{DistributedVector, DofRowMap};
use mpfe::nalgebra::{DMatrix, DVector, Point3};
use mpfe::pack::{pack_to_vec, Unpack, UnpackBuffer};
use mpfe::procedural::{create_line_mesh, create_rectangle_mesh};
use mpfe::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

fn empty_discretization() -> Discretization {
    Discretization::new(
        "empty",
        SerialCommunicator::shared(),
        Arc::new(ElementRegistry::with_defaults()),
        standard_materials(),
    )
}

fn line_discretization() -> Discretization {
    let mesh = create_line_mesh(2.0, 2, CellShape::Line2).unwrap();
    mesh_discretization("line", &mesh, PhysicsKind::Transport, SerialCommunicator::shared())
}

#[test]
fn fill_complete_is_idempotent() {
    let mut dis = line_discretization();
    assert!(!dis.filled());
    dis.fill_complete().unwrap();
    let map = dis.dof_row_map().unwrap().clone();
    let nodes = dis.node_row_map().unwrap().gids().to_vec();

    dis.fill_complete().unwrap();
    assert!(dis.filled());
    assert_eq!(dis.dof_row_map().unwrap().as_ref(), map.as_ref());
    assert_eq!(dis.node_row_map().unwrap().gids(), nodes.as_slice());
    assert_eq!(dis.num_global_nodes().unwrap(), 3);
    assert_eq!(dis.num_global_elements().unwrap(), 2);
}

#[test]
fn maps_are_unavailable_before_fill() {
    let dis = line_discretization();
    assert!(matches!(dis.dof_row_map(), Err(Error::NotFilled { .. })));
    assert!(matches!(dis.dofs_of_node(0), Err(Error::NotFilled { .. })));
}

#[test]
fn mutation_after_fill_is_rejected() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();

    let result = dis.add_node(Node::new(10, 0, Point3::new(5.0, 0.0, 0.0)));
    assert!(matches!(result, Err(Error::StructuralMutationAfterFill { .. })));
    let result = dis.create_element(
        5,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Line2,
        vec![0, 1],
        "MAT 1",
    );
    assert!(matches!(result, Err(Error::StructuralMutationAfterFill { .. })));
    assert!(matches!(
        dis.delete_element(0),
        Err(Error::StructuralMutationAfterFill { .. })
    ));

    // After a reset the discretization may be modified again
    dis.reset();
    dis.add_node(Node::new(3, 0, Point3::new(3.0, 0.0, 0.0))).unwrap();
    dis.create_element(
        2,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Line2,
        vec![2, 3],
        "MAT 1",
    )
    .unwrap();
    dis.fill_complete().unwrap();
    assert_eq!(dis.num_global_elements().unwrap(), 3);
    assert_eq!(dis.dof_row_map().unwrap().num_global(), 4);
}

#[test]
fn identical_duplicate_nodes_are_merged() {
    let mut dis = line_discretization();
    dis.add_node(Node::new(1, 0, Point3::new(1.0, 0.0, 0.0))).unwrap();
    dis.fill_complete().unwrap();
    assert_eq!(dis.num_global_nodes().unwrap(), 3);
}

#[test]
fn conflicting_duplicate_nodes_are_rejected() {
    let mut dis = line_discretization();
    dis.add_node(Node::new(1, 0, Point3::new(1.5, 0.0, 0.0))).unwrap();
    assert!(matches!(dis.fill_complete(), Err(Error::Connectivity(_))));
}

#[test]
fn element_with_missing_node_is_rejected() {
    let mut dis = empty_discretization();
    dis.add_node(Node::new(0, 0, Point3::origin())).unwrap();
    dis.create_element(
        0,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Line2,
        vec![0, 1],
        "MAT 1",
    )
    .unwrap();
    assert!(matches!(dis.fill_complete(), Err(Error::Connectivity(_))));
}

#[test]
fn duplicate_element_is_rejected() {
    let mut dis = line_discretization();
    let result = dis.create_element(
        0,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Line2,
        vec![0, 1],
        "MAT 1",
    );
    assert!(matches!(result, Err(Error::Connectivity(_))));
}

#[test]
fn location_arrays_follow_the_kernel_dofs() {
    let mesh = create_rectangle_mesh([2.0, 1.0], [2, 1]);
    for (physics, dofs_per_node) in [(PhysicsKind::Transport, 1), (PhysicsKind::Solid, 2)] {
        let mut dis = mesh_discretization("field", &mesh, physics, SerialCommunicator::shared());
        dis.fill_complete().unwrap();
        assert_eq!(dis.dof_row_map().unwrap().num_global(), 6 * dofs_per_node);
        for element in dis.owned_elements() {
            let la = dis.location_array(element).unwrap();
            assert_eq!(la.len(), element.shape().num_nodes() * dofs_per_node);
            assert_eq!(la.dofs.len(), la.owners.len());
            for (a, &node) in element.node_ids().iter().enumerate() {
                let dofs = dis.dofs_of_node(node).unwrap();
                assert_eq!(&la.dofs[a * dofs_per_node..(a + 1) * dofs_per_node], &dofs.collect::<Vec<_>>()[..]);
            }
        }
    }
}

#[test]
fn dofs_are_numbered_by_ascending_node_id() {
    let mesh = create_rectangle_mesh([1.0, 1.0], [1, 1]);
    let mut dis = mesh_discretization("field", &mesh, PhysicsKind::Solid, SerialCommunicator::shared());
    dis.fill_complete().unwrap();
    for node in 0..4 {
        assert_eq!(dis.dofs_of_node(node).unwrap(), 2 * node..2 * node + 2);
    }
    assert_eq!(dis.global_to_local_node(3), Some(3));
    assert_eq!(dis.local_to_global_element(0), Some(0));
    assert!(dis.have_global_node(2));
    assert!(!dis.have_global_node(4));
    assert!(dis.have_global_element(0));
}

#[test]
fn states_live_on_the_dof_row_map() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();
    let map = dis.dof_row_map().unwrap().clone();
    let phi = DistributedVector::from_owned(map, DVector::from_vec(vec![1.0, 2.0, 3.0]));
    dis.set_state(STATE_PHINP, &phi).unwrap();

    let element = dis.element(1).unwrap();
    let la = dis.location_array(element).unwrap();
    assert_eq!(dis.extract_local(STATE_PHINP, &la).unwrap().as_slice(), &[2.0, 3.0]);
    assert!(matches!(dis.state("unknown"), Err(Error::Configuration(_))));

    let foreign = DistributedVector::zeros(Arc::new(DofRowMap::serial(5)));
    assert!(matches!(dis.set_state(STATE_PHINP, &foreign), Err(Error::Connectivity(_))));

    dis.clear_state();
    assert!(!dis.has_state(STATE_PHINP));
}

#[test]
fn element_center_is_the_nodal_mean() {
    let mut dis = empty_discretization();
    let coords = [(0.0, 0.0), (4.0, 0.0), (4.0, 1.0), (0.0, 3.0)];
    for (gid, (x, y)) in coords.iter().enumerate() {
        dis.add_node(Node::new(gid, 0, Point3::new(*x, *y, 0.0))).unwrap();
    }
    dis.create_element(
        0,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Quad4,
        vec![0, 1, 2, 3],
        "MAT 1",
    )
    .unwrap();
    dis.fill_complete().unwrap();
    let center = dis
        .element_center_refe_coords(dis.element(0).unwrap())
        .unwrap();
    assert_eq!(center, Point3::new(2.0, 1.0, 0.0));
}

#[test]
fn permuting_nodes_is_allowed_after_fill() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();
    dis.permute_element_nodes(0, &[1, 0]).unwrap();
    assert_eq!(dis.element(0).unwrap().node_ids(), &[1, 0]);
    assert!(matches!(
        dis.permute_element_nodes(0, &[0, 0]),
        Err(Error::Connectivity(_))
    ));
    assert!(matches!(
        dis.permute_element_nodes(7, &[1, 0]),
        Err(Error::Connectivity(_))
    ));
}

#[test]
fn nullspace_of_scalar_field_is_constant() {
    let mut dis = line_discretization();
    dis.set_compute_nullspace(true);
    dis.fill_complete().unwrap();
    let nullspace = dis.nullspace().unwrap().unwrap();
    assert_eq!(nullspace, &DMatrix::from_element(3, 1, 1.0));
}

#[test]
fn nullspace_is_only_computed_on_request() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();
    assert!(dis.nullspace().unwrap().is_none());
}

#[test]
fn nullspace_of_solid_fields_has_rigid_body_modes() {
    let mesh = create_rectangle_mesh([1.0, 1.0], [1, 1]);
    let mut dis = mesh_discretization("solid2d", &mesh, PhysicsKind::Solid, SerialCommunicator::shared());
    dis.set_compute_nullspace(true);
    dis.fill_complete().unwrap();
    let nullspace = dis.nullspace().unwrap().unwrap();
    assert_eq!(nullspace.shape(), (8, 3));
    // In-plane rotation of node 2 at (1, 1)
    assert_eq!(nullspace[(4, 2)], -1.0);
    assert_eq!(nullspace[(5, 2)], 1.0);

    let mesh = mpfe::procedural::create_box_mesh([1.0, 1.0, 1.0], [1, 1, 1]);
    let mut dis = mesh_discretization("solid3d", &mesh, PhysicsKind::Solid, SerialCommunicator::shared());
    dis.set_compute_nullspace(true);
    dis.fill_complete().unwrap();
    assert_eq!(dis.nullspace().unwrap().unwrap().shape(), (24, 6));
}

#[test]
fn owned_node_gid_vectors() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();

    let mut gids = Vec::new();
    assert!(dis.add_owned_node_gid(1, &mut gids));
    assert!(!dis.add_owned_node_gid(9, &mut gids));
    dis.add_owned_node_gid_vector(&[0, 2, 5], &mut gids);
    assert_eq!(gids, vec![1, 0, 2]);

    let mut gids = vec![0, 1, 0, 2, 9];
    dis.remove_node_gids_from_vector(&[0, 9], &mut gids);
    // 9 is not a node of this rank and stays
    assert_eq!(gids, vec![1, 2, 9]);
}

#[test]
fn distributed_fill_assigns_contiguous_dofs_per_rank() {
    let mesh = create_rectangle_mesh([4.0, 1.0], [4, 1]);
    let results = ChannelCommunicator::run(2, |comm| {
        let mut dis = mesh_discretization("field", &mesh, PhysicsKind::Transport, comm);
        dis.fill_complete().unwrap();
        let rank = dis.rank();
        let owned: Vec<usize> = dis.node_row_map().unwrap().gids().to_vec();
        let column: Vec<usize> = dis.node_col_map().unwrap().gids().to_vec();
        let ghost_dofs: Vec<_> = if rank == 1 {
            vec![dis.dofs_of_node(2).unwrap(), dis.dofs_of_node(7).unwrap()]
        } else {
            Vec::new()
        };
        (
            owned,
            column,
            dis.dof_row_map().unwrap().owned_range(),
            ghost_dofs,
            dis.num_global_nodes().unwrap(),
            dis.num_global_elements().unwrap(),
        )
    });

    let (owned, column, range, ghosts, nodes, elements) = &results[0];
    assert_eq!(owned, &vec![0, 1, 2, 5, 6, 7]);
    assert_eq!(column, owned);
    assert_eq!(range, &(0..6));
    assert!(ghosts.is_empty());
    assert_eq!((*nodes, *elements), (10, 4));

    let (owned, column, range, ghosts, nodes, elements) = &results[1];
    assert_eq!(owned, &vec![3, 4, 8, 9]);
    let mut column = column.clone();
    column.sort_unstable();
    assert_eq!(column, vec![2, 3, 4, 7, 8, 9]);
    assert_eq!(range, &(6..10));
    // Ghost nodes carry the DOFs published by their owner
    assert_eq!(ghosts, &vec![2..3, 5..6]);
    assert_eq!((*nodes, *elements), (10, 4));
}

#[test]
fn ghost_states_are_imported_from_owners() {
    let mesh = create_rectangle_mesh([4.0, 1.0], [4, 1]);
    let results = ChannelCommunicator::run(2, |comm| {
        let mut dis = mesh_discretization("field", &mesh, PhysicsKind::Transport, comm);
        dis.fill_complete().unwrap();
        let map = dis.dof_row_map().unwrap().clone();
        // Every DOF holds its own global index
        let values = DVector::from_iterator(map.num_owned(), map.owned_range().map(|dof| dof as f64));
        dis.set_state(STATE_PHINP, &DistributedVector::from_owned(map, values))
            .unwrap();
        let matches: Vec<bool> = dis
            .elements()
            .map(|element| {
                let la = dis.location_array(element).unwrap();
                let local = dis.extract_local(STATE_PHINP, &la).unwrap();
                let expected: Vec<f64> = la.dofs.iter().map(|&dof| dof as f64).collect();
                local.as_slice() == expected.as_slice()
            })
            .collect();
        matches.into_iter().all(|ok| ok)
    });
    assert_eq!(results, vec![true, true]);
}

#[test]
fn redistribute_moves_elements_and_nodes() {
    let mesh = create_rectangle_mesh([4.0, 1.0], [4, 1]);
    let results = ChannelCommunicator::run(2, |comm| {
        let mut dis = mesh_discretization("field", &mesh, PhysicsKind::Transport, comm);
        dis.fill_complete().unwrap();
        let partition: BTreeMap<usize, usize> = dis.owned_elements().map(|e| (e.gid(), 1)).collect();
        dis.redistribute(&partition).unwrap();
        assert!(dis.filled());
        let owners: Vec<usize> = dis.nodes().map(|node| node.owner()).collect();
        (
            dis.num_my_row_elements(),
            dis.num_my_row_nodes(),
            dis.num_global_elements().unwrap(),
            dis.num_global_nodes().unwrap(),
            owners.iter().all(|&owner| owner == 1),
        )
    });
    assert_eq!(results[0], (0, 0, 4, 10, true));
    assert_eq!(results[1], (4, 10, 4, 10, true));
}

#[test]
fn redistribute_to_missing_rank_is_rejected() {
    let mut dis = line_discretization();
    dis.fill_complete().unwrap();
    let partition = BTreeMap::from([(0, 3)]);
    assert!(matches!(dis.redistribute(&partition), Err(Error::Configuration(_))));
}

#[test]
fn meshfree_bin_deletes_first_occurrence() {
    let mut bin = MeshfreeBin::new(4, 1);
    for gid in [7, 3, 7, 9] {
        bin.add_node(gid);
    }
    bin.delete_node(7).unwrap();
    assert_eq!(bin.node_ids(), &[3, 7, 9]);
    assert!(matches!(bin.delete_node(11), Err(Error::Connectivity(_))));
    assert_eq!(bin.num_nodes(), 3);
    bin.delete_all_nodes();
    assert_eq!(bin.num_nodes(), 0);
}

#[test]
fn meshfree_bin_survives_packing() {
    let mut bin = MeshfreeBin::new(12, 2);
    bin.add_node(5);
    bin.add_node(8);

    let bytes = pack_to_vec(&bin).unwrap();

    let restored = MeshfreeBin::unpack(&mut UnpackBuffer::new(&bytes)).unwrap();
    assert_eq!(restored, bin);
    assert_eq!((restored.gid(), restored.owner()), (12, 2));
}
