use crate::mesh_discretization;
use mpfe::clone::{clone_discretization, CloneStrategy, ScatraThermoCloneStrategy};
use mpfe::comm::SerialCommunicator;
use mpfe::condition::{Condition, DIRICHLET};
use mpfe::element::{CellShape, Element, ElementData, Kinematics, PhysicsKind, ProblemVariant};
use mpfe::material::Material;
use std::collections::BTreeMap;
use std::sync::Arc;
use mpfe::procedural::create_rectangle_mesh;
use mpfe::Error;

fn scatra_field() -> mpfe::discretization::Discretization {
    let mesh = create_rectangle_mesh([1.0, 1.0], [2, 2]);
    let mut dis = mesh_discretization("scatra", &mesh, PhysicsKind::Transport, SerialCommunicator::shared());
    dis.add_condition(Condition::dirichlet(vec![0, 3], vec![true], vec![1.0]).with_name("ThermoDirichlet"));
    dis.add_condition(Condition::dirichlet(vec![8], vec![true], vec![0.0]));
    dis
}

#[test]
fn scatra_is_cloned_into_thermo() {
    let mut source = scatra_field();
    source.fill_complete().unwrap();
    let target = clone_discretization(&source, "thermo", 3, &ScatraThermoCloneStrategy).unwrap();

    assert_eq!(target.name(), "thermo");
    assert!(target.filled());
    assert_eq!(target.num_global_nodes().unwrap(), source.num_global_nodes().unwrap());
    assert_eq!(target.num_global_elements().unwrap(), 4);
    for element in target.elements() {
        let original = source.element(element.gid()).unwrap();
        assert_eq!(element.physics(), PhysicsKind::Thermo);
        assert_eq!(element.node_ids(), original.node_ids());
        assert_eq!(element.owner(), original.owner());
        assert_eq!(element.shape(), CellShape::Quad4);
        assert_eq!(element.material().id(), 3);
        assert_eq!(element.data().kinematics, Kinematics::Linear);
    }

    // Only the thermo conditions of the source are copied, under their plain names
    let dirichlet = target.conditions(DIRICHLET);
    assert_eq!(dirichlet.len(), 1);
    assert_eq!(dirichlet[0].node_ids, vec![0, 3]);
    assert!(target.conditions("ThermoDirichlet").is_empty());
}

#[test]
fn clones_need_a_fourier_material() {
    let mut source = scatra_field();
    source.fill_complete().unwrap();
    assert!(matches!(
        clone_discretization(&source, "thermo", 1, &ScatraThermoCloneStrategy),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        clone_discretization(&source, "thermo", 42, &ScatraThermoCloneStrategy),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn clones_need_a_filled_source() {
    let source = scatra_field();
    assert!(matches!(
        clone_discretization(&source, "thermo", 3, &ScatraThermoCloneStrategy),
        Err(Error::NotFilled { .. })
    ));
}

#[test]
fn thermo_strategy_maps_prefixed_conditions() {
    let map = ScatraThermoCloneStrategy.conditions_to_copy();
    assert_eq!(map.get("ThermoDirichlet").map(String::as_str), Some("Dirichlet"));
    assert_eq!(map.get("ThermoSurfaceNeumann").map(String::as_str), Some("SurfaceNeumann"));
    assert_eq!(map.get("S2IKinetics").map(String::as_str), Some("S2IKinetics"));
    assert!(!map.contains_key("Dirichlet"));
}

/// Thermo clones with total Lagrangian kinematics, which a Fourier material does not support.
struct NonlinearThermoStrategy;

impl CloneStrategy for NonlinearThermoStrategy {
    fn conditions_to_copy(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn check_material_type(&self, material: &Material) -> Result<(), Error> {
        ScatraThermoCloneStrategy.check_material_type(material)
    }

    fn determine_ele_type(&self, source: &Element, owned: bool) -> Option<(PhysicsKind, ProblemVariant)> {
        ScatraThermoCloneStrategy.determine_ele_type(source, owned)
    }

    fn set_element_data(&self, source: &Element, material: Arc<Material>, is_nurbs: bool) -> ElementData {
        let mut data = ScatraThermoCloneStrategy.set_element_data(source, material, is_nurbs);
        data.kinematics = Kinematics::NonlinearTotLag;
        data
    }
}

#[test]
fn cloned_kinematics_must_be_supported_by_the_material() {
    let mut source = scatra_field();
    source.fill_complete().unwrap();
    let err = clone_discretization(&source, "thermo", 3, &NonlinearThermoStrategy).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("kinematics"));
}
