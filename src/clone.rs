//! Creation of a discretization for a second physics on the mesh of an existing one.
use crate::discretization::Discretization;
use crate::element::{Element, ElementData, Kinematics, PhysicsKind, ProblemVariant};
use crate::error::{Error, Result};
use crate::material::{Material, MaterialKind};
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Physics-specific decisions taken while cloning a discretization.
pub trait CloneStrategy {
    /// Maps names of source conditions to the names they receive on the target.
    fn conditions_to_copy(&self) -> BTreeMap<String, String>;

    /// Checks that `material` can be used by the cloned elements.
    fn check_material_type(&self, material: &Material) -> Result<()>;

    /// Decides whether `source` is cloned, and if so into which physics and variant.
    fn determine_ele_type(&self, source: &Element, owned: bool) -> Option<(PhysicsKind, ProblemVariant)>;

    /// Element data of the clone of `source`.
    fn set_element_data(&self, source: &Element, material: Arc<Material>, is_nurbs: bool) -> ElementData;
}

/// Clones a scalar transport discretization into a thermo discretization.
///
/// Every element is cloned. Thermo boundary conditions, which are defined on the scatra field
/// with a `Thermo` prefix, become the plain conditions of the thermo field.
#[derive(Debug, Copy, Clone, Default)]
pub struct ScatraThermoCloneStrategy;

impl CloneStrategy for ScatraThermoCloneStrategy {
    fn conditions_to_copy(&self) -> BTreeMap<String, String> {
        [
            ("ThermoDirichlet", "Dirichlet"),
            ("ThermoPointNeumann", "PointNeumann"),
            ("ThermoLineNeumann", "LineNeumann"),
            ("ThermoSurfaceNeumann", "SurfaceNeumann"),
            ("ThermoVolumeNeumann", "VolumeNeumann"),
            ("ThermoInitfield", "Initfield"),
            ("S2IMeshtying", "S2IMeshtying"),
            ("S2IKinetics", "S2IKinetics"),
        ]
        .into_iter()
        .map(|(source, target)| (source.to_string(), target.to_string()))
        .collect()
    }

    fn check_material_type(&self, material: &Material) -> Result<()> {
        if material.kind() != MaterialKind::Fourier {
            return Err(Error::Configuration(format!(
                "Thermo elements cloned from scatra need a {} material, material {} is {}",
                MaterialKind::Fourier,
                material.id(),
                material.kind()
            )));
        }
        Ok(())
    }

    fn determine_ele_type(&self, _source: &Element, _owned: bool) -> Option<(PhysicsKind, ProblemVariant)> {
        Some((PhysicsKind::Thermo, ProblemVariant::Standard))
    }

    fn set_element_data(&self, source: &Element, material: Arc<Material>, is_nurbs: bool) -> ElementData {
        let mut data = ElementData::new(material, source.data().gauss_rule);
        // NURBS elements keep the kinematics they were read with.
        data.kinematics = if is_nurbs {
            source.data().kinematics
        } else {
            Kinematics::Linear
        };
        data
    }
}

/// Creates `target_name` on the nodes of `source`, with elements determined by `strategy` and
/// material `material_id`. Collective.
///
/// The clone has the same node ids, element ids and ownership as the source and is filled. The
/// material must support the kinematics chosen for every cloned element.
pub fn clone_discretization(
    source: &Discretization,
    target_name: &str,
    material_id: usize,
    strategy: &dyn CloneStrategy,
) -> Result<Discretization> {
    if !source.filled() {
        return Err(Error::NotFilled {
            operation: "clone_discretization",
        });
    }
    let material = source.materials().get(material_id)?;
    strategy.check_material_type(&material)?;

    let mut target = Discretization::new(
        target_name,
        Arc::clone(source.comm()),
        Arc::clone(source.registry()),
        Arc::clone(source.materials()),
    );
    for node in source.nodes() {
        target.add_node(node.clone())?;
    }

    let rank = source.rank();
    let registry = Arc::clone(source.registry());
    for element in source.elements() {
        let owned = element.owner() == rank;
        if let Some((physics, variant)) = strategy.determine_ele_type(element, owned) {
            let data = strategy.set_element_data(element, Arc::clone(&material), element.shape().is_nurbs());
            data.material.valid_kinematics(data.kinematics)?;
            let clone = registry.element_from_data(
                element.gid(),
                element.owner(),
                physics,
                variant,
                element.shape(),
                element.node_ids().to_vec(),
                data,
            )?;
            target.add_element(clone)?;
        }
    }

    for (from, to) in strategy.conditions_to_copy() {
        for condition in source.conditions(&from) {
            target.add_condition(condition.clone().with_name(&to));
        }
    }

    target.fill_complete()?;
    info!(
        "Cloned {} into {} with {} elements",
        source.name(),
        target.name(),
        target.num_global_elements()?
    );
    Ok(target)
}
