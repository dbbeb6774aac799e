//! Byte-stream representation of nodes and elements for migration between ranks.
//!
//! Every entity is written as one framed object, so a stream is a plain sequence of objects.
use super::Node;
use crate::element::{CellShape, Element, ElementData, ElementRegistry, Kinematics, PhysicsKind, ProblemVariant};
use crate::error::Result;
use crate::material::MaterialTable;
use crate::quadrature::GaussRule;
use mpfe_pack::{PackBuffer, PackError, UnpackBuffer};
use nalgebra::Point3;

pub(crate) fn pack_node(buffer: &mut PackBuffer, node: &Node) -> std::result::Result<(), PackError> {
    let mut object = buffer.begin_object()?;
    object.add_pod(node.gid)?;
    object.add_pod(node.owner)?;
    object.add_array(node.coords.coords.as_slice())?;
    Ok(())
}

pub(crate) fn unpack_node(buffer: &mut UnpackBuffer) -> Result<Node> {
    let mut object = buffer.extract_object()?;
    let gid = object.extract_pod()?;
    let owner = object.extract_pod()?;
    let coords: Vec<f64> = object.extract_array(3)?;
    Ok(Node::new(gid, owner, Point3::new(coords[0], coords[1], coords[2])))
}

fn pack_optional<P: mpfe_pack::Pod>(buffer: &mut PackBuffer, value: Option<P>, default: P) -> std::result::Result<(), PackError> {
    buffer.add_pod(value.is_some())?;
    buffer.add_pod(value.unwrap_or(default))
}

fn unpack_optional<P: mpfe_pack::Pod>(buffer: &mut UnpackBuffer) -> std::result::Result<Option<P>, PackError> {
    let present: bool = buffer.extract_pod()?;
    let value: P = buffer.extract_pod()?;
    Ok(present.then_some(value))
}

/// Packs an element with its element data. The material is referenced by id.
pub(crate) fn pack_element(buffer: &mut PackBuffer, element: &Element) -> std::result::Result<(), PackError> {
    let mut object = buffer.begin_object()?;
    object.add_pod(element.gid())?;
    object.add_pod(element.owner())?;
    object.add_pod(element.physics().code())?;
    object.add_pod(element.variant().code())?;
    object.add_pod(element.shape().code())?;
    object.add_pod(element.node_ids().len())?;
    object.add_array(element.node_ids())?;

    let data = element.data();
    object.add_pod(data.material.id())?;
    object.add_pod(data.kinematics.code())?;
    object.add_pod(data.gauss_rule.family_code())?;
    let counts = data.gauss_rule.gp_codes();
    object.add_pod(counts.len())?;
    object.add_array(&counts)?;
    pack_optional(&mut object, data.cross_section, 0.0)?;
    pack_optional(&mut object, data.convection, 0)?;
    Ok(())
}

/// Reconstructs an element, resolving its kernel and material on the receiving rank.
pub(crate) fn unpack_element(
    buffer: &mut UnpackBuffer,
    registry: &ElementRegistry,
    materials: &MaterialTable,
) -> Result<Element> {
    let mut object = buffer.extract_object()?;
    let gid = object.extract_pod()?;
    let owner = object.extract_pod()?;
    let physics = PhysicsKind::from_code(object.extract_pod()?)?;
    let variant = ProblemVariant::from_code(object.extract_pod()?)?;
    let shape = CellShape::from_code(object.extract_pod()?)?;
    let num_nodes: usize = object.extract_pod()?;
    let node_ids = object.extract_array(num_nodes)?;

    let material = materials.get(object.extract_pod()?)?;
    let kinematics = Kinematics::from_code(object.extract_pod()?)?;
    let family: u8 = object.extract_pod()?;
    let num_counts: usize = object.extract_pod()?;
    let counts: Vec<usize> = object.extract_array(num_counts)?;
    let gauss_rule = GaussRule::from_family_code(family, &counts)?;

    let mut data = ElementData::new(material, gauss_rule);
    data.kinematics = kinematics;
    data.cross_section = unpack_optional(&mut object)?;
    data.convection = unpack_optional(&mut object)?;

    registry.element_from_data(gid, owner, physics, variant, shape, node_ids, data)
}
