//! Distributed meshes with a DOF map.
//!
//! A [`Discretization`] stores the nodes and elements visible on one rank: the ones it owns and
//! the ghosts mirrored from neighbors. Structural mutation is only possible until
//! [`Discretization::fill_complete`] freezes the node, element and DOF maps. Every collective
//! operation (`fill_complete`, `redistribute`, `set_state`, global counts) must be called by all
//! ranks in the same order.
use crate::assembly::LocationArray;
use crate::comm::{sum_all_usize, Communicator};
use crate::condition::Condition;
use crate::element::{CellShape, Element, ElementRegistry, PhysicsKind, ProblemVariant};
use crate::error::{Error, Result};
use crate::linalg::{DistributedVector, DofRowMap};
use crate::material::MaterialTable;
use crate::Gid;
use nalgebra::{DMatrix, DVector, Point3};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

mod fill;
mod meshfree;
pub(crate) mod pack;
mod redistribute;

pub use meshfree::MeshfreeBin;

/// Name of the state holding the current iterate.
pub const STATE_PHINP: &str = "phinp";
/// Name of the state holding the history part of the time discretization.
pub const STATE_HIST: &str = "hist";

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    gid: Gid,
    owner: usize,
    coords: Point3<f64>,
}

impl Node {
    pub fn new(gid: Gid, owner: usize, coords: Point3<f64>) -> Self {
        Self { gid, owner, coords }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn coords(&self) -> &Point3<f64> {
        &self.coords
    }
}

/// Bijection between global ids and contiguous local indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GidMap {
    gids: Vec<Gid>,
    lookup: FxHashMap<Gid, usize>,
}

impl GidMap {
    pub fn from_gids(gids: Vec<Gid>) -> Self {
        let lookup = gids.iter().enumerate().map(|(lid, &gid)| (gid, lid)).collect();
        Self { gids, lookup }
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }

    pub fn gids(&self) -> &[Gid] {
        &self.gids
    }

    pub fn gid(&self, lid: usize) -> Option<Gid> {
        self.gids.get(lid).copied()
    }

    pub fn lid(&self, gid: Gid) -> Option<usize> {
        self.lookup.get(&gid).copied()
    }

    pub fn contains(&self, gid: Gid) -> bool {
        self.lookup.contains_key(&gid)
    }
}

/// Maps and derived data frozen by `fill_complete`.
#[derive(Debug, Clone)]
pub(crate) struct FillData {
    pub(crate) node_row: GidMap,
    pub(crate) node_col: GidMap,
    pub(crate) element_row: GidMap,
    pub(crate) element_col: GidMap,
    pub(crate) dof_row_map: Arc<DofRowMap>,
    /// DOF range of every column node.
    pub(crate) node_dofs: FxHashMap<Gid, Range<Gid>>,
    /// DOFs of the column nodes in column order.
    pub(crate) dof_col: GidMap,
    /// Column elements adjacent to every column node, ascending.
    pub(crate) node_elements: FxHashMap<Gid, Vec<Gid>>,
    pub(crate) importer: fill::Importer,
    pub(crate) nullspace: Option<DMatrix<f64>>,
}

pub struct Discretization {
    name: String,
    comm: Arc<dyn Communicator>,
    registry: Arc<ElementRegistry>,
    materials: Arc<MaterialTable>,
    nodes: BTreeMap<Gid, Node>,
    /// Nodes added a second time, checked for conflicts by `fill_complete`.
    duplicate_nodes: Vec<Node>,
    elements: BTreeMap<Gid, Element>,
    conditions: BTreeMap<String, Vec<Condition>>,
    compute_nullspace: bool,
    filled: Option<FillData>,
    /// Column vectors of named states.
    states: BTreeMap<String, DVector<f64>>,
}

impl std::fmt::Debug for Discretization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discretization")
            .field("name", &self.name)
            .field("rank", &self.comm.rank())
            .field("num_nodes", &self.nodes.len())
            .field("num_elements", &self.elements.len())
            .field("filled", &self.filled.is_some())
            .finish()
    }
}

impl Discretization {
    pub fn new(
        name: &str,
        comm: Arc<dyn Communicator>,
        registry: Arc<ElementRegistry>,
        materials: Arc<MaterialTable>,
    ) -> Self {
        Self {
            name: name.to_string(),
            comm,
            registry,
            materials,
            nodes: BTreeMap::new(),
            duplicate_nodes: Vec::new(),
            elements: BTreeMap::new(),
            conditions: BTreeMap::new(),
            compute_nullspace: false,
            filled: None,
            states: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    pub fn materials(&self) -> &Arc<MaterialTable> {
        &self.materials
    }

    pub fn filled(&self) -> bool {
        self.filled.is_some()
    }

    fn check_mutable(&self, operation: &'static str) -> Result<()> {
        if self.filled() {
            Err(Error::StructuralMutationAfterFill { operation })
        } else {
            Ok(())
        }
    }

    pub(crate) fn fill_data(&self, operation: &'static str) -> Result<&FillData> {
        self.filled.as_ref().ok_or(Error::NotFilled { operation })
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.check_mutable("add_node")?;
        if self.nodes.contains_key(&node.gid) {
            self.duplicate_nodes.push(node);
        } else {
            self.nodes.insert(node.gid, node);
        }
        Ok(())
    }

    pub fn add_element(&mut self, element: Element) -> Result<()> {
        self.check_mutable("add_element")?;
        if self.elements.contains_key(&element.gid()) {
            return Err(Error::Connectivity(format!(
                "Element {} added twice to discretization {}",
                element.gid(),
                self.name
            )));
        }
        self.elements.insert(element.gid(), element);
        Ok(())
    }

    /// Creates an element through the registry by reading its record and adds it.
    #[allow(clippy::too_many_arguments)]
    pub fn create_element(
        &mut self,
        gid: Gid,
        owner: usize,
        physics: PhysicsKind,
        variant: ProblemVariant,
        shape: CellShape,
        node_ids: Vec<Gid>,
        linedef: &str,
    ) -> Result<()> {
        self.check_mutable("create_element")?;
        let element = self
            .registry
            .create_element(gid, owner, physics, variant, shape, node_ids, linedef, &self.materials)?;
        self.add_element(element)
    }

    /// Removes an element. Its nodes are kept.
    pub fn delete_element(&mut self, gid: Gid) -> Result<Element> {
        self.check_mutable("delete_element")?;
        self.elements
            .remove(&gid)
            .ok_or_else(|| Error::Connectivity(format!("Element {} not found in {}", gid, self.name)))
    }

    /// Replaces the node order of an element by `new[i] = old[permutation[i]]`.
    ///
    /// Since the node set is unchanged, this is allowed after `fill_complete`.
    pub fn permute_element_nodes(&mut self, gid: Gid, permutation: &[usize]) -> Result<()> {
        let element = self
            .elements
            .get_mut(&gid)
            .ok_or_else(|| Error::Connectivity(format!("Element {} not found", gid)))?;
        let old = element.node_ids();
        let mut seen = vec![false; old.len()];
        if permutation.len() != old.len()
            || permutation
                .iter()
                .any(|&p| p >= old.len() || std::mem::replace(&mut seen[p], true))
        {
            return Err(Error::Connectivity(format!(
                "{:?} is not a node permutation of element {}",
                permutation, gid
            )));
        }
        let new = permutation.iter().map(|&p| old[p]).collect();
        element.set_node_ids(new);
        Ok(())
    }

    /// Returns to the unfilled state. All maps and states are dropped.
    pub fn reset(&mut self) {
        self.filled = None;
        self.states.clear();
    }

    /// Requests the computation of the null space (rigid body modes) in `fill_complete`.
    pub fn set_compute_nullspace(&mut self, compute: bool) {
        self.compute_nullspace = compute;
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions
            .entry(condition.name.clone())
            .or_default()
            .push(condition);
    }

    /// All conditions with the given name, in insertion order.
    pub fn conditions(&self, name: &str) -> &[Condition] {
        self.conditions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn condition_names(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn all_conditions(&self) -> &BTreeMap<String, Vec<Condition>> {
        &self.conditions
    }

    pub fn node(&self, gid: Gid) -> Option<&Node> {
        self.nodes.get(&gid)
    }

    pub fn element(&self, gid: Gid) -> Option<&Element> {
        self.elements.get(&gid)
    }

    /// All nodes on this rank, owned and ghosted, in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All elements on this rank, owned and ghosted, in ascending id order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Owned elements in ascending id order, which is the order of the element row map.
    pub fn owned_elements(&self) -> impl Iterator<Item = &Element> {
        let rank = self.rank();
        self.elements.values().filter(move |e| e.owner() == rank)
    }

    pub fn owned_nodes(&self) -> impl Iterator<Item = &Node> {
        let rank = self.rank();
        self.nodes.values().filter(move |n| n.owner == rank)
    }

    pub fn num_my_col_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_my_row_nodes(&self) -> usize {
        self.owned_nodes().count()
    }

    pub fn num_my_col_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_my_row_elements(&self) -> usize {
        self.owned_elements().count()
    }

    /// Number of nodes over all ranks. Collective.
    pub fn num_global_nodes(&self) -> Result<usize> {
        sum_all_usize(self.comm.as_ref(), self.num_my_row_nodes())
    }

    /// Number of elements over all ranks. Collective.
    pub fn num_global_elements(&self) -> Result<usize> {
        sum_all_usize(self.comm.as_ref(), self.num_my_row_elements())
    }

    pub fn node_row_map(&self) -> Result<&GidMap> {
        Ok(&self.fill_data("node_row_map")?.node_row)
    }

    pub fn node_col_map(&self) -> Result<&GidMap> {
        Ok(&self.fill_data("node_col_map")?.node_col)
    }

    pub fn element_row_map(&self) -> Result<&GidMap> {
        Ok(&self.fill_data("element_row_map")?.element_row)
    }

    pub fn element_col_map(&self) -> Result<&GidMap> {
        Ok(&self.fill_data("element_col_map")?.element_col)
    }

    pub fn dof_row_map(&self) -> Result<&Arc<DofRowMap>> {
        Ok(&self.fill_data("dof_row_map")?.dof_row_map)
    }

    pub fn dof_col_map(&self) -> Result<&GidMap> {
        Ok(&self.fill_data("dof_col_map")?.dof_col)
    }

    pub fn nullspace(&self) -> Result<Option<&DMatrix<f64>>> {
        Ok(self.fill_data("nullspace")?.nullspace.as_ref())
    }

    /// Column index of a node.
    pub fn global_to_local_node(&self, gid: Gid) -> Option<usize> {
        self.filled.as_ref()?.node_col.lid(gid)
    }

    /// Global id of the element with the given column index.
    pub fn local_to_global_element(&self, lid: usize) -> Option<Gid> {
        self.filled.as_ref()?.element_col.gid(lid)
    }

    /// Whether the node is present on this rank, owned or ghosted.
    pub fn have_global_node(&self, gid: Gid) -> bool {
        self.nodes.contains_key(&gid)
    }

    pub fn have_global_element(&self, gid: Gid) -> bool {
        self.elements.contains_key(&gid)
    }

    pub fn dofs_of_node(&self, gid: Gid) -> Result<Range<Gid>> {
        self.fill_data("dofs_of_node")?
            .node_dofs
            .get(&gid)
            .cloned()
            .ok_or_else(|| Error::Connectivity(format!("Node {} is not in the column map of {}", gid, self.name)))
    }

    /// Column elements adjacent to a column node.
    pub fn elements_of_node(&self, gid: Gid) -> Result<&[Gid]> {
        Ok(self
            .fill_data("elements_of_node")?
            .node_elements
            .get(&gid)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    pub fn node_coords_of(&self, node_ids: &[Gid]) -> Result<Vec<Point3<f64>>> {
        node_ids
            .iter()
            .map(|gid| {
                self.nodes
                    .get(gid)
                    .map(|node| node.coords)
                    .ok_or_else(|| Error::Connectivity(format!("Node {} is not present in {}", gid, self.name)))
            })
            .collect()
    }

    pub fn element_coords(&self, element: &Element) -> Result<Vec<Point3<f64>>> {
        self.node_coords_of(element.node_ids())
    }

    /// Arithmetic mean of the nodal reference coordinates.
    ///
    /// This is not the image of the reference center and differs from it for higher-order or
    /// curved elements.
    pub fn element_center_refe_coords(&self, element: &Element) -> Result<Point3<f64>> {
        let coords = self.element_coords(element)?;
        let sum = coords
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, x| acc + x.coords);
        Ok(Point3::from(sum / coords.len() as f64))
    }

    /// DOFs of the element nodes, node by node, taking as many DOFs per node as the element
    /// kernel uses.
    pub fn location_array(&self, element: &Element) -> Result<LocationArray> {
        self.location_array_of(element.node_ids(), element.dofs_per_node())
    }

    pub fn location_array_of(&self, node_ids: &[Gid], dofs_per_node: usize) -> Result<LocationArray> {
        let data = self.fill_data("location_array")?;
        let mut la = LocationArray::with_capacity(node_ids.len() * dofs_per_node);
        for gid in node_ids {
            let dofs = data
                .node_dofs
                .get(gid)
                .ok_or_else(|| Error::Connectivity(format!("Node {} has no DOFs in {}", gid, self.name)))?;
            if dofs.len() < dofs_per_node {
                return Err(Error::Connectivity(format!(
                    "Node {} carries {} DOFs, {} requested",
                    gid,
                    dofs.len(),
                    dofs_per_node
                )));
            }
            let owner = self.nodes.get(gid).map(|n| n.owner).unwrap_or(usize::MAX);
            for dof in dofs.start..dofs.start + dofs_per_node {
                la.dofs.push(dof);
                la.owners.push(owner);
            }
        }
        Ok(la)
    }

    /// Imports a distributed vector into the column layout and stores it under `name`. Collective.
    pub fn set_state(&mut self, name: &str, vector: &DistributedVector) -> Result<()> {
        let data = self.fill_data("set_state")?;
        if vector.map().as_ref() != data.dof_row_map.as_ref() {
            return Err(Error::Connectivity(format!(
                "State {} does not live on the DOF row map of {}",
                name, self.name
            )));
        }
        let column = data.importer.import(self.comm.as_ref(), vector, &data.dof_col)?;
        self.states.insert(name.to_string(), column);
        Ok(())
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn clear_state(&mut self) {
        self.states.clear();
    }

    /// Column vector of a state.
    pub fn state(&self, name: &str) -> Result<&DVector<f64>> {
        self.states
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("State \"{}\" has not been set on {}", name, self.name)))
    }

    /// Values of a state at the DOFs of a location array.
    pub fn extract_local(&self, name: &str, la: &LocationArray) -> Result<DVector<f64>> {
        let state = self.state(name)?;
        let dof_col = &self.fill_data("extract_local")?.dof_col;
        let mut local = DVector::zeros(la.dofs.len());
        for (i, dof) in la.dofs.iter().enumerate() {
            let lid = dof_col
                .lid(*dof)
                .ok_or_else(|| Error::Connectivity(format!("DOF {} is not in the column map of {}", dof, self.name)))?;
            local[i] = state[lid];
        }
        Ok(local)
    }

    /// Whether the node is in the column map and owned by this rank.
    pub fn is_node_gid_on_this_proc(&self, gid: Gid) -> bool {
        self.nodes
            .get(&gid)
            .map(|node| node.owner == self.rank())
            .unwrap_or(false)
    }

    /// Appends `gid` to `gids` if the node is owned by this rank. Returns whether it was added.
    pub fn add_owned_node_gid(&self, gid: Gid, gids: &mut Vec<Gid>) -> bool {
        let owned = self.is_node_gid_on_this_proc(gid);
        if owned {
            gids.push(gid);
        }
        owned
    }

    /// Appends every node of `candidates` owned by this rank to `gids`.
    pub fn add_owned_node_gid_vector(&self, candidates: &[Gid], gids: &mut Vec<Gid>) {
        for &gid in candidates {
            self.add_owned_node_gid(gid, gids);
        }
    }

    /// Erases all occurrences of every locally owned node of `to_remove` from `gids`.
    pub fn remove_node_gids_from_vector(&self, to_remove: &[Gid], gids: &mut Vec<Gid>) {
        for &gid in to_remove {
            if self.is_node_gid_on_this_proc(gid) {
                gids.retain(|&g| g != gid);
            }
        }
    }
}
