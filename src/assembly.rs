//! Assembly of element contributions into distributed residuals and Jacobians.
//!
//! Owned elements are visited in ascending id order, which is the order of the element row map.
//! Contributions are summed in that order, so results are reproducible for a fixed partition.
use crate::comm::{all_gather_array, sum_all};
use crate::condition::{CELL_NEUMANN_CONDITIONS, DIRICHLET, POINT_NEUMANN};
use crate::discretization::Discretization;
use crate::element::{Element, ElementSystem};
use crate::error::{Error, Result};
use crate::linalg::{DistributedMatrix, DistributedVector};
use crate::params::ParameterInterface;
use crate::Gid;
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

pub mod global;

pub use global::{apply_dirichlet_csr, apply_dirichlet_rhs, MatrixAccumulator, VectorAccumulator};

/// Global DOFs of an element (or boundary cell), node by node, with the owner of every DOF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationArray {
    pub dofs: Vec<Gid>,
    pub owners: Vec<usize>,
}

impl LocationArray {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            dofs: Vec::with_capacity(n),
            owners: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }
}

/// Scatters a local matrix and vector into the accumulators.
pub fn assemble(
    matrix: Option<&mut MatrixAccumulator>,
    vector: Option<&mut VectorAccumulator>,
    local_matrix: &DMatrix<f64>,
    local_vector: &DVector<f64>,
    la: &LocationArray,
) -> Result<()> {
    let n = la.len();
    if let Some(matrix) = matrix {
        assert_eq!(local_matrix.nrows(), n);
        assert_eq!(local_matrix.ncols(), n);
        for (j, &col) in la.dofs.iter().enumerate() {
            for (i, &row) in la.dofs.iter().enumerate() {
                matrix.add(row, col, local_matrix[(i, j)])?;
            }
        }
    }
    if let Some(vector) = vector {
        assert_eq!(local_vector.len(), n);
        for (i, &row) in la.dofs.iter().enumerate() {
            vector.add(row, local_vector[i])?;
        }
    }
    Ok(())
}

/// Selects the containers filled by [`assemble_system`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SweepTargets {
    /// Assemble `matrix1` of every element.
    pub matrix: bool,
    /// Add the point and cell Neumann loads to the vector.
    pub neumann: bool,
}

impl SweepTargets {
    pub fn vector_only() -> Self {
        Self {
            matrix: false,
            neumann: false,
        }
    }

    pub fn full() -> Self {
        Self {
            matrix: true,
            neumann: true,
        }
    }
}

/// The distributed system produced by an evaluation sweep.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub matrix: Option<DistributedMatrix>,
    pub vector: DistributedVector,
}

/// Evaluates every owned element for the action of `params` and assembles `matrix1` and
/// `vector1`. Collective.
pub fn assemble_system(
    dis: &Discretization,
    params: &ParameterInterface,
    targets: SweepTargets,
) -> Result<AssembledSystem> {
    let map = dis.dof_row_map()?.clone();
    let mut matrix = targets.matrix.then(|| MatrixAccumulator::new(map.clone()));
    let mut vector = VectorAccumulator::new(map);

    let mut system = ElementSystem::new(0);
    let mut num_elements = 0;
    for element in dis.owned_elements() {
        let la = dis.location_array(element)?;
        system.reset(la.len());
        element
            .kernel()
            .evaluate(params, dis, element, &la, &mut system)?;
        assemble(matrix.as_mut(), Some(&mut vector), &system.matrix1, &system.vector1, &la)?;
        num_elements += 1;
    }
    if targets.neumann {
        evaluate_neumann(dis, params, &mut vector)?;
    }
    debug!(
        "Assembled {:?} over {} elements of {} on rank {}",
        params.action(),
        num_elements,
        dis.name(),
        dis.rank()
    );

    let comm = dis.comm().as_ref();
    let matrix = matrix.map(|m| m.complete(comm)).transpose()?;
    let vector = vector.complete(comm)?;
    Ok(AssembledSystem { matrix, vector })
}

/// A column element containing every node of `node_ids`, preferring owned elements.
fn parent_element<'a>(dis: &'a Discretization, node_ids: &[Gid]) -> Result<&'a Element> {
    let first = node_ids
        .iter()
        .min()
        .ok_or_else(|| Error::Connectivity("Boundary cell without nodes".to_string()))?;
    let candidates = dis
        .elements_of_node(*first)?
        .iter()
        .filter_map(|gid| dis.element(*gid))
        .filter(|element| node_ids.iter().all(|n| element.node_ids().contains(n)));
    let mut fallback = None;
    for element in candidates {
        if element.owner() == dis.rank() {
            return Ok(element);
        }
        fallback.get_or_insert(element);
    }
    fallback.ok_or_else(|| {
        Error::Connectivity(format!(
            "No element of {} contains all nodes of the boundary cell {:?}",
            dis.name(),
            node_ids
        ))
    })
}

/// Adds the point and cell Neumann loads of `dis` to `vector`.
///
/// A point load is added by the owner of its node. A cell load is integrated by the owner of
/// the cell node with the smallest id, using the kernel of an element containing the cell.
/// Loads are scaled by the load factor of the kernel of an adjacent element.
pub fn evaluate_neumann(dis: &Discretization, params: &ParameterInterface, vector: &mut VectorAccumulator) -> Result<()> {
    let rank = dis.rank();
    for condition in dis.conditions(POINT_NEUMANN) {
        for &node_gid in &condition.node_ids {
            if !dis.is_node_gid_on_this_proc(node_gid) {
                continue;
            }
            let node = dis
                .node(node_gid)
                .ok_or_else(|| Error::Connectivity(format!("Neumann node {} is missing", node_gid)))?;
            let scale = match dis.elements_of_node(node_gid)?.first().and_then(|gid| dis.element(*gid)) {
                Some(element) => element.kernel().load_factor(params),
                None => params.time_factors().load_factor(),
            };
            for (i, dof) in dis.dofs_of_node(node_gid)?.enumerate() {
                let value = condition.value(i, node.coords(), params.total_time(), params.functions())?;
                if value != 0.0 {
                    vector.add(dof, scale * value)?;
                }
            }
        }
    }

    for name in CELL_NEUMANN_CONDITIONS {
        for condition in dis.conditions(name) {
            for cell in &condition.cells {
                let responsible = cell.node_ids.iter().min().copied();
                match responsible {
                    Some(gid) if dis.node(gid).map(|n| n.owner()) == Some(rank) => {}
                    _ => continue,
                }
                let element = parent_element(dis, &cell.node_ids)?;
                let kernel = element.kernel();
                let la = dis.location_array_of(&cell.node_ids, kernel.dofs_per_node())?;
                let mut force = DVector::zeros(la.len());
                kernel.evaluate_neumann(params, dis, element, condition, cell, &la, &mut force, None)?;
                assemble(None, Some(vector), &DMatrix::zeros(0, 0), &force, &la)?;
            }
        }
    }
    Ok(())
}

/// Prescribed values of all Dirichlet DOFs at the time of `params`, replicated on every rank.
/// Collective.
///
/// Each rank evaluates the conditions on its owned nodes. For a DOF constrained by several
/// conditions, the last one wins.
pub fn collect_dirichlet(dis: &Discretization, params: &ParameterInterface) -> Result<BTreeMap<Gid, f64>> {
    let mut local: BTreeMap<Gid, f64> = BTreeMap::new();
    for condition in dis.conditions(DIRICHLET) {
        for &node_gid in &condition.node_ids {
            if !dis.is_node_gid_on_this_proc(node_gid) {
                continue;
            }
            let node = dis
                .node(node_gid)
                .ok_or_else(|| Error::Connectivity(format!("Dirichlet node {} is missing", node_gid)))?;
            for (i, dof) in dis.dofs_of_node(node_gid)?.enumerate() {
                if condition.is_active(i) {
                    let value = condition.value(i, node.coords(), params.total_time(), params.functions())?;
                    local.insert(dof, value);
                }
            }
        }
    }

    let dofs: Vec<Gid> = local.keys().copied().collect();
    let values: Vec<f64> = local.values().copied().collect();
    let comm = dis.comm().as_ref();
    let all_dofs = all_gather_array(comm, &dofs)?;
    let all_values = all_gather_array(comm, &values)?;
    Ok(all_dofs
        .into_iter()
        .flatten()
        .zip(all_values.into_iter().flatten())
        .collect())
}

/// Total mass `sum detJ * w * rho` of all elements. Collective.
pub fn homogenize_density(dis: &Discretization) -> Result<f64> {
    let mut mass = 0.0;
    for element in dis.owned_elements() {
        mass += element.kernel().homogenize_density(dis, element)?;
    }
    sum_all(dis.comm().as_ref(), mass)
}

/// Lets every owned element forward a restart read to its micro-scale problems.
pub fn read_restart_multi(dis: &Discretization) -> Result<()> {
    for element in dis.owned_elements() {
        element.kernel().read_restart_multi(element)?;
    }
    Ok(())
}

/// Lets every owned element initialize its micro-scale problems for inverse analysis.
pub fn invana_init(dis: &Discretization) -> Result<()> {
    for element in dis.owned_elements() {
        element.kernel().invana_init(element)?;
    }
    Ok(())
}
