//! Construction of the node, element and DOF maps.
use super::{Discretization, FillData, GidMap};
use crate::comm::{all_gather_array, all_gather_pod, pack_array, unpack_array, Communicator};
use crate::error::{Error, Result};
use crate::linalg::{DistributedVector, DofRowMap};
use crate::Gid;
use itertools::{Either, Itertools};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// Communication plan that brings owned DOF values to the ranks that ghost them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Importer {
    /// Owned DOFs to send to every rank.
    send: Vec<Vec<Gid>>,
    /// Ghost DOFs received from every rank, in the order they are sent.
    recv: Vec<Vec<Gid>>,
}

impl Importer {
    /// Builds the plan for the ghost DOFs of a column map. Collective.
    fn new(comm: &dyn Communicator, map: &DofRowMap, ghost_dofs: &[Gid]) -> Result<Self> {
        let mut recv = vec![Vec::new(); comm.size()];
        for &dof in ghost_dofs {
            let owner = map
                .owner_of(dof)
                .ok_or_else(|| Error::Connectivity(format!("Ghost DOF {} has no owner", dof)))?;
            recv[owner].push(dof);
        }
        let requests = recv.iter().map(|dofs| pack_array(dofs)).collect::<Result<Vec<_>>>()?;
        let send = comm
            .all_to_all(requests)?
            .iter()
            .map(|bytes| unpack_array(bytes))
            .collect::<Result<Vec<Vec<Gid>>>>()?;
        if let Some(dof) = send.iter().flatten().find(|&&dof| !map.is_owned(dof)) {
            return Err(Error::Connectivity(format!(
                "Rank {} was asked for DOF {} which it does not own",
                comm.rank(),
                dof
            )));
        }
        Ok(Self { send, recv })
    }

    /// Returns the column vector of `vector`. Collective.
    pub(crate) fn import(
        &self,
        comm: &dyn Communicator,
        vector: &DistributedVector,
        dof_col: &GidMap,
    ) -> Result<DVector<f64>> {
        let map = vector.map();
        let outgoing = self
            .send
            .iter()
            .map(|dofs| {
                let values: Vec<f64> = dofs
                    .iter()
                    .map(|&dof| vector.get(dof).unwrap_or(0.0))
                    .collect();
                pack_array(&values)
            })
            .collect::<Result<Vec<_>>>()?;
        let incoming = comm.all_to_all(outgoing)?;

        let mut column = DVector::zeros(dof_col.len());
        for (lid, &dof) in dof_col.gids().iter().enumerate() {
            if let Some(value) = vector.get(dof) {
                column[lid] = value;
            }
        }
        for (source, bytes) in incoming.iter().enumerate() {
            let values: Vec<f64> = unpack_array(bytes)?;
            if values.len() != self.recv[source].len() {
                return Err(Error::Communication(format!(
                    "Expected {} ghost values from rank {}, received {}",
                    self.recv[source].len(),
                    source,
                    values.len()
                )));
            }
            for (&dof, value) in self.recv[source].iter().zip(values) {
                if let Some(lid) = dof_col.lid(dof) {
                    debug_assert!(!map.is_owned(dof));
                    column[lid] = value;
                }
            }
        }
        Ok(column)
    }
}

/// Rigid body modes of the owned DOFs, one column per mode.
///
/// Scalar fields get a constant mode. Two-dimensional fields get two translations and the
/// in-plane rotation, three-dimensional fields three translations and three rotations.
pub(crate) fn compute_nullspace(
    dis: &Discretization,
    node_row: &GidMap,
    node_dofs: &FxHashMap<Gid, Range<Gid>>,
    map: &DofRowMap,
) -> Result<DMatrix<f64>> {
    let width = node_row
        .gids()
        .iter()
        .filter_map(|gid| node_dofs.get(gid).map(|dofs| dofs.len()))
        .max()
        .unwrap_or(0);
    let num_modes = match width {
        0 | 1 => 1,
        2 => 3,
        _ => 6,
    };
    let offset = map.owned_range().start;
    let mut nullspace = DMatrix::zeros(map.num_owned(), num_modes);
    for &gid in node_row.gids() {
        let node = dis
            .node(gid)
            .ok_or_else(|| Error::Connectivity(format!("Row node {} is missing", gid)))?;
        let x = node.coords();
        let dofs = &node_dofs[&gid];
        let row = dofs.start - offset;
        match dofs.len() {
            0 => {}
            1 => nullspace[(row, 0)] = 1.0,
            2 => {
                nullspace[(row, 0)] = 1.0;
                nullspace[(row + 1, 1)] = 1.0;
                nullspace[(row, 2)] = -x.y;
                nullspace[(row + 1, 2)] = x.x;
            }
            _ => {
                for i in 0..3 {
                    nullspace[(row + i, i)] = 1.0;
                }
                // Rotations about z, x and y
                nullspace[(row, 3)] = -x.y;
                nullspace[(row + 1, 3)] = x.x;
                nullspace[(row + 1, 4)] = -x.z;
                nullspace[(row + 2, 4)] = x.y;
                nullspace[(row, 5)] = x.z;
                nullspace[(row + 2, 5)] = -x.x;
            }
        }
    }
    Ok(nullspace)
}

impl Discretization {
    /// Freezes the discretization and builds its maps. Collective and idempotent.
    ///
    /// Duplicate node definitions are merged if they agree and rejected otherwise. Every element
    /// must reference nodes present on this rank. Each node receives as many DOFs as the widest
    /// kernel among its adjacent elements requires, numbered contiguously per rank in rank order
    /// and, within a rank, in ascending node id order.
    pub fn fill_complete(&mut self) -> Result<()> {
        if self.filled.is_some() {
            return Ok(());
        }
        let comm = Arc::clone(&self.comm);
        let rank = comm.rank();

        for duplicate in std::mem::take(&mut self.duplicate_nodes) {
            let existing = &self.nodes[&duplicate.gid];
            if existing != &duplicate {
                return Err(Error::Connectivity(format!(
                    "Conflicting definitions of node {}: {:?} and {:?}",
                    duplicate.gid, existing, duplicate
                )));
            }
        }

        let mut node_elements: FxHashMap<Gid, Vec<Gid>> = FxHashMap::default();
        let mut node_width: FxHashMap<Gid, usize> = FxHashMap::default();
        for element in self.elements.values() {
            for &node in element.node_ids() {
                if !self.nodes.contains_key(&node) {
                    return Err(Error::Connectivity(format!(
                        "Element {} references node {}, which is not present on rank {}",
                        element.gid(),
                        node,
                        rank
                    )));
                }
                node_elements.entry(node).or_default().push(element.gid());
                let width = node_width.entry(node).or_insert(0);
                *width = (*width).max(element.dofs_per_node());
            }
        }
        for adjacent in node_elements.values_mut() {
            adjacent.dedup();
        }

        let split_owned = |gid: Gid, owner: usize| if owner == rank { Either::Left(gid) } else { Either::Right(gid) };
        let (owned_nodes, ghost_nodes): (Vec<Gid>, Vec<Gid>) = self
            .nodes
            .values()
            .partition_map(|n| split_owned(n.gid, n.owner));
        let (owned_elements, ghost_elements): (Vec<Gid>, Vec<Gid>) = self
            .elements
            .values()
            .partition_map(|e| split_owned(e.gid(), e.owner()));

        let node_row = GidMap::from_gids(owned_nodes.clone());
        let node_col = GidMap::from_gids(owned_nodes.iter().chain(&ghost_nodes).copied().collect());
        let element_row = GidMap::from_gids(owned_elements.clone());
        let element_col = GidMap::from_gids(owned_elements.iter().chain(&ghost_elements).copied().collect());

        let num_owned_dofs: usize = owned_nodes
            .iter()
            .map(|gid| node_width.get(gid).copied().unwrap_or(0))
            .sum();
        let counts = all_gather_pod(comm.as_ref(), num_owned_dofs)?;
        let dof_row_map = Arc::new(DofRowMap::from_counts(&counts, rank));

        let mut node_dofs: FxHashMap<Gid, Range<Gid>> = FxHashMap::default();
        let mut next = dof_row_map.owned_range().start;
        let mut published = Vec::with_capacity(3 * owned_nodes.len());
        for &gid in &owned_nodes {
            let width = node_width.get(&gid).copied().unwrap_or(0);
            node_dofs.insert(gid, next..next + width);
            published.extend_from_slice(&[gid, next, width]);
            next += width;
        }

        // Owners publish the DOFs of their nodes, ghosts pick theirs up
        let all_published = all_gather_array(comm.as_ref(), &published)?;
        let mut ghost_lookup: BTreeMap<Gid, (usize, Range<Gid>)> = BTreeMap::new();
        for (source, entries) in all_published.iter().enumerate() {
            if source == rank {
                continue;
            }
            for entry in entries.chunks_exact(3) {
                ghost_lookup.insert(entry[0], (source, entry[1]..entry[1] + entry[2]));
            }
        }
        for &gid in &ghost_nodes {
            let (source, dofs) = ghost_lookup.get(&gid).cloned().ok_or_else(|| {
                Error::Connectivity(format!("Ghost node {} on rank {} is not owned by any rank", gid, rank))
            })?;
            let owner = self.nodes[&gid].owner;
            if source != owner {
                return Err(Error::Connectivity(format!(
                    "Node {} is ghosted with owner {} but owned by rank {}",
                    gid, owner, source
                )));
            }
            node_dofs.insert(gid, dofs);
        }

        let dof_col_gids: Vec<Gid> = node_col
            .gids()
            .iter()
            .flat_map(|gid| node_dofs[gid].clone())
            .collect();
        let ghost_dofs: Vec<Gid> = ghost_nodes
            .iter()
            .flat_map(|gid| node_dofs[gid].clone())
            .collect();
        let importer = Importer::new(comm.as_ref(), &dof_row_map, &ghost_dofs)?;

        let nullspace = if self.compute_nullspace {
            Some(compute_nullspace(self, &node_row, &node_dofs, &dof_row_map)?)
        } else {
            None
        };

        debug!(
            "Filled {} on rank {}: {} row nodes, {} column nodes, {} row elements, {} owned of {} DOFs",
            self.name,
            rank,
            node_row.len(),
            node_col.len(),
            element_row.len(),
            dof_row_map.num_owned(),
            dof_row_map.num_global()
        );

        self.states.clear();
        self.filled = Some(FillData {
            node_row,
            node_col,
            element_row,
            element_col,
            dof_row_map,
            node_dofs,
            dof_col: GidMap::from_gids(dof_col_gids),
            node_elements,
            importer,
            nullspace,
        });
        Ok(())
    }
}
