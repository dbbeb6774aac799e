//! Condensation of slave DOFs of mortar-coupled interfaces.
//!
//! Every coupled interface contributes a projection `P = D^-1 M` from its master DOFs to its
//! slave DOFs, so that slave values follow as `x_s = P x_m`. With the transformation `T`, the
//! identity with the slave rows replaced by `P` and the slave columns removed, the condensed
//! system is `T^T A T x' = T^T b` and the full solution is `x = T x'`. Projections are applied
//! per field of a block system, in the order they were pushed.
use crate::comm::all_gather_array;
use crate::condition::CouplingSide;
use crate::discretization::Discretization;
use crate::error::{Error, Result};
use crate::Gid;
use log::debug;
use nalgebra::{DMatrix, DVector, Point3};
use nalgebra_sparse::convert::serial::convert_csr_dense;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::BTreeMap;

/// A node of one side of an interface with the coupled DOFs it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceNode {
    pub gid: Gid,
    pub coords: Point3<f64>,
    pub dofs: Vec<Gid>,
}

/// Mortar matrices of an interface.
///
/// Rows follow the DOFs of the slave nodes in node order, columns of `m` the DOFs of the master
/// nodes in node order.
#[derive(Debug, Clone)]
pub struct MortarOperators {
    pub d: CsrMatrix<f64>,
    pub m: CsrMatrix<f64>,
}

/// Computes the mortar matrices of an interface.
pub trait MortarOperatorProvider {
    fn mortar_operators(&self, slave: &[InterfaceNode], master: &[InterfaceNode]) -> Result<MortarOperators>;
}

/// Couples every slave node to the nearest master node, which is exact for matching meshes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NodeMatchingMortar {
    /// Largest accepted distance between a slave node and its master node.
    pub tolerance: f64,
}

impl Default for NodeMatchingMortar {
    fn default() -> Self {
        Self { tolerance: 1e-10 }
    }
}

impl MortarOperatorProvider for NodeMatchingMortar {
    fn mortar_operators(&self, slave: &[InterfaceNode], master: &[InterfaceNode]) -> Result<MortarOperators> {
        let num_slave_dofs: usize = slave.iter().map(|n| n.dofs.len()).sum();
        let num_master_dofs: usize = master.iter().map(|n| n.dofs.len()).sum();
        let mut master_offsets = Vec::with_capacity(master.len());
        let mut offset = 0;
        for node in master {
            master_offsets.push(offset);
            offset += node.dofs.len();
        }

        let mut d = CooMatrix::new(num_slave_dofs, num_slave_dofs);
        let mut m = CooMatrix::new(num_slave_dofs, num_master_dofs);
        let mut row = 0;
        for node in slave {
            let (nearest, distance) = master
                .iter()
                .enumerate()
                .map(|(idx, candidate)| (idx, (candidate.coords - node.coords).norm()))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .ok_or_else(|| Error::Connectivity("Interface without master nodes".to_string()))?;
            if distance > self.tolerance {
                return Err(Error::Connectivity(format!(
                    "Slave node {} has no matching master node (nearest is {} at distance {:e})",
                    node.gid, master[nearest].gid, distance
                )));
            }
            if master[nearest].dofs.len() != node.dofs.len() {
                return Err(Error::Connectivity(format!(
                    "Slave node {} and master node {} carry different numbers of coupled DOFs",
                    node.gid, master[nearest].gid
                )));
            }
            for k in 0..node.dofs.len() {
                d.push(row + k, row + k, 1.0);
                m.push(row + k, master_offsets[nearest] + k, 1.0);
            }
            row += node.dofs.len();
        }
        Ok(MortarOperators {
            d: CsrMatrix::from(&d),
            m: CsrMatrix::from(&m),
        })
    }
}

/// Projection of one interface: for every slave DOF, its weights on master DOFs.
#[derive(Debug, Clone)]
struct Projection {
    id: usize,
    num_dofs: usize,
    rows: BTreeMap<Gid, Vec<(Gid, f64)>>,
}

impl Projection {
    /// The transformation `T` on the global DOFs of the field.
    fn transformation(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_dofs, self.num_dofs);
        for dof in 0..self.num_dofs {
            match self.rows.get(&dof) {
                Some(weights) => {
                    for &(master, weight) in weights {
                        coo.push(dof, master, weight);
                    }
                }
                None => coo.push(dof, dof, 1.0),
            }
        }
        CsrMatrix::from(&coo)
    }

    fn slave_identity(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_dofs, self.num_dofs);
        for &dof in self.rows.keys() {
            coo.push(dof, dof, 1.0);
        }
        CsrMatrix::from(&coo)
    }
}

/// Collects the nodes of one side of an interface with the selected DOF components, replicated
/// on every rank in ascending id order. Collective.
fn gather_side(dis: &Discretization, nodes: &[Gid], components: &[usize]) -> Result<Vec<InterfaceNode>> {
    let mut ids = Vec::new();
    let mut coords = Vec::new();
    for &gid in nodes {
        if !dis.is_node_gid_on_this_proc(gid) {
            continue;
        }
        let range = dis.dofs_of_node(gid)?;
        ids.push(gid);
        for &c in components {
            if c >= range.len() {
                return Err(Error::Configuration(format!(
                    "Node {} carries {} DOFs, cannot couple component {}",
                    gid,
                    range.len(),
                    c
                )));
            }
            ids.push(range.start + c);
        }
        let x = dis
            .node(gid)
            .ok_or_else(|| Error::Connectivity(format!("Interface node {} is missing", gid)))?
            .coords();
        coords.extend_from_slice(&[x.x, x.y, x.z]);
    }

    let comm = dis.comm().as_ref();
    let all_ids = all_gather_array(comm, &ids)?;
    let all_coords = all_gather_array(comm, &coords)?;
    let width = 1 + components.len();
    let mut side: Vec<InterfaceNode> = all_ids
        .iter()
        .zip(&all_coords)
        .flat_map(|(ids, coords)| {
            ids.chunks_exact(width)
                .zip(coords.chunks_exact(3))
                .map(|(entry, x)| InterfaceNode {
                    gid: entry[0],
                    coords: Point3::new(x[0], x[1], x[2]),
                    dofs: entry[1..].to_vec(),
                })
        })
        .collect();
    side.sort_by_key(|node| node.gid);
    Ok(side)
}

/// Ordered projections of all coupled interfaces of a (block) system.
pub struct MultiFieldCoupling {
    provider: Box<dyn MortarOperatorProvider>,
    projections: Vec<Projection>,
    next_id: usize,
    /// Projection ids in use when the matrix was last condensed.
    condensed_with: Option<Vec<usize>>,
}

impl std::fmt::Debug for MultiFieldCoupling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFieldCoupling")
            .field("num_projections", &self.projections.len())
            .field("condensed_with", &self.condensed_with)
            .finish()
    }
}

impl Default for MultiFieldCoupling {
    fn default() -> Self {
        Self::new(Box::new(NodeMatchingMortar::default()))
    }
}

impl MultiFieldCoupling {
    pub fn new(provider: Box<dyn MortarOperatorProvider>) -> Self {
        Self {
            provider,
            projections: Vec::new(),
            next_id: 0,
            condensed_with: None,
        }
    }

    pub fn num_projections(&self) -> usize {
        self.projections.len()
    }

    fn fingerprint(&self) -> Vec<usize> {
        self.projections.iter().map(|p| p.id).collect()
    }

    /// Appends the projection of the interface named `nodeset` in `dis`, restricted to the DOF
    /// components `dofs` of every node. Collective.
    ///
    /// The conditions named `nodeset` with a slave side form the slave nodes, the ones with a
    /// master side the master nodes.
    pub fn push_back_coupling(&mut self, dis: &Discretization, nodeset: &str, dofs: &[usize]) -> Result<()> {
        let conditions = dis.conditions(nodeset);
        let side_nodes = |side: CouplingSide| -> Vec<Gid> {
            let mut nodes: Vec<Gid> = conditions
                .iter()
                .filter(|c| c.side == Some(side))
                .flat_map(|c| c.node_ids.iter().copied())
                .collect();
            nodes.sort_unstable();
            nodes.dedup();
            nodes
        };
        let slave_ids = side_nodes(CouplingSide::Slave);
        let master_ids = side_nodes(CouplingSide::Master);
        if slave_ids.is_empty() || master_ids.is_empty() {
            return Err(Error::Configuration(format!(
                "Coupling condition {} needs both a slave and a master side",
                nodeset
            )));
        }

        let slave = gather_side(dis, &slave_ids, dofs)?;
        let master = gather_side(dis, &master_ids, dofs)?;
        let operators = self.provider.mortar_operators(&slave, &master)?;

        let d = convert_csr_dense(&operators.d);
        let d_inv = d
            .try_inverse()
            .ok_or_else(|| Error::Configuration(format!("Mortar matrix D of {} is singular", nodeset)))?;
        let p: DMatrix<f64> = d_inv * convert_csr_dense(&operators.m);

        let slave_dofs: Vec<Gid> = slave.iter().flat_map(|n| n.dofs.iter().copied()).collect();
        let master_dofs: Vec<Gid> = master.iter().flat_map(|n| n.dofs.iter().copied()).collect();
        if let Some(dof) = slave_dofs.iter().find(|dof| master_dofs.contains(dof)) {
            return Err(Error::Configuration(format!(
                "DOF {} of {} is both slave and master",
                dof, nodeset
            )));
        }
        let mut rows = BTreeMap::new();
        for (i, &slave_dof) in slave_dofs.iter().enumerate() {
            let weights: Vec<(Gid, f64)> = master_dofs
                .iter()
                .enumerate()
                .filter(|(j, _)| p[(i, *j)] != 0.0)
                .map(|(j, &master_dof)| (master_dof, p[(i, j)]))
                .collect();
            rows.insert(slave_dof, weights);
        }

        let num_dofs = dis.dof_row_map()?.num_global();
        debug!(
            "Coupling {}: {} slave DOFs projected on {} master DOFs",
            nodeset,
            slave_dofs.len(),
            master_dofs.len()
        );
        self.projections.push(Projection {
            id: self.next_id,
            num_dofs,
            rows,
        });
        self.next_id += 1;
        Ok(())
    }

    fn check_dimensions(&self, sizes: impl Iterator<Item = usize>) -> Result<()> {
        let found: Vec<usize> = sizes.collect();
        let expected: Vec<usize> = self.projections.iter().map(|p| p.num_dofs).collect();
        if found != expected {
            return Err(Error::Connectivity(format!(
                "Block system with field sizes {:?} does not match coupled fields of sizes {:?}",
                found, expected
            )));
        }
        Ok(())
    }

    fn check_order(&self) -> Result<()> {
        let found = self.fingerprint();
        match &self.condensed_with {
            Some(expected) if *expected == found => Ok(()),
            Some(expected) => Err(Error::CouplingOrderMismatch {
                expected: expected.clone(),
                found,
            }),
            None => Err(Error::CouplingOrderMismatch {
                expected: Vec::new(),
                found,
            }),
        }
    }

    /// Condenses every block `A_rc` to `T_r^T A_rc T_c`. Diagonal blocks get a unit entry on
    /// their slave diagonal.
    ///
    /// `blocks[r][c]` is the block coupling field `r` to field `c`, where field `i` belongs to the
    /// `i`-th pushed projection.
    pub fn condense_matrix(&mut self, blocks: &[Vec<CsrMatrix<f64>>]) -> Result<Vec<Vec<CsrMatrix<f64>>>> {
        self.check_dimensions(blocks.iter().map(|row| row.first().map(|b| b.nrows()).unwrap_or(0)))?;
        let transformations: Vec<CsrMatrix<f64>> = self.projections.iter().map(Projection::transformation).collect();
        let mut condensed = Vec::with_capacity(blocks.len());
        for (r, row) in blocks.iter().enumerate() {
            if row.len() != blocks.len() {
                return Err(Error::Connectivity(format!(
                    "Block row {} has {} blocks, expected {}",
                    r,
                    row.len(),
                    blocks.len()
                )));
            }
            let t_r_transpose = transformations[r].transpose();
            let mut condensed_row = Vec::with_capacity(row.len());
            for (c, block) in row.iter().enumerate() {
                if block.nrows() != transformations[r].nrows() || block.ncols() != transformations[c].nrows() {
                    return Err(Error::Connectivity(format!(
                        "Block ({}, {}) has dimensions {}x{}",
                        r,
                        c,
                        block.nrows(),
                        block.ncols()
                    )));
                }
                let mut a = &(&t_r_transpose * block) * &transformations[c];
                if r == c {
                    a = &a + &self.projections[r].slave_identity();
                }
                condensed_row.push(a);
            }
            condensed.push(condensed_row);
        }
        self.condensed_with = Some(self.fingerprint());
        Ok(condensed)
    }

    /// Condenses every right-hand side block `v` to `T^T v`.
    pub fn condense_rhs(&self, blocks: &[DVector<f64>]) -> Result<Vec<DVector<f64>>> {
        self.check_order()?;
        self.check_dimensions(blocks.iter().map(DVector::len))?;
        Ok(blocks
            .iter()
            .zip(&self.projections)
            .map(|(v, projection)| {
                let mut condensed = v.clone();
                for (&slave, weights) in &projection.rows {
                    for &(master, weight) in weights {
                        condensed[master] += weight * v[slave];
                    }
                }
                for &slave in projection.rows.keys() {
                    condensed[slave] = 0.0;
                }
                condensed
            })
            .collect())
    }

    /// Reconstructs the slave increments `dx_s = P dx_m` of every block in place.
    pub fn recover_incr(&self, blocks: &mut [DVector<f64>]) -> Result<()> {
        self.check_order()?;
        self.check_dimensions(blocks.iter().map(DVector::len))?;
        for (dx, projection) in blocks.iter_mut().zip(&self.projections) {
            for (&slave, weights) in &projection.rows {
                dx[slave] = weights.iter().map(|&(master, weight)| weight * dx[master]).sum();
            }
        }
        Ok(())
    }
}
