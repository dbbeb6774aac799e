//! Procedural generation of structured meshes, distributed over the ranks of a communicator.
//!
//! Nodes are numbered lexicographically, with x running fastest. Cells are assigned to ranks in
//! contiguous blocks; a node is owned by the lowest rank owning one of its cells.
use crate::comm::Communicator;
use crate::config::{ElementConfig, MeshConfig};
use crate::discretization::{Discretization, Node};
use crate::element::{CellShape, ElementRegistry};
use crate::error::{Error, Result};
use crate::material::MaterialTable;
use crate::Gid;
use log::debug;
use nalgebra::Point3;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A mesh with a single cell shape, before distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredMesh {
    pub shape: CellShape,
    pub vertices: Vec<Point3<f64>>,
    pub cells: Vec<Vec<Gid>>,
}

impl StructuredMesh {
    /// Rank owning cell `cell` when the cells are split into `size` contiguous blocks.
    pub fn cell_owner(&self, cell: usize, size: usize) -> usize {
        cell * size / self.cells.len().max(1)
    }

    /// Owner of every vertex: the lowest rank owning an adjacent cell.
    pub fn vertex_owners(&self, size: usize) -> Vec<usize> {
        let mut owners = vec![usize::MAX; self.vertices.len()];
        for (index, cell) in self.cells.iter().enumerate() {
            let owner = self.cell_owner(index, size);
            for &v in cell {
                owners[v] = owners[v].min(owner);
            }
        }
        owners
    }

    /// Vertices whose coordinates satisfy `predicate`, in ascending order.
    pub fn vertices_where(&self, predicate: impl Fn(&Point3<f64>) -> bool) -> Vec<Gid> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, x)| predicate(x))
            .map(|(gid, _)| gid)
            .collect()
    }
}

/// `cells` line cells on `[0, length]` along the x-axis. `Line3` cells number their vertices
/// sequentially, so that the mid node of cell `e` is `2 e + 1`.
pub fn create_line_mesh(length: f64, cells: usize, shape: CellShape) -> Result<StructuredMesh> {
    let per_cell = match shape {
        CellShape::Line2 => 1,
        CellShape::Line3 => 2,
        _ => {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: "procedural line mesh".to_string(),
            })
        }
    };
    let num_vertices = per_cell * cells + 1;
    let h = length / (num_vertices - 1) as f64;
    let vertices = (0..num_vertices)
        .map(|i| Point3::new(i as f64 * h, 0.0, 0.0))
        .collect();
    let cells = (0..cells)
        .map(|e| match per_cell {
            1 => vec![e, e + 1],
            _ => vec![2 * e, 2 * e + 2, 2 * e + 1],
        })
        .collect();
    Ok(StructuredMesh {
        shape,
        vertices,
        cells,
    })
}

/// Quad4 cells on `[0, size[0]] x [0, size[1]]`, counterclockwise.
pub fn create_rectangle_mesh(size: [f64; 2], cells: [usize; 2]) -> StructuredMesh {
    let [nx, ny] = cells;
    let (hx, hy) = (size[0] / nx as f64, size[1] / ny as f64);
    let vertex = |i: usize, j: usize| j * (nx + 1) + i;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point3::new(i as f64 * hx, j as f64 * hy, 0.0));
        }
    }
    let mut connectivity = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            connectivity.push(vec![vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1)]);
        }
    }
    StructuredMesh {
        shape: CellShape::Quad4,
        vertices,
        cells: connectivity,
    }
}

/// Hex8 cells on `[0, size[0]] x [0, size[1]] x [0, size[2]]`.
pub fn create_box_mesh(size: [f64; 3], cells: [usize; 3]) -> StructuredMesh {
    let [nx, ny, nz] = cells;
    let h = [size[0] / nx as f64, size[1] / ny as f64, size[2] / nz as f64];
    let vertex = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(Point3::new(i as f64 * h[0], j as f64 * h[1], k as f64 * h[2]));
            }
        }
    }
    let mut connectivity = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                connectivity.push(vec![
                    vertex(i, j, k),
                    vertex(i + 1, j, k),
                    vertex(i + 1, j + 1, k),
                    vertex(i, j + 1, k),
                    vertex(i, j, k + 1),
                    vertex(i + 1, j, k + 1),
                    vertex(i + 1, j + 1, k + 1),
                    vertex(i, j + 1, k + 1),
                ]);
            }
        }
    }
    StructuredMesh {
        shape: CellShape::Hex8,
        vertices,
        cells: connectivity,
    }
}

pub fn create_mesh(config: &MeshConfig) -> Result<StructuredMesh> {
    match *config {
        MeshConfig::Line { length, cells, shape } => create_line_mesh(length, cells, shape),
        MeshConfig::Rectangle { size, cells } => Ok(create_rectangle_mesh(size, cells)),
        MeshConfig::Box { size, cells } => Ok(create_box_mesh(size, cells)),
    }
}

/// Adds the cells of `mesh` owned by this rank, and their nodes, to `dis`.
///
/// Cell `e` becomes element `e`, vertex `v` becomes node `v`.
pub fn populate_discretization(dis: &mut Discretization, mesh: &StructuredMesh, element: &ElementConfig) -> Result<()> {
    let rank = dis.rank();
    let size = dis.comm().size();
    let owners = mesh.vertex_owners(size);
    let mut nodes = BTreeSet::new();
    let mut num_elements = 0;
    for (gid, cell) in mesh.cells.iter().enumerate() {
        let owner = mesh.cell_owner(gid, size);
        if owner != rank {
            continue;
        }
        dis.create_element(
            gid,
            owner,
            element.physics,
            element.variant,
            mesh.shape,
            cell.clone(),
            &element.linedef,
        )?;
        nodes.extend(cell.iter().copied());
        num_elements += 1;
    }
    for gid in nodes {
        dis.add_node(Node::new(gid, owners[gid], mesh.vertices[gid]))?;
    }
    debug!("Rank {} holds {} of {} cells of {}", rank, num_elements, mesh.cells.len(), dis.name());
    Ok(())
}

/// Creates the (unfilled) discretization `name` from a mesh configuration.
pub fn create_discretization(
    name: &str,
    mesh: &MeshConfig,
    element: &ElementConfig,
    comm: Arc<dyn Communicator>,
    registry: Arc<ElementRegistry>,
    materials: Arc<MaterialTable>,
) -> Result<Discretization> {
    let mesh = create_mesh(mesh)?;
    let mut dis = Discretization::new(name, comm, registry, materials);
    populate_discretization(&mut dis, &mesh, element)?;
    Ok(dis)
}
