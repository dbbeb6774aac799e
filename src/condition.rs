//! Boundary and coupling conditions attached to a discretization.
use crate::element::CellShape;
use crate::error::{Error, Result};
use crate::function::FunctionManager;
use crate::Gid;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

pub const DIRICHLET: &str = "Dirichlet";
pub const POINT_NEUMANN: &str = "PointNeumann";
pub const LINE_NEUMANN: &str = "LineNeumann";
pub const SURFACE_NEUMANN: &str = "SurfaceNeumann";
pub const VOLUME_NEUMANN: &str = "VolumeNeumann";

/// Names of all Neumann conditions evaluated on cells, in evaluation order.
pub const CELL_NEUMANN_CONDITIONS: [&str; 3] = [LINE_NEUMANN, SURFACE_NEUMANN, VOLUME_NEUMANN];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Surface,
    Volume,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplingSide {
    Slave,
    Master,
}

/// A boundary (or volume) cell over which a distributed load is integrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCell {
    pub shape: CellShape,
    pub node_ids: Vec<Gid>,
}

impl BoundaryCell {
    pub fn new(shape: CellShape, node_ids: Vec<Gid>) -> Self {
        Self { shape, node_ids }
    }
}

/// A named condition on a node set and, for distributed loads, a set of cells.
///
/// Per-DOF data (`onoff`, `values`, `functions`) has one entry per DOF of the node. A DOF with
/// `onoff[i] == false` is not affected by the condition. A function id scales the value in time
/// (and space).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub kind: GeometryKind,
    pub node_ids: Vec<Gid>,
    #[serde(default)]
    pub cells: Vec<BoundaryCell>,
    pub onoff: Vec<bool>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub functions: Vec<Option<usize>>,
    #[serde(default)]
    pub side: Option<CouplingSide>,
}

impl Condition {
    pub fn new(name: &str, kind: GeometryKind, node_ids: Vec<Gid>) -> Self {
        let mut node_ids = node_ids;
        node_ids.sort_unstable();
        node_ids.dedup();
        Self {
            name: name.to_string(),
            kind,
            node_ids,
            cells: Vec::new(),
            onoff: Vec::new(),
            values: Vec::new(),
            functions: Vec::new(),
            side: None,
        }
    }

    /// Dirichlet condition prescribing `values[i]` on every DOF `i` with `onoff[i]`.
    pub fn dirichlet(node_ids: Vec<Gid>, onoff: Vec<bool>, values: Vec<f64>) -> Self {
        Self::new(DIRICHLET, GeometryKind::Point, node_ids).with_values(onoff, values)
    }

    pub fn point_neumann(node_ids: Vec<Gid>, onoff: Vec<bool>, values: Vec<f64>) -> Self {
        Self::new(POINT_NEUMANN, GeometryKind::Point, node_ids).with_values(onoff, values)
    }

    /// Distributed load on the given cells. The condition name follows from the geometry kind.
    pub fn neumann(kind: GeometryKind, cells: Vec<BoundaryCell>, onoff: Vec<bool>, values: Vec<f64>) -> Self {
        let name = match kind {
            GeometryKind::Point => POINT_NEUMANN,
            GeometryKind::Line => LINE_NEUMANN,
            GeometryKind::Surface => SURFACE_NEUMANN,
            GeometryKind::Volume => VOLUME_NEUMANN,
        };
        let node_ids = cells.iter().flat_map(|cell| cell.node_ids.iter().copied()).collect();
        let mut condition = Self::new(name, kind, node_ids).with_values(onoff, values);
        condition.cells = cells;
        condition
    }

    pub fn with_values(mut self, onoff: Vec<bool>, values: Vec<f64>) -> Self {
        self.functions = vec![None; values.len()];
        self.onoff = onoff;
        self.values = values;
        self
    }

    pub fn with_functions(mut self, functions: Vec<Option<usize>>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_side(mut self, side: CouplingSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn contains_node(&self, node: Gid) -> bool {
        self.node_ids.binary_search(&node).is_ok()
    }

    pub fn is_active(&self, dof: usize) -> bool {
        self.onoff.get(dof).copied().unwrap_or(false)
    }

    /// Value of the condition for the given DOF at `x` and time `t`, zero for inactive DOFs.
    pub fn value(&self, dof: usize, x: &Point3<f64>, t: f64, functions: &FunctionManager) -> Result<f64> {
        if !self.is_active(dof) {
            return Ok(0.0);
        }
        let value = self.values.get(dof).copied().ok_or_else(|| {
            Error::Configuration(format!(
                "Condition {} is active for DOF {} but has no value for it",
                self.name, dof
            ))
        })?;
        match self.functions.get(dof).copied().flatten() {
            Some(id) => Ok(value * functions.evaluate(id, dof, x, t)?),
            None => Ok(value),
        }
    }
}
