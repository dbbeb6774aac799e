//! Elements, the element kernel interface and the kernels shared by all physics.
use crate::assembly::LocationArray;
use crate::condition::{BoundaryCell, Condition};
use crate::discretization::Discretization;
use crate::error::{Error, Result};
use crate::material::{Material, MaterialTable};
use crate::params::ParameterInterface;
use crate::quadrature::GaussRule;
use crate::Gid;
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

pub mod basis;
pub mod registry;
pub mod shell;

#[cfg(feature = "solid")]
pub mod solid;
#[cfg(feature = "transport")]
pub mod transport;
#[cfg(feature = "truss")]
pub mod truss;

mod shape;

pub use registry::ElementRegistry;
pub use shape::CellShape;

/// Physics family of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhysicsKind {
    Transport,
    Thermo,
    Solid,
    Truss,
}

impl PhysicsKind {
    pub const ALL: [PhysicsKind; 4] = [
        PhysicsKind::Transport,
        PhysicsKind::Thermo,
        PhysicsKind::Solid,
        PhysicsKind::Truss,
    ];

    /// Element type name as used in input records.
    pub fn element_type_name(&self) -> &'static str {
        match self {
            PhysicsKind::Transport => "TRANSP",
            PhysicsKind::Thermo => "THERMO",
            PhysicsKind::Solid => "SOLID",
            PhysicsKind::Truss => "TRUSS3",
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Invalid physics code {}", code)))
    }
}

impl Display for PhysicsKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element_type_name())
    }
}

/// Problem variant selecting a kernel specialization within a physics family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProblemVariant {
    Standard,
    LevelSet,
    /// Extended finite elements. Only a restricted set of shapes is instantiated.
    Xfem,
}

impl ProblemVariant {
    pub const ALL: [ProblemVariant; 3] = [ProblemVariant::Standard, ProblemVariant::LevelSet, ProblemVariant::Xfem];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Invalid problem variant code {}", code)))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kinematics {
    Linear,
    /// Total Lagrangian, geometrically nonlinear.
    NonlinearTotLag,
}

impl Kinematics {
    pub fn code(&self) -> u8 {
        match self {
            Kinematics::Linear => 0,
            Kinematics::NonlinearTotLag => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Kinematics::Linear),
            1 => Ok(Kinematics::NonlinearTotLag),
            _ => Err(Error::Configuration(format!("Invalid kinematics code {}", code))),
        }
    }
}

impl Display for Kinematics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Kinematics::Linear => write!(f, "linear"),
            Kinematics::NonlinearTotLag => write!(f, "nonlinearTotLag"),
        }
    }
}

impl FromStr for Kinematics {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(Kinematics::Linear),
            "nonlinear" | "nonlinearTotLag" => Ok(Kinematics::NonlinearTotLag),
            _ => Err(Error::Configuration(format!("Unknown kinematic type \"{}\"", s))),
        }
    }
}

/// Data read from an element record.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub material: Arc<Material>,
    pub kinematics: Kinematics,
    pub gauss_rule: GaussRule,
    /// Cross section area of line elements.
    pub cross_section: Option<f64>,
    /// Function id of a convective velocity field.
    pub convection: Option<usize>,
}

impl ElementData {
    pub fn new(material: Arc<Material>, gauss_rule: GaussRule) -> Self {
        Self {
            material,
            kinematics: Kinematics::Linear,
            gauss_rule,
            cross_section: None,
            convection: None,
        }
    }
}

/// A finite element. Nodes are referenced by id and resolved through the owning discretization.
#[derive(Clone)]
pub struct Element {
    pub(crate) gid: Gid,
    pub(crate) owner: usize,
    pub(crate) node_ids: Vec<Gid>,
    pub(crate) shape: CellShape,
    pub(crate) physics: PhysicsKind,
    pub(crate) variant: ProblemVariant,
    pub(crate) data: ElementData,
    pub(crate) kernel: Arc<dyn ElementKernel>,
}

impl Debug for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("gid", &self.gid)
            .field("owner", &self.owner)
            .field("node_ids", &self.node_ids)
            .field("shape", &self.shape)
            .field("physics", &self.physics)
            .field("variant", &self.variant)
            .field("material", &self.data.material.id())
            .finish()
    }
}

impl Element {
    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn node_ids(&self) -> &[Gid] {
        &self.node_ids
    }

    pub fn shape(&self) -> CellShape {
        self.shape
    }

    pub fn physics(&self) -> PhysicsKind {
        self.physics
    }

    pub fn variant(&self) -> ProblemVariant {
        self.variant
    }

    pub fn data(&self) -> &ElementData {
        &self.data
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.data.material
    }

    pub fn kernel(&self) -> &Arc<dyn ElementKernel> {
        &self.kernel
    }

    pub fn dofs_per_node(&self) -> usize {
        self.kernel.dofs_per_node()
    }

    pub(crate) fn set_node_ids(&mut self, node_ids: Vec<Gid>) {
        self.node_ids = node_ids;
    }
}

/// Caller-provided local containers of an element evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSystem {
    pub matrix1: DMatrix<f64>,
    pub matrix2: DMatrix<f64>,
    pub vector1: DVector<f64>,
    pub vector2: DVector<f64>,
    pub vector3: DVector<f64>,
}

impl ElementSystem {
    pub fn new(ndofs: usize) -> Self {
        Self {
            matrix1: DMatrix::zeros(ndofs, ndofs),
            matrix2: DMatrix::zeros(ndofs, ndofs),
            vector1: DVector::zeros(ndofs),
            vector2: DVector::zeros(ndofs),
            vector3: DVector::zeros(ndofs),
        }
    }

    /// Resizes all containers to `ndofs` and fills them with zeros.
    pub fn reset(&mut self, ndofs: usize) {
        if self.vector1.len() != ndofs {
            *self = Self::new(ndofs);
        } else {
            self.matrix1.fill(0.0);
            self.matrix2.fill(0.0);
            self.vector1.fill(0.0);
            self.vector2.fill(0.0);
            self.vector3.fill(0.0);
        }
    }

    pub fn ndofs(&self) -> usize {
        self.vector1.len()
    }
}

/// The contract between the assembly engine and a shape-specialized element kernel.
///
/// Kernels are stateless and shared by all elements with the same (physics, shape, variant)
/// key. Element-specific data lives in [`ElementData`].
pub trait ElementKernel: Send + Sync {
    fn physics(&self) -> PhysicsKind;

    fn shape(&self) -> CellShape;

    fn variant(&self) -> ProblemVariant;

    fn dofs_per_node(&self) -> usize;

    /// Reads an element record of type `eletype` and shape name `distype`.
    fn read_element(&self, eletype: &str, distype: &str, linedef: &str, materials: &MaterialTable)
        -> Result<ElementData>;

    /// Evaluates the element for the action of `params`, writing into the containers of `system`,
    /// which are sized according to `la`.
    fn evaluate(
        &self,
        params: &ParameterInterface,
        dis: &Discretization,
        element: &Element,
        la: &LocationArray,
        system: &mut ElementSystem,
    ) -> Result<()>;

    /// Integrates a distributed load of `condition` over `cell`, which must be a sub-cell of
    /// `element`. `la` holds the DOFs of the cell nodes.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_neumann(
        &self,
        params: &ParameterInterface,
        dis: &Discretization,
        element: &Element,
        condition: &Condition,
        cell: &BoundaryCell,
        la: &LocationArray,
        force: &mut DVector<f64>,
        _stiffness: Option<&mut DMatrix<f64>>,
    ) -> Result<()> {
        let coords = dis.node_coords_of(&cell.node_ids)?;
        if la.dofs.len() != cell.node_ids.len() * self.dofs_per_node() {
            return Err(Error::Connectivity(format!(
                "Location array of {} DOFs does not match cell with {} nodes",
                la.dofs.len(),
                cell.node_ids.len()
            )));
        }
        integrate_cell_load(
            cell.shape,
            &coords,
            condition,
            self.dofs_per_node(),
            params,
            self.load_factor(params),
            force,
        )
        .map_err(|err| match err {
            Error::NegativeJacobian { determinant, .. } => Error::NegativeJacobian {
                element: element.gid(),
                determinant,
            },
            other => other,
        })
    }

    /// Quadrature rule that integrates the element operators of `shape` exactly (for affine
    /// geometry).
    fn optimal_gauss_rule(&self, shape: CellShape) -> Result<GaussRule>;

    /// Factor applied to external loads of this physics.
    fn load_factor(&self, params: &ParameterInterface) -> f64 {
        params.time_factors().load_factor()
    }

    /// Accumulates the mass `sum detJ * w * rho` of the element.
    fn homogenize_density(&self, _dis: &Discretization, _element: &Element) -> Result<f64> {
        Ok(0.0)
    }

    /// Broadcasts a restart read to the micro-scale problem of every Gauss point.
    fn read_restart_multi(&self, _element: &Element) -> Result<()> {
        Ok(())
    }

    /// Broadcasts the inverse-analysis initialization to every Gauss point.
    fn invana_init(&self, _element: &Element) -> Result<()> {
        Ok(())
    }
}

/// `K += fac * B^T D B` for a strain-displacement operator `B` (`neps x nd`) and a constitutive
/// matrix `D` (`neps x neps`).
///
/// For each column `j` of `B`, the product `db = fac * D B[:, j]` is formed first and then
/// contracted with the columns of `B`. The summation order is fixed.
pub fn add_btdb(k: &mut DMatrix<f64>, b: &DMatrix<f64>, d: &DMatrix<f64>, fac: f64) {
    let neps = b.nrows();
    let nd = b.ncols();
    assert_eq!(d.nrows(), neps);
    assert_eq!(d.ncols(), neps);
    assert_eq!(k.nrows(), nd);
    assert_eq!(k.ncols(), nd);

    let mut db = vec![0.0; neps];
    for j in 0..nd {
        for (row, db_row) in db.iter_mut().enumerate() {
            let mut sum = 0.0;
            for l in 0..neps {
                sum += d[(row, l)] * b[(l, j)] * fac;
            }
            *db_row = sum;
        }
        for i in 0..nd {
            let mut sum = 0.0;
            for (m, db_m) in db.iter().enumerate() {
                sum += b[(m, i)] * db_m;
            }
            k[(i, j)] += sum;
        }
    }
}

/// Jacobian `dX/dxi` of the reference-to-physical map, with one row per reference dimension.
pub fn reference_jacobian(derivatives: &DMatrix<f64>, coords: &[Point3<f64>]) -> DMatrix<f64> {
    let dim = derivatives.nrows();
    DMatrix::from_fn(dim, 3, |r, c| {
        coords
            .iter()
            .enumerate()
            .map(|(a, x)| derivatives[(r, a)] * x[c])
            .sum()
    })
}

/// Determinant of the reference-to-physical map of a cell living in its own dimension.
///
/// Two-dimensional cells are assumed to lie in the xy-plane. For line cells the length of
/// `dX/dxi` is returned, which is never negative.
pub fn jacobian_determinant(shape: CellShape, coords: &[Point3<f64>], xi: &Point3<f64>) -> f64 {
    let derivatives = basis::shape_derivatives(shape, xi);
    let jac = reference_jacobian(&derivatives, coords);
    match shape.reference_dim() {
        1 => jac.row(0).norm(),
        2 => jac[(0, 0)] * jac[(1, 1)] - jac[(0, 1)] * jac[(1, 0)],
        _ => Matrix3::from_fn(|r, c| jac[(r, c)]).determinant(),
    }
}

/// Shape functions and their physical derivatives at one quadrature point.
#[derive(Debug, Clone)]
pub struct PointEvaluation {
    pub values: DVector<f64>,
    /// Physical derivatives, one row per reference dimension.
    pub gradients: DMatrix<f64>,
    pub determinant: f64,
    pub position: Point3<f64>,
}

/// Evaluates shape functions and physical gradients at `xi`.
///
/// Line cells are differentiated along their arc length. Fails with
/// [`Error::NegativeJacobian`] (with element id 0, to be filled in by the caller) if the
/// determinant is not positive.
pub fn evaluate_point(shape: CellShape, coords: &[Point3<f64>], xi: &Point3<f64>) -> Result<PointEvaluation> {
    let (values, derivatives) = basis::shape_functions_and_derivatives(shape, xi);
    let jac = reference_jacobian(&derivatives, coords);
    let position = coords
        .iter()
        .zip(values.iter())
        .fold(Point3::origin(), |acc, (x, n)| acc + x.coords * *n);
    let determinant = jacobian_determinant(shape, coords, xi);
    if determinant <= 0.0 {
        return Err(Error::NegativeJacobian { element: 0, determinant });
    }
    let gradients = match shape.reference_dim() {
        1 => derivatives / determinant,
        2 => {
            let j2 = Matrix2::new(jac[(0, 0)], jac[(0, 1)], jac[(1, 0)], jac[(1, 1)]);
            let inv = j2
                .try_inverse()
                .ok_or(Error::NegativeJacobian { element: 0, determinant })?;
            DMatrix::from_fn(2, derivatives.ncols(), |r, a| {
                inv[(r, 0)] * derivatives[(0, a)] + inv[(r, 1)] * derivatives[(1, a)]
            })
        }
        _ => {
            let j3 = Matrix3::from_fn(|r, c| jac[(r, c)]);
            let inv = j3
                .try_inverse()
                .ok_or(Error::NegativeJacobian { element: 0, determinant })?;
            DMatrix::from_fn(3, derivatives.ncols(), |r, a| {
                (0..3).map(|c| inv[(r, c)] * derivatives[(c, a)]).sum()
            })
        }
    };
    Ok(PointEvaluation {
        values,
        gradients,
        determinant,
        position,
    })
}

/// Evaluates the element at every point of its rule, attributing geometry faults to the element.
pub fn evaluate_element_points(
    element: &Element,
    coords: &[Point3<f64>],
) -> Result<Vec<(f64, PointEvaluation)>> {
    element
        .data
        .gauss_rule
        .points()
        .iter()
        .map(|(w, xi)| {
            evaluate_point(element.shape, coords, xi)
                .map(|point| (w, point))
                .map_err(|err| match err {
                    Error::NegativeJacobian { determinant, .. } => Error::NegativeJacobian {
                        element: element.gid,
                        determinant,
                    },
                    other => other,
                })
        })
        .collect()
}

/// Measure of the map of an embedded cell: length, area or volume element.
pub fn cell_measure(shape: CellShape, coords: &[Point3<f64>], xi: &Point3<f64>) -> f64 {
    let derivatives = basis::shape_derivatives(shape, xi);
    let jac = reference_jacobian(&derivatives, coords);
    match shape.reference_dim() {
        1 => jac.row(0).norm(),
        2 => {
            let t1 = nalgebra::Vector3::new(jac[(0, 0)], jac[(0, 1)], jac[(0, 2)]);
            let t2 = nalgebra::Vector3::new(jac[(1, 0)], jac[(1, 1)], jac[(1, 2)]);
            t1.cross(&t2).norm()
        }
        _ => Matrix3::from_fn(|r, c| jac[(r, c)]).determinant().abs(),
    }
}

/// Integrates the consistent nodal load `int N_a t_i dA` of a condition over a cell, for every
/// node `a` and each of the `dofs_per_node` components `i`.
pub fn integrate_cell_load(
    shape: CellShape,
    coords: &[Point3<f64>],
    condition: &Condition,
    dofs_per_node: usize,
    params: &ParameterInterface,
    scale: f64,
    force: &mut DVector<f64>,
) -> Result<()> {
    let n = shape.num_nodes();
    if coords.len() != n || force.len() != n * dofs_per_node {
        return Err(Error::Connectivity(format!(
            "Cell of shape {} with {} nodes does not match {} load entries",
            shape,
            coords.len(),
            force.len()
        )));
    }
    for (w, xi) in GaussRule::optimal_for(shape).points().iter() {
        let (values, _) = basis::shape_functions_and_derivatives(shape, xi);
        let measure = cell_measure(shape, coords, xi);
        if measure <= 0.0 {
            return Err(Error::NegativeJacobian {
                element: 0,
                determinant: measure,
            });
        }
        let position = coords
            .iter()
            .zip(values.iter())
            .fold(Point3::origin(), |acc, (x, n)| acc + x.coords * *n);
        for i in 0..dofs_per_node {
            let load = condition.value(i, &position, params.total_time(), params.functions())?;
            if load == 0.0 {
                continue;
            }
            for a in 0..n {
                force[a * dofs_per_node + i] += scale * values[a] * load * measure * w;
            }
        }
    }
    Ok(())
}

/// Validates that a `MAT` reference exists and returns the material.
pub(crate) fn read_material(linedef: &crate::linedef::LineDefinition, materials: &MaterialTable) -> Result<Arc<Material>> {
    let id = linedef
        .int("MAT")?
        .ok_or_else(|| Error::Configuration("Element record without MAT".to_string()))?;
    materials.get(id)
}
