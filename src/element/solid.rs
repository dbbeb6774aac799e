//! Solid kernels: plane strain in 2D and continuum elements in 3D.
//!
//! Small-deformation elements use the classical strain-displacement operator `B` and an isotropic
//! constitutive matrix. Geometrically nonlinear elements use a total Lagrangian formulation with
//! a St. Venant-Kirchhoff material, including the geometric stiffness. Both are quasi-static:
//! inertia only enters through the mass matrix action.
//!
//! Strains are stored in Voigt notation with engineering shear strains, ordered
//! `xx, yy, zz, xy, yz, xz` in 3D and `xx, yy, xy` in 2D.
use crate::assembly::LocationArray;
use crate::discretization::{Discretization, STATE_PHINP};
use crate::element::registry::ElementRegistry;
use crate::element::{
    add_btdb, evaluate_element_points, read_material, CellShape, Element, ElementData, ElementKernel,
    ElementSystem, Kinematics, PhysicsKind, PointEvaluation, ProblemVariant,
};
use crate::error::{Error, Result};
use crate::linedef::{LineDefinition, LineSchema};
use crate::material::{MaterialKind, MaterialTable};
use crate::params::{Action, ParameterInterface};
use crate::quadrature::GaussRule;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Shapes with a solid kernel.
pub const SOLID_SHAPES: [CellShape; 12] = [
    CellShape::Quad4,
    CellShape::Quad9,
    CellShape::Tri3,
    CellShape::Tri6,
    CellShape::Nurbs9,
    CellShape::Hex8,
    CellShape::Hex20,
    CellShape::Hex27,
    CellShape::Tet4,
    CellShape::Tet10,
    CellShape::Nurbs27,
    CellShape::Pyramid5,
];

/// Isotropic linear elastic constitutive matrix in Voigt notation.
///
/// Two-dimensional matrices assume plane strain.
pub fn isotropic_constitutive_matrix(dim: usize, young: f64, poisson: f64) -> DMatrix<f64> {
    let lambda = young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson));
    let mu = young / (2.0 * (1.0 + poisson));
    let neps = voigt_size(dim);
    let mut d = DMatrix::zeros(neps, neps);
    for i in 0..dim {
        for j in 0..dim {
            d[(i, j)] = if i == j { lambda + 2.0 * mu } else { lambda };
        }
    }
    for i in dim..neps {
        d[(i, i)] = mu;
    }
    d
}

fn voigt_size(dim: usize) -> usize {
    if dim == 2 {
        3
    } else {
        6
    }
}

/// Index pairs of the shear components in Voigt order.
fn shear_pairs(dim: usize) -> &'static [(usize, usize)] {
    if dim == 2 {
        &[(0, 1)]
    } else {
        &[(0, 1), (1, 2), (0, 2)]
    }
}

/// Linear strain-displacement operator.
pub fn linear_b_operator(gradients: &DMatrix<f64>) -> DMatrix<f64> {
    let dim = gradients.nrows();
    let n = gradients.ncols();
    let mut b = DMatrix::zeros(voigt_size(dim), dim * n);
    for a in 0..n {
        for i in 0..dim {
            b[(i, a * dim + i)] = gradients[(i, a)];
        }
        for (s, &(i, j)) in shear_pairs(dim).iter().enumerate() {
            b[(dim + s, a * dim + i)] = gradients[(j, a)];
            b[(dim + s, a * dim + j)] = gradients[(i, a)];
        }
    }
    b
}

/// Nonlinear operator `B_NL = dE/du` for the deformation gradient `f`.
pub fn nonlinear_b_operator(gradients: &DMatrix<f64>, f: &DMatrix<f64>) -> DMatrix<f64> {
    let dim = gradients.nrows();
    let n = gradients.ncols();
    let mut b = DMatrix::zeros(voigt_size(dim), dim * n);
    for a in 0..n {
        for i in 0..dim {
            let col = a * dim + i;
            for k in 0..dim {
                b[(k, col)] = f[(i, k)] * gradients[(k, a)];
            }
            for (s, &(k, l)) in shear_pairs(dim).iter().enumerate() {
                b[(dim + s, col)] = f[(i, k)] * gradients[(l, a)] + f[(i, l)] * gradients[(k, a)];
            }
        }
    }
    b
}

/// Green-Lagrange strain `E = (F^T F - I) / 2` in Voigt notation.
pub fn green_lagrange_strain(f: &DMatrix<f64>) -> DVector<f64> {
    let dim = f.nrows();
    let c = f.tr_mul(f);
    let mut strain = DVector::zeros(voigt_size(dim));
    for i in 0..dim {
        strain[i] = 0.5 * (c[(i, i)] - 1.0);
    }
    for (s, &(i, j)) in shear_pairs(dim).iter().enumerate() {
        strain[dim + s] = c[(i, j)];
    }
    strain
}

fn stress_tensor(dim: usize, stress: &DVector<f64>) -> DMatrix<f64> {
    let mut s = DMatrix::zeros(dim, dim);
    for i in 0..dim {
        s[(i, i)] = stress[i];
    }
    for (k, &(i, j)) in shear_pairs(dim).iter().enumerate() {
        s[(i, j)] = stress[dim + k];
        s[(j, i)] = stress[dim + k];
    }
    s
}

#[derive(Debug, Clone)]
pub struct SolidKernel {
    shape: CellShape,
}

impl SolidKernel {
    pub fn new(shape: CellShape) -> Self {
        assert!(SOLID_SHAPES.contains(&shape), "No solid kernel for {}", shape);
        Self { shape }
    }

    fn dim(&self) -> usize {
        self.shape.reference_dim()
    }

    fn schema(&self) -> LineSchema {
        let gp_arity = GaussRule::optimal_for(self.shape).gp_codes().len();
        let schema = LineSchema::new().required("MAT", 1).optional("KINEM", 1);
        if self.shape == CellShape::Nurbs27 {
            schema.required("GP", gp_arity)
        } else {
            schema.optional("GP", gp_arity)
        }
    }

    fn deformation_gradient(&self, point: &PointEvaluation, displacements: &DVector<f64>) -> DMatrix<f64> {
        let dim = self.dim();
        let mut f = DMatrix::identity(dim, dim);
        for a in 0..point.gradients.ncols() {
            for i in 0..dim {
                for j in 0..dim {
                    f[(i, j)] += displacements[a * dim + i] * point.gradients[(j, a)];
                }
            }
        }
        f
    }

    /// Integrates the tangent stiffness and the internal force vector.
    fn stiffness_and_internal_force(
        &self,
        element: &Element,
        points: &[(f64, PointEvaluation)],
        displacements: &DVector<f64>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let dim = self.dim();
        let ndofs = dim * self.shape.num_nodes();
        let (young, poisson, _) = element.material().elastic_params()?;
        let d = isotropic_constitutive_matrix(dim, young, poisson);
        let mut stiffness = DMatrix::zeros(ndofs, ndofs);
        let mut internal_force = DVector::zeros(ndofs);

        match element.data().kinematics {
            Kinematics::Linear => {
                for (w, point) in points {
                    let b = linear_b_operator(&point.gradients);
                    add_btdb(&mut stiffness, &b, &d, w * point.determinant);
                }
                internal_force.gemv(1.0, &stiffness, displacements, 0.0);
            }
            Kinematics::NonlinearTotLag => {
                for (w, point) in points {
                    let fac = w * point.determinant;
                    let f = self.deformation_gradient(point, displacements);
                    let b = nonlinear_b_operator(&point.gradients, &f);
                    let stress = &d * green_lagrange_strain(&f);
                    internal_force.gemv_tr(fac, &b, &stress, 1.0);
                    add_btdb(&mut stiffness, &b, &d, fac);

                    // Geometric stiffness
                    let s = stress_tensor(dim, &stress);
                    let sg = &s * &point.gradients;
                    let n = point.gradients.ncols();
                    for a in 0..n {
                        for b_node in 0..n {
                            let value: f64 = (0..dim).map(|k| point.gradients[(k, a)] * sg[(k, b_node)]).sum();
                            for i in 0..dim {
                                stiffness[(a * dim + i, b_node * dim + i)] += fac * value;
                            }
                        }
                    }
                }
            }
        }
        Ok((stiffness, internal_force))
    }

    fn mass_matrix(&self, element: &Element, points: &[(f64, PointEvaluation)]) -> Result<DMatrix<f64>> {
        let dim = self.dim();
        let n = self.shape.num_nodes();
        let (_, _, density) = element.material().elastic_params()?;
        let mut mass = DMatrix::zeros(dim * n, dim * n);
        for (w, point) in points {
            let fac = density * w * point.determinant;
            for a in 0..n {
                for b in 0..n {
                    let value = fac * point.values[a] * point.values[b];
                    for i in 0..dim {
                        mass[(a * dim + i, b * dim + i)] += value;
                    }
                }
            }
        }
        Ok(mass)
    }
}

impl ElementKernel for SolidKernel {
    fn physics(&self) -> PhysicsKind {
        PhysicsKind::Solid
    }

    fn shape(&self) -> CellShape {
        self.shape
    }

    fn variant(&self) -> ProblemVariant {
        ProblemVariant::Standard
    }

    fn dofs_per_node(&self) -> usize {
        self.dim()
    }

    fn read_element(
        &self,
        eletype: &str,
        distype: &str,
        linedef: &str,
        materials: &MaterialTable,
    ) -> Result<ElementData> {
        if eletype != PhysicsKind::Solid.element_type_name() || distype != self.shape.name() {
            return Err(Error::Configuration(format!(
                "{} {} record read by the solid {} kernel",
                eletype, distype, self.shape
            )));
        }
        let record = LineDefinition::parse(linedef, &self.schema())?;
        let material = read_material(&record, materials)?;
        if !matches!(
            material.kind(),
            MaterialKind::StVenantKirchhoff | MaterialKind::MicroMaterial
        ) {
            return Err(Error::Configuration(format!(
                "Solid elements require an elastic material, material {} is {}",
                material.id(),
                material.kind()
            )));
        }

        let codes = record.ints("GP")?;
        let (kinematics, gauss_rule) = if self.shape == CellShape::Nurbs27 {
            // Tri-quadratic NURBS demand the full 3x3x3 rule and are always geometrically nonlinear
            let codes = codes.unwrap_or_default();
            if codes != [3, 3, 3] {
                return Err(Error::Configuration(format!(
                    "NURBS27 elements require GP 3 3 3, got {:?}",
                    codes
                )));
            }
            (Kinematics::NonlinearTotLag, GaussRule::Hex(3, 3, 3))
        } else {
            let kinematics = match record.word("KINEM") {
                Some(word) => word.parse::<Kinematics>()?,
                None => Kinematics::Linear,
            };
            let rule = match codes {
                Some(codes) => GaussRule::from_gp_codes(self.shape, &codes)?,
                None => self.optimal_gauss_rule(self.shape)?,
            };
            (kinematics, rule)
        };
        material.valid_kinematics(kinematics)?;

        let mut data = ElementData::new(material, gauss_rule);
        data.kinematics = kinematics;
        Ok(data)
    }

    fn evaluate(
        &self,
        params: &ParameterInterface,
        dis: &Discretization,
        element: &Element,
        la: &LocationArray,
        system: &mut ElementSystem,
    ) -> Result<()> {
        let ndofs = self.dim() * self.shape.num_nodes();
        if la.dofs.len() != ndofs || system.ndofs() != ndofs {
            return Err(Error::Connectivity(format!(
                "Location array of element {} has {} DOFs, expected {}",
                element.gid(),
                la.dofs.len(),
                ndofs
            )));
        }

        match params.action() {
            Action::CalcSystem | Action::CalcInitialTimeDerivative => {
                let coords = dis.element_coords(element)?;
                let points = evaluate_element_points(element, &coords)?;
                let displacements = dis.extract_local(STATE_PHINP, la)?;
                let (stiffness, internal_force) =
                    self.stiffness_and_internal_force(element, &points, &displacements)?;
                system.vector1 -= internal_force;
                if params.action() == Action::CalcSystem {
                    system.matrix1 += stiffness;
                } else {
                    system.matrix1 += self.mass_matrix(element, &points)?;
                }
            }
            Action::CalcMassMatrix => {
                let coords = dis.element_coords(element)?;
                let points = evaluate_element_points(element, &coords)?;
                system.matrix1 += self.mass_matrix(element, &points)?;
            }
            Action::HomogenizeDensity | Action::MultiReadRestart | Action::MultiInvanaInit => {}
        }
        Ok(())
    }

    fn optimal_gauss_rule(&self, shape: CellShape) -> Result<GaussRule> {
        if !SOLID_SHAPES.contains(&shape) {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: "solid elements".to_string(),
            });
        }
        Ok(GaussRule::optimal_for(shape))
    }

    fn load_factor(&self, _params: &ParameterInterface) -> f64 {
        1.0
    }

    fn homogenize_density(&self, dis: &Discretization, element: &Element) -> Result<f64> {
        let coords = dis.element_coords(element)?;
        let (_, _, density) = element.material().elastic_params()?;
        Ok(evaluate_element_points(element, &coords)?
            .iter()
            .map(|(w, point)| point.determinant * w * density)
            .sum())
    }

    fn read_restart_multi(&self, element: &Element) -> Result<()> {
        for gp in 0..element.data().gauss_rule.num_points() {
            element.material().micro_read_restart(element.gid(), gp);
        }
        Ok(())
    }

    fn invana_init(&self, element: &Element) -> Result<()> {
        for gp in 0..element.data().gauss_rule.num_points() {
            element.material().micro_invana_init(element.gid(), gp);
        }
        Ok(())
    }
}

pub(crate) fn register(registry: &mut ElementRegistry) {
    for shape in SOLID_SHAPES {
        registry.register(Arc::new(SolidKernel::new(shape)));
    }
}
