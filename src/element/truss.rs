//! Axial bar elements embedded in 3D space (three DOFs per node).
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
use nalgebra::{DMatrix, DVector, Point3, Vector3};
use std::sync::Arc;

const DIM: usize = 3;

#[derive(Debug, Clone)]
pub struct TrussKernel {
    shape: CellShape,
}

impl TrussKernel {
    pub fn new(shape: CellShape) -> Self {
        assert!(
            matches!(shape, CellShape::Line2 | CellShape::Line3),
            "No truss kernel for {}",
            shape
        );
        Self { shape }
    }

    fn schema() -> LineSchema {
        LineSchema::new()
            .required("MAT", 1)
            .required("CROSS", 1)
            .optional("KINEM", 1)
            .optional("GP", 1)
    }

    fn cross_section(element: &Element) -> Result<f64> {
        element.data().cross_section.ok_or_else(|| {
            Error::Configuration(format!("Truss element {} has no cross section", element.gid()))
        })
    }

    /// Derivative `dx/ds` of the position `X + u` along the reference arc length.
    fn stretch_direction(
        point: &PointEvaluation,
        coords: &[Point3<f64>],
        displacements: &DVector<f64>,
    ) -> Vector3<f64> {
        let mut direction = Vector3::zeros();
        for (a, x) in coords.iter().enumerate() {
            let u = Vector3::new(
                displacements[DIM * a],
                displacements[DIM * a + 1],
                displacements[DIM * a + 2],
            );
            direction += (x.coords + u) * point.gradients[(0, a)];
        }
        direction
    }

    fn stiffness_and_internal_force(
        &self,
        element: &Element,
        coords: &[Point3<f64>],
        displacements: &DVector<f64>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let n = self.shape.num_nodes();
        let area = Self::cross_section(element)?;
        let (young, _, _) = element.material().elastic_params()?;
        let axial = DMatrix::from_element(1, 1, young * area);
        let mut stiffness = DMatrix::zeros(DIM * n, DIM * n);
        let mut internal_force = DVector::zeros(DIM * n);

        for (w, point) in evaluate_element_points(element, coords)? {
            let fac = w * point.determinant;
            match element.data().kinematics {
                Kinematics::Linear => {
                    let tangent = Self::stretch_direction(&point, coords, &DVector::zeros(DIM * n));
                    let b = DMatrix::from_fn(1, DIM * n, |_, col| point.gradients[(0, col / DIM)] * tangent[col % DIM]);
                    add_btdb(&mut stiffness, &b, &axial, fac);
                }
                Kinematics::NonlinearTotLag => {
                    let direction = Self::stretch_direction(&point, coords, displacements);
                    let strain = 0.5 * (direction.norm_squared() - 1.0);
                    let stress = young * strain;
                    let b = DMatrix::from_fn(1, DIM * n, |_, col| point.gradients[(0, col / DIM)] * direction[col % DIM]);
                    add_btdb(&mut stiffness, &b, &axial, fac);
                    internal_force += b.row(0).transpose() * (fac * area * stress);
                    for a in 0..n {
                        for c in 0..n {
                            let value = fac * area * stress * point.gradients[(0, a)] * point.gradients[(0, c)];
                            for i in 0..DIM {
                                stiffness[(DIM * a + i, DIM * c + i)] += value;
                            }
                        }
                    }
                }
            }
        }
        if element.data().kinematics == Kinematics::Linear {
            internal_force.gemv(1.0, &stiffness, displacements, 0.0);
        }
        Ok((stiffness, internal_force))
    }

    fn mass_matrix(&self, element: &Element, coords: &[Point3<f64>]) -> Result<DMatrix<f64>> {
        let n = self.shape.num_nodes();
        let area = Self::cross_section(element)?;
        let (_, _, density) = element.material().elastic_params()?;
        let mut mass = DMatrix::zeros(DIM * n, DIM * n);
        for (w, point) in evaluate_element_points(element, coords)? {
            let fac = density * area * w * point.determinant;
            for a in 0..n {
                for c in 0..n {
                    let value = fac * point.values[a] * point.values[c];
                    for i in 0..DIM {
                        mass[(DIM * a + i, DIM * c + i)] += value;
                    }
                }
            }
        }
        Ok(mass)
    }
}

impl ElementKernel for TrussKernel {
    fn physics(&self) -> PhysicsKind {
        PhysicsKind::Truss
    }

    fn shape(&self) -> CellShape {
        self.shape
    }

    fn variant(&self) -> ProblemVariant {
        ProblemVariant::Standard
    }

    fn dofs_per_node(&self) -> usize {
        DIM
    }

    fn read_element(
        &self,
        eletype: &str,
        distype: &str,
        linedef: &str,
        materials: &MaterialTable,
    ) -> Result<ElementData> {
        if eletype != PhysicsKind::Truss.element_type_name() || distype != self.shape.name() {
            return Err(Error::Configuration(format!(
                "{} {} record read by the truss {} kernel",
                eletype, distype, self.shape
            )));
        }
        let record = LineDefinition::parse(linedef, &Self::schema())?;
        let material = read_material(&record, materials)?;
        if material.kind() != MaterialKind::StVenantKirchhoff {
            return Err(Error::Configuration(format!(
                "Truss elements require a St. Venant-Kirchhoff material, material {} is {}",
                material.id(),
                material.kind()
            )));
        }
        let kinematics = match record.word("KINEM") {
            Some(word) => word.parse::<Kinematics>()?,
            None => Kinematics::Linear,
        };
        material.valid_kinematics(kinematics)?;

        let cross_section = record
            .real("CROSS")?
            .ok_or_else(|| Error::Configuration("Truss record without CROSS".to_string()))?;
        if cross_section <= 0.0 {
            return Err(Error::Configuration(format!(
                "Truss cross section must be positive, got {}",
                cross_section
            )));
        }

        let gauss_rule = match record.ints("GP")? {
            Some(codes) => GaussRule::from_gp_codes(self.shape, &codes)?,
            None => self.optimal_gauss_rule(self.shape)?,
        };

        let mut data = ElementData::new(material, gauss_rule);
        data.kinematics = kinematics;
        data.cross_section = Some(cross_section);
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
        let ndofs = DIM * self.shape.num_nodes();
        if la.dofs.len() != ndofs || system.ndofs() != ndofs {
            return Err(Error::Connectivity(format!(
                "Location array of element {} has {} DOFs, expected {}",
                element.gid(),
                la.dofs.len(),
                ndofs
            )));
        }

        let coords = dis.element_coords(element)?;
        match params.action() {
            Action::CalcSystem => {
                let displacements = dis.extract_local(STATE_PHINP, la)?;
                let (stiffness, internal_force) =
                    self.stiffness_and_internal_force(element, &coords, &displacements)?;
                system.vector1 -= internal_force;
                system.matrix1 += stiffness;
            }
            Action::CalcMassMatrix => {
                system.matrix1 += self.mass_matrix(element, &coords)?;
            }
            Action::CalcInitialTimeDerivative => {
                let displacements = dis.extract_local(STATE_PHINP, la)?;
                let (_, internal_force) = self.stiffness_and_internal_force(element, &coords, &displacements)?;
                system.vector1 -= internal_force;
                system.matrix1 += self.mass_matrix(element, &coords)?;
            }
            Action::HomogenizeDensity | Action::MultiReadRestart | Action::MultiInvanaInit => {}
        }
        Ok(())
    }

    fn optimal_gauss_rule(&self, shape: CellShape) -> Result<GaussRule> {
        match shape {
            CellShape::Line2 => Ok(GaussRule::Line(2)),
            CellShape::Line3 => Ok(GaussRule::Line(3)),
            _ => Err(Error::UnsupportedCellShape {
                shape,
                context: "truss elements are line2 or line3".to_string(),
            }),
        }
    }

    fn load_factor(&self, _params: &ParameterInterface) -> f64 {
        1.0
    }

    fn homogenize_density(&self, dis: &Discretization, element: &Element) -> Result<f64> {
        let coords = dis.element_coords(element)?;
        let area = Self::cross_section(element)?;
        let (_, _, density) = element.material().elastic_params()?;
        Ok(evaluate_element_points(element, &coords)?
            .iter()
            .map(|(w, point)| point.determinant * w * density * area)
            .sum())
    }
}

pub(crate) fn register(registry: &mut ElementRegistry) {
    for shape in [CellShape::Line2, CellShape::Line3] {
        registry.register(Arc::new(TrussKernel::new(shape)));
    }
}
