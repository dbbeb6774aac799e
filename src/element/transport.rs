//! Scalar transport and heat conduction kernels (one DOF per node).
//!
//! Per element, the capacity matrix `M = int c N N` and the transport operator
//! `K = int k grad N . grad N + N (u . grad N)` are integrated. The residual handed to the
//! assembly engine is `r = -(M (phi - hist) + timefac K phi)` for transient schemes and
//! `r = -K phi` for stationary ones, with Jacobian `M + timefac K` or `K`, respectively.
use crate::assembly::LocationArray;
use crate::discretization::{Discretization, STATE_HIST, STATE_PHINP};
use crate::element::registry::{ElementRegistry, INSTANTIATED_SHAPES, XFEM_SHAPES};
use crate::element::{
    evaluate_element_points, read_material, CellShape, Element, ElementData, ElementKernel, ElementSystem,
    Kinematics, PhysicsKind, ProblemVariant,
};
use crate::error::{Error, Result};
use crate::linedef::{LineDefinition, LineSchema};
use crate::material::{MaterialKind, MaterialTable};
use crate::params::{Action, ParameterInterface};
use crate::quadrature::GaussRule;
use nalgebra::{DMatrix, DVector, Point3};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TransportKernel {
    physics: PhysicsKind,
    shape: CellShape,
    variant: ProblemVariant,
}

impl TransportKernel {
    pub fn new(physics: PhysicsKind, shape: CellShape, variant: ProblemVariant) -> Self {
        assert!(matches!(physics, PhysicsKind::Transport | PhysicsKind::Thermo));
        Self { physics, shape, variant }
    }

    fn schema(&self) -> LineSchema {
        let gp_arity = GaussRule::optimal_for(self.shape).gp_codes().len();
        LineSchema::new()
            .required("MAT", 1)
            .optional("KINEM", 1)
            .optional("GP", gp_arity)
            .optional("CONV", 1)
    }

    /// Returns `(diffusivity, capacity)` used by this kernel.
    fn coefficients(&self, element: &Element) -> Result<(f64, f64)> {
        match self.variant {
            // The level-set field is transported by pure convection
            ProblemVariant::LevelSet => Ok((0.0, 1.0)),
            _ => element.material().transport_params(),
        }
    }

    /// Integrates the capacity matrix and the transport operator.
    fn operators(
        &self,
        params: &ParameterInterface,
        element: &Element,
        coords: &[Point3<f64>],
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let n = self.shape.num_nodes();
        let (diffusivity, capacity) = self.coefficients(element)?;
        let mut mass = DMatrix::zeros(n, n);
        let mut stiffness = DMatrix::zeros(n, n);

        for (w, point) in evaluate_element_points(element, coords)? {
            let fac = w * point.determinant;
            let dim = point.gradients.nrows();

            mass.ger(capacity * fac, &point.values, &point.values, 1.0);
            let grad_t = point.gradients.transpose();
            stiffness.gemm(diffusivity * fac, &grad_t, &point.gradients, 1.0);

            if let Some(conv) = element.data().convection {
                let mut velocity = DVector::zeros(dim);
                for i in 0..dim {
                    velocity[i] = params
                        .functions()
                        .evaluate(conv, i, &point.position, params.total_time())?;
                }
                // u . grad N_b for every node b
                let convective = point.gradients.tr_mul(&velocity);
                stiffness.ger(fac, &point.values, &convective, 1.0);
            }
        }
        Ok((mass, stiffness))
    }
}

impl ElementKernel for TransportKernel {
    fn physics(&self) -> PhysicsKind {
        self.physics
    }

    fn shape(&self) -> CellShape {
        self.shape
    }

    fn variant(&self) -> ProblemVariant {
        self.variant
    }

    fn dofs_per_node(&self) -> usize {
        1
    }

    fn read_element(
        &self,
        eletype: &str,
        distype: &str,
        linedef: &str,
        materials: &MaterialTable,
    ) -> Result<ElementData> {
        if eletype != self.physics.element_type_name() || distype != self.shape.name() {
            return Err(Error::Configuration(format!(
                "{} {} record read by the {} {} kernel",
                eletype, distype, self.physics, self.shape
            )));
        }
        let record = LineDefinition::parse(linedef, &self.schema())?;
        let material = read_material(&record, materials)?;

        let expected = match self.physics {
            PhysicsKind::Thermo => MaterialKind::Fourier,
            _ => MaterialKind::Scatra,
        };
        if self.variant != ProblemVariant::LevelSet && material.kind() != expected {
            return Err(Error::Configuration(format!(
                "{} elements require a {} material, material {} is {}",
                self.physics,
                expected,
                material.id(),
                material.kind()
            )));
        }

        let kinematics = match record.word("KINEM") {
            Some(word) => word.parse::<Kinematics>()?,
            None => Kinematics::Linear,
        };
        material.valid_kinematics(kinematics)?;

        let gauss_rule = match record.ints("GP")? {
            Some(codes) => GaussRule::from_gp_codes(self.shape, &codes)?,
            None => self.optimal_gauss_rule(self.shape)?,
        };

        let mut data = ElementData::new(material, gauss_rule);
        data.kinematics = kinematics;
        data.convection = record.int("CONV")?;
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
        let n = self.shape.num_nodes();
        if la.dofs.len() != n || system.ndofs() != n {
            return Err(Error::Connectivity(format!(
                "Location array of element {} has {} DOFs, expected {}",
                element.gid(),
                la.dofs.len(),
                n
            )));
        }

        match params.action() {
            Action::CalcSystem => {
                let coords = dis.element_coords(element)?;
                let (mass, stiffness) = self.operators(params, element, &coords)?;
                let phi = dis.extract_local(STATE_PHINP, la)?;
                let factors = params.time_factors();
                if factors.stationary {
                    system.vector1 -= &stiffness * &phi;
                    system.matrix1 += &stiffness;
                } else {
                    let hist = dis.extract_local(STATE_HIST, la)?;
                    let timefac = factors.timefac;
                    system.vector1 -= &mass * (&phi - hist) + (&stiffness * &phi) * timefac;
                    system.matrix1 += mass + stiffness * timefac;
                }
            }
            Action::CalcMassMatrix => {
                let coords = dis.element_coords(element)?;
                let (mass, _) = self.operators(params, element, &coords)?;
                system.matrix1 += mass;
            }
            Action::CalcInitialTimeDerivative => {
                let coords = dis.element_coords(element)?;
                let (mass, stiffness) = self.operators(params, element, &coords)?;
                let phi = dis.extract_local(STATE_PHINP, la)?;
                system.vector1 -= &stiffness * &phi;
                system.matrix1 += mass;
            }
            Action::HomogenizeDensity | Action::MultiReadRestart | Action::MultiInvanaInit => {}
        }
        Ok(())
    }

    fn optimal_gauss_rule(&self, shape: CellShape) -> Result<GaussRule> {
        if !INSTANTIATED_SHAPES.contains(&shape) {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: "transport elements".to_string(),
            });
        }
        Ok(GaussRule::optimal_for(shape))
    }
}

pub(crate) fn register(registry: &mut ElementRegistry) {
    for shape in INSTANTIATED_SHAPES {
        registry.register(Arc::new(TransportKernel::new(
            PhysicsKind::Transport,
            shape,
            ProblemVariant::Standard,
        )));
        registry.register(Arc::new(TransportKernel::new(
            PhysicsKind::Transport,
            shape,
            ProblemVariant::LevelSet,
        )));
        registry.register(Arc::new(TransportKernel::new(
            PhysicsKind::Thermo,
            shape,
            ProblemVariant::Standard,
        )));
    }
    for shape in XFEM_SHAPES {
        registry.register(Arc::new(TransportKernel::new(
            PhysicsKind::Transport,
            shape,
            ProblemVariant::Xfem,
        )));
    }
}
