//! Through-thickness integration for layered shell kernels.
//!
//! A shell with director coordinate `e3` in `[-condfac, condfac]` integrates its material law
//! over the thickness into a 12x12 stiffness relating membrane strains and curvatures to force and
//! moment resultants. With `zeta = e3 / condfac` the blocks of `D` are
//!
//! ```text
//! | int C        int C zeta   |
//! | int C zeta   int C zeta^2 |
//! ```
//!
//! where only the lower blocks are accumulated and the upper triangle is mirrored afterwards.
use nalgebra::{SMatrix, SVector};

pub type Matrix6 = SMatrix<f64, 6, 6>;
pub type Vector6 = SVector<f64, 6>;
pub type Matrix12 = SMatrix<f64, 12, 12>;
pub type Vector12 = SVector<f64, 12>;

/// Accumulated material stiffness and stress resultants of a shell point.
#[derive(Debug, Clone, PartialEq)]
pub struct ThicknessIntegration {
    /// Material stiffness, symmetric after every added layer.
    pub d: Matrix12,
    /// Force resultants `n` in the first six entries, moment resultants `m` in the last six.
    pub resultants: Vector12,
}

impl Default for ThicknessIntegration {
    fn default() -> Self {
        Self {
            d: Matrix12::zeros(),
            resultants: Vector12::zeros(),
        }
    }
}

impl ThicknessIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the contribution of one thickness integration point with constitutive matrix `c`,
    /// stress `stress` and integration weight `fact`.
    pub fn add_layer(&mut self, c: &Matrix6, stress: &Vector6, e3: f64, condfac: f64, fact: f64) {
        let zeta = e3 / condfac;
        for i in 0..6 {
            let stress_fact = stress[i] * fact;
            self.resultants[i] += stress_fact;
            self.resultants[i + 6] += stress_fact * zeta;
            for j in 0..6 {
                let c_fact = c[(i, j)] * fact;
                self.d[(i, j)] += c_fact;
                self.d[(i + 6, j)] += c_fact * zeta;
                self.d[(i + 6, j + 6)] += c_fact * zeta * zeta;
            }
        }
        self.mirror();
    }

    /// Copies the lower triangle onto the upper triangle.
    fn mirror(&mut self) {
        for i in 0..12 {
            for j in (i + 1)..12 {
                self.d[(i, j)] = self.d[(j, i)];
            }
        }
    }

    pub fn force_resultants(&self) -> Vector6 {
        self.resultants.fixed_rows::<6>(0).into_owned()
    }

    pub fn moment_resultants(&self) -> Vector6 {
        self.resultants.fixed_rows::<6>(6).into_owned()
    }
}

/// Integrates a layer stack with Gauss-Legendre points over `e3 in [-condfac, condfac]`.
///
/// The closure returns the constitutive matrix and the stress at a given `e3`.
pub fn integrate_thickness<F>(num_points: usize, condfac: f64, mut layer: F) -> ThicknessIntegration
where
    F: FnMut(f64) -> (Matrix6, Vector6),
{
    let (weights, points) = crate::quadrature::gauss_legendre(num_points);
    let mut integration = ThicknessIntegration::new();
    for (w, xi) in weights.iter().zip(points.iter()) {
        let e3 = xi * condfac;
        let (c, stress) = layer(e3);
        integration.add_layer(&c, &stress, e3, condfac, *w * condfac);
    }
    integration
}
