//! Gauss rules for the reference cells.
//!
//! Rules for quadrilaterals and hexahedra are tensor products of one-dimensional Gauss-Legendre
//! rules. Triangles, tetrahedra and the pyramid use collapsed (Duffy) tensor product rules, which
//! map a tensor rule on the cube onto the simplex.
use crate::element::CellShape;
use crate::error::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Largest number of points per direction accepted from input records.
pub const MAX_POINTS_PER_DIRECTION: usize = 5;

/// A quadrature rule on one of the reference cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaussRule {
    Line(usize),
    Quad(usize, usize),
    Hex(usize, usize, usize),
    /// Collapsed rule with the given number of points per direction.
    Tri(usize),
    Tet(usize),
    Wedge { tri: usize, line: usize },
    Pyramid(usize),
}

/// Weights and points of a rule. Unused coordinates of lower-dimensional rules are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussPoints {
    pub weights: Vec<f64>,
    pub points: Vec<Point3<f64>>,
}

impl GaussPoints {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Point3<f64>)> {
        self.weights.iter().copied().zip(self.points.iter())
    }
}

/// Recurrence relation for Legendre polynomials.
///
/// The derivative formula is not defined at |x| == 1, so it is only
/// suitable for evaluation in the open interval (-1, 1).
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }
        Self { n, x, p1, p2 }
    }

    fn value_and_derivative(&self) -> (f64, f64) {
        let n = self.n as f64;
        (self.p1, n * (self.x * self.p1 - self.p2) / (self.x * self.x - 1.0))
    }
}

/// Gauss-Legendre rule with `n` points on `[-1, 1]`, exact for polynomials of degree `2n - 1`.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n > 0, "number of points must be positive");
    let m = (n + 1) / 2;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // The roots come in symmetric pairs, so only the first m are computed by Newton's method
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
        for _ in 0..100 {
            let dx = -p / dp;
            x += dx;
            let (p_new, dp_new) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
            p = p_new;
            dp = dp_new;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in m..n {
        let mirror = n - i - 1;
        points.push(-points[mirror]);
        weights.push(weights[mirror]);
    }

    (weights, points)
}

fn gauss_unit_interval(n: usize) -> (Vec<f64>, Vec<f64>) {
    let (weights, points) = gauss_legendre(n);
    (
        weights.into_iter().map(|w| 0.5 * w).collect(),
        points.into_iter().map(|x| 0.5 * (1.0 + x)).collect(),
    )
}

impl GaussRule {
    /// The cell shapes a rule can be used with share its reference domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            GaussRule::Line(_) => 1,
            GaussRule::Quad(..) | GaussRule::Tri(_) => 2,
            _ => 3,
        }
    }

    pub fn num_points(&self) -> usize {
        match *self {
            GaussRule::Line(n) => n,
            GaussRule::Quad(nx, ny) => nx * ny,
            GaussRule::Hex(nx, ny, nz) => nx * ny * nz,
            GaussRule::Tri(n) => n * n,
            GaussRule::Tet(n) | GaussRule::Pyramid(n) => n * n * n,
            GaussRule::Wedge { tri, line } => tri * tri * line,
        }
    }

    /// Whether the rule integrates over the reference cell of `shape`.
    pub fn is_compatible_with(&self, shape: CellShape) -> bool {
        use CellShape::*;
        matches!(
            (self, shape),
            (GaussRule::Line(_), Line2 | Line3)
                | (GaussRule::Quad(..), Quad4 | Quad8 | Quad9 | Nurbs9)
                | (GaussRule::Hex(..), Hex8 | Hex20 | Hex27 | Nurbs27)
                | (GaussRule::Tri(_), Tri3 | Tri6)
                | (GaussRule::Tet(_), Tet4 | Tet10)
                | (GaussRule::Wedge { .. }, Wedge6)
                | (GaussRule::Pyramid(_), Pyramid5)
        )
    }

    /// Full-order rule for the given shape.
    pub fn optimal_for(shape: CellShape) -> GaussRule {
        use CellShape::*;
        match shape {
            Line2 => GaussRule::Line(2),
            Line3 => GaussRule::Line(3),
            Quad4 => GaussRule::Quad(2, 2),
            Quad8 | Quad9 | Nurbs9 => GaussRule::Quad(3, 3),
            Tri3 => GaussRule::Tri(2),
            Tri6 => GaussRule::Tri(3),
            Tet4 => GaussRule::Tet(2),
            Tet10 => GaussRule::Tet(3),
            Hex8 => GaussRule::Hex(2, 2, 2),
            Hex20 | Hex27 | Nurbs27 => GaussRule::Hex(3, 3, 3),
            Wedge6 => GaussRule::Wedge { tri: 2, line: 2 },
            Pyramid5 => GaussRule::Pyramid(3),
        }
    }

    /// Builds a rule for `shape` from the point counts of a `GP` record.
    ///
    /// Tensor cells expect one count per reference dimension, simplices and the pyramid a single
    /// count, wedges a triangle and a line count. Every count must lie in
    /// `1..=MAX_POINTS_PER_DIRECTION`.
    pub fn from_gp_codes(shape: CellShape, codes: &[usize]) -> Result<GaussRule> {
        if let Some(code) = codes
            .iter()
            .find(|&&c| c == 0 || c > MAX_POINTS_PER_DIRECTION)
        {
            return Err(Error::Configuration(format!(
                "Unknown Gauss rule code {} for {} (expected 1..={})",
                code, shape, MAX_POINTS_PER_DIRECTION
            )));
        }
        let expected = match GaussRule::optimal_for(shape) {
            GaussRule::Line(_) => 1,
            GaussRule::Quad(..) => 2,
            GaussRule::Hex(..) => 3,
            GaussRule::Wedge { .. } => 2,
            _ => 1,
        };
        if codes.len() != expected {
            return Err(Error::Configuration(format!(
                "GP record for {} expects {} entries, got {:?}",
                shape, expected, codes
            )));
        }
        Ok(match GaussRule::optimal_for(shape) {
            GaussRule::Line(_) => GaussRule::Line(codes[0]),
            GaussRule::Quad(..) => GaussRule::Quad(codes[0], codes[1]),
            GaussRule::Hex(..) => GaussRule::Hex(codes[0], codes[1], codes[2]),
            GaussRule::Tri(_) => GaussRule::Tri(codes[0]),
            GaussRule::Tet(_) => GaussRule::Tet(codes[0]),
            GaussRule::Wedge { .. } => GaussRule::Wedge {
                tri: codes[0],
                line: codes[1],
            },
            GaussRule::Pyramid(_) => GaussRule::Pyramid(codes[0]),
        })
    }

    /// The point counts of the rule, in the order accepted by [`GaussRule::from_gp_codes`].
    pub fn gp_codes(&self) -> Vec<usize> {
        match *self {
            GaussRule::Line(n) | GaussRule::Tri(n) | GaussRule::Tet(n) | GaussRule::Pyramid(n) => vec![n],
            GaussRule::Quad(nx, ny) => vec![nx, ny],
            GaussRule::Hex(nx, ny, nz) => vec![nx, ny, nz],
            GaussRule::Wedge { tri, line } => vec![tri, line],
        }
    }

    /// Compact code identifying the rule family, used when packing elements.
    pub fn family_code(&self) -> u8 {
        match self {
            GaussRule::Line(_) => 0,
            GaussRule::Quad(..) => 1,
            GaussRule::Hex(..) => 2,
            GaussRule::Tri(_) => 3,
            GaussRule::Tet(_) => 4,
            GaussRule::Wedge { .. } => 5,
            GaussRule::Pyramid(_) => 6,
        }
    }

    pub fn from_family_code(code: u8, counts: &[usize]) -> Result<GaussRule> {
        let count = |i: usize| {
            counts
                .get(i)
                .copied()
                .ok_or_else(|| Error::Configuration(format!("Missing point count for Gauss rule family {}", code)))
        };
        Ok(match code {
            0 => GaussRule::Line(count(0)?),
            1 => GaussRule::Quad(count(0)?, count(1)?),
            2 => GaussRule::Hex(count(0)?, count(1)?, count(2)?),
            3 => GaussRule::Tri(count(0)?),
            4 => GaussRule::Tet(count(0)?),
            5 => GaussRule::Wedge {
                tri: count(0)?,
                line: count(1)?,
            },
            6 => GaussRule::Pyramid(count(0)?),
            _ => return Err(Error::Configuration(format!("Invalid Gauss rule family {}", code))),
        })
    }

    pub fn points(&self) -> GaussPoints {
        let mut weights = Vec::with_capacity(self.num_points());
        let mut points = Vec::with_capacity(self.num_points());
        match *self {
            GaussRule::Line(n) => {
                let (w, x) = gauss_legendre(n);
                for (wx, x) in w.into_iter().zip(x) {
                    weights.push(wx);
                    points.push(Point3::new(x, 0.0, 0.0));
                }
            }
            GaussRule::Quad(nx, ny) => {
                let (wx, x) = gauss_legendre(nx);
                let (wy, y) = gauss_legendre(ny);
                for (wx, x) in wx.iter().zip(&x) {
                    for (wy, y) in wy.iter().zip(&y) {
                        weights.push(wx * wy);
                        points.push(Point3::new(*x, *y, 0.0));
                    }
                }
            }
            GaussRule::Hex(nx, ny, nz) => {
                let (wx, x) = gauss_legendre(nx);
                let (wy, y) = gauss_legendre(ny);
                let (wz, z) = gauss_legendre(nz);
                for (wx, x) in wx.iter().zip(&x) {
                    for (wy, y) in wy.iter().zip(&y) {
                        for (wz, z) in wz.iter().zip(&z) {
                            weights.push(wx * wy * wz);
                            points.push(Point3::new(*x, *y, *z));
                        }
                    }
                }
            }
            GaussRule::Tri(n) => {
                let (w, t) = gauss_unit_interval(n);
                for (wu, u) in w.iter().zip(&t) {
                    for (wv, v) in w.iter().zip(&t) {
                        weights.push(wu * wv * (1.0 - v));
                        points.push(Point3::new(u * (1.0 - v), *v, 0.0));
                    }
                }
            }
            GaussRule::Tet(n) => {
                let (w, t) = gauss_unit_interval(n);
                for (wu, u) in w.iter().zip(&t) {
                    for (wv, v) in w.iter().zip(&t) {
                        for (ww, s) in w.iter().zip(&t) {
                            weights.push(wu * wv * ww * (1.0 - v) * (1.0 - s) * (1.0 - s));
                            points.push(Point3::new(u * (1.0 - v) * (1.0 - s), v * (1.0 - s), *s));
                        }
                    }
                }
            }
            GaussRule::Wedge { tri, line } => {
                let triangle = GaussRule::Tri(tri).points();
                let (wz, z) = gauss_legendre(line);
                for (wt, p) in triangle.iter() {
                    for (wz, z) in wz.iter().zip(&z) {
                        weights.push(wt * wz);
                        points.push(Point3::new(p.x, p.y, *z));
                    }
                }
            }
            GaussRule::Pyramid(n) => {
                let (w, x) = gauss_legendre(n);
                for (wu, u) in w.iter().zip(&x) {
                    for (wv, v) in w.iter().zip(&x) {
                        for (ww, s) in w.iter().zip(&x) {
                            let zeta = 0.5 * (1.0 + s);
                            let collapse = 1.0 - zeta;
                            weights.push(wu * wv * ww * collapse * collapse * 0.5);
                            points.push(Point3::new(u * collapse, v * collapse, zeta));
                        }
                    }
                }
            }
        }
        GaussPoints { weights, points }
    }
}
