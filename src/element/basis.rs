//! Shape functions of the reference cells.
//!
//! Quadrilaterals and hexahedra live on `[-1, 1]^d`, triangles and tetrahedra on the unit simplex,
//! wedges on the unit triangle times `[-1, 1]` and the pyramid has the base `[-1, 1]^2` at `z = 0`
//! and its apex at `(0, 0, 1)`. NURBS cells use quadratic Bernstein polynomials on `[-1, 1]^d` with
//! unit weights, for which the rational basis coincides with the polynomial one.
use crate::element::CellShape;
use nalgebra::{DMatrix, DVector, Point3};

const QUAD_NODES: [[f64; 2]; 9] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
    [0.0, -1.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [-1.0, 0.0],
    [0.0, 0.0],
];

#[rustfmt::skip]
const HEX_NODES: [[f64; 3]; 27] = [
    [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0],
    // Bottom edges
    [0.0, -1.0, -1.0], [1.0, 0.0, -1.0], [0.0, 1.0, -1.0], [-1.0, 0.0, -1.0],
    // Vertical edges
    [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0],
    // Top edges
    [0.0, -1.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [-1.0, 0.0, 1.0],
    // Faces: bottom, front, right, back, left, top
    [0.0, 0.0, -1.0], [0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, 0.0],
];

const TRI6_EDGES: [(usize, usize); 3] = [(0, 1), (1, 2), (2, 0)];
const TET10_EDGES: [(usize, usize); 6] = [(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)];

/// Reference coordinates of the nodes of the given shape.
///
/// For NURBS cells these are the Greville abscissae of the control points.
pub fn reference_coords(shape: CellShape) -> Vec<Point3<f64>> {
    use CellShape::*;
    match shape {
        Line2 => vec![Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
        Line3 => vec![
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ],
        Quad4 | Quad8 | Quad9 => QUAD_NODES[..shape.num_nodes()]
            .iter()
            .map(|[x, y]| Point3::new(*x, *y, 0.0))
            .collect(),
        Hex8 | Hex20 | Hex27 => HEX_NODES[..shape.num_nodes()]
            .iter()
            .map(|[x, y, z]| Point3::new(*x, *y, *z))
            .collect(),
        Tri3 | Tri6 => {
            let corners = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
            let mut coords = corners.to_vec();
            if shape == Tri6 {
                coords.extend(TRI6_EDGES.iter().map(|&(a, b)| nalgebra::center(&corners[a], &corners[b])));
            }
            coords
        }
        Tet4 | Tet10 => {
            let corners = [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ];
            let mut coords = corners.to_vec();
            if shape == Tet10 {
                coords.extend(TET10_EDGES.iter().map(|&(a, b)| nalgebra::center(&corners[a], &corners[b])));
            }
            coords
        }
        Wedge6 => vec![
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(1.0, 0.0, -1.0),
            Point3::new(0.0, 1.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ],
        Pyramid5 => vec![
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ],
        Nurbs9 => (0..9)
            .map(|idx| Point3::new(greville(idx % 3), greville(idx / 3), 0.0))
            .collect(),
        Nurbs27 => (0..27)
            .map(|idx| Point3::new(greville(idx % 3), greville((idx / 3) % 3), greville(idx / 9)))
            .collect(),
    }
}

fn greville(i: usize) -> f64 {
    i as f64 - 1.0
}

/// Reference point at which shape function derivatives are evaluated for center checks.
pub fn derivative_center(shape: CellShape) -> Point3<f64> {
    use CellShape::*;
    match shape {
        Tri3 | Tri6 => Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
        Tet4 | Tet10 => Point3::new(0.25, 0.25, 0.25),
        Wedge6 => Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
        Pyramid5 => Point3::new(0.0, 0.0, 0.25),
        _ => Point3::origin(),
    }
}

/// Evaluates all shape functions at the reference point `xi`.
pub fn shape_functions(shape: CellShape, xi: &Point3<f64>) -> DVector<f64> {
    shape_functions_and_derivatives(shape, xi).0
}

/// Evaluates the reference derivatives of all shape functions at `xi`.
///
/// The result has one row per reference dimension and one column per node.
pub fn shape_derivatives(shape: CellShape, xi: &Point3<f64>) -> DMatrix<f64> {
    shape_functions_and_derivatives(shape, xi).1
}

pub fn shape_functions_and_derivatives(shape: CellShape, xi: &Point3<f64>) -> (DVector<f64>, DMatrix<f64>) {
    use CellShape::*;
    let n = shape.num_nodes();
    let dim = shape.reference_dim();
    let mut values = DVector::zeros(n);
    let mut derivatives = DMatrix::zeros(dim, n);
    let x = [xi.x, xi.y, xi.z];

    match shape {
        Line2 | Quad4 | Hex8 => {
            let nodes = reference_coords(shape);
            for (a, node) in nodes.iter().enumerate() {
                tensor_product(&mut values, &mut derivatives, a, dim, |d| {
                    (0.5 * (1.0 + node[d] * x[d]), 0.5 * node[d])
                });
            }
        }
        Line3 | Quad9 | Hex27 => {
            let nodes = reference_coords(shape);
            for (a, node) in nodes.iter().enumerate() {
                tensor_product(&mut values, &mut derivatives, a, dim, |d| lagrange_quadratic(node[d], x[d]));
            }
        }
        Nurbs9 | Nurbs27 => {
            for a in 0..n {
                let index = [a % 3, (a / 3) % 3, a / 9];
                tensor_product(&mut values, &mut derivatives, a, dim, |d| bernstein_quadratic(index[d], x[d]));
            }
        }
        Quad8 | Hex20 => {
            let nodes = reference_coords(shape);
            for (a, node) in nodes.iter().enumerate() {
                serendipity(&mut values, &mut derivatives, a, dim, &[node.x, node.y, node.z], &x);
            }
        }
        Tri3 | Tri6 | Tet4 | Tet10 => simplex(shape, &mut values, &mut derivatives, &x),
        Wedge6 => {
            let tri = [1.0 - x[0] - x[1], x[0], x[1]];
            let dtri = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];
            for a in 0..6 {
                let t = a % 3;
                let c = if a < 3 { -1.0 } else { 1.0 };
                let line = 0.5 * (1.0 + c * x[2]);
                values[a] = tri[t] * line;
                derivatives[(0, a)] = dtri[t][0] * line;
                derivatives[(1, a)] = dtri[t][1] * line;
                derivatives[(2, a)] = tri[t] * 0.5 * c;
            }
        }
        Pyramid5 => {
            let (xi, eta, zeta) = (x[0], x[1], x[2]);
            let one_minus_zeta = 1.0 - zeta;
            // The rational term vanishes at the apex
            let (r, dr_dxi, dr_deta, dr_dzeta) = if one_minus_zeta.abs() > 1e-14 {
                (
                    xi * eta / one_minus_zeta,
                    eta / one_minus_zeta,
                    xi / one_minus_zeta,
                    xi * eta / (one_minus_zeta * one_minus_zeta),
                )
            } else {
                (0.0, 0.0, 0.0, 0.0)
            };
            for (a, [xa, ya]) in QUAD_NODES[..4].iter().enumerate() {
                values[a] = 0.25 * (one_minus_zeta + xa * xi + ya * eta + xa * ya * r);
                derivatives[(0, a)] = 0.25 * (xa + xa * ya * dr_dxi);
                derivatives[(1, a)] = 0.25 * (ya + xa * ya * dr_deta);
                derivatives[(2, a)] = 0.25 * (-1.0 + xa * ya * dr_dzeta);
            }
            values[4] = zeta;
            derivatives[(2, 4)] = 1.0;
        }
    }

    (values, derivatives)
}

/// Evaluates the product `prod_d f_d(x_d)` and its gradient, given per-dimension values and
/// derivatives of the factors.
fn tensor_product(
    values: &mut DVector<f64>,
    derivatives: &mut DMatrix<f64>,
    node: usize,
    dim: usize,
    factor: impl Fn(usize) -> (f64, f64),
) {
    let factors: Vec<(f64, f64)> = (0..dim).map(&factor).collect();
    values[node] = factors.iter().map(|(f, _)| f).product();
    for d in 0..dim {
        derivatives[(d, node)] = factors
            .iter()
            .enumerate()
            .map(|(e, (f, df))| if e == d { *df } else { *f })
            .product();
    }
}

/// One-dimensional quadratic Lagrange polynomial for the node at `a` in `{-1, 0, 1}`.
fn lagrange_quadratic(a: f64, x: f64) -> (f64, f64) {
    if a < -0.5 {
        (0.5 * x * (x - 1.0), x - 0.5)
    } else if a > 0.5 {
        (0.5 * x * (x + 1.0), x + 0.5)
    } else {
        (1.0 - x * x, -2.0 * x)
    }
}

fn bernstein_quadratic(i: usize, x: f64) -> (f64, f64) {
    let t = 0.5 * (1.0 + x);
    // dt/dx = 1/2
    match i {
        0 => ((1.0 - t) * (1.0 - t), -(1.0 - t)),
        1 => (2.0 * t * (1.0 - t), 1.0 - 2.0 * t),
        _ => (t * t, t),
    }
}

fn serendipity(
    values: &mut DVector<f64>,
    derivatives: &mut DMatrix<f64>,
    node: usize,
    dim: usize,
    a: &[f64; 3],
    x: &[f64; 3],
) {
    let is_corner = (0..dim).all(|d| a[d] != 0.0);
    if is_corner {
        let scale = 1.0 / f64::powi(2.0, dim as i32);
        let linear: Vec<f64> = (0..dim).map(|d| 1.0 + a[d] * x[d]).collect();
        let product: f64 = linear.iter().product();
        let s: f64 = (0..dim).map(|d| a[d] * x[d]).sum::<f64>() - (dim as f64 - 1.0);
        values[node] = scale * product * s;
        for d in 0..dim {
            let others: f64 = (0..dim).filter(|&e| e != d).map(|e| linear[e]).product();
            derivatives[(d, node)] = scale * a[d] * others * (s + linear[d]);
        }
    } else {
        let scale = 1.0 / f64::powi(2.0, dim as i32 - 1);
        tensor_product(values, derivatives, node, dim, |d| {
            if a[d] == 0.0 {
                (1.0 - x[d] * x[d], -2.0 * x[d])
            } else {
                (1.0 + a[d] * x[d], a[d])
            }
        });
        values[node] *= scale;
        for d in 0..dim {
            derivatives[(d, node)] *= scale;
        }
    }
}

fn simplex(shape: CellShape, values: &mut DVector<f64>, derivatives: &mut DMatrix<f64>, x: &[f64; 3]) {
    let dim = shape.reference_dim();
    // Barycentric coordinates and their constant gradients
    let mut bary = vec![1.0 - x[..dim].iter().sum::<f64>()];
    bary.extend_from_slice(&x[..dim]);
    let grad = |i: usize, d: usize| -> f64 {
        if i == 0 {
            -1.0
        } else if i == d + 1 {
            1.0
        } else {
            0.0
        }
    };

    match shape {
        CellShape::Tri3 | CellShape::Tet4 => {
            for i in 0..=dim {
                values[i] = bary[i];
                for d in 0..dim {
                    derivatives[(d, i)] = grad(i, d);
                }
            }
        }
        _ => {
            let edges: &[(usize, usize)] = if dim == 2 { &TRI6_EDGES } else { &TET10_EDGES };
            for i in 0..=dim {
                values[i] = bary[i] * (2.0 * bary[i] - 1.0);
                for d in 0..dim {
                    derivatives[(d, i)] = (4.0 * bary[i] - 1.0) * grad(i, d);
                }
            }
            for (k, &(i, j)) in edges.iter().enumerate() {
                let node = dim + 1 + k;
                values[node] = 4.0 * bary[i] * bary[j];
                for d in 0..dim {
                    derivatives[(d, node)] = 4.0 * (bary[j] * grad(i, d) + bary[i] * grad(j, d));
                }
            }
        }
    }
}
