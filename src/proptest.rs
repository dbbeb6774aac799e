use crate::element::basis::reference_coords;
use crate::element::CellShape;
use crate::procedural::{create_rectangle_mesh, StructuredMesh};
use ::proptest::prelude::*;
use nalgebra::{Matrix3, Point3, Vector3};
use std::cmp::max;

pub fn point3() -> impl Strategy<Value = Point3<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range.clone()].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

impl Arbitrary for CellShape {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop::sample::select(CellShape::ALL.to_vec()).boxed()
    }
}

/// A linear map with determinant bounded away from zero, positive if `orientation_preserving`.
fn affine_matrix(dim: usize, orientation_preserving: bool) -> impl Strategy<Value = Matrix3<f64>> {
    // Diagonally dominant matrices with a positive diagonal have a positive determinant
    let diagonal = [1.0..3.0, 1.0..3.0, 1.0..3.0];
    let off_diagonal = prop::array::uniform6(-0.3..0.3);
    (diagonal, off_diagonal).prop_map(move |(d, o)| {
        let mut m = Matrix3::new(d[0], o[0], o[1], o[2], d[1], o[3], o[4], o[5], d[2]);
        for i in dim..3 {
            for j in 0..3 {
                if i != j {
                    m[(i, j)] = 0.0;
                    m[(j, i)] = 0.0;
                }
            }
            m[(i, i)] = 1.0;
        }
        if !orientation_preserving {
            for i in 0..3 {
                m[(i, 0)] = -m[(i, 0)];
            }
        }
        m
    })
}

/// Nodal coordinates of an affinely mapped reference cell of the given shape.
pub fn affine_cell(shape: CellShape, orientation_preserving: bool) -> impl Strategy<Value = Vec<Point3<f64>>> {
    let dim = shape.reference_dim();
    let translation = [-5.0..5.0, -5.0..5.0, -5.0..5.0];
    (affine_matrix(dim, orientation_preserving), translation).prop_map(move |(m, t)| {
        let t = if dim == 3 {
            Vector3::new(t[0], t[1], t[2])
        } else {
            Vector3::new(t[0], t[1], 0.0)
        };
        reference_coords(shape)
            .into_iter()
            .map(|xi| Point3::from(m * xi.coords + t))
            .collect()
    })
}

/// Payloads for pack buffers: a scalar and an array of doubles.
pub fn pack_payload(max_len: usize) -> impl Strategy<Value = (i32, Vec<f64>)> {
    (any::<i32>(), prop::collection::vec(-1e6..1e6, 0..=max_len))
}

/// Rectangle meshes with at most `max_cells` cells.
pub fn rectangle_mesh(max_cells: usize) -> impl Strategy<Value = StructuredMesh> {
    let max_cells = max(1, max_cells);
    (1..=max_cells)
        .prop_flat_map(move |nx| (Just(nx), 1..=max(1, max_cells / nx)))
        .prop_map(|(nx, ny)| create_rectangle_mesh([nx as f64, ny as f64], [nx, ny]))
}
