//! Detection and repair of inverted elements.
//!
//! An element is inverted if the determinant of its reference-to-physical map is not positive.
//! Inverted elements are repaired by a shape-specific node permutation ("rewind") which mirrors
//! the reference cell and flips its orientation.
use crate::comm::{all_gather_array, sum_all_usize};
use crate::discretization::Discretization;
use crate::element::{basis, jacobian_determinant, CellShape};
use crate::error::{Error, Result};
use crate::quadrature::GaussRule;
use crate::Gid;
use log::{info, warn};
use nalgebra::Point3;

/// Where the determinant is checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CheckPoints {
    /// The reference point used for derivative evaluation (the cell center for most shapes).
    Center,
    /// Every point of the optimal Gauss rule of the shape.
    FullGaussRule,
}

impl CheckPoints {
    fn points(&self, shape: CellShape) -> Vec<Point3<f64>> {
        match self {
            CheckPoints::Center => vec![basis::derivative_center(shape)],
            CheckPoints::FullGaussRule => GaussRule::optimal_for(shape)
                .points()
                .iter()
                .map(|(_, xi)| *xi)
                .collect(),
        }
    }
}

/// Permutation `p` with `new[i] = old[p[i]]` that mirrors the reference cell of `shape`.
///
/// Line cells have no orientation in space and cannot be rewound.
pub fn rewind_permutation(shape: CellShape) -> Result<Vec<usize>> {
    use CellShape::*;
    let permutation = match shape {
        Tri3 => vec![0, 2, 1],
        Tri6 => vec![0, 2, 1, 5, 4, 3],
        Quad4 => vec![0, 3, 2, 1],
        Quad8 => vec![0, 3, 2, 1, 7, 6, 5, 4],
        Quad9 => vec![0, 3, 2, 1, 7, 6, 5, 4, 8],
        Tet4 => vec![0, 2, 1, 3],
        Tet10 => vec![0, 2, 1, 3, 6, 5, 4, 7, 9, 8],
        // Swap the bottom and top faces
        Hex8 => vec![4, 5, 6, 7, 0, 1, 2, 3],
        Hex20 => vec![4, 5, 6, 7, 0, 1, 2, 3, 16, 17, 18, 19, 12, 13, 14, 15, 8, 9, 10, 11],
        Hex27 => vec![
            4, 5, 6, 7, 0, 1, 2, 3, 16, 17, 18, 19, 12, 13, 14, 15, 8, 9, 10, 11, 25, 21, 22, 23, 24, 20, 26,
        ],
        Wedge6 => vec![3, 4, 5, 0, 1, 2],
        Pyramid5 => vec![0, 3, 2, 1, 4],
        Nurbs9 => (0..9).map(|idx| idx % 3 + 3 * (2 - idx / 3)).collect(),
        Nurbs27 => (0..27).map(|idx| idx % 9 + 9 * (2 - idx / 9)).collect(),
        Line2 | Line3 => {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: "rewinding".to_string(),
            })
        }
    };
    Ok(permutation)
}

/// Node ids of an element of the given shape with flipped orientation.
pub fn rewind_element(node_ids: &[Gid], shape: CellShape) -> Result<Vec<Gid>> {
    if node_ids.len() != shape.num_nodes() {
        return Err(Error::Connectivity(format!(
            "{} nodes given for a {} cell",
            node_ids.len(),
            shape
        )));
    }
    Ok(rewind_permutation(shape)?
        .into_iter()
        .map(|p| node_ids[p])
        .collect())
}

/// Whether the determinant is positive at every check point.
pub fn has_positive_jacobian(shape: CellShape, coords: &[Point3<f64>], points: CheckPoints) -> bool {
    points
        .points(shape)
        .iter()
        .all(|xi| jacobian_determinant(shape, coords, xi) > 0.0)
}

/// Ids of the column elements of `dis` with a non-positive determinant at a check point.
///
/// Line cells always pass.
pub fn find_negative_elements(dis: &Discretization, points: CheckPoints) -> Result<Vec<Gid>> {
    let mut negative = Vec::new();
    for element in dis.elements() {
        if element.shape().reference_dim() == 1 {
            continue;
        }
        let coords = dis.element_coords(element)?;
        if !has_positive_jacobian(element.shape(), &coords, points) {
            negative.push(element.gid());
        }
    }
    Ok(negative)
}

/// Outcome of [`validate_element_jacobian`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JacobianReport {
    /// Elements owned by this rank that were rewound.
    pub rewound: Vec<Gid>,
    /// Global number of elements still inverted after rewinding.
    pub remaining: usize,
}

/// Rewinds every inverted element and counts the elements that remain inverted. Collective.
///
/// Ghost elements are rewound as well, so owners and ghosts agree on the node order.
pub fn validate_element_jacobian(dis: &mut Discretization, points: CheckPoints) -> Result<JacobianReport> {
    let rank = dis.rank();
    let negative = find_negative_elements(dis, points)?;
    let mut rewound = Vec::new();
    for gid in negative {
        let (shape, owner) = match dis.element(gid) {
            Some(element) => (element.shape(), element.owner()),
            None => continue,
        };
        dis.permute_element_nodes(gid, &rewind_permutation(shape)?)?;
        if owner == rank {
            rewound.push(gid);
        }
    }

    let still_negative = find_negative_elements(dis, points)?;
    let owned_remaining = still_negative
        .iter()
        .filter(|gid| dis.element(**gid).map(|e| e.owner()) == Some(rank))
        .count();
    let remaining = sum_all_usize(dis.comm().as_ref(), owned_remaining)?;
    if !rewound.is_empty() {
        info!("Rewound {} elements of {} on rank {}", rewound.len(), dis.name(), rank);
    }
    if remaining > 0 {
        warn!("{} elements of {} remain inverted after rewinding", remaining, dis.name());
    }
    Ok(JacobianReport { rewound, remaining })
}

/// Like [`validate_element_jacobian`], but fails if any element remains inverted. Collective.
pub fn validate_element_jacobian_strict(dis: &mut Discretization, points: CheckPoints) -> Result<JacobianReport> {
    let report = validate_element_jacobian(dis, points)?;
    if report.remaining > 0 {
        let rank = dis.rank();
        let local: Vec<Gid> = find_negative_elements(dis, points)?
            .into_iter()
            .filter(|gid| dis.element(*gid).map(|e| e.owner()) == Some(rank))
            .collect();
        let elements = all_gather_array(dis.comm().as_ref(), &local)?
            .into_iter()
            .flatten()
            .collect();
        return Err(Error::NegativeJacobianAfterRewind { elements });
    }
    Ok(report)
}
