use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Reference cell shapes.
///
/// Lagrange shapes are numbered corners first, then edge midpoints, then face and volume centers.
/// NURBS shapes use lexicographic control point ordering, e.g. `i + 3 j + 9 k` for `Nurbs27`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellShape {
    Line2,
    Line3,
    Tri3,
    Tri6,
    Quad4,
    Quad8,
    Quad9,
    Nurbs9,
    Tet4,
    Tet10,
    Hex8,
    Hex20,
    Hex27,
    Nurbs27,
    Wedge6,
    Pyramid5,
}

impl CellShape {
    pub const ALL: [CellShape; 16] = [
        CellShape::Line2,
        CellShape::Line3,
        CellShape::Tri3,
        CellShape::Tri6,
        CellShape::Quad4,
        CellShape::Quad8,
        CellShape::Quad9,
        CellShape::Nurbs9,
        CellShape::Tet4,
        CellShape::Tet10,
        CellShape::Hex8,
        CellShape::Hex20,
        CellShape::Hex27,
        CellShape::Nurbs27,
        CellShape::Wedge6,
        CellShape::Pyramid5,
    ];

    pub fn num_nodes(&self) -> usize {
        use CellShape::*;
        match self {
            Line2 => 2,
            Line3 => 3,
            Tri3 => 3,
            Tri6 => 6,
            Quad4 => 4,
            Quad8 => 8,
            Quad9 => 9,
            Nurbs9 => 9,
            Tet4 => 4,
            Tet10 => 10,
            Hex8 => 8,
            Hex20 => 20,
            Hex27 => 27,
            Nurbs27 => 27,
            Wedge6 => 6,
            Pyramid5 => 5,
        }
    }

    /// Dimension of the reference cell.
    pub fn reference_dim(&self) -> usize {
        use CellShape::*;
        match self {
            Line2 | Line3 => 1,
            Tri3 | Tri6 | Quad4 | Quad8 | Quad9 | Nurbs9 => 2,
            Tet4 | Tet10 | Hex8 | Hex20 | Hex27 | Nurbs27 | Wedge6 | Pyramid5 => 3,
        }
    }

    pub fn is_nurbs(&self) -> bool {
        matches!(self, CellShape::Nurbs9 | CellShape::Nurbs27)
    }

    /// Upper-case name as used in input records, e.g. `HEX8`.
    pub fn name(&self) -> &'static str {
        use CellShape::*;
        match self {
            Line2 => "LINE2",
            Line3 => "LINE3",
            Tri3 => "TRI3",
            Tri6 => "TRI6",
            Quad4 => "QUAD4",
            Quad8 => "QUAD8",
            Quad9 => "QUAD9",
            Nurbs9 => "NURBS9",
            Tet4 => "TET4",
            Tet10 => "TET10",
            Hex8 => "HEX8",
            Hex20 => "HEX20",
            Hex27 => "HEX27",
            Nurbs27 => "NURBS27",
            Wedge6 => "WEDGE6",
            Pyramid5 => "PYRAMID5",
        }
    }

    /// Compact code used when packing elements.
    pub fn code(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|shape| shape == self)
            .map(|idx| idx as u8)
            .unwrap_or(u8::MAX)
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Invalid cell shape code {}", code)))
    }
}

impl Display for CellShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CellShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|shape| shape.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Unknown cell shape \"{}\"", s)))
    }
}
