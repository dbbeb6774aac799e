//! Error type shared by all layers of the core.
use crate::element::{CellShape, PhysicsKind, ProblemVariant};
use crate::Gid;
use mpfe_pack::PackError;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
///
/// Every variant except [`Error::NegativeJacobian`] is fatal for the operation that produced it.
/// A negative element Jacobian can be repaired by rewinding the element node order.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid input, e.g. a negative penalty parameter or an unknown Gauss rule code.
    Configuration(String),
    /// A structural mutation was attempted on a discretization that has been filled.
    StructuralMutationAfterFill { operation: &'static str },
    /// Element-node references that cannot be resolved, or conflicting duplicate entities.
    Connectivity(String),
    UnsupportedCellShape { shape: CellShape, context: String },
    UnknownElementVariant {
        physics: PhysicsKind,
        shape: CellShape,
        variant: ProblemVariant,
    },
    NegativeJacobian { element: Gid, determinant: f64 },
    NegativeJacobianAfterRewind { elements: Vec<Gid> },
    /// Mortar projections were applied in a different order than they were condensed with.
    CouplingOrderMismatch { expected: Vec<usize>, found: Vec<usize> },
    SolverDivergence(String),
    Pack(PackError),
    Communication(String),
    UnknownQuantity { field: String, quantity: String },
    /// An operation requires a filled discretization.
    NotFilled { operation: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Error::StructuralMutationAfterFill { operation } => write!(
                f,
                "Structural mutation ({}) of a discretization after fill_complete",
                operation
            ),
            Error::Connectivity(msg) => write!(f, "Connectivity fault: {}", msg),
            Error::UnsupportedCellShape { shape, context } => {
                write!(f, "Unsupported cell shape {} ({})", shape, context)
            }
            Error::UnknownElementVariant {
                physics,
                shape,
                variant,
            } => write!(
                f,
                "No element kernel registered for physics {:?}, shape {}, variant {:?}",
                physics, shape, variant
            ),
            Error::NegativeJacobian { element, determinant } => write!(
                f,
                "Negative Jacobian determinant {:e} in element {}",
                determinant, element
            ),
            Error::NegativeJacobianAfterRewind { elements } => write!(
                f,
                "Negative Jacobian determinant after rewinding in elements {:?}",
                elements
            ),
            Error::CouplingOrderMismatch { expected, found } => write!(
                f,
                "Mortar projections applied in inconsistent order: condensed with {:?}, applied with {:?}",
                expected, found
            ),
            Error::SolverDivergence(msg) => write!(f, "Nonlinear solver diverged: {}", msg),
            Error::Pack(err) => write!(f, "Packing error: {}", err),
            Error::Communication(msg) => write!(f, "Communication error: {}", msg),
            Error::UnknownQuantity { field, quantity } => {
                write!(f, "Unknown result quantity \"{}\" for field \"{}\"", quantity, field)
            }
            Error::NotFilled { operation } => {
                write!(f, "Operation {} requires fill_complete to be called first", operation)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Pack(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PackError> for Error {
    fn from(err: PackError) -> Self {
        Error::Pack(err)
    }
}
