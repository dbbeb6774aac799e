//! Byte-stream packing for migrating entities between ranks.
//!
//! Packing happens in two phases. During the *sizing* phase, every `add_*` call only
//! accumulates the number of bytes that will eventually be written. Calling
//! [`PackBuffer::start_packing`] reserves exactly that many bytes once, after which the very same
//! sequence of `add_*` calls performs the actual writes:
//!
//! ```
//! use mpfe_pack::PackBuffer;
//!
//! fn pack(buffer: &mut PackBuffer, id: i32, coords: &[f64]) -> Result<(), mpfe_pack::PackError> {
//!     let mut object = buffer.begin_object()?;
//!     object.add_pod(id)?;
//!     object.add_array(coords)?;
//!     Ok(())
//! }
//!
//! let coords = [0.0, 1.0, 2.0];
//! let mut buffer = PackBuffer::new();
//! pack(&mut buffer, 3, &coords).unwrap();
//! buffer.start_packing();
//! pack(&mut buffer, 3, &coords).unwrap();
//! let bytes = buffer.finish().unwrap();
//! assert_eq!(bytes.len(), 4 + 4 + 3 * 8);
//! ```
//!
//! Objects are framed by a 4-byte size header, so that a reader can skip an object without
//! understanding its content.
use std::fmt;
use std::fmt::{Display, Formatter};

mod buffer;
mod unpack;

pub use buffer::{ObjectMarker, PackBuffer};
pub use unpack::UnpackBuffer;

/// Size in bytes of the header preceding every framed object.
pub const OBJECT_HEADER_SIZE: usize = 4;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PackError {
    /// A write in the packing phase would exceed the size accumulated during the sizing phase.
    BufferOverflow { reserved: usize, requested: usize },
    /// The packing phase wrote fewer bytes than were accumulated during the sizing phase.
    SizeMismatch { reserved: usize, written: usize },
    /// A read requested more bytes than remain in the buffer.
    UnexpectedEnd { requested: usize, available: usize },
    /// An object header does not describe a valid object.
    InvalidObjectHeader { size: i32 },
    /// The stream contains data that the reader does not understand.
    InvalidData(String),
}

impl Display for PackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferOverflow { reserved, requested } => write!(
                f,
                "Buffer overflow: write of {} bytes would exceed the {} reserved bytes",
                requested, reserved
            ),
            Self::SizeMismatch { reserved, written } => write!(
                f,
                "Packing phase wrote {} bytes, but {} bytes were reserved",
                written, reserved
            ),
            Self::UnexpectedEnd { requested, available } => write!(
                f,
                "Unexpected end of buffer: requested {} bytes, {} available",
                requested, available
            ),
            Self::InvalidObjectHeader { size } => write!(f, "Invalid object header (size {})", size),
            Self::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for PackError {}

/// Plain-old-data types with a fixed little-endian byte representation.
pub trait Pod: Copy {
    const SIZE: usize;

    /// Writes exactly `SIZE` bytes into `out`.
    fn write_le(&self, out: &mut [u8]);

    /// Reads a value from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_pod_for_primitive {
    ($($t:ty),*) => {
        $(
            impl Pod for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_le(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_pod_for_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

// usize is always encoded as 8 bytes so that streams do not depend on the platform
impl Pod for usize {
    const SIZE: usize = 8;

    fn write_le(&self, out: &mut [u8]) {
        out.copy_from_slice(&(*self as u64).to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        u64::read_le(bytes) as usize
    }
}

impl Pod for bool {
    const SIZE: usize = 1;

    fn write_le(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Types that know how to write themselves into a [`PackBuffer`].
///
/// Implementations must issue the same sequence of writes in both phases.
pub trait Pack {
    fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError>;
}

/// Types that can be reconstructed from an [`UnpackBuffer`].
pub trait Unpack: Sized {
    fn unpack(buffer: &mut UnpackBuffer) -> Result<Self, PackError>;
}

/// Runs both phases for the given object and returns the packed bytes.
pub fn pack_to_vec<P: Pack + ?Sized>(object: &P) -> Result<Vec<u8>, PackError> {
    let mut buffer = PackBuffer::new();
    object.pack(&mut buffer)?;
    buffer.start_packing();
    object.pack(&mut buffer)?;
    buffer.finish()
}

impl Pack for [f64] {
    fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError> {
        buffer.add_pod(self.len())?;
        buffer.add_array(self)
    }
}

impl Pack for Vec<f64> {
    fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError> {
        self.as_slice().pack(buffer)
    }
}

impl Unpack for Vec<f64> {
    fn unpack(buffer: &mut UnpackBuffer) -> Result<Self, PackError> {
        let len: usize = buffer.extract_pod()?;
        buffer.extract_array(len)
    }
}

impl Pack for str {
    fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError> {
        buffer.add_pod(self.len())?;
        buffer.add_array(self.as_bytes())
    }
}

impl Unpack for String {
    fn unpack(buffer: &mut UnpackBuffer) -> Result<Self, PackError> {
        let len: usize = buffer.extract_pod()?;
        let bytes: Vec<u8> = buffer.extract_array(len)?;
        String::from_utf8(bytes).map_err(|err| PackError::InvalidData(err.to_string()))
    }
}
