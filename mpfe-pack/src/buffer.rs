use crate::{Pod, PackError, OBJECT_HEADER_SIZE};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Sizing,
    Packing,
}

/// Two-phase byte packer.
///
/// See the crate-level documentation for the protocol.
#[derive(Debug, Clone)]
pub struct PackBuffer {
    buf: Vec<u8>,
    size: usize,
    phase: Phase,
}

impl Default for PackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PackBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            size: 0,
            phase: Phase::Sizing,
        }
    }

    /// Ends the sizing phase and reserves the accumulated number of bytes.
    ///
    /// Calling this more than once has no further effect.
    pub fn start_packing(&mut self) {
        if self.phase == Phase::Sizing {
            self.phase = Phase::Packing;
            self.buf.reserve_exact(self.size);
        }
    }

    pub fn is_sizing(&self) -> bool {
        self.phase == Phase::Sizing
    }

    /// The number of bytes accumulated during the sizing phase.
    pub fn required_size(&self) -> usize {
        self.size
    }

    /// The bytes written so far. Empty during the sizing phase.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the buffer and returns the packed bytes.
    ///
    /// Fails if the packing phase has not been started, or if it wrote fewer bytes than
    /// were accumulated during sizing.
    pub fn finish(self) -> Result<Vec<u8>, PackError> {
        if self.phase == Phase::Sizing && self.size > 0 {
            return Err(PackError::SizeMismatch {
                reserved: self.size,
                written: 0,
            });
        }
        if self.buf.len() != self.size {
            return Err(PackError::SizeMismatch {
                reserved: self.size,
                written: self.buf.len(),
            });
        }
        Ok(self.buf)
    }

    /// Adds a single POD value.
    pub fn add_pod<P: Pod>(&mut self, value: P) -> Result<(), PackError> {
        match self.phase {
            Phase::Sizing => {
                self.size += P::SIZE;
                Ok(())
            }
            Phase::Packing => {
                let offset = self.grow(P::SIZE)?;
                value.write_le(&mut self.buf[offset..offset + P::SIZE]);
                Ok(())
            }
        }
    }

    /// Adds the values of the slice without a length prefix.
    pub fn add_array<P: Pod>(&mut self, values: &[P]) -> Result<(), PackError> {
        let nbytes = P::SIZE * values.len();
        match self.phase {
            Phase::Sizing => {
                self.size += nbytes;
                Ok(())
            }
            Phase::Packing => {
                let offset = self.grow(nbytes)?;
                for (value, chunk) in values
                    .iter()
                    .zip(self.buf[offset..offset + nbytes].chunks_exact_mut(P::SIZE))
                {
                    value.write_le(chunk);
                }
                Ok(())
            }
        }
    }

    /// Starts a framed object.
    ///
    /// A placeholder size header is written immediately. When the returned marker goes out of
    /// scope (or [`ObjectMarker::end`] is called), the header is patched with the number of bytes
    /// written through the marker.
    pub fn begin_object(&mut self) -> Result<ObjectMarker<'_>, PackError> {
        self.add_pod(0i32)?;
        let start = self.buf.len();
        Ok(ObjectMarker { buffer: self, start })
    }

    fn grow(&mut self, nbytes: usize) -> Result<usize, PackError> {
        let offset = self.buf.len();
        if offset + nbytes > self.size {
            return Err(PackError::BufferOverflow {
                reserved: self.size,
                requested: offset + nbytes,
            });
        }
        self.buf.resize(offset + nbytes, 0);
        Ok(offset)
    }

    fn set_object_size(&mut self, start: usize) {
        if self.phase == Phase::Packing {
            let object_size = (self.buf.len() - start) as i32;
            object_size.write_le(&mut self.buf[start - OBJECT_HEADER_SIZE..start]);
        }
    }
}

/// Scoped marker of a framed object. Dereferences to the underlying [`PackBuffer`].
#[derive(Debug)]
pub struct ObjectMarker<'a> {
    buffer: &'a mut PackBuffer,
    start: usize,
}

impl<'a> ObjectMarker<'a> {
    /// Explicitly ends the object. Equivalent to dropping the marker.
    pub fn end(self) {}
}

impl<'a> Deref for ObjectMarker<'a> {
    type Target = PackBuffer;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl<'a> DerefMut for ObjectMarker<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl<'a> Drop for ObjectMarker<'a> {
    fn drop(&mut self) {
        self.buffer.set_object_size(self.start);
    }
}
