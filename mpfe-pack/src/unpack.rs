use crate::{PackError, Pod, OBJECT_HEADER_SIZE};

/// Sequential reader over bytes produced by a [`PackBuffer`](crate::PackBuffer).
#[derive(Debug, Clone)]
pub struct UnpackBuffer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> UnpackBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, nbytes: usize) -> Result<&'a [u8], PackError> {
        if nbytes > self.remaining() {
            return Err(PackError::UnexpectedEnd {
                requested: nbytes,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + nbytes];
        self.position += nbytes;
        Ok(slice)
    }

    pub fn extract_pod<P: Pod>(&mut self) -> Result<P, PackError> {
        self.take(P::SIZE).map(P::read_le)
    }

    /// Extracts `len` values written by [`PackBuffer::add_array`](crate::PackBuffer::add_array).
    pub fn extract_array<P: Pod>(&mut self, len: usize) -> Result<Vec<P>, PackError> {
        let nbytes = P::SIZE.checked_mul(len).ok_or(PackError::UnexpectedEnd {
            requested: usize::MAX,
            available: self.remaining(),
        })?;
        let bytes = self.take(nbytes)?;
        Ok(bytes.chunks_exact(P::SIZE).map(P::read_le).collect())
    }

    /// Reads the header of the next framed object and returns a reader restricted to its payload.
    ///
    /// The position of `self` is advanced past the whole object.
    pub fn extract_object(&mut self) -> Result<UnpackBuffer<'a>, PackError> {
        let size: i32 = self.extract_pod()?;
        if size < 0 {
            return Err(PackError::InvalidObjectHeader { size });
        }
        let payload = self.take(size as usize)?;
        Ok(UnpackBuffer::new(payload))
    }

    /// Skips the next framed object without interpreting its content.
    ///
    /// Returns the size of the skipped payload.
    pub fn skip_object(&mut self) -> Result<usize, PackError> {
        self.extract_object().map(|object| object.data.len())
    }

    /// Peeks at the size header of the next object without consuming it.
    pub fn peek_object_size(&self) -> Result<usize, PackError> {
        let mut copy = self.clone();
        let size: i32 = copy.extract_pod()?;
        if size < 0 {
            return Err(PackError::InvalidObjectHeader { size });
        }
        Ok(size as usize + OBJECT_HEADER_SIZE)
    }
}
