use crate::error::{Error, Result};
use crate::linalg::{DistributedVector, DofRowMap};
use mpfe_pack::{PackBuffer, PackError, UnpackBuffer};
use nalgebra::DVector;
use std::sync::Arc;

/// State vectors of a time integrator.
#[derive(Debug, Clone)]
pub struct TimeState {
    /// `x_{n+1}`, the unknown of the current step.
    pub phinp: DistributedVector,
    pub phin: DistributedVector,
    /// `x_{n-1}`, only kept by multistep schemes.
    pub phinm: Option<DistributedVector>,
    pub phidtn: DistributedVector,
    pub phidtnp: DistributedVector,
}

impl TimeState {
    pub fn new(map: Arc<DofRowMap>, with_previous: bool) -> Self {
        let zeros = DistributedVector::zeros(map);
        Self {
            phinp: zeros.clone(),
            phin: zeros.clone(),
            phinm: with_previous.then(|| zeros.clone()),
            phidtn: zeros.clone(),
            phidtnp: zeros,
        }
    }

    /// Shifts the state by one step: `x_{n-1} <- x_n`, `x_n <- x_{n+1}` and the same for the
    /// time derivative.
    pub fn rotate(&mut self) {
        if let Some(phinm) = &mut self.phinm {
            phinm.owned_mut().copy_from(self.phin.owned());
        }
        self.phin.owned_mut().copy_from(self.phinp.owned());
        self.phidtn.owned_mut().copy_from(self.phidtnp.owned());
    }

    fn vectors(&self) -> impl Iterator<Item = &DistributedVector> {
        [&self.phinp, &self.phin, &self.phidtn, &self.phidtnp]
            .into_iter()
            .chain(self.phinm.as_ref())
    }

    /// Writes the owned values of all vectors.
    pub fn pack(&self, buffer: &mut PackBuffer) -> std::result::Result<(), PackError> {
        buffer.add_pod(self.phinm.is_some())?;
        for vector in self.vectors() {
            buffer.add_pod(vector.owned().len())?;
            buffer.add_array(vector.owned().as_slice())?;
        }
        Ok(())
    }

    /// Reads vectors written by [`TimeState::pack`] into a state of the same layout.
    pub fn unpack_into(&mut self, buffer: &mut UnpackBuffer) -> Result<()> {
        let with_previous: bool = buffer.extract_pod()?;
        if with_previous != self.phinm.is_some() {
            return Err(Error::Configuration(format!(
                "Restart {} the previous step, the integrator {}",
                if with_previous { "contains" } else { "lacks" },
                if self.phinm.is_some() { "needs it" } else { "does not" }
            )));
        }
        let mut read = |vector: &mut DistributedVector| -> Result<()> {
            let len: usize = buffer.extract_pod()?;
            if len != vector.owned().len() {
                return Err(Error::Configuration(format!(
                    "Restart vector with {} owned entries does not match {} owned DOFs",
                    len,
                    vector.owned().len()
                )));
            }
            let values: Vec<f64> = buffer.extract_array(len)?;
            *vector.owned_mut() = DVector::from_vec(values);
            Ok(())
        };
        read(&mut self.phinp)?;
        read(&mut self.phin)?;
        read(&mut self.phidtn)?;
        read(&mut self.phidtnp)?;
        if let Some(phinm) = &mut self.phinm {
            read(phinm)?;
        }
        Ok(())
    }
}
