//! Accumulation of local contributions into row-distributed containers.
use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::linalg::{DistributedMatrix, DistributedVector, DofRowMap};
use crate::Gid;
use mpfe_pack::{PackBuffer, UnpackBuffer};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Triplets destined for rows owned by other ranks, one list per rank.
type OffProcess<T> = Vec<Vec<T>>;

fn exchange<T, W, R>(comm: &dyn Communicator, outgoing: &OffProcess<T>, write: W, read: R) -> Result<Vec<Vec<T>>>
where
    W: Fn(&mut PackBuffer, &T) -> std::result::Result<(), mpfe_pack::PackError>,
    R: Fn(&mut UnpackBuffer) -> std::result::Result<T, mpfe_pack::PackError>,
{
    let send = outgoing
        .iter()
        .map(|entries| -> Result<Vec<u8>> {
            let mut buffer = PackBuffer::new();
            for phase in 0..2 {
                if phase == 1 {
                    buffer.start_packing();
                }
                buffer.add_pod(entries.len())?;
                for entry in entries {
                    write(&mut buffer, entry)?;
                }
            }
            Ok(buffer.finish()?)
        })
        .collect::<Result<Vec<_>>>()?;
    comm.all_to_all(send)?
        .iter()
        .map(|bytes| -> Result<Vec<T>> {
            if bytes.is_empty() {
                return Ok(Vec::new());
            }
            let mut reader = UnpackBuffer::new(bytes);
            let len: usize = reader.extract_pod()?;
            (0..len)
                .map(|_| read(&mut reader).map_err(Error::from))
                .collect()
        })
        .collect()
}

/// Sparse matrix under construction. Contributions to rows of other ranks are buffered until
/// [`MatrixAccumulator::complete`].
#[derive(Debug, Clone)]
pub struct MatrixAccumulator {
    map: Arc<DofRowMap>,
    rows: Vec<BTreeMap<Gid, f64>>,
    off_process: OffProcess<(Gid, Gid, f64)>,
}

impl MatrixAccumulator {
    pub fn new(map: Arc<DofRowMap>) -> Self {
        Self {
            rows: vec![BTreeMap::new(); map.num_owned()],
            off_process: vec![Vec::new(); map.num_ranks()],
            map,
        }
    }

    pub fn map(&self) -> &Arc<DofRowMap> {
        &self.map
    }

    pub fn add(&mut self, row: Gid, col: Gid, value: f64) -> Result<()> {
        match self.map.local_index(row) {
            Some(i) => *self.rows[i].entry(col).or_insert(0.0) += value,
            None => {
                let owner = self
                    .map
                    .owner_of(row)
                    .ok_or_else(|| Error::Connectivity(format!("Row {} is outside the DOF map", row)))?;
                self.off_process[owner].push((row, col, value));
            }
        }
        Ok(())
    }

    /// Exchanges buffered rows and returns the assembled matrix. Collective.
    ///
    /// Received contributions are added in rank order after the local ones.
    pub fn complete(mut self, comm: &dyn Communicator) -> Result<DistributedMatrix> {
        let received = exchange(
            comm,
            &self.off_process,
            |buffer, &(row, col, value)| {
                buffer.add_pod(row)?;
                buffer.add_pod(col)?;
                buffer.add_pod(value)
            },
            |reader| Ok((reader.extract_pod()?, reader.extract_pod()?, reader.extract_pod()?)),
        )?;
        for (row, col, value) in received.into_iter().flatten() {
            let i = self
                .map
                .local_index(row)
                .ok_or_else(|| Error::Communication(format!("Received row {} which is not owned", row)))?;
            *self.rows[i].entry(col).or_insert(0.0) += value;
        }

        let nnz = self.rows.iter().map(BTreeMap::len).sum();
        let mut offsets = Vec::with_capacity(self.rows.len() + 1);
        let mut col_indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        offsets.push(0);
        for row in &self.rows {
            for (&col, &value) in row {
                col_indices.push(col);
                values.push(value);
            }
            offsets.push(col_indices.len());
        }
        let local = CsrMatrix::try_from_csr_data(
            self.map.num_owned(),
            self.map.num_global(),
            offsets,
            col_indices,
            values,
        )
        .map_err(|err| Error::Connectivity(format!("Invalid assembled matrix: {}", err)))?;
        Ok(DistributedMatrix::from_local_csr(self.map, local))
    }
}

/// Vector under construction, with off-process entries buffered like [`MatrixAccumulator`].
#[derive(Debug, Clone)]
pub struct VectorAccumulator {
    map: Arc<DofRowMap>,
    values: DVector<f64>,
    off_process: OffProcess<(Gid, f64)>,
}

impl VectorAccumulator {
    pub fn new(map: Arc<DofRowMap>) -> Self {
        Self {
            values: DVector::zeros(map.num_owned()),
            off_process: vec![Vec::new(); map.num_ranks()],
            map,
        }
    }

    pub fn add(&mut self, row: Gid, value: f64) -> Result<()> {
        match self.map.local_index(row) {
            Some(i) => self.values[i] += value,
            None => {
                let owner = self
                    .map
                    .owner_of(row)
                    .ok_or_else(|| Error::Connectivity(format!("Row {} is outside the DOF map", row)))?;
                self.off_process[owner].push((row, value));
            }
        }
        Ok(())
    }

    /// Exchanges buffered entries and returns the assembled vector. Collective.
    pub fn complete(mut self, comm: &dyn Communicator) -> Result<DistributedVector> {
        let received = exchange(
            comm,
            &self.off_process,
            |buffer, &(row, value)| {
                buffer.add_pod(row)?;
                buffer.add_pod(value)
            },
            |reader| Ok((reader.extract_pod()?, reader.extract_pod()?)),
        )?;
        for (row, value) in received.into_iter().flatten() {
            let i = self
                .map
                .local_index(row)
                .ok_or_else(|| Error::Communication(format!("Received row {} which is not owned", row)))?;
            self.values[i] += value;
        }
        Ok(DistributedVector::from_owned(self.map, self.values))
    }
}

/// Zeroes the rows and columns of the constrained DOFs and puts a unit entry on their diagonal.
///
/// Columns are zeroed by visiting the rows coupled to a constrained row, which requires a
/// structurally symmetric pattern. Constrained rows must contain their diagonal entry.
pub fn apply_dirichlet_csr(matrix: &mut CsrMatrix<f64>, constrained: &[Gid]) -> Result<()> {
    let n = matrix.nrows();
    let mut is_constrained = vec![false; n];
    let mut rows_to_visit = vec![false; n];

    for &row_idx in constrained {
        if row_idx >= n {
            return Err(Error::Connectivity(format!(
                "Constrained DOF {} is outside the {}x{} system",
                row_idx, n, n
            )));
        }
        is_constrained[row_idx] = true;
        let mut row = matrix.row_mut(row_idx);
        let (cols, values) = row.cols_and_values_mut();
        let mut has_diagonal = false;
        for (&col_idx, val) in cols.iter().zip(values) {
            if col_idx == row_idx {
                *val = 1.0;
                has_diagonal = true;
            } else {
                *val = 0.0;
                // (c, r) must be zeroed as well, so row c needs a visit
                rows_to_visit[col_idx] = true;
            }
        }
        if !has_diagonal {
            return Err(Error::Connectivity(format!(
                "Constrained DOF {} has no diagonal entry",
                row_idx
            )));
        }
    }

    for row_idx in (0..n).filter(|&i| rows_to_visit[i] && !is_constrained[i]) {
        let mut row = matrix.row_mut(row_idx);
        let (cols, values) = row.cols_and_values_mut();
        for (&col_idx, val) in cols.iter().zip(values) {
            if is_constrained[col_idx] {
                *val = 0.0;
            }
        }
    }
    Ok(())
}

/// Zeroes the constrained entries of a right-hand side.
pub fn apply_dirichlet_rhs(rhs: &mut DVector<f64>, constrained: &[Gid]) {
    for &idx in constrained {
        rhs[idx] = 0.0;
    }
}
