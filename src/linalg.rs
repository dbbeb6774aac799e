//! Row-distributed vectors and matrices over a contiguous DOF numbering.
//!
//! Global DOF ids are numbered contiguously per rank in rank order, so a row map is fully
//! described by the offsets of the rank ranges. Every rank stores its owned rows only. The
//! gather operations replicate a distributed object on every rank, which is how the core hands
//! assembled systems to solvers that run redundantly on all ranks.
use crate::comm::{all_gather_array, Communicator};
use crate::error::{Error, Result};
use crate::Gid;
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::ops::Range;
use std::sync::Arc;

/// Owned row ranges of all ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofRowMap {
    /// `offsets[r]..offsets[r + 1]` are the rows owned by rank `r`.
    offsets: Vec<usize>,
    rank: usize,
}

impl DofRowMap {
    /// Creates a map from per-rank offsets, which must start at zero and be non-decreasing.
    pub fn from_offsets(offsets: Vec<usize>, rank: usize) -> Self {
        assert!(offsets.len() >= 2, "Offsets must describe at least one rank");
        assert_eq!(offsets[0], 0, "Offsets must start at zero");
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "Offsets must be non-decreasing");
        assert!(rank + 1 < offsets.len(), "Rank out of bounds");
        Self { offsets, rank }
    }

    /// Map of a single rank owning all `n` rows.
    pub fn serial(n: usize) -> Self {
        Self::from_offsets(vec![0, n], 0)
    }

    /// Builds the map from the number of rows owned by every rank.
    pub fn from_counts(counts: &[usize], rank: usize) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        for count in counts {
            offsets.push(offsets.last().copied().unwrap_or(0) + count);
        }
        Self::from_offsets(offsets, rank)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_ranks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_global(&self) -> usize {
        self.offsets[self.num_ranks()]
    }

    pub fn owned_range(&self) -> Range<Gid> {
        self.range_of(self.rank)
    }

    pub fn range_of(&self, rank: usize) -> Range<Gid> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    pub fn num_owned(&self) -> usize {
        self.owned_range().len()
    }

    pub fn is_owned(&self, dof: Gid) -> bool {
        self.owned_range().contains(&dof)
    }

    /// Local row index of an owned DOF.
    pub fn local_index(&self, dof: Gid) -> Option<usize> {
        self.is_owned(dof).then(|| dof - self.offsets[self.rank])
    }

    /// Rank owning the given global DOF.
    pub fn owner_of(&self, dof: Gid) -> Option<usize> {
        if dof >= self.num_global() {
            return None;
        }
        // Last rank whose range starts at or before dof. Empty ranges share offsets with
        // their successor, so the partition point skips them.
        let rank = self.offsets.partition_point(|&offset| offset <= dof) - 1;
        Some(rank)
    }
}

/// A vector distributed by rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedVector {
    map: Arc<DofRowMap>,
    values: DVector<f64>,
}

impl DistributedVector {
    pub fn zeros(map: Arc<DofRowMap>) -> Self {
        let values = DVector::zeros(map.num_owned());
        Self { map, values }
    }

    pub fn from_owned(map: Arc<DofRowMap>, values: DVector<f64>) -> Self {
        assert_eq!(values.len(), map.num_owned(), "Owned values must match the row map");
        Self { map, values }
    }

    /// Extracts the owned rows from a replicated global vector.
    pub fn from_global(map: Arc<DofRowMap>, global: DVectorView<f64>) -> Self {
        assert_eq!(global.len(), map.num_global(), "Global vector must match the row map");
        let range = map.owned_range();
        let values = global.rows(range.start, range.len()).into_owned();
        Self { map, values }
    }

    pub fn map(&self) -> &Arc<DofRowMap> {
        &self.map
    }

    pub fn owned(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn owned_mut(&mut self) -> &mut DVector<f64> {
        &mut self.values
    }

    /// Value of an owned DOF.
    pub fn get(&self, dof: Gid) -> Option<f64> {
        self.map.local_index(dof).map(|i| self.values[i])
    }

    /// Sets an owned DOF. Returns `false` if the DOF is not owned by this rank.
    pub fn set(&mut self, dof: Gid, value: f64) -> bool {
        match self.map.local_index(dof) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// `self = a * x + b * self`.
    pub fn axpy(&mut self, a: f64, x: &DistributedVector, b: f64) {
        assert_eq!(self.map, x.map, "Vectors must share the row map");
        self.values.axpy(a, &x.values, b);
    }

    pub fn dot(&self, comm: &dyn Communicator, other: &DistributedVector) -> Result<f64> {
        crate::comm::sum_all(comm, self.values.dot(&other.values))
    }

    pub fn norm(&self, comm: &dyn Communicator) -> Result<f64> {
        Ok(self.dot(comm, self)?.sqrt())
    }

    /// Replicates the full vector on every rank.
    pub fn gather_global(&self, comm: &dyn Communicator) -> Result<DVector<f64>> {
        let parts = all_gather_array(comm, self.values.as_slice())?;
        let global: Vec<f64> = parts.into_iter().flatten().collect();
        if global.len() != self.map.num_global() {
            return Err(Error::Communication(format!(
                "Gathered {} entries for a vector of global size {}",
                global.len(),
                self.map.num_global()
            )));
        }
        Ok(DVector::from_vec(global))
    }
}

/// A sparse matrix distributed by rows. Each rank stores its owned rows with global column
/// indices.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedMatrix {
    map: Arc<DofRowMap>,
    local: CsrMatrix<f64>,
}

impl DistributedMatrix {
    pub fn from_local_csr(map: Arc<DofRowMap>, local: CsrMatrix<f64>) -> Self {
        assert_eq!(local.nrows(), map.num_owned());
        assert_eq!(local.ncols(), map.num_global());
        Self { map, local }
    }

    pub fn map(&self) -> &Arc<DofRowMap> {
        &self.map
    }

    pub fn local(&self) -> &CsrMatrix<f64> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut CsrMatrix<f64> {
        &mut self.local
    }

    /// Value at a global position in an owned row, zero for entries outside the pattern.
    pub fn get(&self, row: Gid, col: Gid) -> Option<f64> {
        let i = self.map.local_index(row)?;
        Some(
            self.local
                .get_entry(i, col)
                .map(|entry| entry.into_value())
                .unwrap_or(0.0),
        )
    }

    /// Replicates the full matrix on every rank.
    pub fn gather_global(&self, comm: &dyn Communicator) -> Result<CsrMatrix<f64>> {
        let offset = self.map.owned_range().start;
        let mut rows = Vec::with_capacity(self.local.nnz());
        let mut cols = Vec::with_capacity(self.local.nnz());
        let mut values = Vec::with_capacity(self.local.nnz());
        for (i, j, v) in self.local.triplet_iter() {
            rows.push(offset + i);
            cols.push(j);
            values.push(*v);
        }
        let all_rows = all_gather_array(comm, &rows)?;
        let all_cols = all_gather_array(comm, &cols)?;
        let all_values = all_gather_array(comm, &values)?;

        let n = self.map.num_global();
        let mut coo = CooMatrix::new(n, n);
        for ((rows, cols), values) in all_rows.iter().zip(&all_cols).zip(&all_values) {
            for ((&i, &j), &v) in rows.iter().zip(cols).zip(values) {
                coo.push(i, j, v);
            }
        }
        Ok(CsrMatrix::from(&coo))
    }
}
