//! Sparse Filtration Encoding
//!
//! Keeps exactly the entries of a dense distance matrix with value strictly
//! below the cutoff, in row-major coordinate (COO) form. Omitted entries are
//! "absent" for the solver: no edge, i.e. infinite distance. Restricting to
//! `d < cutoff` is the same as truncating the Vietoris-Rips filtration at
//! radius `cutoff`, and the solver's cost scales with the number of kept
//! entries.
//!
//! Diagonal entries are kept like any other (they are 0 < cutoff for a
//! well-formed matrix) and give the vertex birth values.

use ndarray::Array2;
use tracing::debug;

use crate::distance::{DistanceMatrix, DistanceSummary};

/// Default cutoff: the natural bound of the correlation distance
pub const DEFAULT_MAX_DISTANCE: f64 = 1.0;

/// One stored coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// COO representation of the truncated filtration
#[derive(Debug, Clone, PartialEq)]
pub struct SparseFiltration {
    n_nodes: usize,
    cutoff: f64,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl SparseFiltration {
    /// Keep every entry with `value < cutoff`, unchanged.
    pub fn encode(matrix: &DistanceMatrix, cutoff: f64) -> Self {
        let n = matrix.n_nodes();
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();

        for ((i, j), &value) in matrix.view().indexed_iter() {
            if value < cutoff {
                rows.push(i);
                cols.push(j);
                values.push(value);
            }
        }

        debug!(n, nnz = values.len(), cutoff, "encoded sparse filtration");
        Self {
            n_nodes: n,
            cutoff,
            rows,
            cols,
            values,
        }
    }

    /// Well-formed filtration with no stored entries
    pub fn empty(n_nodes: usize, cutoff: f64) -> Self {
        Self {
            n_nodes,
            cutoff,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Assemble from raw coordinates without any checks; the solver
    /// validates what it receives.
    pub fn from_triplets(n_nodes: usize, cutoff: f64, entries: Vec<SparseEntry>) -> Self {
        let mut out = Self::empty(n_nodes, cutoff);
        for e in entries {
            out.rows.push(e.row);
            out.cols.push(e.col);
            out.values.push(e.value);
        }
        out
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn entries(&self) -> impl Iterator<Item = SparseEntry> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&row, &col), &value)| SparseEntry { row, col, value })
    }

    /// Dense reconstruction, absent entries set to `fill`
    pub fn to_dense(&self, fill: f64) -> Array2<f64> {
        let mut out = Array2::from_elem((self.n_nodes, self.n_nodes), fill);
        for e in self.entries() {
            out[[e.row, e.col]] = e.value;
        }
        out
    }

    /// Statistics over stored values; `None` when empty
    pub fn summary(&self) -> Option<DistanceSummary> {
        DistanceSummary::from_values(self.values.iter().copied())
    }

    pub fn byte_size(&self) -> usize {
        self.nnz() * (2 * std::mem::size_of::<usize>() + std::mem::size_of::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sorted(f: &SparseFiltration) -> Vec<(usize, usize, u64)> {
        let mut v: Vec<_> = f.entries().map(|e| (e.row, e.col, e.value.to_bits())).collect();
        v.sort();
        v
    }

    fn sample() -> DistanceMatrix {
        DistanceMatrix::from_array(array![
            [0.0, 0.2, 1.0, 0.7],
            [0.2, 0.0, 0.99, 1.0],
            [1.0, 0.99, 0.0, 0.4],
            [0.7, 1.0, 0.4, 0.0]
        ])
        .unwrap()
    }

    #[test]
    fn test_strict_cutoff() {
        let dm = sample();
        let sf = SparseFiltration::encode(&dm, DEFAULT_MAX_DISTANCE);
        // 4 diagonal + 8 off-diagonal below 1.0
        assert_eq!(sf.nnz(), 12);
        assert!(sf.entries().all(|e| e.value < 1.0));
        assert!(!sf.entries().any(|e| (e.row, e.col) == (0, 2)));
    }

    #[test]
    fn test_reconstruction_matches_threshold() {
        let dm = sample();
        for &cutoff in &[0.0, 0.3, 0.7, 1.0, 2.0] {
            let sf = SparseFiltration::encode(&dm, cutoff);
            let dense = sf.to_dense(f64::INFINITY);
            for ((i, j), &v) in dm.view().indexed_iter() {
                if v < cutoff {
                    assert_eq!(dense[[i, j]].to_bits(), v.to_bits());
                } else {
                    assert!(dense[[i, j]] >= cutoff);
                }
            }
        }
    }

    #[test]
    fn test_no_duplicates_and_idempotent() {
        let dm = sample();
        let a = SparseFiltration::encode(&dm, 0.8);
        let b = SparseFiltration::encode(&dm, 0.8);
        assert_eq!(sorted(&a), sorted(&b));

        let mut coords: Vec<_> = a.entries().map(|e| (e.row, e.col)).collect();
        let before = coords.len();
        coords.dedup();
        assert_eq!(coords.len(), before);
    }

    #[test]
    fn test_all_filtered_is_empty_not_error() {
        let dm = DistanceMatrix::from_array(array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        let sf = SparseFiltration::encode(&dm, 0.0);
        assert!(sf.is_empty());
        assert_eq!(sf.n_nodes(), 2);
        assert!(sf.summary().is_none());
        assert_eq!(sf.to_dense(7.0), array![[7.0, 7.0], [7.0, 7.0]]);
    }

    #[test]
    fn test_two_clusters_keep_only_within_cluster_edges() {
        // {0, 1} and {2, 3}: distance 0 inside, 1 between
        let dm = DistanceMatrix::from_array(array![
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0]
        ])
        .unwrap();
        let sf = SparseFiltration::encode(&dm, 1.0);
        assert_eq!(sf.nnz(), 8);
        assert!(sf.entries().all(|e| (e.row < 2) == (e.col < 2) && e.value == 0.0));
    }
}
