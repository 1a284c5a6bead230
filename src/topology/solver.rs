//! Boundary with the persistence engine.
//!
//! The engine receives a sparse precomputed distance matrix, the maximum
//! homology dimension, a worker hint and an edge-collapse flag. It answers
//! with per-dimension `[birth, death]` arrays in the engine's own layout,
//! which [`crate::topology::PersistenceDiagram::from_raw`] normalises.

use super::sparse::SparseFiltration;
use crate::config::PipelineConfig;
use crate::error::Result;

/// Default simplex budget of the built-in engine. A complete graph on 100
/// nodes at `max_dim = 2` needs about 4.1 million simplices.
pub const DEFAULT_MAX_SIMPLICES: usize = 5_000_000;

/// Request parameters forwarded to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverOptions {
    /// Highest homology dimension to report
    pub max_dim: usize,
    /// Worker threads; `None` means all available
    pub n_threads: Option<usize>,
    pub collapse_edges: bool,
    /// Abort with a resource failure beyond this many simplices;
    /// `None` lifts the limit
    pub max_simplices: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_dim: 2,
            n_threads: None,
            collapse_edges: true,
            max_simplices: Some(DEFAULT_MAX_SIMPLICES),
        }
    }
}

impl SolverOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_dim: config.max_dim,
            n_threads: config.n_threads,
            collapse_edges: config.collapse_edges,
            max_simplices: config.max_simplices,
        }
    }
}

/// Raw engine output: `dgms[d]` holds the `[birth, death]` pairs of H_d.
///
/// Order inside a dimension is engine-defined. Zero-persistence pairs may be
/// present and deaths may be `f64::INFINITY`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPersistence {
    pub dgms: Vec<Vec<[f64; 2]>>,
}

/// An engine computing Vietoris-Rips persistence from a sparse matrix
pub trait PersistenceSolver {
    /// Short engine name used in logs and error messages
    fn name(&self) -> &str;

    /// Failures are reported as [`crate::TopologyError::SolverFailure`].
    fn compute(&self, filtration: &SparseFiltration, options: &SolverOptions)
        -> Result<RawPersistence>;
}

impl<S: PersistenceSolver + ?Sized> PersistenceSolver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compute(
        &self,
        filtration: &SparseFiltration,
        options: &SolverOptions,
    ) -> Result<RawPersistence> {
        (**self).compute(filtration, options)
    }
}
