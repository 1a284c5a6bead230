//! Error taxonomy for the activation → persistence pipeline.
//!
//! Every failure surfaces to the top-level run. Nothing here is retried:
//! persistence computation is deterministic for identical input, so a retry
//! would reproduce the same failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    /// Unrecognised distance-metric selector.
    #[error("invalid metric: {0:?} (expected pearson, spearman or dcor)")]
    InvalidMetric(String),

    /// Activation extraction yielded zero usable samples.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The persistence engine rejected the input or ran out of resources.
    #[error("persistence solver {solver} failed{}: {reason}", fmt_epoch(.epoch))]
    SolverFailure {
        solver: String,
        epoch: Option<usize>,
        reason: String,
    },

    /// An artifact could not be read or written.
    #[error("i/o failure at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failure at {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

fn fmt_epoch(epoch: &Option<usize>) -> String {
    match epoch {
        Some(e) => format!(" at epoch {e}"),
        None => String::new(),
    }
}

impl TopologyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization { path: path.into(), source }
    }

    pub(crate) fn solver(solver: &str, reason: impl Into<String>) -> Self {
        Self::SolverFailure {
            solver: solver.to_string(),
            epoch: None,
            reason: reason.into(),
        }
    }

    /// Attach the checkpoint epoch to a solver failure.
    pub(crate) fn at_epoch(self, at: usize) -> Self {
        match self {
            Self::SolverFailure { solver, reason, .. } => Self::SolverFailure {
                solver,
                epoch: Some(at),
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;
