//! Pipeline Configuration
//!
//! All knobs of a run live in one explicit struct handed to the pipeline at
//! construction. Defaults reproduce the usual experiment settings:
//!
//! | Field                 | Default     | Meaning                                      |
//! |-----------------------|-------------|----------------------------------------------|
//! | `max_dim`             | 2           | Highest homology dimension computed          |
//! | `metric`              | `"pearson"` | Pairwise similarity measure                  |
//! | `absolute_similarity` | true        | Discard correlation sign before `√(1-s)`     |
//! | `max_distance`        | 1.0         | Sparsification cutoff (strict `<`)           |
//! | `eps_thresh`          | 1.0         | Scale at which Betti numbers are summarised  |
//! | `n_threads`           | all cores   | Worker hint for the device and the solver    |
//! | `collapse_edges`      | true        | Edge-collapse request forwarded to the solver|
//! | `reduced_homology`    | true        | Drop the global H₀ class                     |
//! | `max_simplices`       | 5 000 000   | Simplex budget; `null` lifts it              |

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation::{NodeMode, Reduction};
use crate::error::{Result, TopologyError};
use crate::topology::DEFAULT_MAX_SIMPLICES;

/// Configuration of a single run over a list of checkpoint epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum homology dimension (UPPER_DIM)
    pub max_dim: usize,
    /// Metric name, see [`crate::distance::Metric::from_name`]
    pub metric: String,
    /// Use |s| instead of s when mapping similarity to distance
    pub absolute_similarity: bool,
    /// Entries with distance `>= max_distance` are left out of the filtration
    pub max_distance: f64,
    /// Filtration scale used for the per-epoch Betti summary
    pub eps_thresh: f64,
    /// Worker threads; `None` means all available
    pub n_threads: Option<usize>,
    pub collapse_edges: bool,
    pub reduced_homology: bool,
    /// Log matrix statistics at info level
    pub verbose: bool,
    pub node_mode: NodeMode,
    pub reduction: Option<Reduction>,
    pub drop_constant_nodes: bool,
    /// Simplex budget for the built-in solver. Exceeding it is a
    /// `SolverFailure`; `None` removes the limit.
    pub max_simplices: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dim: 2,
            metric: "pearson".to_string(),
            absolute_similarity: true,
            max_distance: 1.0,
            eps_thresh: 1.0,
            n_threads: None,
            collapse_edges: true,
            reduced_homology: true,
            verbose: false,
            node_mode: NodeMode::Neurons,
            reduction: None,
            drop_constant_nodes: false,
            max_simplices: Some(DEFAULT_MAX_SIMPLICES),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TopologyError::io(path, e))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TopologyError::serialization(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(TopologyError::InvalidConfig(format!(
                "max_distance must be finite and positive, got {}",
                self.max_distance
            )));
        }
        if !self.eps_thresh.is_finite() || self.eps_thresh < 0.0 {
            return Err(TopologyError::InvalidConfig(format!(
                "eps_thresh must be finite and non-negative, got {}",
                self.eps_thresh
            )));
        }
        if self.n_threads == Some(0) {
            return Err(TopologyError::InvalidConfig(
                "n_threads must be at least 1 (omit it to use all cores)".into(),
            ));
        }
        if let Some(Reduction::Pca { components: 0 }) = self.reduction {
            return Err(TopologyError::InvalidConfig(
                "pca reduction needs at least one component".into(),
            ));
        }
        if self.max_simplices == Some(0) {
            return Err(TopologyError::InvalidConfig("max_simplices must be positive".into()));
        }
        Ok(())
    }
}

/// Deterministic artifact naming for one (network, dataset, iteration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLayout {
    pub save_dir: PathBuf,
    pub network: String,
    pub dataset: String,
    pub iteration: usize,
}

impl RunLayout {
    pub fn new(
        save_dir: impl Into<PathBuf>,
        network: impl Into<String>,
        dataset: impl Into<String>,
        iteration: usize,
    ) -> Self {
        Self {
            save_dir: save_dir.into(),
            network: network.into(),
            dataset: dataset.into(),
            iteration,
        }
    }

    /// `<save_dir>/<net>/<net>_<dataset>_ss<iter>`
    pub fn run_dir(&self) -> PathBuf {
        self.save_dir
            .join(&self.network)
            .join(format!("{}_{}_ss{}", self.network, self.dataset, self.iteration))
    }

    pub fn diagram_path(&self, epoch: usize) -> PathBuf {
        self.run_dir().join(format!("dgm_epoch_{epoch}.json"))
    }

    pub fn times_path(&self) -> PathBuf {
        self.run_dir().join("times.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dim, 2);
        assert_eq!(config.max_distance, 1.0);
        assert!(config.reduced_homology);
        assert_eq!(config.max_simplices, Some(DEFAULT_MAX_SIMPLICES));
    }

    #[test]
    fn test_null_budget_is_unlimited() {
        let config: PipelineConfig = serde_json::from_str(r#"{"max_simplices": null}"#).unwrap();
        assert_eq!(config.max_simplices, None);
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_simplices, Some(DEFAULT_MAX_SIMPLICES));
    }

    #[test]
    fn test_rejects_bad_cutoff() {
        let config = PipelineConfig {
            max_distance: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TopologyError::InvalidConfig(_))));

        let config = PipelineConfig {
            n_threads: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"metric": "spearman", "max_dim": 1, "reduction": {"kind": "pca", "components": 8}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.metric, "spearman");
        assert_eq!(config.max_dim, 1);
        assert_eq!(config.reduction, Some(Reduction::Pca { components: 8 }));
        assert_eq!(config.eps_thresh, 1.0);
    }

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::new("/tmp/results", "lenet", "mnist", 3);
        assert_eq!(
            layout.diagram_path(20),
            PathBuf::from("/tmp/results/lenet/lenet_mnist_ss3/dgm_epoch_20.json")
        );
        assert_eq!(
            layout.times_path(),
            PathBuf::from("/tmp/results/lenet/lenet_mnist_ss3/times.jsonl")
        );
    }
}
