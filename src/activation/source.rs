//! Activation Sources
//!
//! The network, its checkpoints and the data subset live outside this crate.
//! A source hands back the activations of one checkpoint epoch.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use super::extractor::LayerActivations;
use crate::error::{Result, TopologyError};

/// Anything that can run a frozen checkpoint over the fixed data subset
pub trait ActivationSource {
    /// Activations for checkpoint `epoch`, one `samples × units` block per layer
    fn load_epoch(&mut self, epoch: usize) -> Result<LayerActivations>;
}

/// Pre-recorded activations keyed by epoch
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    epochs: BTreeMap<usize, LayerActivations>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, epoch: usize, activations: LayerActivations) {
        self.epochs.insert(epoch, activations);
    }

    pub fn with_epoch(mut self, epoch: usize, activations: LayerActivations) -> Self {
        self.insert(epoch, activations);
        self
    }
}

impl ActivationSource for InMemorySource {
    fn load_epoch(&mut self, epoch: usize) -> Result<LayerActivations> {
        self.epochs.get(&epoch).cloned().ok_or_else(|| {
            TopologyError::DegenerateInput(format!("no activations recorded for epoch {epoch}"))
        })
    }
}

#[derive(Deserialize)]
struct LayerFile {
    layers: Vec<Vec<Vec<f64>>>,
}

/// Reads `<dir>/epoch_<e>.json` files of the form `{"layers": [[[f64]]]}`
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch}.json"))
    }
}

impl ActivationSource for JsonDirSource {
    fn load_epoch(&mut self, epoch: usize) -> Result<LayerActivations> {
        let path = self.epoch_path(epoch);
        let file = File::open(&path).map_err(|e| TopologyError::io(&path, e))?;
        let parsed: LayerFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TopologyError::serialization(&path, e))?;

        let mut layers = Vec::with_capacity(parsed.layers.len());
        for (idx, rows) in parsed.layers.into_iter().enumerate() {
            let n_rows = rows.len();
            let n_cols = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|r| r.len() != n_cols) {
                return Err(TopologyError::ShapeMismatch(format!(
                    "{}: layer {idx} has ragged rows",
                    path.display()
                )));
            }
            let flat: Vec<f64> = rows.into_iter().flatten().collect();
            let block = Array2::from_shape_vec((n_rows, n_cols), flat)
                .map_err(|e| TopologyError::ShapeMismatch(e.to_string()))?;
            layers.push(block);
        }
        Ok(LayerActivations::new(layers))
    }
}

/// Synthetic network whose units form groups driven by shared latent signals.
///
/// The latent signals are fixed (same data subset every epoch); the private
/// noise of each unit shrinks as the epoch grows, so within-group
/// correlation tightens over "training".
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub n_groups: usize,
    pub units_per_group: usize,
    pub n_samples: usize,
    pub n_layers: usize,
    /// Noise std at epoch 0
    pub base_noise: f64,
    /// Noise std is `base_noise / (1 + sharpening · epoch)`
    pub sharpening: f64,
    pub seed: u64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            n_groups: 3,
            units_per_group: 8,
            n_samples: 64,
            n_layers: 2,
            base_noise: 1.5,
            sharpening: 0.25,
            seed: 42,
        }
    }
}

impl SyntheticSource {
    pub fn noise_at(&self, epoch: usize) -> f64 {
        self.base_noise / (1.0 + self.sharpening * epoch as f64)
    }
}

impl ActivationSource for SyntheticSource {
    fn load_epoch(&mut self, epoch: usize) -> Result<LayerActivations> {
        let invalid = |e: rand_distr::NormalError| TopologyError::InvalidConfig(e.to_string());
        let unit = Normal::new(0.0, 1.0).map_err(invalid)?;
        let noise = Normal::new(0.0, self.noise_at(epoch)).map_err(invalid)?;

        let mut latent_rng = StdRng::seed_from_u64(self.seed);
        let latent = Array2::from_shape_fn((self.n_groups, self.n_samples), |_| {
            unit.sample(&mut latent_rng)
        });

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1 + epoch as u64));
        let n_units = self.n_groups * self.units_per_group;
        let gains: Vec<f64> = (0..n_units).map(|_| 1.0 + 0.25 * unit.sample(&mut rng)).collect();

        // Units are dealt round-robin over layers
        let n_layers = self.n_layers.max(1);
        let mut per_layer: Vec<Vec<usize>> = vec![Vec::new(); n_layers];
        for u in 0..n_units {
            per_layer[u % n_layers].push(u);
        }

        let layers = per_layer
            .into_iter()
            .map(|units| {
                Array2::from_shape_fn((self.n_samples, units.len()), |(s, c)| {
                    let u = units[c];
                    let group = u / self.units_per_group;
                    gains[u] * latent[[group, s]] + noise.sample(&mut rng)
                })
            })
            .collect();

        Ok(LayerActivations::new(layers))
    }
}
