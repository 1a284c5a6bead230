//! Activation Extractor
//!
//! Turns per-layer activation blocks into the node × feature matrix consumed
//! by the distance builder.

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::reduction::{pca_project, Reduction};
use crate::config::PipelineConfig;
use crate::error::{Result, TopologyError};

/// Seed for the PCA power iteration, fixed so reruns are reproducible.
const PCA_SEED: u64 = 0x5eed;

/// Variance below which a node is treated as constant.
const CONSTANT_VARIANCE: f64 = 1e-12;

/// What a graph node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// One node per unit (neuron / channel)
    #[default]
    Neurons,
    /// One node per input sample
    Samples,
}

/// Raw activations of one checkpoint, one `samples × units` block per layer
#[derive(Debug, Clone, Default)]
pub struct LayerActivations {
    pub layers: Vec<Array2<f64>>,
}

impl LayerActivations {
    pub fn new(layers: Vec<Array2<f64>>) -> Self {
        Self { layers }
    }

    /// Number of samples shared by all layers
    pub fn n_samples(&self) -> Option<usize> {
        self.layers.first().map(|l| l.nrows())
    }

    /// Total number of units across layers
    pub fn n_units(&self) -> usize {
        self.layers.iter().map(|l| l.ncols()).sum()
    }
}

/// Ordered node vectors, one row per graph node.
///
/// Owned by the extractor until it is moved into the distance builder.
#[derive(Debug, Clone)]
pub struct ActivationMatrix {
    data: Array2<f64>,
    n_samples: usize,
    original_nodes: usize,
}

impl ActivationMatrix {
    /// Wrap a node × feature matrix whose features are samples.
    pub fn from_nodes(data: Array2<f64>) -> Self {
        let n_samples = data.ncols();
        let original_nodes = data.nrows();
        Self {
            data,
            n_samples,
            original_nodes,
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Usable samples the activations were computed from
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Node count before constant-node filtering
    pub fn original_nodes(&self) -> usize {
        self.original_nodes
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}

/// Builds [`ActivationMatrix`] values from raw layer activations
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    node_mode: NodeMode,
    reduction: Option<Reduction>,
    drop_constant_nodes: bool,
}

impl Extractor {
    pub fn new(node_mode: NodeMode) -> Self {
        Self {
            node_mode,
            ..Self::default()
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            node_mode: config.node_mode,
            reduction: config.reduction,
            drop_constant_nodes: config.drop_constant_nodes,
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = Some(reduction);
        self
    }

    pub fn with_drop_constant_nodes(mut self, drop: bool) -> Self {
        self.drop_constant_nodes = drop;
        self
    }

    pub fn extract(&self, activations: LayerActivations) -> Result<ActivationMatrix> {
        let n_samples = activations.n_samples().ok_or_else(|| {
            TopologyError::DegenerateInput("activation source returned no layers".into())
        })?;

        for (idx, layer) in activations.layers.iter().enumerate() {
            if layer.nrows() != n_samples {
                return Err(TopologyError::ShapeMismatch(format!(
                    "layer {idx} has {} samples, layer 0 has {n_samples}",
                    layer.nrows()
                )));
            }
        }
        if n_samples == 0 {
            return Err(TopologyError::DegenerateInput(
                "activation extraction yielded zero samples".into(),
            ));
        }

        let views: Vec<ArrayView2<f64>> = activations.layers.iter().map(|l| l.view()).collect();
        let mut stacked = concatenate(Axis(1), &views)
            .map_err(|e| TopologyError::ShapeMismatch(e.to_string()))?;
        drop(activations);

        let mut non_finite = 0usize;
        stacked.mapv_inplace(|v| {
            if v.is_finite() {
                v
            } else {
                non_finite += 1;
                0.0
            }
        });
        if non_finite > 0 {
            warn!(non_finite, "replaced non-finite activations with 0");
        }

        let mut data = match self.node_mode {
            NodeMode::Neurons => stacked.t().to_owned(),
            NodeMode::Samples => stacked,
        };
        let original_nodes = data.nrows();

        if self.drop_constant_nodes {
            let keep: Vec<usize> = data
                .axis_iter(Axis(0))
                .enumerate()
                .filter(|(_, row)| row.var(0.0) > CONSTANT_VARIANCE)
                .map(|(i, _)| i)
                .collect();
            if keep.len() < original_nodes {
                debug!(dropped = original_nodes - keep.len(), "dropped constant nodes");
            }
            data = data.select(Axis(0), &keep);
        }

        if let Some(Reduction::Pca { components }) = self.reduction {
            data = pca_project(&data, components, PCA_SEED);
        }

        debug!(
            n_nodes = data.nrows(),
            n_features = data.ncols(),
            original_nodes,
            "extracted activation matrix"
        );

        Ok(ActivationMatrix {
            data,
            n_samples,
            original_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_layers() -> LayerActivations {
        // 3 samples; layer 0 has 2 units, layer 1 has 1 unit
        LayerActivations::new(vec![
            array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]],
            array![[0.5], [0.1], [0.9]],
        ])
    }

    #[test]
    fn test_neuron_nodes() {
        let m = Extractor::new(NodeMode::Neurons).extract(two_layers()).unwrap();
        assert_eq!(m.n_nodes(), 3);
        assert_eq!(m.n_features(), 3);
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.view().row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(m.view().row(2).to_vec(), vec![0.5, 0.1, 0.9]);
    }

    #[test]
    fn test_sample_nodes() {
        let m = Extractor::new(NodeMode::Samples).extract(two_layers()).unwrap();
        assert_eq!(m.n_nodes(), 3);
        assert_eq!(m.view().row(1).to_vec(), vec![2.0, 5.0, 0.1]);
    }

    #[test]
    fn test_drop_constant() {
        let m = Extractor::new(NodeMode::Neurons)
            .with_drop_constant_nodes(true)
            .extract(two_layers())
            .unwrap();
        assert_eq!(m.n_nodes(), 2);
        assert_eq!(m.original_nodes(), 3);
    }

    #[test]
    fn test_zero_samples_is_degenerate() {
        let acts = LayerActivations::new(vec![Array2::zeros((0, 4))]);
        let err = Extractor::default().extract(acts).unwrap_err();
        assert!(matches!(err, TopologyError::DegenerateInput(_)));

        let err = Extractor::default().extract(LayerActivations::default()).unwrap_err();
        assert!(matches!(err, TopologyError::DegenerateInput(_)));
    }

    #[test]
    fn test_mismatched_layers() {
        let acts = LayerActivations::new(vec![Array2::zeros((3, 2)), Array2::zeros((4, 2))]);
        let err = Extractor::default().extract(acts).unwrap_err();
        assert!(matches!(err, TopologyError::ShapeMismatch(_)));
    }

    #[test]
    fn test_non_finite_sanitized() {
        let acts = LayerActivations::new(vec![array![[f64::NAN], [1.0], [f64::INFINITY]]]);
        let m = Extractor::default().extract(acts).unwrap();
        assert_eq!(m.view().row(0).to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_pca_reduction_shape() {
        let m = Extractor::new(NodeMode::Samples)
            .with_reduction(Reduction::Pca { components: 2 })
            .extract(two_layers())
            .unwrap();
        assert_eq!(m.n_nodes(), 3);
        assert_eq!(m.n_features(), 2);
    }
}
