//! Distance Matrix Builder
//!
//! Similarity s(i, j) from the selected [`Metric`] is mapped to a distance
//!
//!   d(i, j) = √(1 − s(i, j))
//!
//! which sends s = 1 → 0 and s = 0 → 1 and is a pseudometric for
//! correlation-derived similarities. With `absolute_similarity` the sign of
//! the correlation is discarded first, keeping d ∈ [0, 1]; otherwise
//! d ∈ [0, √2].

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::backend::{ComputeDevice, DeviceBuffer};
use super::metric::Metric;
use crate::activation::ActivationMatrix;
use crate::config::PipelineConfig;
use crate::error::{Result, TopologyError};

const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Map a raw similarity to a distance.
///
/// NaN (undefined correlation) is treated as no similarity; values are
/// clamped to [-1, 1] so rounding never pushes `1 − s` below zero.
pub fn similarity_to_distance(similarity: f64, absolute: bool) -> f64 {
    let s = if similarity.is_nan() {
        0.0
    } else if absolute {
        similarity.abs()
    } else {
        similarity
    };
    let s = s.clamp(-1.0, 1.0);
    (1.0 - s).max(0.0).sqrt()
}

/// Min / mean / max of a set of distances
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceSummary {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl DistanceSummary {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            count,
            min,
            mean: sum / count as f64,
            max,
        })
    }
}

/// Dense N×N distance matrix: symmetric, zero diagonal, finite, non-negative
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Array2<f64>,
}

impl DistanceMatrix {
    /// Validate and wrap a precomputed matrix.
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(TopologyError::ShapeMismatch(format!(
                "distance matrix must be square, got {rows}×{cols}"
            )));
        }
        for i in 0..rows {
            if data[[i, i]].abs() > SYMMETRY_TOLERANCE {
                return Err(TopologyError::ShapeMismatch(format!(
                    "non-zero diagonal at {i}: {}",
                    data[[i, i]]
                )));
            }
            for j in i + 1..cols {
                let (a, b) = (data[[i, j]], data[[j, i]]);
                if !a.is_finite() || !b.is_finite() || a < 0.0 || b < 0.0 {
                    return Err(TopologyError::ShapeMismatch(format!(
                        "entry ({i}, {j}) is not a finite non-negative distance"
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOLERANCE {
                    return Err(TopologyError::ShapeMismatch(format!(
                        "asymmetric entries at ({i}, {j}): {a} vs {b}"
                    )));
                }
            }
        }
        Ok(Self { data })
    }

    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n)),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.data.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Statistics over every entry, diagonal included
    pub fn summary(&self) -> Option<DistanceSummary> {
        DistanceSummary::from_values(self.data.iter().copied())
    }
}

/// Builds a [`DistanceMatrix`] from activations under a selectable metric
#[derive(Debug, Clone)]
pub struct DistanceMatrixBuilder {
    metric: Metric,
    absolute_similarity: bool,
}

impl Default for DistanceMatrixBuilder {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

impl DistanceMatrixBuilder {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            absolute_similarity: true,
        }
    }

    /// Resolve the configured metric name; fails fast on unknown names.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(Metric::from_name(&config.metric)?)
            .with_absolute_similarity(config.absolute_similarity))
    }

    pub fn with_absolute_similarity(mut self, absolute: bool) -> Self {
        self.absolute_similarity = absolute;
        self
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Compute the distance matrix on `device`, leaving it device-resident.
    ///
    /// The activations are consumed; their device copy and the prepared
    /// per-row state are freed before this returns.
    pub fn build(
        &self,
        device: &ComputeDevice,
        activations: ActivationMatrix,
    ) -> Result<DeviceBuffer> {
        if activations.n_samples() == 0 {
            return Err(TopologyError::DegenerateInput(
                "activation matrix was built from zero samples".into(),
            ));
        }
        let n = activations.n_nodes();
        if n <= 1 {
            debug!(n, "degenerate node set, returning 1×1 zero matrix");
            return Ok(device.upload(Array2::zeros((1, 1))));
        }

        let upper = {
            let resident = device.upload(activations.into_inner());
            let prepared = self.metric.prepare(resident.view());
            debug!(
                metric = self.metric.name(),
                n,
                prepared_bytes = prepared.byte_size(),
                resident_bytes = device.memory().resident_bytes(),
                "computing pairwise similarities"
            );
            let absolute = self.absolute_similarity;
            let rows: Vec<Vec<f64>> = device.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|i| {
                        (i + 1..n)
                            .map(|j| similarity_to_distance(prepared.similarity(i, j), absolute))
                            .collect()
                    })
                    .collect()
            });
            rows
        };

        let mut out = Array2::<f64>::zeros((n, n));
        for (i, row) in upper.into_iter().enumerate() {
            for (offset, d) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                out[[i, j]] = d;
                out[[j, i]] = d;
            }
        }
        Ok(device.upload(out))
    }

    /// Compute and immediately synchronise back to host memory.
    pub fn build_host(
        &self,
        device: &ComputeDevice,
        activations: ActivationMatrix,
    ) -> Result<DistanceMatrix> {
        let buffer = self.build(device, activations)?;
        Ok(DistanceMatrix {
            data: buffer.into_host(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn device() -> ComputeDevice {
        ComputeDevice::cpu(Some(2)).unwrap()
    }

    #[test]
    fn test_transform_endpoints_and_monotone() {
        assert_eq!(similarity_to_distance(1.0, true), 0.0);
        assert_eq!(similarity_to_distance(0.0, true), 1.0);
        let mut prev = f64::INFINITY;
        for k in 0..=100 {
            let s = k as f64 / 100.0;
            let d = similarity_to_distance(s, true);
            assert!(d <= prev);
            prev = d;
        }
    }

    #[test]
    fn test_transform_sanitizes() {
        assert_eq!(similarity_to_distance(f64::NAN, true), 1.0);
        assert_eq!(similarity_to_distance(1.0 + 1e-15, true), 0.0);
        assert_eq!(similarity_to_distance(-0.5, true), similarity_to_distance(0.5, true));
        assert!((similarity_to_distance(-1.0, false) - 2.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_single_node_gives_1x1_zero() {
        let acts = ActivationMatrix::from_nodes(array![[0.3, 0.1, 0.7]]);
        let dm = DistanceMatrixBuilder::default().build_host(&device(), acts).unwrap();
        assert_eq!(dm.n_nodes(), 1);
        assert_eq!(dm.get(0, 0), 0.0);

        let acts = ActivationMatrix::from_nodes(Array2::zeros((0, 4)));
        let dm = DistanceMatrixBuilder::default().build_host(&device(), acts).unwrap();
        assert_eq!(dm.n_nodes(), 1);
    }

    #[test]
    fn test_zero_samples_is_degenerate() {
        let acts = ActivationMatrix::from_nodes(Array2::zeros((3, 0)));
        let err = DistanceMatrixBuilder::default().build(&device(), acts).unwrap_err();
        assert!(matches!(err, TopologyError::DegenerateInput(_)));
    }

    #[test]
    fn test_perfect_correlation_gives_zero_matrix() {
        let base = [0.2, -1.0, 3.5, 0.0, 2.25, 7.0];
        let acts = Array2::from_shape_fn((5, 6), |(i, j)| (i as f64 + 1.0) * base[j] + i as f64);
        let dm = DistanceMatrixBuilder::default()
            .build_host(&device(), ActivationMatrix::from_nodes(acts))
            .unwrap();
        assert_eq!(dm.n_nodes(), 5);
        for v in dm.view().iter() {
            assert!(v.abs() < 1e-7, "expected zero distance, got {v}");
        }
    }

    #[test]
    fn test_properties_and_memory_released() {
        let acts = array![
            [1.0, 2.0, 3.0, 4.0],
            [4.0, 1.0, 3.0, 2.0],
            [1.0, 1.0, 1.0, 1.0],
            [2.0, 4.0, 6.0, 9.0]
        ];
        let device = device();
        let dm = DistanceMatrixBuilder::default()
            .build_host(&device, ActivationMatrix::from_nodes(acts))
            .unwrap();
        assert_eq!(device.memory().resident_bytes(), 0);
        assert!(device.memory().peak_bytes() > 0);

        let n = dm.n_nodes();
        for i in 0..n {
            assert_eq!(dm.get(i, i), 0.0);
            for j in 0..n {
                let d = dm.get(i, j);
                assert!(d.is_finite() && (0.0..=1.0).contains(&d));
                assert_eq!(d, dm.get(j, i));
            }
        }
        // Constant node: similarity undefined, sanitised to distance 1
        assert_eq!(dm.get(2, 0), 1.0);
        assert!(DistanceMatrix::from_array(dm.into_inner()).is_ok());
    }

    #[test]
    fn test_from_array_validation() {
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [0.5, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(array![[0.0, -1.0], [-1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(Array2::zeros((2, 3))).is_err());
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [1.0, 0.0]]).is_ok());
    }

    #[test]
    fn test_invalid_metric_fails_fast() {
        let config = PipelineConfig {
            metric: "cosine".into(),
            ..Default::default()
        };
        assert!(matches!(
            DistanceMatrixBuilder::from_config(&config),
            Err(TopologyError::InvalidMetric(_))
        ));
    }
}
