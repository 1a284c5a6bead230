//! Dimensionality reduction of node vectors.
//!
//! PCA via power iteration with deflation on the feature covariance. Only
//! the leading few axes are ever requested, so a full eigendecomposition is
//! not needed.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

const POWER_ITERATIONS: usize = 500;
const POWER_TOLERANCE: f64 = 1e-10;
const EIGEN_FLOOR: f64 = 1e-12;

/// Optional reduction applied to every node vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reduction {
    Pca { components: usize },
}

impl Reduction {
    /// Parse a reduction name as given on the command line.
    pub fn from_name(name: &str, components: usize) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pca" => Ok(Self::Pca { components }),
            other => Err(TopologyError::InvalidConfig(format!(
                "unsupported reduction {other:?} (supported: pca)"
            ))),
        }
    }
}

/// Project rows of `data` onto its leading `components` principal axes.
///
/// The output always has `min(components, n_features)` columns; axes beyond
/// the numerical rank are left as zero columns.
pub fn pca_project(data: &Array2<f64>, components: usize, seed: u64) -> Array2<f64> {
    let (n, f) = data.dim();
    let k = components.min(f);
    if n == 0 || k == 0 {
        return Array2::zeros((n, k));
    }

    let mean = data.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(f));
    let centered = data - &mean;
    let denom = (n.saturating_sub(1)).max(1) as f64;
    let mut cov = centered.t().dot(&centered) / denom;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut axes = Array2::<f64>::zeros((f, k));

    for c in 0..k {
        let mut v = Array1::from_iter((0..f).map(|_| rng.sample::<f64, _>(StandardNormal)));
        let norm = v.dot(&v).sqrt();
        if norm == 0.0 {
            break;
        }
        v /= norm;

        for _ in 0..POWER_ITERATIONS {
            let mut next = cov.dot(&v);
            let next_norm = next.dot(&next).sqrt();
            if next_norm < EIGEN_FLOOR {
                break;
            }
            next /= next_norm;
            let delta = (&next - &v).mapv(f64::abs).sum();
            v = next;
            if delta < POWER_TOLERANCE {
                break;
            }
        }

        let lambda = v.dot(&cov.dot(&v));
        if lambda < EIGEN_FLOOR {
            break;
        }

        // Deflate: C ← C − λ v vᵀ
        let outer = v
            .view()
            .insert_axis(Axis(1))
            .dot(&v.view().insert_axis(Axis(0)));
        cov.scaled_add(-lambda, &outer);
        axes.column_mut(c).assign(&v);
    }

    centered.dot(&axes)
}
