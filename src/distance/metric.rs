//! Pairwise similarity measures between node vectors.
//!
//! Every metric yields a correlation-like similarity, nominally in [-1, 1].
//! Per-row work (standardisation, ranking, distance centring) is done once in
//! [`Metric::prepare`]; the pairwise step then only combines two prepared rows.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, TopologyError};

/// Caller-supplied pairwise similarity
pub type PairwiseFn = dyn Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Send + Sync;

/// Named wrapper around a [`PairwiseFn`]
#[derive(Clone)]
pub struct CustomMetric {
    name: String,
    func: Arc<PairwiseFn>,
}

impl CustomMetric {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMetric").field("name", &self.name).finish()
    }
}

/// Closed set of similarity measures
#[derive(Debug, Clone, Default)]
pub enum Metric {
    /// Signed Pearson correlation coefficient. The sign is discarded later,
    /// by the builder's `absolute_similarity` flag, not by the metric.
    #[default]
    AbsCorrelation,
    /// Spearman rank correlation (Pearson on average ranks)
    RankCorrelation,
    /// Székely distance correlation, in [0, 1]
    DistanceCorrelation,
    Custom(CustomMetric),
}

impl Metric {
    /// Resolve a metric selector. Unknown names fail before any computation.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "pearson" | "correlation" | "corrcoef" => Ok(Self::AbsCorrelation),
            "spearman" | "rank" => Ok(Self::RankCorrelation),
            "dcor" | "distance_correlation" => Ok(Self::DistanceCorrelation),
            _ => Err(TopologyError::InvalidMetric(name.to_string())),
        }
    }

    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(CustomMetric {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AbsCorrelation => "pearson",
            Self::RankCorrelation => "spearman",
            Self::DistanceCorrelation => "dcor",
            Self::Custom(c) => c.name(),
        }
    }

    /// Precompute per-row state for `data` (rows = nodes).
    pub(crate) fn prepare(&self, data: ArrayView2<f64>) -> PreparedMetric {
        match self {
            Self::AbsCorrelation => PreparedMetric::Standardized(standardize_rows(data.to_owned())),
            Self::RankCorrelation => {
                let mut ranked = data.to_owned();
                for mut row in ranked.axis_iter_mut(Axis(0)) {
                    let ranks = average_ranks(row.view());
                    row.assign(&ranks);
                }
                PreparedMetric::Standardized(standardize_rows(ranked))
            }
            Self::DistanceCorrelation => {
                PreparedMetric::Centered(data.axis_iter(Axis(0)).map(CenteredRow::new).collect())
            }
            Self::Custom(c) => PreparedMetric::Custom {
                func: Arc::clone(&c.func),
                data: data.to_owned(),
            },
        }
    }
}

/// Per-row state ready for pairwise evaluation
pub(crate) enum PreparedMetric {
    /// Unit-norm centred rows; a row of NaN marks a constant input row
    Standardized(Array2<f64>),
    Centered(Vec<CenteredRow>),
    Custom {
        func: Arc<PairwiseFn>,
        data: Array2<f64>,
    },
}

impl PreparedMetric {
    /// Raw similarity of nodes `i` and `j`; may be NaN when undefined.
    pub(crate) fn similarity(&self, i: usize, j: usize) -> f64 {
        match self {
            Self::Standardized(z) => z.row(i).dot(&z.row(j)),
            Self::Centered(rows) => distance_correlation(&rows[i], &rows[j]),
            Self::Custom { func, data } => func(data.row(i), data.row(j)),
        }
    }

    pub(crate) fn byte_size(&self) -> usize {
        let floats = match self {
            Self::Standardized(z) => z.len(),
            Self::Centered(rows) => rows.iter().map(|r| 2 * r.values.len()).sum(),
            Self::Custom { data, .. } => data.len(),
        };
        floats * std::mem::size_of::<f64>()
    }
}

fn standardize_rows(mut data: Array2<f64>) -> Array2<f64> {
    for mut row in data.axis_iter_mut(Axis(0)) {
        let mean = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - mean);
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 && norm.is_finite() {
            row.mapv_inplace(|v| v / norm);
        } else {
            row.fill(f64::NAN);
        }
    }
    data
}

/// Ranks starting at 1, ties sharing their average rank
fn average_ranks(values: ArrayView1<f64>) -> Array1<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = Array1::zeros(n);
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        start = end;
    }
    ranks
}

/// Row summary for the doubly-centred distance matrix of one node
pub(crate) struct CenteredRow {
    values: Vec<f64>,
    /// Row means of |x_k − x_l|
    row_means: Vec<f64>,
    grand_mean: f64,
    /// dVar²(x)
    variance: f64,
}

impl CenteredRow {
    fn new(x: ArrayView1<f64>) -> Self {
        let values = x.to_vec();
        let s = values.len();
        let mut row_means = vec![0.0; s];
        for k in 0..s {
            row_means[k] = values.iter().map(|v| (values[k] - v).abs()).sum::<f64>() / s as f64;
        }
        let grand_mean = if s > 0 {
            row_means.iter().sum::<f64>() / s as f64
        } else {
            0.0
        };

        let mut row = Self {
            values,
            row_means,
            grand_mean,
            variance: 0.0,
        };
        row.variance = centered_product_mean(&row, &row);
        row
    }

    fn centered(&self, k: usize, l: usize) -> f64 {
        (self.values[k] - self.values[l]).abs() - self.row_means[k] - self.row_means[l]
            + self.grand_mean
    }
}

fn centered_product_mean(a: &CenteredRow, b: &CenteredRow) -> f64 {
    let s = a.values.len().min(b.values.len());
    if s == 0 {
        return 0.0;
    }
    let mut acc = 0.0;
    for k in 0..s {
        for l in 0..s {
            acc += a.centered(k, l) * b.centered(k, l);
        }
    }
    acc / (s * s) as f64
}

fn distance_correlation(a: &CenteredRow, b: &CenteredRow) -> f64 {
    let denom = (a.variance * b.variance).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    let dcov2 = centered_product_mean(a, b).max(0.0);
    (dcov2 / denom).sqrt()
}
