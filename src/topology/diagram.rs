//! Persistence Diagrams
//!
//! Canonical per-dimension (birth, death) pairs. A pair represents a
//! topological feature that is "born" at filtration value b and "dies" at d;
//! `d = ∞` marks a class that never dies within the observed range.
//!
//! ## Interpretation
//!
//! - Long-lived features (large d-b) represent robust topological structure
//! - Short-lived features may be noise or transient phenomena
//! - Comparing diagrams across checkpoints tracks how the functional graph
//!   of the network reorganises during training

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::betti::BettiNumbers;
use super::solver::RawPersistence;
use crate::error::{Result, TopologyError};

/// JSON has no infinity: essential deaths are written as `null`.
mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// A persistence pair [birth, death)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistencePair {
    pub birth: f64,
    #[serde(with = "infinite_as_null")]
    pub death: f64,
}

impl PersistencePair {
    pub fn new(birth: f64, death: f64) -> Self {
        Self { birth, death }
    }

    /// Lifetime of the feature
    pub fn persistence(&self) -> f64 {
        self.death - self.birth
    }

    /// Is this an essential feature (infinite persistence)?
    pub fn is_essential(&self) -> bool {
        self.death.is_infinite()
    }

    /// Feature exists at scale `epsilon`
    pub fn alive_at(&self, epsilon: f64) -> bool {
        self.birth <= epsilon && epsilon < self.death
    }
}

/// Persistence diagram for dimensions `0..=max_dim`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceDiagram {
    pub max_dim: usize,
    /// The global H₀ class was dropped
    pub reduced: bool,
    dims: Vec<Vec<PersistencePair>>,
}

impl PersistenceDiagram {
    /// Normalise raw engine output.
    ///
    /// - dimensions are padded / truncated to `0..=max_dim`
    /// - points with `birth >= death` carry no information and are dropped
    /// - with `reduced`, the oldest infinite H₀ class is removed
    /// - pairs are sorted by (birth, death)
    pub fn from_raw(raw: RawPersistence, max_dim: usize, reduced: bool) -> Result<Self> {
        if raw.dgms.len() > max_dim + 1 {
            debug!(
                returned = raw.dgms.len(),
                max_dim, "ignoring dimensions above the requested maximum"
            );
        }

        let mut dims = Vec::with_capacity(max_dim + 1);
        let mut raw_dims = raw.dgms.into_iter();
        for d in 0..=max_dim {
            let points = raw_dims.next().unwrap_or_default();
            let mut pairs = Vec::with_capacity(points.len());
            for [birth, death] in points {
                if !birth.is_finite() || death.is_nan() {
                    return Err(TopologyError::solver(
                        "postprocess",
                        format!("malformed H{d} point ({birth}, {death})"),
                    ));
                }
                if birth < death {
                    pairs.push(PersistencePair::new(birth, death));
                }
            }
            pairs.sort_by(|a, b| a.birth.total_cmp(&b.birth).then(a.death.total_cmp(&b.death)));
            dims.push(pairs);
        }

        if reduced {
            // Sorted by birth: the first essential pair is the oldest one
            if let Some(pos) = dims[0].iter().position(PersistencePair::is_essential) {
                dims[0].remove(pos);
            }
        }

        Ok(Self {
            max_dim,
            reduced,
            dims,
        })
    }

    /// Pairs of dimension `d`; empty beyond `max_dim`
    pub fn dim(&self, d: usize) -> &[PersistencePair] {
        self.dims.get(d).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of pairs over all dimensions
    pub fn len(&self) -> usize {
        self.dims.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finite pairs of dimension `d`
    pub fn finite(&self, d: usize) -> impl Iterator<Item = &PersistencePair> {
        self.dim(d).iter().filter(|p| !p.is_essential())
    }

    pub fn essential_count(&self, d: usize) -> usize {
        self.dim(d).iter().filter(|p| p.is_essential()).count()
    }

    /// Total persistence of finite pairs in dimension d
    pub fn total_persistence(&self, d: usize) -> f64 {
        self.finite(d).map(PersistencePair::persistence).sum()
    }

    /// Maximum finite persistence in dimension d
    pub fn max_persistence(&self, d: usize) -> f64 {
        self.finite(d).map(PersistencePair::persistence).fold(0.0, f64::max)
    }

    /// Shannon entropy of normalised finite lifetimes in dimension d
    pub fn persistence_entropy(&self, d: usize) -> f64 {
        let lifetimes: Vec<f64> = self
            .finite(d)
            .map(PersistencePair::persistence)
            .filter(|&p| p > 0.0)
            .collect();
        let total: f64 = lifetimes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }

        let mut entropy = 0.0;
        for l in lifetimes {
            let p = l / total;
            entropy -= p * p.ln();
        }
        entropy
    }

    /// Betti numbers of the filtration at scale `epsilon`
    pub fn betti_at(&self, epsilon: f64) -> BettiNumbers {
        BettiNumbers::at_scale(self, epsilon)
    }

    /// Flat `[birth, death, dimension]` rows, dimension-major
    pub fn to_triples(&self) -> Vec<[f64; 3]> {
        self.dims
            .iter()
            .enumerate()
            .flat_map(|(d, pairs)| pairs.iter().map(move |p| [p.birth, p.death, d as f64]))
            .collect()
    }
}
