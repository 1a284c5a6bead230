//! Betti Numbers: Topological Invariants
//!
//! The k-th Betti number βₖ counts the k-dimensional "holes" alive at a
//! filtration scale ε:
//!
//! - β₀: Number of connected components
//! - β₁: Number of 1-dimensional loops/cycles
//! - β₂: Number of 2-dimensional voids/cavities
//!
//! Read off a persistence diagram as the number of pairs with
//! `birth ≤ ε < death`. On a reduced diagram β₀ is one less than the
//! component count.

use serde::{Deserialize, Serialize};

use super::diagram::PersistenceDiagram;

/// Betti numbers at a specific filtration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettiNumbers {
    /// Filtration scale
    pub epsilon: f64,
    /// `counts[k]` = βₖ
    pub counts: Vec<usize>,
}

impl BettiNumbers {
    pub fn at_scale(diagram: &PersistenceDiagram, epsilon: f64) -> Self {
        let counts = (0..=diagram.max_dim)
            .map(|d| diagram.dim(d).iter().filter(|p| p.alive_at(epsilon)).count())
            .collect();
        Self { epsilon, counts }
    }

    /// βₖ, zero beyond the computed range
    pub fn beta(&self, k: usize) -> usize {
        self.counts.get(k).copied().unwrap_or(0)
    }

    /// Total topological complexity
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Euler characteristic χ = β₀ - β₁ + β₂ - ...
    pub fn euler_characteristic(&self) -> i64 {
        self.counts
            .iter()
            .enumerate()
            .map(|(k, &b)| if k % 2 == 0 { b as i64 } else { -(b as i64) })
            .sum()
    }

    /// Betti numbers per node, for comparing graphs of different size
    pub fn normalized(&self, n_nodes: usize) -> Vec<f64> {
        let n = n_nodes.max(1) as f64;
        self.counts.iter().map(|&b| b as f64 / n).collect()
    }
}

/// Betti curve: sequence of Betti numbers across filtration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettiCurve {
    pub values: Vec<BettiNumbers>,
}

impl BettiCurve {
    /// Sample `steps` evenly spaced scales in `[start, stop]`.
    pub fn sample(diagram: &PersistenceDiagram, start: f64, stop: f64, steps: usize) -> Self {
        let values = match steps {
            0 => Vec::new(),
            1 => vec![BettiNumbers::at_scale(diagram, start)],
            _ => {
                let step = (stop - start) / (steps - 1) as f64;
                (0..steps)
                    .map(|i| BettiNumbers::at_scale(diagram, start + step * i as f64))
                    .collect()
            }
        };
        Self { values }
    }

    /// (ε, βₖ) curve
    pub fn curve(&self, k: usize) -> Vec<(f64, usize)> {
        self.values.iter().map(|b| (b.epsilon, b.beta(k))).collect()
    }

    /// Scale and value of the first maximum of βₖ
    pub fn peak(&self, k: usize) -> Option<(f64, usize)> {
        self.values
            .iter()
            .map(|b| (b.epsilon, b.beta(k)))
            .fold(None, |best, cur| match best {
                Some((_, v)) if v >= cur.1 => best,
                _ => Some(cur),
            })
    }

    /// Integrated βₖ (trapezoidal area under curve)
    pub fn integrated(&self, k: usize) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }

        let mut integral = 0.0;
        for i in 1..self.values.len() {
            let de = self.values[i].epsilon - self.values[i - 1].epsilon;
            let avg = (self.values[i].beta(k) + self.values[i - 1].beta(k)) as f64 / 2.0;
            integral += de * avg;
        }
        integral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::RawPersistence;

    fn diagram() -> PersistenceDiagram {
        // Three components merging at 0.2 and 0.6, one loop over [0.4, 0.8)
        let raw = RawPersistence {
            dgms: vec![
                vec![[0.0, 0.2], [0.0, 0.6], [0.0, f64::INFINITY]],
                vec![[0.4, 0.8]],
            ],
        };
        PersistenceDiagram::from_raw(raw, 1, false).unwrap()
    }

    #[test]
    fn test_betti_at_scale() {
        let pd = diagram();
        assert_eq!(pd.betti_at(0.0).counts, vec![3, 0]);
        assert_eq!(pd.betti_at(0.5).counts, vec![2, 1]);
        assert_eq!(pd.betti_at(0.8).counts, vec![1, 0]);
        assert_eq!(pd.betti_at(0.5).euler_characteristic(), 1);
        assert_eq!(pd.betti_at(0.5).beta(5), 0);
        assert_eq!(pd.betti_at(0.0).normalized(3), vec![1.0, 0.0]);
    }

    #[test]
    fn test_curve() {
        let curve = BettiCurve::sample(&diagram(), 0.0, 1.0, 11);
        assert_eq!(curve.values.len(), 11);
        assert_eq!(curve.curve(0)[0], (0.0, 3));
        let (eps, peak) = curve.peak(1).unwrap();
        assert_eq!(peak, 1);
        assert!((eps - 0.4).abs() < 1e-12);
        // β₁ = 1 on [0.4, 0.8): four unit steps of 0.1 plus half steps at the ends
        assert!((curve.integrated(1) - 0.4).abs() < 1e-9);
    }
}
