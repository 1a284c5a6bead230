//! Distance Module: Activation Vectors → Correlation Distances
//!
//! Nodes of the functional graph are compared with a correlation-like
//! similarity and the result is turned into a proper distance for a
//! Vietoris-Rips filtration:
//!
//!   s(i, j) ∈ [-1, 1]  →  d(i, j) = √(1 − |s(i, j)|) ∈ [0, 1]
//!
//! Pairwise work runs on a [`ComputeDevice`] whose resident memory is
//! tracked buffer by buffer and released as soon as a buffer goes out of
//! scope.

mod backend;
mod builder;
mod metric;

pub use backend::{ComputeDevice, DeviceBuffer, DeviceMemory};
pub use builder::{similarity_to_distance, DistanceMatrix, DistanceMatrixBuilder, DistanceSummary};
pub use metric::{CustomMetric, Metric, PairwiseFn};
