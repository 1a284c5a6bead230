//! Topology Module: Sparse Filtrations and Persistent Homology
//!
//! Implements the filtration side of the pipeline:
//! - Sparse (COO) encoding of a truncated distance matrix
//! - The boundary contract with a persistence engine
//! - An exact built-in Vietoris-Rips engine
//! - Normalised persistence diagrams and Betti numbers
//!
//! ## Mathematical Background
//!
//! The distance matrix of a checkpoint defines a weighted graph whose clique
//! complex, grown with the scale parameter ε, is the Vietoris-Rips
//! filtration VR_ε. Persistent homology tracks the birth and death of
//! connected components, loops and voids across that filtration. Entries at
//! or above the cutoff never enter the filtration, so features still alive
//! at the cutoff are reported with infinite death.

mod betti;
mod diagram;
mod rips;
mod solver;
mod sparse;

pub use betti::{BettiCurve, BettiNumbers};
pub use diagram::{PersistenceDiagram, PersistencePair};
pub use rips::RipsSolver;
pub use solver::{PersistenceSolver, RawPersistence, SolverOptions, DEFAULT_MAX_SIMPLICES};
pub use sparse::{SparseEntry, SparseFiltration, DEFAULT_MAX_DISTANCE};
