//! # Activation-Topology
//!
//! Persistent Homology of Neural-Network Activation Graphs
//! across Training Checkpoints
//!
//! ## Framework
//!
//! Each checkpoint of a network is turned into a weighted graph whose nodes
//! are units (or input samples) and whose edge weights are a
//! correlation-derived distance between their activation vectors. The
//! Vietoris-Rips filtration of that graph yields a persistence diagram per
//! checkpoint; the sequence of diagrams describes how the network's
//! functional structure reorganises during training.
//!
//! ### Pipeline
//!
//! 1. **Extraction**: stack layer activations over a fixed data subset into
//!    one vector per node
//!
//! 2. **Distance**: pairwise similarity s (Pearson, Spearman, distance
//!    correlation or custom) mapped to d = √(1 - |s|)
//!
//! 3. **Sparsification**: keep only entries with d < cutoff as a COO list
//!
//! 4. **Persistence**: compute H₀..H_k of the sparse filtration, time it,
//!    and drop the global H₀ class (reduced homology)
//!
//! 5. **Artifacts**: one diagram file per checkpoint plus an append-only
//!    timing log per run
//!
//! ## Example
//!
//! ```no_run
//! use activation_topology::{Pipeline, PipelineConfig, RunLayout, SyntheticSource};
//!
//! let layout = RunLayout::new("results", "mlp", "synthetic", 0);
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), layout)?;
//! let report = pipeline.run(&mut SyntheticSource::default(), &[0, 5, 10])?;
//! for record in &report.epochs {
//!     println!("epoch {}: β = {:?}", record.epoch, record.betti.counts);
//! }
//! # Ok::<(), activation_topology::TopologyError>(())
//! ```
//!
//! ## References
//!
//! - Edelsbrunner & Harer, "Computational Topology" (2010)
//! - Rieck et al., "Neural Persistence" (ICLR 2019)
//! - Bauer, "Ripser: efficient computation of Vietoris-Rips persistence
//!   barcodes" (2021)

pub mod activation;
pub mod artifacts;
pub mod config;
pub mod distance;
pub mod error;
pub mod pipeline;
pub mod topology;

pub use error::{Result, TopologyError};

pub use config::{PipelineConfig, RunLayout};

// Re-exports from activation
pub use activation::{
    ActivationMatrix,
    ActivationSource,
    Extractor,
    InMemorySource,
    JsonDirSource,
    LayerActivations,
    NodeMode,
    Reduction,
    SyntheticSource,
};

// Re-exports from distance
pub use distance::{
    ComputeDevice,
    DistanceMatrix,
    DistanceMatrixBuilder,
    Metric,
    similarity_to_distance,
};

// Re-exports from topology
pub use topology::{
    // Sparse filtration
    SparseFiltration,
    DEFAULT_MAX_DISTANCE,
    // Engine boundary
    PersistenceSolver,
    RipsSolver,
    SolverOptions,
    DEFAULT_MAX_SIMPLICES,
    // Normalised output
    PersistenceDiagram,
    PersistencePair,
    BettiNumbers,
    BettiCurve,
};

pub use pipeline::{Pipeline, PersistenceOrchestrator, RunReport};

pub use artifacts::{ArtifactWriter, EpochRecord, RunTimeRecord};
