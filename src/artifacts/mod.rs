//! Artifact Module: Persisted Diagrams and Timing Logs

mod writer;

pub use writer::{ArtifactWriter, EpochRecord, RunTimeRecord};
