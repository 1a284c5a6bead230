//! Pipeline Module: Checkpoint-by-Checkpoint Orchestration
//!
//! - [`PersistenceOrchestrator`]: submits a filtration, times the engine and
//!   normalises its output
//! - [`Pipeline`]: wires extraction, distance building, sparsification,
//!   persistence and artifact writing over a list of epochs

mod orchestrator;
mod runner;

pub use orchestrator::{
    EpochPersistence, JobState, PersistenceJob, PersistenceOrchestrator, RunTiming,
};
pub use runner::{Pipeline, RunReport};
