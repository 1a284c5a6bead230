//! Persistence Orchestrator
//!
//! Submits one sparse filtration per checkpoint to the engine, times the
//! computation and normalises the raw output. Each epoch runs as a
//! [`PersistenceJob`]:
//!
//! ```text
//! Idle → Submitted → Computing → PostProcessing → Done
//! ```
//!
//! There is no retry. A failed computation aborts the run: an empty diagram
//! in place of a failed checkpoint would silently corrupt any analysis over
//! the epoch sequence.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::topology::{PersistenceDiagram, PersistenceSolver, SolverOptions, SparseFiltration};

/// Lifecycle of one epoch's persistence computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Submitted,
    Computing,
    PostProcessing,
    /// Terminal
    Done,
}

impl JobState {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Submitted),
            Self::Submitted => Some(Self::Computing),
            Self::Computing => Some(Self::PostProcessing),
            Self::PostProcessing => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// State of the computation for a single checkpoint epoch
#[derive(Debug, Clone)]
pub struct PersistenceJob {
    epoch: usize,
    state: JobState,
    history: Vec<JobState>,
}

impl PersistenceJob {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            state: JobState::Idle,
            history: vec![JobState::Idle],
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(epoch = self.epoch, from = ?self.state, to = ?next, "job transition");
            self.state = next;
            self.history.push(next);
        }
    }
}

/// Per-checkpoint and accumulated solver wall-clock time for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTiming {
    pub per_epoch: Vec<(usize, Duration)>,
    pub total: Duration,
}

impl RunTiming {
    fn record(&mut self, epoch: usize, elapsed: Duration) {
        self.per_epoch.push((epoch, elapsed));
        self.total += elapsed;
    }
}

/// Normalised result for one checkpoint
#[derive(Debug, Clone)]
pub struct EpochPersistence {
    pub epoch: usize,
    pub n_nodes: usize,
    pub nnz: usize,
    pub diagram: PersistenceDiagram,
    pub solver_time: Duration,
    pub postprocess_time: Duration,
}

/// Drives a [`PersistenceSolver`] epoch by epoch
#[derive(Debug)]
pub struct PersistenceOrchestrator<S> {
    solver: S,
    options: SolverOptions,
    reduced: bool,
    timing: RunTiming,
    last_job: Option<PersistenceJob>,
}

impl<S: PersistenceSolver> PersistenceOrchestrator<S> {
    pub fn new(solver: S, options: SolverOptions, reduced: bool) -> Self {
        Self {
            solver,
            options,
            reduced,
            timing: RunTiming::default(),
            last_job: None,
        }
    }

    pub fn from_config(solver: S, config: &PipelineConfig) -> Self {
        Self::new(solver, SolverOptions::from_config(config), config.reduced_homology)
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn timing(&self) -> &RunTiming {
        &self.timing
    }

    pub fn reset_timing(&mut self) {
        self.timing = RunTiming::default();
    }

    /// The most recent job, finished or failed
    pub fn last_job(&self) -> Option<&PersistenceJob> {
        self.last_job.as_ref()
    }

    /// Compute the persistence diagram of `filtration` for checkpoint `epoch`.
    ///
    /// The filtration is consumed and freed before post-processing starts.
    pub fn compute(
        &mut self,
        epoch: usize,
        filtration: SparseFiltration,
    ) -> Result<EpochPersistence> {
        let mut job = PersistenceJob::new(epoch);
        let n_nodes = filtration.n_nodes();
        let nnz = filtration.nnz();

        job.advance();
        info!(
            epoch,
            solver = self.solver.name(),
            n_nodes,
            nnz,
            max_dim = self.options.max_dim,
            "submitted filtration"
        );

        job.advance();
        let started = Instant::now();
        let outcome = self.solver.compute(&filtration, &self.options);
        let solver_time = started.elapsed();
        drop(filtration);

        let raw = match outcome {
            Ok(raw) => raw,
            Err(e) => {
                self.last_job = Some(job);
                return Err(e.at_epoch(epoch));
            }
        };
        self.timing.record(epoch, solver_time);
        info!(
            epoch,
            minutes = solver_time.as_secs_f64() / 60.0,
            "computation time"
        );

        job.advance();
        let started = Instant::now();
        let diagram = match PersistenceDiagram::from_raw(raw, self.options.max_dim, self.reduced) {
            Ok(d) => d,
            Err(e) => {
                self.last_job = Some(job);
                return Err(e.at_epoch(epoch));
            }
        };
        let postprocess_time = started.elapsed();
        debug!(
            epoch,
            minutes = postprocess_time.as_secs_f64() / 60.0,
            "post-processing time"
        );

        job.advance();
        self.last_job = Some(job);

        Ok(EpochPersistence {
            epoch,
            n_nodes,
            nnz,
            diagram,
            solver_time,
            postprocess_time,
        })
    }
}
