//! Artifact Writer
//!
//! One JSON diagram file per checkpoint and an append-only JSON-lines
//! timing log per run directory:
//!
//! ```text
//! <save_dir>/<net>/<net>_<dataset>_ss<iter>/dgm_epoch_<epoch>.json
//! <save_dir>/<net>/<net>_<dataset>_ss<iter>/times.jsonl
//! ```
//!
//! Diagram files are overwritten on rerun. The timing log only ever grows:
//! each completed run appends one record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RunLayout;
use crate::error::{Result, TopologyError};
use crate::topology::{BettiNumbers, PersistenceDiagram};

/// Everything persisted for one checkpoint epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub network: String,
    pub dataset: String,
    pub iteration: usize,
    pub epoch: usize,
    pub metric: String,
    pub solver: String,
    /// Graph nodes after extraction
    pub n_nodes: usize,
    /// Nodes before constant-node removal
    pub original_nodes: usize,
    /// Stored entries of the sparse filtration
    pub nnz: usize,
    pub max_distance: f64,
    pub solver_seconds: f64,
    pub postprocess_seconds: f64,
    /// Betti numbers at `eps_thresh`
    pub betti: BettiNumbers,
    pub diagram: PersistenceDiagram,
}

/// Solver wall-clock times of one completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTimeRecord {
    pub network: String,
    pub dataset: String,
    pub iteration: usize,
    pub solver: String,
    pub epochs: Vec<usize>,
    /// Parallel to `epochs`
    pub epoch_seconds: Vec<f64>,
    pub total_seconds: f64,
    /// Seconds since the Unix epoch
    pub recorded_at: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    layout: RunLayout,
}

impl ArtifactWriter {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    fn ensure_run_dir(&self) -> Result<PathBuf> {
        let dir = self.layout.run_dir();
        fs::create_dir_all(&dir).map_err(|e| TopologyError::io(&dir, e))?;
        Ok(dir)
    }

    /// Write (or overwrite) the diagram file of `record.epoch`.
    pub fn write_epoch(&self, record: &EpochRecord) -> Result<PathBuf> {
        self.ensure_run_dir()?;
        let path = self.layout.diagram_path(record.epoch);
        let file = File::create(&path).map_err(|e| TopologyError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)
            .map_err(|e| TopologyError::serialization(&path, e))?;
        writer.flush().map_err(|e| TopologyError::io(&path, e))?;
        debug!(path = %path.display(), epoch = record.epoch, "wrote diagram");
        Ok(path)
    }

    pub fn read_epoch(&self, epoch: usize) -> Result<EpochRecord> {
        let path = self.layout.diagram_path(epoch);
        let file = File::open(&path).map_err(|e| TopologyError::io(&path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TopologyError::serialization(&path, e))
    }

    /// Append one line to the run's timing log, creating it if needed.
    pub fn append_run_time(&self, record: &RunTimeRecord) -> Result<PathBuf> {
        self.ensure_run_dir()?;
        let path = self.layout.times_path();
        let mut line =
            serde_json::to_string(record).map_err(|e| TopologyError::serialization(&path, e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TopologyError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| TopologyError::io(&path, e))?;
        info!(path = %path.display(), total_seconds = record.total_seconds, "appended run times");
        Ok(path)
    }

    /// All timing records of this run directory, oldest first.
    pub fn read_run_times(&self) -> Result<Vec<RunTimeRecord>> {
        read_jsonl(&self.layout.times_path())
    }
}

fn read_jsonl(path: &Path) -> Result<Vec<RunTimeRecord>> {
    let file = File::open(path).map_err(|e| TopologyError::io(path, e))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| TopologyError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(
            serde_json::from_str(&line).map_err(|e| TopologyError::serialization(path, e))?,
        );
    }
    Ok(records)
}
