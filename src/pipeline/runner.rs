//! End-to-end run over a list of checkpoint epochs.
//!
//! Per epoch: extract → distance matrix → sparse filtration → persistence →
//! artifact. Epochs are processed strictly in order and at most one epoch's
//! dense matrix is alive at a time. The timing log is appended once, after
//! every epoch succeeded.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use super::orchestrator::PersistenceOrchestrator;
use crate::activation::{ActivationSource, Extractor};
use crate::artifacts::{ArtifactWriter, EpochRecord, RunTimeRecord};
use crate::config::{PipelineConfig, RunLayout};
use crate::distance::{ComputeDevice, DistanceMatrixBuilder, DistanceSummary, Metric};
use crate::error::Result;
use crate::topology::{PersistenceSolver, RipsSolver, SparseFiltration};

/// Outcome of [`Pipeline::run`]
#[derive(Debug, Clone)]
pub struct RunReport {
    pub epochs: Vec<EpochRecord>,
    pub times: RunTimeRecord,
}

/// Activation → persistence-diagram pipeline bound to one run layout
pub struct Pipeline<S = RipsSolver> {
    config: PipelineConfig,
    extractor: Extractor,
    builder: DistanceMatrixBuilder,
    device: ComputeDevice,
    orchestrator: PersistenceOrchestrator<S>,
    writer: ArtifactWriter,
}

impl Pipeline<RipsSolver> {
    pub fn new(config: PipelineConfig, layout: RunLayout) -> Result<Self> {
        Self::with_solver(config, layout, RipsSolver)
    }
}

impl<S: PersistenceSolver> Pipeline<S> {
    /// Validates the configuration and resolves the metric before any
    /// activation is touched.
    pub fn with_solver(config: PipelineConfig, layout: RunLayout, solver: S) -> Result<Self> {
        config.validate()?;
        let builder = DistanceMatrixBuilder::from_config(&config)?;
        let extractor = Extractor::from_config(&config);
        let device = ComputeDevice::cpu(config.n_threads)?;
        let orchestrator = PersistenceOrchestrator::from_config(solver, &config);
        info!(
            metric = builder.metric().name(),
            solver = orchestrator.solver().name(),
            threads = device.threads(),
            max_dim = config.max_dim,
            max_distance = config.max_distance,
            "pipeline ready"
        );
        Ok(Self {
            config,
            extractor,
            builder,
            device,
            orchestrator,
            writer: ArtifactWriter::new(layout),
        })
    }

    /// Replace the configured metric, e.g. with [`Metric::custom`].
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.builder =
            DistanceMatrixBuilder::new(metric).with_absolute_similarity(self.config.absolute_similarity);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn device(&self) -> &ComputeDevice {
        &self.device
    }

    pub fn orchestrator(&self) -> &PersistenceOrchestrator<S> {
        &self.orchestrator
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Process one checkpoint and write its diagram file.
    pub fn process_epoch(
        &mut self,
        source: &mut dyn ActivationSource,
        epoch: usize,
    ) -> Result<EpochRecord> {
        info!(epoch, "processing checkpoint");
        let layers = source.load_epoch(epoch)?;
        let activations = self.extractor.extract(layers)?;
        let original_nodes = activations.original_nodes();

        self.device.memory().reset_peak();
        let filtration = {
            let matrix = self.builder.build_host(&self.device, activations)?;
            let n = matrix.n_nodes();
            self.log_stats(epoch, "distance matrix", (n, n), n * n, matrix.summary());
            debug!(
                epoch,
                peak_bytes = self.device.memory().peak_bytes(),
                resident_bytes = self.device.memory().resident_bytes(),
                "device memory after distance build"
            );
            SparseFiltration::encode(&matrix, self.config.max_distance)
        };
        let n = filtration.n_nodes();
        self.log_stats(epoch, "sparse filtration", (n, n), filtration.nnz(), filtration.summary());

        let result = self.orchestrator.compute(epoch, filtration)?;
        let betti = result.diagram.betti_at(self.config.eps_thresh);
        info!(epoch, eps_thresh = self.config.eps_thresh, betti = ?betti.counts, "betti numbers");

        let layout = self.writer.layout();
        let record = EpochRecord {
            network: layout.network.clone(),
            dataset: layout.dataset.clone(),
            iteration: layout.iteration,
            epoch,
            metric: self.builder.metric().name().to_string(),
            solver: self.orchestrator.solver().name().to_string(),
            n_nodes: result.n_nodes,
            original_nodes,
            nnz: result.nnz,
            max_distance: self.config.max_distance,
            solver_seconds: result.solver_time.as_secs_f64(),
            postprocess_seconds: result.postprocess_time.as_secs_f64(),
            betti,
            diagram: result.diagram,
        };
        self.writer.write_epoch(&record)?;
        Ok(record)
    }

    /// Process `epochs` in order, then append the run's solver times.
    ///
    /// The first failing epoch aborts the run; diagram files already
    /// written stay on disk but no timing line is appended.
    pub fn run(&mut self, source: &mut dyn ActivationSource, epochs: &[usize]) -> Result<RunReport> {
        self.orchestrator.reset_timing();
        let mut records = Vec::with_capacity(epochs.len());
        for &epoch in epochs {
            records.push(self.process_epoch(source, epoch)?);
        }

        let timing = self.orchestrator.timing();
        info!(
            epochs = epochs.len(),
            minutes = timing.total.as_secs_f64() / 60.0,
            "total computation time"
        );

        let layout = self.writer.layout();
        let times = RunTimeRecord {
            network: layout.network.clone(),
            dataset: layout.dataset.clone(),
            iteration: layout.iteration,
            solver: self.orchestrator.solver().name().to_string(),
            epochs: timing.per_epoch.iter().map(|(e, _)| *e).collect(),
            epoch_seconds: timing.per_epoch.iter().map(|(_, d)| d.as_secs_f64()).collect(),
            total_seconds: timing.total.as_secs_f64(),
            recorded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.writer.append_run_time(&times)?;

        Ok(RunReport {
            epochs: records,
            times,
        })
    }

    fn log_stats(
        &self,
        epoch: usize,
        what: &str,
        shape: (usize, usize),
        nnz: usize,
        summary: Option<DistanceSummary>,
    ) {
        let Some(s) = summary else {
            debug!(epoch, what, shape = ?shape, nnz, "no entries");
            return;
        };
        if self.config.verbose {
            info!(epoch, what, shape = ?shape, nnz, min = s.min, mean = s.mean, max = s.max, "stats");
        } else {
            debug!(epoch, what, shape = ?shape, nnz, min = s.min, mean = s.mean, max = s.max, "stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{InMemorySource, LayerActivations, SyntheticSource};
    use crate::error::TopologyError;
    use crate::topology::{RawPersistence, SolverOptions};
    use ndarray::{array, Array2};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct ExhaustedSolver;

    impl PersistenceSolver for ExhaustedSolver {
        fn name(&self) -> &str {
            "exhausted"
        }

        fn compute(&self, _: &SparseFiltration, _: &SolverOptions) -> Result<RawPersistence> {
            Err(TopologyError::solver("exhausted", "device out of memory"))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            max_dim: 1,
            reduced_homology: false,
            n_threads: Some(2),
            ..Default::default()
        }
    }

    fn layout(dir: &tempfile::TempDir) -> RunLayout {
        RunLayout::new(dir.path(), "mlp", "toy", 0)
    }

    /// Five units, every one a multiple of the same signal
    fn correlated() -> LayerActivations {
        let base = [0.3, -1.2, 2.0, 0.7, -0.4, 1.1];
        let layer = Array2::from_shape_fn((6, 5), |(s, u)| base[s] * (u + 1) as f64);
        LayerActivations::new(vec![layer])
    }

    /// Columns {0, 1} and {2, 3} correlated within, exactly uncorrelated across
    fn two_clusters() -> LayerActivations {
        let layer = array![
            [1.0, 2.0, 1.0, 3.0],
            [-1.0, -2.0, 1.0, 3.0],
            [1.0, 2.0, -1.0, -3.0],
            [-1.0, -2.0, -1.0, -3.0]
        ];
        LayerActivations::new(vec![layer])
    }

    /// Three mutually uncorrelated units, split over two layers
    fn uncorrelated() -> LayerActivations {
        let first = array![[1.0, 1.0], [-1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]];
        let second = array![[1.0], [-1.0], [-1.0], [1.0]];
        LayerActivations::new(vec![first, second])
    }

    #[test]
    fn test_perfectly_correlated_single_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(config(), layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(0, correlated());
        let record = pipeline.process_epoch(&mut source, 0).unwrap();

        assert_eq!(record.n_nodes, 5);
        assert_eq!(record.nnz, 25);
        assert_eq!(record.diagram.essential_count(0), 1);
        for d in 0..=1 {
            assert!(record.diagram.finite(d).all(|p| p.persistence() < 1e-6));
        }
        assert_eq!(record.betti.beta(0), 1);
    }

    #[test]
    fn test_two_uncorrelated_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(config(), layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(3, two_clusters());
        let record = pipeline.process_epoch(&mut source, 3).unwrap();
        assert_eq!(record.diagram.essential_count(0), 2);
        assert_eq!(record.betti.beta(0), 2);

        let reduced = PipelineConfig {
            reduced_homology: true,
            ..config()
        };
        let mut pipeline = Pipeline::new(reduced, layout(&dir)).unwrap();
        let record = pipeline.process_epoch(&mut source, 3).unwrap();
        assert_eq!(record.diagram.essential_count(0), 1);
    }

    #[test]
    fn test_no_edges_below_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(config(), layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(0, uncorrelated());
        let record = pipeline.process_epoch(&mut source, 0).unwrap();

        // Only the zero diagonal survives the strict cutoff
        assert_eq!(record.nnz, 3);
        assert_eq!(record.diagram.essential_count(0), 3);
        assert!(record.diagram.dim(1).is_empty());
    }

    #[test]
    fn test_solver_failure_releases_device_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::with_solver(config(), layout(&dir), ExhaustedSolver).unwrap();
        let mut source = InMemorySource::new().with_epoch(7, two_clusters());

        let err = pipeline.run(&mut source, &[7]).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::SolverFailure { epoch: Some(7), .. }
        ));
        assert_eq!(pipeline.device().memory().resident_bytes(), 0);
        assert_eq!(pipeline.device().memory().live_buffers(), 0);
        assert!(!pipeline.writer().layout().times_path().exists());
    }

    #[test]
    fn test_simplex_budget_is_solver_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Five nearly coincident nodes: 5 vertices, 10 edges, 10 triangles
        let tight = PipelineConfig {
            max_simplices: Some(20),
            ..config()
        };
        let mut pipeline = Pipeline::new(tight, layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(2, correlated());

        let err = pipeline.run(&mut source, &[2]).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::SolverFailure { epoch: Some(2), .. }
        ));
        assert!(err.to_string().contains("resource limit"));
        assert_eq!(pipeline.device().memory().resident_bytes(), 0);
        assert!(!layout(&dir).times_path().exists());

        let roomy = PipelineConfig {
            max_simplices: Some(25),
            ..config()
        };
        let mut pipeline = Pipeline::new(roomy, layout(&dir)).unwrap();
        assert!(pipeline.run(&mut source, &[2]).is_ok());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_verbose_logs_shape_and_nnz() {
        let dir = tempfile::tempdir().unwrap();
        let verbose = PipelineConfig {
            verbose: true,
            ..config()
        };
        let mut pipeline = Pipeline::new(verbose, layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(0, uncorrelated());

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            pipeline.process_epoch(&mut source, 0).unwrap();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let dense = logs
            .lines()
            .find(|l| l.contains("distance matrix") && l.contains("stats"))
            .unwrap();
        assert!(dense.contains("shape=(3, 3)"));
        assert!(dense.contains("nnz=9"));
        let sparse = logs
            .lines()
            .find(|l| l.contains("sparse filtration") && l.contains("stats"))
            .unwrap();
        assert!(sparse.contains("nnz=3"));
    }

    #[test]
    fn test_invalid_metric_fails_before_compute() {
        let dir = tempfile::tempdir().unwrap();
        let bad = PipelineConfig {
            metric: "cosine".into(),
            ..config()
        };
        let err = Pipeline::new(bad, layout(&dir)).err().unwrap();
        assert!(matches!(err, TopologyError::InvalidMetric(ref m) if m == "cosine"));
        assert!(!layout(&dir).run_dir().exists());
    }

    #[test]
    fn test_missing_epoch_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(config(), layout(&dir)).unwrap();
        let mut source = InMemorySource::new().with_epoch(0, two_clusters());
        let err = pipeline.run(&mut source, &[0, 1]).unwrap_err();
        assert!(matches!(err, TopologyError::DegenerateInput(_)));
        assert!(layout(&dir).diagram_path(0).exists());
        assert!(!layout(&dir).times_path().exists());
    }

    #[test]
    fn test_runs_append_times() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = InMemorySource::new()
            .with_epoch(0, two_clusters())
            .with_epoch(10, correlated());

        for _ in 0..2 {
            let mut pipeline = Pipeline::new(config(), layout(&dir)).unwrap();
            let report = pipeline.run(&mut source, &[0, 10]).unwrap();
            assert_eq!(report.epochs.len(), 2);
            assert_eq!(report.times.epochs, vec![0, 10]);
        }

        let writer = ArtifactWriter::new(layout(&dir));
        let times = writer.read_run_times().unwrap();
        assert_eq!(times.len(), 2);
        let sum: f64 = times[1].epoch_seconds.iter().sum();
        assert!((sum - times[1].total_seconds).abs() < 1e-9);

        let stored = writer.read_epoch(10).unwrap();
        assert_eq!(stored.n_nodes, 5);
        assert_eq!(stored.network, "mlp");
    }

    #[test]
    fn test_custom_metric() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(config(), layout(&dir))
            .unwrap()
            .with_metric(Metric::custom("orthogonal", |_, _| 0.0));
        let mut source = InMemorySource::new().with_epoch(0, correlated());
        let record = pipeline.process_epoch(&mut source, 0).unwrap();
        assert_eq!(record.metric, "orthogonal");
        assert_eq!(record.nnz, 5);
        assert_eq!(record.diagram.essential_count(0), 5);
    }

    #[test]
    fn test_synthetic_training_run() {
        let dir = tempfile::tempdir().unwrap();
        let verbose = PipelineConfig {
            verbose: true,
            reduced_homology: true,
            ..config()
        };
        let mut pipeline = Pipeline::new(verbose, layout(&dir)).unwrap();
        let mut source = SyntheticSource {
            n_groups: 2,
            units_per_group: 5,
            n_samples: 32,
            ..Default::default()
        };
        let report = pipeline.run(&mut source, &[0, 8]).unwrap();
        assert_eq!(report.epochs.len(), 2);
        for record in &report.epochs {
            assert_eq!(record.n_nodes, 10);
            assert!(record.diagram.reduced);
            assert!(record.nnz >= 10);
        }
        assert!(layout(&dir).diagram_path(8).exists());
    }
}
