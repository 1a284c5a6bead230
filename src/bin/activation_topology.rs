//! Activation Topology: per-checkpoint persistence diagrams
//!
//! Reads recorded activations (`<activations-dir>/epoch_<e>.json`) for each
//! requested checkpoint, builds the functional graph, computes its
//! persistent homology and writes the diagrams plus a timing log under
//! `<save-dir>/<net>/<net>_<dataset>_ss<iter>/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use activation_topology::{
    JsonDirSource, Metric, Pipeline, PipelineConfig, Reduction, RunLayout,
};

#[derive(Parser, Debug)]
#[command(
    name = "activation_topology",
    version,
    about = "Persistent homology of activation graphs across training checkpoints"
)]
struct Args {
    /// JSON pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding epoch_<e>.json activation files
    #[arg(long)]
    activations_dir: PathBuf,

    #[arg(long, default_value = "results")]
    save_dir: PathBuf,

    /// Network name
    #[arg(long)]
    net: String,

    #[arg(long)]
    dataset: String,

    /// Checkpoint epochs, processed in the given order
    #[arg(long, value_delimiter = ',', required = true)]
    chkpt_epochs: Vec<usize>,

    /// pearson, spearman or dcor
    #[arg(long)]
    metric: Option<String>,

    /// Scale for the per-epoch Betti summary
    #[arg(long)]
    eps_thresh: Option<f64>,

    /// Sparsification cutoff
    #[arg(long)]
    max_distance: Option<f64>,

    #[arg(long)]
    max_dim: Option<usize>,

    #[arg(long)]
    threads: Option<usize>,

    /// Dimensionality reduction applied to node vectors (pca)
    #[arg(long)]
    reduction: Option<String>,

    #[arg(long, default_value_t = 32)]
    components: usize,

    /// Subset / repetition index
    #[arg(long, default_value_t = 0)]
    iter: usize,

    /// Keep the global H₀ class
    #[arg(long)]
    full_homology: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<(PipelineConfig, RunLayout, JsonDirSource, Vec<usize>)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(metric) = self.metric {
            // Resolve early so a typo fails before anything is read
            Metric::from_name(&metric)?;
            config.metric = metric;
        }
        if let Some(eps) = self.eps_thresh {
            config.eps_thresh = eps;
        }
        if let Some(cutoff) = self.max_distance {
            config.max_distance = cutoff;
        }
        if let Some(dim) = self.max_dim {
            config.max_dim = dim;
        }
        if self.threads.is_some() {
            config.n_threads = self.threads;
        }
        if let Some(name) = &self.reduction {
            config.reduction = Some(Reduction::from_name(name, self.components)?);
        }
        if self.full_homology {
            config.reduced_homology = false;
        }
        config.verbose |= self.verbose;

        let layout = RunLayout::new(self.save_dir, self.net, self.dataset, self.iter);
        let source = JsonDirSource::new(self.activations_dir);
        Ok((config, layout, source, self.chkpt_epochs))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("activation_topology=info".parse()?),
        )
        .init();

    let (config, layout, mut source, epochs) = Args::parse().into_config()?;
    let run_dir = layout.run_dir();

    let mut pipeline = Pipeline::new(config, layout)?;
    let report = pipeline.run(&mut source, &epochs)?;

    for record in &report.epochs {
        println!(
            "epoch {:>4}: nodes = {:>5}, nnz = {:>9}, β = {:?}, solver = {:.3}s",
            record.epoch, record.n_nodes, record.nnz, record.betti.counts, record.solver_seconds
        );
    }
    println!(
        "Total computation time: {:.4} min → {}",
        report.times.total_seconds / 60.0,
        run_dir.display()
    );
    Ok(())
}
