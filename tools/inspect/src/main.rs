//! Inspection tool for face-mask corpora.
//!
//! Subcommands:
//! - `scan`: count samples per class
//! - `split`: compute a train/val assignment and optionally save it as JSON
//! - `stats`: estimate per-channel mean and std from the images
//! - `decode`: print the attributes behind a class id

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mask_core::{
    load_toml_config, setup_cli_logging, DatasetConfig, LabelProjection, SplitPolicy, SubjectDraw,
};
use mask_dataset::statistics::compute_channel_statistics_with_progress;
use mask_dataset::{CorpusScanner, DatasetStats, ImageLoader, MaskDatasetBuilder};
use tracing::info;

#[derive(Parser)]
#[command(name = "mask-inspect")]
#[command(about = "Inspect, split and summarize a face-mask corpus", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count samples per class
    Scan {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Label projection used for class ids
        #[arg(short, long, value_enum)]
        projection: Option<ProjectionArg>,
    },

    /// Split the corpus and print split statistics
    Split {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Split policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Fraction held out for validation
        #[arg(long)]
        val_ratio: Option<f64>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Draw validation subjects with replacement
        #[arg(long)]
        with_replacement: bool,

        /// Write the assignment to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Estimate per-channel normalization statistics
    Stats {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Maximum number of images to read
        #[arg(long)]
        sample_cap: Option<usize>,

        /// Write the statistics to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the attributes encoded by a class id
    Decode {
        /// Class id
        label: usize,

        /// Label projection the id belongs to
        #[arg(short, long, value_enum, default_value = "full")]
        projection: ProjectionArg,
    },
}

#[derive(Args)]
struct CorpusArgs {
    /// Root directory of per-subject folders
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Dataset configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sort directory listings by name
    #[arg(long)]
    sorted: bool,
}

impl CorpusArgs {
    /// Config file first, then command-line overrides
    fn resolve(&self) -> Result<DatasetConfig> {
        let mut config = match (&self.config, &self.data_dir) {
            (Some(path), _) => load_toml_config::<DatasetConfig>(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            (None, Some(dir)) => DatasetConfig::new(dir),
            (None, None) => bail!("Either --data-dir or --config is required"),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.sorted {
            config.sorted_listing = true;
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProjectionArg {
    Full,
    MaskOnly,
    GenderAge,
}

impl From<ProjectionArg> for LabelProjection {
    fn from(arg: ProjectionArg) -> Self {
        match arg {
            ProjectionArg::Full => LabelProjection::Full,
            ProjectionArg::MaskOnly => LabelProjection::MaskOnly,
            ProjectionArg::GenderAge => LabelProjection::GenderAge,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    RandomSample,
    SubjectDisjoint,
}

impl From<PolicyArg> for SplitPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::RandomSample => SplitPolicy::RandomSample,
            PolicyArg::SubjectDisjoint => SplitPolicy::SubjectDisjoint,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    match cli.command {
        Commands::Scan { corpus, projection } => {
            let mut config = corpus.resolve()?;
            if let Some(projection) = projection {
                config.projection = projection.into();
            }
            scan_corpus(&config)?
        }

        Commands::Split {
            corpus,
            policy,
            val_ratio,
            seed,
            with_replacement,
            output,
        } => {
            let mut config = corpus.resolve()?;
            if let Some(policy) = policy {
                config.split.policy = policy.into();
            }
            if let Some(val_ratio) = val_ratio {
                config.split.val_ratio = val_ratio;
            }
            if let Some(seed) = seed {
                config.split.seed = seed;
            }
            if with_replacement {
                config.split.subject_draw = SubjectDraw::WithReplacement;
            }
            split_corpus(config, output.as_deref())?
        }

        Commands::Stats {
            corpus,
            sample_cap,
            output,
        } => {
            let mut config = corpus.resolve()?;
            if let Some(cap) = sample_cap {
                config.stats_sample_cap = cap;
            }
            estimate_statistics(&config, output.as_deref())?
        }

        Commands::Decode { label, projection } => decode_label(label, projection.into())?,
    }

    Ok(())
}

fn scan_corpus(config: &DatasetConfig) -> Result<()> {
    config.validate()?;
    let samples = CorpusScanner::new(&config.data_dir)
        .sorted(config.sorted_listing)
        .scan(&config.filter)
        .context("Failed to scan corpus")?;

    DatasetStats::from_samples(&samples, config.projection).print();
    Ok(())
}

fn split_corpus(config: DatasetConfig, output: Option<&Path>) -> Result<()> {
    info!(
        "Splitting {} with policy {} (val_ratio {}, seed {})",
        config.data_dir.display(),
        config.split.policy,
        config.split.val_ratio,
        config.split.seed
    );

    let dataset = MaskDatasetBuilder::from_config(config)
        .build()
        .context("Failed to build dataset")?;

    print!("{}", dataset.split_stats());
    for subset in dataset.split() {
        println!("\n[{}]", subset.phase());
        subset.class_stats().print();
    }

    if let Some(path) = output {
        dataset
            .assignment()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved split assignment to {}", path.display());
    }

    Ok(())
}

fn estimate_statistics(config: &DatasetConfig, output: Option<&Path>) -> Result<()> {
    config.validate()?;
    let samples = CorpusScanner::new(&config.data_dir)
        .sorted(config.sorted_listing)
        .scan(&config.filter)
        .context("Failed to scan corpus")?;

    let count = samples.len().min(config.stats_sample_cap);
    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let loader = ImageLoader::new(&config.data_dir);
    let statistics =
        compute_channel_statistics_with_progress(&loader, &samples, config.stats_sample_cap, |_| {
            pb.inc(1)
        })
        .context("Failed to estimate channel statistics")?;
    pb.finish_with_message("Done");

    println!("Channel statistics over {} images:", count);
    println!("  mean: {:?}", statistics.mean);
    println!("  std:  {:?}", statistics.std);

    if let Some(path) = output {
        fs::write(path, serde_json::to_string_pretty(&statistics)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved statistics to {}", path.display());
    }

    Ok(())
}

fn decode_label(label: usize, projection: LabelProjection) -> Result<()> {
    let decoded = projection.decode(label)?;
    println!("{} ({} projection): {}", label, projection, decoded);
    Ok(())
}
