//! Populate and train a solved-state table, writing it only once converged.
//!
//! ```text
//! precompute --preset finkel --output data/finkel.lut
//! precompute --preset finkel --pieces 3 --output data/finkel3.lut --output-type percent16
//! precompute --preset masters --output data/masters.lut --resume
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ur_lut::constants::DEFAULT_PRECISION;
use ur_lut::env_config;
use ur_lut::storage::read_lut_expecting;
use ur_lut::{GameConfig, LutTrainer, SweepOrder, TrainOutcome, TrainSettings, ValueType};

#[derive(Parser, Debug)]
#[command(name = "precompute")]
#[command(version, about = "Solve a Royal Game of Ur variant by value iteration", long_about = None)]
struct Args {
    /// Rule preset: finkel, masters or aseb
    #[arg(long, default_value = "finkel")]
    preset: GameConfig,

    /// Override the preset's starting piece count
    #[arg(long)]
    pieces: Option<u8>,

    /// Override whether pieces on rosettes are safe from capture
    #[arg(long)]
    safe_rosettes: Option<bool>,

    /// Override whether landing on a rosette grants another roll
    #[arg(long)]
    rosettes_grant_extra_rolls: Option<bool>,

    /// Override whether capturing grants another roll
    #[arg(long)]
    captures_grant_extra_rolls: Option<bool>,

    /// Final table, written only after convergence
    #[arg(long)]
    output: PathBuf,

    /// Checkpoint file (default: `<output>.checkpoint`)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Continue from the checkpoint instead of starting from priors
    #[arg(long)]
    resume: bool,

    /// Value encoding used while training
    #[arg(long, default_value = "f32")]
    training_type: ValueType,

    /// Value encoding of the final table
    #[arg(long, default_value = "percent16")]
    output_type: ValueType,

    /// Convergence threshold in percentage points
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: f64,

    /// Sweep order: layered or jacobi
    #[arg(long, default_value = "layered")]
    order: SweepOrder,

    /// Stop after this many sweeps even if not converged
    #[arg(long)]
    max_sweeps: Option<u32>,

    /// Sweeps between checkpoint writes
    #[arg(long, default_value_t = 1)]
    checkpoint_interval: u32,

    /// Recorded in the table's annotations
    #[arg(long)]
    author: Option<String>,

    /// Extra `key=value` annotations
    #[arg(long = "annotation", value_name = "KEY=VALUE")]
    annotations: Vec<String>,

    /// Show progress bars
    #[arg(long)]
    progress: bool,
}

impl Args {
    fn config(&self) -> GameConfig {
        let mut config = self.preset;
        if let Some(pieces) = self.pieces {
            config.starting_pieces = pieces;
        }
        if let Some(safe) = self.safe_rosettes {
            config.safe_rosettes = safe;
        }
        if let Some(extra) = self.rosettes_grant_extra_rolls {
            config.rosettes_grant_extra_rolls = extra;
        }
        if let Some(extra) = self.captures_grant_extra_rolls {
            config.captures_grant_extra_rolls = extra;
        }
        config
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.clone().unwrap_or_else(|| {
            let mut name = self.output.as_os_str().to_os_string();
            name.push(".checkpoint");
            PathBuf::from(name)
        })
    }
}

fn main() -> Result<()> {
    env_config::init_logging()?;
    let args = Args::parse();
    env_config::init_base_path()?;
    env_config::init_rayon_threads();

    let config = args.config();
    log::info!("Configuration: {}", config.descriptor());
    let trainer = LutTrainer::new(config).context("invalid configuration")?;
    let checkpoint = args.checkpoint_path();

    let mut lut = if args.resume && checkpoint.exists() {
        let lut = read_lut_expecting(&checkpoint, args.training_type)
            .with_context(|| format!("failed to resume from {}", checkpoint.display()))?;
        lut.check_config(&config)?;
        lut
    } else {
        if args.resume {
            log::warn!("No checkpoint at {}, starting from priors", checkpoint.display());
        }
        trainer.populate_new_lut(args.training_type, args.progress)?
    };

    if let Some(author) = &args.author {
        lut.set_author(author.as_str());
    }
    for annotation in &args.annotations {
        let Some((key, value)) = annotation.split_once('=') else {
            bail!("annotation '{annotation}' is not of the form key=value");
        };
        lut.set_annotation(key.trim(), value.trim());
    }

    let settings = TrainSettings {
        precision: args.precision,
        order: args.order,
        max_sweeps: args.max_sweeps,
        checkpoint: Some(checkpoint),
        checkpoint_interval: args.checkpoint_interval,
        show_progress: args.progress,
    };
    let outcome = trainer.train_and_write(&mut lut, &settings, &args.output, args.output_type)?;

    match outcome {
        TrainOutcome::Converged(report) => {
            log::info!(
                "Wrote {} after {} sweeps (max change {:.2e})",
                args.output.display(),
                report.sweep,
                report.max_change
            );
            Ok(())
        }
        TrainOutcome::SweepLimit(report) | TrainOutcome::Stopped(report) => bail!(
            "training stopped after sweep {} with max change {:.2e}; resume with --resume",
            report.sweep,
            report.max_change
        ),
    }
}
