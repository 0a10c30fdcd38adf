//! WGAN-GP image generation
//!
//! Main entry point providing CLI interface for:
//! - Writing a default configuration
//! - Training the generator and critic
//! - Generating sample grids from a saved generator

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tch::Device;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use wgan_gp::{
    data::{BatchStream, DataLoader, DatasetKind, ImageDataset, ImageTransform},
    model::{layers::IMAGE_SIZE, WganGp},
    training::{Trainer, TrainingConfig},
    utils::{load_checkpoint_meta, save_image_grid, Config, META_FILE},
};

/// WGAN-GP for 64x64 images
#[derive(Parser)]
#[command(name = "wgan_gp")]
#[command(version = "0.1.0")]
#[command(about = "Train a Wasserstein GAN with gradient penalty on image folders")]
struct Cli {
    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration file
    Init {
        /// Output configuration file path (.toml or .json)
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },

    /// Train the generator and critic
    Train {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Training image directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Validation image directory
        #[arg(long)]
        val_dir: Option<PathBuf>,

        /// Output directory for samples, logs and weights
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Iteration to stop at
        #[arg(long)]
        end_iter: Option<usize>,

        /// Load weights from the output directory before training
        #[arg(long)]
        restore: bool,

        /// Train on the GPU
        #[arg(long)]
        gpu: bool,
    },

    /// Generate a sample grid from a saved generator
    Generate {
        /// Checkpoint directory holding generator.pt
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Number of images to generate
        #[arg(short, long, default_value = "64")]
        num_samples: i64,

        /// Output PNG path
        #[arg(short, long, default_value = "samples.png")]
        output: PathBuf,

        /// Random seed for the noise
        #[arg(short, long)]
        seed: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { output } => {
            init_config(&output)?;
        }
        Commands::Train {
            config,
            data_dir,
            val_dir,
            output,
            end_iter,
            restore,
            gpu,
        } => {
            let mut config = load_config(&config)?;
            if let Some(dir) = data_dir {
                config.data.data_dir = dir;
            }
            if let Some(dir) = val_dir {
                config.data.val_dir = dir;
            }
            if let Some(dir) = output {
                config.training.output_path = dir;
            }
            if let Some(end) = end_iter {
                config.training.end_iter = end;
            }
            if restore {
                config.training.restore = true;
            }
            if gpu {
                config.training.device = "cuda".to_string();
            }
            train_model(config)?;
        }
        Commands::Generate {
            checkpoint,
            num_samples,
            output,
            seed,
        } => {
            generate_samples(&checkpoint, num_samples, &output, seed)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        Config::from_file(path).with_context(|| format!("reading {}", path.display()))
    } else {
        info!("Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Train the WGAN-GP model
fn train_model(config: Config) -> Result<()> {
    config.validate()?;

    if let Some(seed) = config.training.seed {
        tch::manual_seed(seed);
    }

    let device = config.get_device();
    info!("Using device: {:?}", device);

    let transform = ImageTransform::new(IMAGE_SIZE);
    let data = &config.data;

    info!("Loading training images from {}", data.data_dir.display());
    let train_set = ImageDataset::open(&data.data_dir, data.dataset, &data.training_classes)?;
    info!("Found {} training images", train_set.len());

    let train_loader = DataLoader::new(
        train_set,
        transform.clone(),
        data.batch_size,
        true, // shuffle
        true, // drop_last
        data.seed,
    )?
    .with_device(device);
    let mut train_stream = BatchStream::new(train_loader);

    let mut val_loader = open_validation(&config, transform, device)?;

    let mut model = WganGp::new(config.generator_config(), config.critic_config(), device);

    let mut trainer = Trainer::new(TrainingConfig::from(&config));
    let summary = trainer.train(&mut model, &mut train_stream, val_loader.as_mut())?;

    match summary.final_stats {
        Some(stats) => info!(
            "Training complete after {} iterations. Final G_cost: {:.4}, D_cost: {:.4}, W_dist: {:.4}",
            summary.iterations_run, stats.gen_cost, stats.disc_cost, stats.w_dist
        ),
        None => info!("Training complete, no iterations run"),
    }

    Ok(())
}

/// Validation loader, or `None` when there are no validation images
fn open_validation(
    config: &Config,
    transform: ImageTransform,
    device: Device,
) -> Result<Option<DataLoader>> {
    let data = &config.data;
    let wanted = match data.dataset {
        DatasetKind::Lsun => !data.val_classes.is_empty(),
        DatasetKind::Raw => data.val_dir.is_dir(),
    };
    if !wanted {
        warn!("No validation data configured, skipping dev_disc_cost");
        return Ok(None);
    }

    let val_set = ImageDataset::open(&data.val_dir, data.dataset, &data.val_classes)?;
    info!("Found {} validation images", val_set.len());

    let loader = DataLoader::new(val_set, transform, data.batch_size, true, true, data.seed)?
        .with_device(device);
    if loader.num_batches() == 0 {
        warn!(
            "Fewer validation images than one batch ({}), skipping dev_disc_cost",
            data.batch_size
        );
        return Ok(None);
    }
    Ok(Some(loader))
}

/// Generate a sample grid from a saved generator
fn generate_samples(
    checkpoint: &Path,
    num_samples: i64,
    output: &Path,
    seed: Option<i64>,
) -> Result<()> {
    if let Some(seed) = seed {
        tch::manual_seed(seed);
    }

    let meta = load_checkpoint_meta(checkpoint)
        .with_context(|| format!("reading {} in {}", META_FILE, checkpoint.display()))?;
    info!(
        "Checkpoint from iteration {} (latent_dim={}, dim={})",
        meta.iteration, meta.generator.latent_dim, meta.generator.dim
    );

    let mut model = WganGp::new(meta.generator, meta.critic, Device::cuda_if_available());
    model.load_generator(checkpoint)?;

    info!("Generating {} samples", num_samples);
    let noise = model.noise(num_samples);
    let images = model.generate_images(&noise, false);

    save_image_grid(&images, output, 8, 2)?;
    info!("Saved samples to {}", output.display());

    Ok(())
}

/// Initialize default configuration
fn init_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config.save(output)?;
    info!("Created default configuration at {}", output.display());
    Ok(())
}
