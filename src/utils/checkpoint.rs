//! Checkpoint save/load utilities
//!
//! A checkpoint directory holds `generator.pt`, `discriminator.pt` and a
//! `meta.json` describing the iteration and the model shape. Saving again
//! into the same directory overwrites the previous checkpoint.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, WganError};
use crate::model::{CriticConfig, GeneratorConfig, WganGp, CRITIC_FILE, GENERATOR_FILE};
use crate::training::IterationStats;

/// File name of the checkpoint metadata
pub const META_FILE: &str = "meta.json";

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Last completed iteration
    pub iteration: usize,
    /// Generator cost at checkpoint
    pub gen_cost: f64,
    /// Critic cost at checkpoint
    pub disc_cost: f64,
    /// Wasserstein gap at checkpoint
    pub w_dist: f64,
    /// Timestamp of checkpoint
    pub timestamp: String,
    /// Generator shape
    pub generator: GeneratorConfig,
    /// Critic shape
    pub critic: CriticConfig,
}

/// Save a complete checkpoint (weights + metadata)
///
/// # Arguments
///
/// * `model` - Model to save
/// * `stats` - Costs of the iteration being checkpointed, if any
/// * `iteration` - Last completed iteration
/// * `dir` - Directory to save into
///
/// # Returns
///
/// Path to the checkpoint directory
pub fn save_checkpoint(
    model: &WganGp,
    stats: Option<&IterationStats>,
    iteration: usize,
    dir: &Path,
) -> Result<PathBuf> {
    model.save(dir)?;

    let meta = CheckpointMeta {
        iteration,
        gen_cost: stats.map(|s| s.gen_cost).unwrap_or(0.0),
        disc_cost: stats.map(|s| s.disc_cost).unwrap_or(0.0),
        w_dist: stats.map(|s| s.w_dist).unwrap_or(0.0),
        timestamp: chrono::Utc::now().to_rfc3339(),
        generator: model.generator.config().clone(),
        critic: model.critic.config().clone(),
    };

    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(dir.join(META_FILE), meta_json)?;

    tracing::info!("Saved checkpoint for iteration {} to {}", iteration, dir.display());
    Ok(dir.to_path_buf())
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(dir: &Path) -> Result<CheckpointMeta> {
    let content = std::fs::read_to_string(dir.join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

/// Check that a directory holds both weight files
pub fn checkpoint_exists(dir: &Path) -> bool {
    dir.join(GENERATOR_FILE).is_file() && dir.join(CRITIC_FILE).is_file()
}

/// Load a complete checkpoint into `model`
///
/// Returns the metadata when `meta.json` is present. Weights saved by an
/// older run without metadata still load.
pub fn load_checkpoint(model: &mut WganGp, dir: &Path) -> Result<Option<CheckpointMeta>> {
    if !checkpoint_exists(dir) {
        return Err(WganError::data(format!(
            "no {} / {} in {}",
            GENERATOR_FILE,
            CRITIC_FILE,
            dir.display()
        )));
    }

    let meta = if dir.join(META_FILE).exists() {
        let meta = load_checkpoint_meta(dir)?;
        if meta.generator.latent_dim != model.latent_dim() || meta.generator.dim != model.dim() {
            return Err(WganError::config(format!(
                "checkpoint was trained with latent_dim={} dim={}, model has latent_dim={} dim={}",
                meta.generator.latent_dim,
                meta.generator.dim,
                model.latent_dim(),
                model.dim()
            )));
        }
        Some(meta)
    } else {
        None
    };

    model.load(dir)?;

    match &meta {
        Some(m) => tracing::info!(
            "Loaded checkpoint from {} (iteration {})",
            dir.display(),
            m.iteration
        ),
        None => tracing::info!("Loaded weights from {}", dir.display()),
    }
    Ok(meta)
}
