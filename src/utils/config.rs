//! Configuration management
//!
//! Provides unified configuration for data loading, the networks and the
//! training loop. Defaults reproduce the reference WGAN-GP 64x64 setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::DatasetKind;
use crate::error::{Result, WganError};
use crate::model::{AdamConfig, CriticConfig, GeneratorConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training configuration
    pub training: TrainingSection,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root of the training images
    pub data_dir: PathBuf,
    /// Root of the validation images
    pub val_dir: PathBuf,
    /// Dataset layout: "lsun" or "raw"
    pub dataset: DatasetKind,
    /// LSUN classes used for training
    pub training_classes: Vec<String>,
    /// LSUN classes used for validation
    pub val_classes: Vec<String>,
    /// Batch size
    pub batch_size: usize,
    /// Shuffle seed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model width for both networks
    pub dim: i64,
    /// Latent dimension size
    pub latent_dim: i64,
}

/// Training-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSection {
    /// First iteration to run
    pub start_iter: usize,
    /// Iteration to stop at (exclusive)
    pub end_iter: usize,
    /// Critic updates per iteration
    pub critic_iters: usize,
    /// Generator updates per iteration
    pub gener_iters: usize,
    /// Gradient penalty weight
    pub lambda: f64,
    /// Log costs every N iterations
    pub log_every: usize,
    /// Validate, sample and checkpoint every N iterations
    pub checkpoint_every: usize,
    /// Output directory for samples, logs and weights
    pub output_path: PathBuf,
    /// Load weights from `output_path` and continue training
    pub restore: bool,
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Tensor RNG seed
    #[serde(default)]
    pub seed: Option<i64>,
    /// Adam settings for both networks
    pub adam: AdamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                data_dir: PathBuf::from("/datasets/lsun"),
                val_dir: PathBuf::from("/datasets/lsun"),
                dataset: DatasetKind::Lsun,
                training_classes: vec!["bedroom_train".to_string()],
                val_classes: vec!["bedroom_val".to_string()],
                batch_size: 64,
                seed: None,
            },
            model: ModelConfig {
                dim: 64,
                latent_dim: 128,
            },
            training: TrainingSection {
                start_iter: 0,
                end_iter: 100_000,
                critic_iters: 5,
                gener_iters: 1,
                lambda: 10.0,
                log_every: 10,
                checkpoint_every: 200,
                output_path: PathBuf::from("output"),
                restore: false,
                device: "cuda".to_string(),
                seed: None,
                adam: AdamConfig::default(),
            },
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML or JSON file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if is_toml(path) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Save configuration to a TOML or JSON file, chosen by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if is_toml(path) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Generator settings derived from the model section
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            latent_dim: self.model.latent_dim,
            dim: self.model.dim,
        }
    }

    /// Critic settings derived from the model section
    pub fn critic_config(&self) -> CriticConfig {
        CriticConfig {
            dim: self.model.dim,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data.data_dir.as_os_str().is_empty() {
            return Err(WganError::config("data_dir must point at the image data"));
        }
        if self.data.batch_size == 0 {
            return Err(WganError::config("batch size must be > 0"));
        }
        if self.data.dataset == DatasetKind::Lsun && self.data.training_classes.is_empty() {
            return Err(WganError::config("lsun dataset needs training_classes"));
        }
        if self.model.dim <= 0 || self.model.latent_dim <= 0 {
            return Err(WganError::config("model dim and latent_dim must be > 0"));
        }
        let t = &self.training;
        if t.end_iter <= t.start_iter {
            return Err(WganError::config(format!(
                "end_iter ({}) must be greater than start_iter ({})",
                t.end_iter, t.start_iter
            )));
        }
        if t.critic_iters == 0 || t.gener_iters == 0 {
            return Err(WganError::config("critic_iters and gener_iters must be > 0"));
        }
        if t.lambda <= 0.0 || t.adam.lr <= 0.0 {
            return Err(WganError::config("lambda and learning rate must be > 0"));
        }
        if t.checkpoint_every == 0 || t.log_every == 0 {
            return Err(WganError::config("log_every and checkpoint_every must be > 0"));
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|e| e == "toml").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model.dim, 64);
        assert_eq!(config.model.latent_dim, 128);
        assert_eq!(config.training.critic_iters, 5);
        assert_eq!(config.training.gener_iters, 1);
        assert_eq!(config.training.checkpoint_every, 200);
        assert_eq!(config.training.lambda, 10.0);
        assert_eq!(config.training.adam.beta1, 0.0);
        assert_eq!(config.training.adam.beta2, 0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_toml_and_json_files() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.data.dataset = DatasetKind::Raw;
        config.training.end_iter = 42;

        let toml_path = dir.path().join("config.toml");
        config.save(&toml_path).unwrap();
        let loaded = Config::from_file(&toml_path).unwrap();
        assert_eq!(loaded.data.dataset, DatasetKind::Raw);
        assert_eq!(loaded.training.end_iter, 42);

        let json_path = dir.path().join("config.json");
        config.save(&json_path).unwrap();
        let loaded = Config::from_file(&json_path).unwrap();
        assert_eq!(loaded.training.end_iter, 42);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.end_iter = config.training.start_iter;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.critic_iters = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.data.data_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cpu_device() {
        let mut config = Config::default();
        config.training.device = "cpu".to_string();
        assert_eq!(config.get_device(), tch::Device::Cpu);
    }
}
