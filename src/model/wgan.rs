//! WGAN-GP wrapper combining Generator and Critic
//!
//! Owns both variable stores and provides optimizer construction,
//! critic freezing, generation and persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};
use tracing::debug;

use super::critic::{Critic, CriticConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::data::denormalize;
use crate::error::Result;

/// File name of the saved generator weights
pub const GENERATOR_FILE: &str = "generator.pt";

/// File name of the saved critic weights
pub const CRITIC_FILE: &str = "discriminator.pt";

/// Adam hyper-parameters shared by both networks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamConfig {
    /// Learning rate
    pub lr: f64,
    /// First moment decay
    pub beta1: f64,
    /// Second moment decay
    pub beta2: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta1: 0.0,
            beta2: 0.9,
        }
    }
}

impl AdamConfig {
    fn build(&self, vs: &VarStore) -> Result<nn::Optimizer> {
        let adam = nn::Adam {
            beta1: self.beta1,
            beta2: self.beta2,
            ..Default::default()
        };
        Ok(adam.build(vs, self.lr)?)
    }
}

/// Complete WGAN-GP model
pub struct WganGp {
    /// Generator network
    pub generator: Generator,
    /// Critic network
    pub critic: Critic,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for critic
    pub critic_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl WganGp {
    /// Create a new model
    ///
    /// # Arguments
    ///
    /// * `gen_config` - Generator configuration
    /// * `critic_config` - Critic configuration
    /// * `device` - Device to create model on
    pub fn new(gen_config: GeneratorConfig, critic_config: CriticConfig, device: Device) -> Self {
        let gen_vs = VarStore::new(device);
        let critic_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config);
        let critic = Critic::new(&critic_vs.root(), critic_config);

        Self {
            generator,
            critic,
            gen_vs,
            critic_vs,
            device,
        }
    }

    /// Create a model with the same width for both networks
    pub fn with_defaults(latent_dim: i64, dim: i64, device: Device) -> Self {
        Self::new(
            GeneratorConfig { latent_dim, dim },
            CriticConfig { dim },
            device,
        )
    }

    /// Draw a noise batch on the model's device
    pub fn noise(&self, num_samples: i64) -> Tensor {
        self.generator.noise(num_samples, self.device)
    }

    /// Run the generator without recording gradients
    ///
    /// `train` selects batch statistics (true) or running statistics (false)
    /// in the generator's batch norm layers.
    pub fn generate_t(&self, noise: &Tensor, train: bool) -> Tensor {
        tch::no_grad(|| self.generator.forward_t(noise, train))
    }

    /// Generate images in [-1, 1] from noise (inference mode)
    pub fn generate(&self, noise: &Tensor) -> Tensor {
        self.generate_t(noise, false)
    }

    /// Generate images mapped to [0, 1], ready to be saved
    pub fn generate_images(&self, noise: &Tensor, train: bool) -> Tensor {
        denormalize(&self.generate_t(noise, train))
    }

    /// Critic score for each image
    pub fn score(&self, images: &Tensor) -> Tensor {
        self.critic.score(images)
    }

    /// Build the generator's Adam optimizer
    pub fn gen_optimizer(&self, config: &AdamConfig) -> Result<nn::Optimizer> {
        config.build(&self.gen_vs)
    }

    /// Build the critic's Adam optimizer
    pub fn critic_optimizer(&self, config: &AdamConfig) -> Result<nn::Optimizer> {
        config.build(&self.critic_vs)
    }

    /// Stop gradients from accumulating in the critic's parameters
    pub fn freeze_critic(&mut self) {
        self.critic_vs.freeze();
    }

    /// Let the critic's parameters receive gradients again
    pub fn unfreeze_critic(&mut self) {
        self.critic_vs.unfreeze();
    }

    /// Paths of the two weight files inside `dir`
    pub fn weight_paths(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join(GENERATOR_FILE), dir.join(CRITIC_FILE))
    }

    /// Save both networks into `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let (gen_path, critic_path) = Self::weight_paths(dir);
        self.gen_vs.save(&gen_path)?;
        self.critic_vs.save(&critic_path)?;
        debug!("Saved weights to {}", dir.display());
        Ok(())
    }

    /// Load both networks from `dir`
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let (gen_path, critic_path) = Self::weight_paths(dir);
        self.gen_vs.load(&gen_path)?;
        self.critic_vs.load(&critic_path)?;
        debug!("Loaded weights from {}", dir.display());
        Ok(())
    }

    /// Load only the generator from `dir`
    pub fn load_generator(&mut self, dir: &Path) -> Result<()> {
        self.gen_vs.load(dir.join(GENERATOR_FILE))?;
        Ok(())
    }

    /// Get latent dimension
    pub fn latent_dim(&self) -> i64 {
        self.generator.config().latent_dim
    }

    /// Get model width
    pub fn dim(&self) -> i64 {
        self.generator.config().dim
    }
}
