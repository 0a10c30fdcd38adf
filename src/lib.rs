//! # WGAN-GP image generation
//!
//! Wasserstein GAN with gradient penalty for 64x64 RGB images (LSUN
//! bedrooms or any folder of images), built on `tch`.
//!
//! ## Modules
//!
//! - `data`: Dataset discovery, image transforms and batching
//! - `model`: ResNet generator and critic
//! - `training`: Losses, gradient penalty and the training loop
//! - `utils`: Configuration, checkpoints, sample grids and run logs

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{BatchStream, DataLoader, DatasetKind, ImageDataset, ImageTransform};
pub use error::{Result, WganError};
pub use model::{Critic, Generator, WganGp};
pub use training::{Trainer, TrainingConfig, TrainingMetrics, TrainingSummary};
pub use utils::{load_checkpoint, save_checkpoint, Config};
