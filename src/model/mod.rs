//! Model module containing the WGAN-GP architecture
//!
//! This module provides:
//! - Residual building blocks and weight initialisation
//! - Generator network mapping noise to 64x64 images
//! - Critic network scoring images
//! - `WganGp` wrapper owning both networks

mod critic;
mod generator;
pub mod layers;
mod wgan;

pub use critic::{Critic, CriticConfig};
pub use generator::{Generator, GeneratorConfig};
pub use wgan::{AdamConfig, WganGp, CRITIC_FILE, GENERATOR_FILE};
