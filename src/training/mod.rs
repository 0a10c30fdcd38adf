//! Training module for WGAN-GP
//!
//! This module provides:
//! - Training loop implementation
//! - Loss functions (Wasserstein critic and generator costs)
//! - Gradient penalty on real/fake interpolates
//! - Per-iteration metrics

mod gradient_penalty;
mod losses;
mod metrics;
mod trainer;

pub use gradient_penalty::{gradient_penalty, gradient_penalty_at, interpolate, random_alpha};
pub use losses::{critic_loss, dev_critic_cost, generator_loss, wasserstein_gap};
pub use metrics::{IterationStats, TrainingMetrics};
pub use trainer::{Trainer, TrainingConfig, TrainingSummary, METRICS_FILE};
