//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Scalar plot log and summary writer
//! - Image grid helpers

mod checkpoint;
mod config;
mod grid;
mod plot;
mod summary;

pub use checkpoint::{
    checkpoint_exists, load_checkpoint, load_checkpoint_meta, save_checkpoint, CheckpointMeta,
    META_FILE,
};
pub use config::{Config, DataConfig, ModelConfig, TrainingSection};
pub use grid::{make_grid, min_max_scale, save_image, save_image_grid, to_u8};
pub use plot::Plotter;
pub use summary::SummaryWriter;
