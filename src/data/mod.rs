//! Data module for loading training images
//!
//! This module provides:
//! - Dataset discovery for LSUN class folders and plain image folders
//! - Image transform pipeline (scale, centre crop, normalise)
//! - DataLoader for batching, plus an endless batch stream

mod dataset;
mod loader;
mod transform;

pub use dataset::{DatasetKind, ImageDataset, ImageSample};
pub use loader::{BatchStream, DataLoader, DataLoaderIter, ImageBatch};
pub use transform::{center_crop, denormalize, ImageTransform};
