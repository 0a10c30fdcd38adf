//! Image dataset discovery
//!
//! Two layouts are supported:
//! - `lsun`: one folder per configured class under the root (e.g. `bedroom_train`)
//! - `raw`: image-folder layout, every sub-directory of the root is a class

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, WganError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Dataset layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Exported LSUN category folders
    Lsun,
    /// Plain folder of images
    Raw,
}

impl std::str::FromStr for DatasetKind {
    type Err = WganError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lsun" => Ok(Self::Lsun),
            "raw" | "folder" | "imagefolder" => Ok(Self::Raw),
            other => Err(WganError::config(format!("unknown dataset kind '{}'", other))),
        }
    }
}

/// One image on disk with its class label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class index
    pub label: i64,
}

/// Indexed collection of image files
#[derive(Debug, Clone)]
pub struct ImageDataset {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageDataset {
    /// Scan `root` for images
    ///
    /// `classes` is only used for the `lsun` layout.
    pub fn open(root: impl AsRef<Path>, kind: DatasetKind, classes: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(WganError::data(format!(
                "dataset directory {} does not exist",
                root.display()
            )));
        }

        let class_names: Vec<String> = match kind {
            DatasetKind::Lsun => {
                if classes.is_empty() {
                    return Err(WganError::config("lsun dataset needs at least one class"));
                }
                classes.to_vec()
            }
            DatasetKind::Raw => list_subdirs(&root)?,
        };

        let mut samples = Vec::new();
        if class_names.is_empty() {
            // Flat folder: everything is class 0
            for path in collect_images(&root, false)? {
                samples.push(ImageSample { path, label: 0 });
            }
        } else {
            for (label, class) in class_names.iter().enumerate() {
                let dir = root.join(class);
                if !dir.is_dir() {
                    return Err(WganError::data(format!(
                        "class directory {} does not exist",
                        dir.display()
                    )));
                }
                let found = collect_images(&dir, true)?;
                debug!("Class {} ({}): {} images", label, class, found.len());
                samples.extend(found.into_iter().map(|path| ImageSample {
                    path,
                    label: label as i64,
                }));
            }
        }

        if samples.is_empty() {
            return Err(WganError::EmptyDataset(root.display().to_string()));
        }

        info!(
            "Indexed {} images in {} class(es) under {}",
            samples.len(),
            class_names.len().max(1),
            root.display()
        );

        Ok(Self {
            root,
            classes: class_names,
            samples,
        })
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get sample by index
    pub fn get(&self, idx: usize) -> Option<&ImageSample> {
        self.samples.get(idx)
    }

    /// Class names in label order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Dataset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// Collect image files, sorted by path
fn collect_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else if is_image(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
