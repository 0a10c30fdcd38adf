//! Image transform pipeline
//!
//! Turns a decoded image into a normalised training tensor:
//! scale shorter side, centre crop, convert to float, normalise to [-1, 1].

use tch::{vision::image, Kind, Tensor};

use crate::error::{Result, WganError};

/// Transform applied to every decoded image
#[derive(Debug, Clone)]
pub struct ImageTransform {
    /// Output side length (square images)
    pub size: i64,
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub mean: [f64; 3],
    /// Per-channel standard deviation
    pub std: [f64; 3],
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ImageTransform {
    /// Transform producing `size x size` images normalised to [-1, 1]
    pub fn new(size: i64) -> Self {
        Self {
            size,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }

    /// Apply the full pipeline to a `[C, H, W]` uint8 image
    ///
    /// Returns a `[3, size, size]` float tensor.
    pub fn apply(&self, raw: &Tensor) -> Result<Tensor> {
        let rgb = to_rgb(raw)?;
        let scaled = self.scale(&rgb)?;
        let cropped = center_crop(&scaled, self.size)?;
        let x = cropped.to_kind(Kind::Float) / 255.0;
        Ok(self.normalize(&x))
    }

    /// Load an image from disk and apply the pipeline
    pub fn load(&self, path: &std::path::Path) -> Result<Tensor> {
        let raw = image::load(path)?;
        self.apply(&raw)
    }

    /// Resize so that the shorter side equals `size`, keeping aspect ratio
    fn scale(&self, img: &Tensor) -> Result<Tensor> {
        let (_, h, w) = img.size3()?;
        if h.min(w) == self.size {
            return Ok(img.shallow_clone());
        }
        let (new_h, new_w) = if h <= w {
            (self.size, (w * self.size + h / 2) / h)
        } else {
            ((h * self.size + w / 2) / w, self.size)
        };
        Ok(image::resize(img, new_w.max(self.size), new_h.max(self.size))?)
    }

    fn normalize(&self, x: &Tensor) -> Tensor {
        let device = x.device();
        let mean = Tensor::from_slice(&self.mean)
            .to_kind(Kind::Float)
            .view([3, 1, 1])
            .to_device(device);
        let std = Tensor::from_slice(&self.std)
            .to_kind(Kind::Float)
            .view([3, 1, 1])
            .to_device(device);
        (x - mean) / std
    }
}

/// Force three channels: greyscale is repeated, alpha is dropped
fn to_rgb(img: &Tensor) -> Result<Tensor> {
    let (c, _, _) = img.size3()?;
    match c {
        3 => Ok(img.shallow_clone()),
        1 => Ok(img.repeat([3, 1, 1])),
        4 => Ok(img.narrow(0, 0, 3)),
        2 => Ok(img.narrow(0, 0, 1).repeat([3, 1, 1])),
        other => Err(WganError::Shape(format!(
            "unsupported channel count {} in image",
            other
        ))),
    }
}

/// Crop the central `size x size` window of a `[C, H, W]` tensor
pub fn center_crop(img: &Tensor, size: i64) -> Result<Tensor> {
    let (_, h, w) = img.size3()?;
    if h < size || w < size {
        return Err(WganError::Shape(format!(
            "cannot crop {}x{} image to {}",
            h, w, size
        )));
    }
    let top = (h - size) / 2;
    let left = (w - size) / 2;
    Ok(img.narrow(1, top, size).narrow(2, left, size))
}

/// Map a normalised `[-1, 1]` tensor back to `[0, 1]`
pub fn denormalize(x: &Tensor) -> Tensor {
    (x * 0.5 + 0.5).clamp(0.0, 1.0)
}
