//! Image grid helpers
//!
//! Tiles a batch of images into one picture and writes it as PNG.

use std::path::Path;

use tch::{Device, Kind, Tensor};

use crate::error::{Result, WganError};

/// Tile `images` (N, C, H, W) into a single (C', H', W') image
///
/// Up to `nrow` images per row, `padding` pixels between and around them
/// filled with `pad_value`. Single-channel batches are expanded to RGB.
pub fn make_grid(images: &Tensor, nrow: i64, padding: i64, pad_value: f64) -> Result<Tensor> {
    let (n, c, h, w) = images.size4()?;
    if n == 0 {
        return Err(WganError::Shape("cannot build a grid from an empty batch".to_string()));
    }
    if nrow <= 0 {
        return Err(WganError::Shape(format!("nrow must be > 0, got {}", nrow)));
    }

    let images = if c == 1 {
        images.repeat([1, 3, 1, 1])
    } else {
        images.shallow_clone()
    };
    let channels = images.size()[1];

    let cols = nrow.min(n);
    let rows = (n + cols - 1) / cols;
    let cell_h = h + padding;
    let cell_w = w + padding;

    let grid = Tensor::full(
        [channels, rows * cell_h + padding, cols * cell_w + padding],
        pad_value,
        (images.kind(), images.device()),
    );

    tch::no_grad(|| {
        for k in 0..n {
            let (r, col) = (k / cols, k % cols);
            let mut cell = grid
                .narrow(1, r * cell_h + padding, h)
                .narrow(2, col * cell_w + padding, w);
            cell.copy_(&images.get(k));
        }
    });

    Ok(grid)
}

/// Rescale a tensor to [0, 1] using its own minimum and maximum
pub fn min_max_scale(x: &Tensor) -> Tensor {
    let lo = x.min();
    let hi = x.max();
    let range = (&hi - &lo).clamp_min(1e-12);
    (x - lo) / range
}

/// Convert a [0, 1] float image to uint8 on the CPU
pub fn to_u8(image: &Tensor) -> Tensor {
    (image.to_device(Device::Cpu).to_kind(Kind::Float) * 255.0)
        .round()
        .clamp(0.0, 255.0)
        .to_kind(Kind::Uint8)
}

/// Save a batch of [0, 1] images as one PNG grid
pub fn save_image_grid(
    images: &Tensor,
    path: impl AsRef<Path>,
    nrow: i64,
    padding: i64,
) -> Result<()> {
    let grid = make_grid(&images.detach(), nrow, padding, 0.0)?;
    save_image(&grid, path)
}

/// Save a single (C, H, W) [0, 1] image
pub fn save_image(image: &Tensor, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tch::vision::image::save(&to_u8(image), path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_grid_shape() {
        let images = Tensor::ones([10, 3, 4, 4], (Kind::Float, Device::Cpu));
        let grid = make_grid(&images, 8, 2, 0.0).unwrap();
        // 8 columns, 2 rows
        assert_eq!(grid.size(), vec![3, 2 * 6 + 2, 8 * 6 + 2]);
    }

    #[test]
    fn test_grid_fewer_images_than_nrow() {
        let images = Tensor::ones([3, 3, 4, 4], (Kind::Float, Device::Cpu));
        let grid = make_grid(&images, 8, 1, 0.0).unwrap();
        assert_eq!(grid.size(), vec![3, 6, 3 * 5 + 1]);
    }

    #[test]
    fn test_grid_padding_and_content() {
        let images = Tensor::ones([2, 1, 2, 2], (Kind::Float, Device::Cpu));
        let grid = make_grid(&images, 2, 1, 0.0).unwrap();
        assert_eq!(grid.size(), vec![3, 4, 7]);
        // Border is padding, interior holds the images
        assert_eq!(grid.double_value(&[0, 0, 0]), 0.0);
        assert_eq!(grid.double_value(&[0, 1, 1]), 1.0);
        assert_eq!(grid.double_value(&[2, 2, 5]), 1.0);
        assert_eq!(grid.double_value(&[0, 1, 3]), 0.0);
        let total = grid.sum(Kind::Float).double_value(&[]);
        assert_eq!(total, 3.0 * 8.0);
    }

    #[test]
    fn test_min_max_scale() {
        let x = Tensor::from_slice(&[-2.0f32, 0.0, 2.0]);
        let y = Vec::<f32>::try_from(&min_max_scale(&x)).unwrap();
        assert_eq!(y, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_save_image_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples/grid.png");
        let images = Tensor::rand([4, 3, 8, 8], (Kind::Float, Device::Cpu));
        save_image_grid(&images, &path, 2, 2).unwrap();
        assert!(path.exists());
    }
}
