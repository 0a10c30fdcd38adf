//! DataLoader for batching and iterating over image datasets
//!
//! Provides batching for GAN training with support for:
//! - Random shuffling (re-shuffled every epoch)
//! - Drop last incomplete batch
//! - Parallel image decoding within a batch
//! - An endless stream that restarts the loader when an epoch runs out

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tch::{Device, Tensor};
use tracing::debug;

use super::dataset::ImageDataset;
use super::transform::ImageTransform;
use crate::error::{Result, WganError};

/// One batch of images
#[derive(Debug)]
pub struct ImageBatch {
    /// Images, shape (batch, 3, size, size)
    pub images: Tensor,
}

impl ImageBatch {
    /// Number of images in the batch
    pub fn len(&self) -> i64 {
        self.images.size()[0]
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// DataLoader over an [`ImageDataset`]
pub struct DataLoader {
    dataset: ImageDataset,
    transform: ImageTransform,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Device batches are moved to
    device: Device,
    rng: StdRng,
    /// Current indices for iteration
    indices: Vec<usize>,
    /// Current position in iteration
    current_idx: usize,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `dataset` - Indexed image files
    /// * `transform` - Pipeline applied to each decoded image
    /// * `batch_size` - Number of images per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    /// * `seed` - Shuffle seed; `None` seeds from entropy
    pub fn new(
        dataset: ImageDataset,
        transform: ImageTransform,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(WganError::config("batch size must be > 0"));
        }

        let indices: Vec<usize> = (0..dataset.len()).collect();
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut loader = Self {
            dataset,
            transform,
            batch_size,
            shuffle,
            drop_last,
            device: Device::Cpu,
            rng,
            indices,
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        Ok(loader)
    }

    /// Move produced batches to `device`
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.dataset.len();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            num_samples.div_ceil(self.batch_size)
        }
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Underlying dataset
    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch
    ///
    /// Returns `Ok(None)` when the epoch is complete
    pub fn next_batch(&mut self) -> Result<Option<ImageBatch>> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return Ok(None);
        }

        let end = (start + self.batch_size).min(num_samples);

        // Skip incomplete batch if drop_last
        if self.drop_last && end - start < self.batch_size {
            self.current_idx = num_samples;
            return Ok(None);
        }

        let samples: Vec<_> = self.indices[start..end]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();

        let transform = &self.transform;
        let decoded: Vec<Result<Tensor>> = samples
            .par_iter()
            .map(|sample| transform.load(&sample.path))
            .collect();
        let images = decoded.into_iter().collect::<Result<Vec<Tensor>>>()?;

        self.current_idx = end;
        debug!("Loaded batch [{}..{})", start, end);

        Ok(Some(ImageBatch {
            images: Tensor::stack(&images, 0).to_device(self.device),
        }))
    }

    /// Iterate over the batches of one epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = Result<ImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch().transpose()
    }
}

/// Endless batch source
///
/// When the wrapped loader runs out, it is reset (and re-shuffled) and
/// iteration continues from the first batch of the new epoch.
pub struct BatchStream {
    loader: DataLoader,
    epoch: usize,
}

impl BatchStream {
    /// Wrap a loader
    pub fn new(loader: DataLoader) -> Self {
        Self { loader, epoch: 0 }
    }

    /// Pull the next batch, restarting the loader when exhausted
    pub fn next_batch(&mut self) -> Result<ImageBatch> {
        if let Some(batch) = self.loader.next_batch()? {
            return Ok(batch);
        }

        self.loader.reset();
        self.epoch += 1;
        debug!("Data loader exhausted, starting epoch {}", self.epoch);

        self.loader.next_batch()?.ok_or_else(|| {
            WganError::data(format!(
                "loader yields no batch ({} images, batch size {})",
                self.loader.num_samples(),
                self.loader.batch_size()
            ))
        })
    }

    /// Number of completed passes over the data
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Access the wrapped loader
    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetKind;
    use std::path::Path;
    use tch::{vision::image, Kind};
    use tempfile::tempdir;

    fn write_images(dir: &Path, count: usize) {
        for i in 0..count {
            let img = Tensor::full([3, 64, 64], (i * 10) as i64, (Kind::Uint8, Device::Cpu));
            image::save(&img, dir.join(format!("img_{:03}.png", i))).unwrap();
        }
    }

    fn loader(dir: &Path, batch_size: usize, drop_last: bool) -> DataLoader {
        let ds = ImageDataset::open(dir, DatasetKind::Raw, &[]).unwrap();
        DataLoader::new(ds, ImageTransform::new(64), batch_size, false, drop_last, Some(0)).unwrap()
    }

    #[test]
    fn test_dataloader_basic() {
        let dir = tempdir().unwrap();
        write_images(dir.path(), 10);
        let mut loader = loader(dir.path(), 3, false);

        assert_eq!(loader.num_batches(), 4); // ceil(10/3) = 4
        assert_eq!(loader.num_samples(), 10);

        let mut sizes = Vec::new();
        while let Some(batch) = loader.next_batch().unwrap() {
            assert_eq!(batch.images.size()[1..], [3, 64, 64]);
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let dir = tempdir().unwrap();
        write_images(dir.path(), 10);
        let mut loader = loader(dir.path(), 3, true);

        assert_eq!(loader.num_batches(), 3); // floor(10/3) = 3

        let batches: Vec<_> = loader.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 3));
    }

    #[test]
    fn test_batch_stream_restarts() {
        let dir = tempdir().unwrap();
        write_images(dir.path(), 4);
        let mut stream = BatchStream::new(loader(dir.path(), 2, true));

        for _ in 0..5 {
            let batch = stream.next_batch().unwrap();
            assert_eq!(batch.len(), 2);
        }
        assert_eq!(stream.epoch(), 2);
    }

    #[test]
    fn test_batch_stream_too_few_images() {
        let dir = tempdir().unwrap();
        write_images(dir.path(), 2);
        let mut stream = BatchStream::new(loader(dir.path(), 4, true));
        assert!(stream.next_batch().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempdir().unwrap();
        write_images(dir.path(), 1);
        let ds = ImageDataset::open(dir.path(), DatasetKind::Raw, &[]).unwrap();
        assert!(DataLoader::new(ds, ImageTransform::new(64), 0, true, true, None).is_err());
    }
}
