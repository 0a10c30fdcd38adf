//! Summary writer for scalars and images
//!
//! Scalars go to `scalars.csv` (tag, step, value, wall_time); images are
//! written as PNG files under `images/`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tch::Tensor;

use super::grid::save_image;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ScalarEvent<'a> {
    tag: &'a str,
    step: usize,
    value: f64,
    wall_time: f64,
}

/// Append-only event log for one training run
pub struct SummaryWriter {
    log_dir: PathBuf,
    scalars: csv::Writer<File>,
}

impl SummaryWriter {
    /// Open (or continue) a run in `log_dir`
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(log_dir.join("images"))?;

        let scalars_path = log_dir.join("scalars.csv");
        let is_new = !scalars_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&scalars_path)?;

        let mut scalars = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            scalars.write_record(["tag", "step", "value", "wall_time"])?;
            scalars.flush()?;
        }

        Ok(Self { log_dir, scalars })
    }

    /// Record a scalar value
    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let wall_time = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        self.scalars.serialize(ScalarEvent {
            tag,
            step,
            value,
            wall_time,
        })?;
        self.scalars.flush()?;
        Ok(())
    }

    /// Record a (C, H, W) image with values in [0, 1]
    pub fn add_image(&mut self, tag: &str, image: &Tensor, step: usize) -> Result<PathBuf> {
        let path = self.image_path(tag, step);
        save_image(image, &path)?;
        Ok(path)
    }

    /// File an image for `tag` at `step` is written to
    pub fn image_path(&self, tag: &str, step: usize) -> PathBuf {
        let safe_tag = tag.replace(['/', '\\', ' '], "_");
        self.log_dir
            .join("images")
            .join(format!("{}_{:06}.png", safe_tag, step))
    }

    /// Run directory
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};
    use tempfile::tempdir;

    #[test]
    fn test_scalars_appended() {
        let dir = tempdir().unwrap();
        {
            let mut writer = SummaryWriter::new(dir.path()).unwrap();
            writer.add_scalar("data/disc_cost", -1.5, 4).unwrap();
        }
        {
            // Reopening keeps earlier events and does not repeat the header
            let mut writer = SummaryWriter::new(dir.path()).unwrap();
            writer.add_scalar("data/gen_cost", 0.25, 4).unwrap();
        }

        let mut reader = csv::Reader::from_path(dir.path().join("scalars.csv")).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "data/disc_cost");
        assert_eq!(&rows[0][1], "4");
        assert_eq!(&rows[1][2], "0.25");
    }

    #[test]
    fn test_add_image() {
        let dir = tempdir().unwrap();
        let mut writer = SummaryWriter::new(dir.path()).unwrap();
        let image = Tensor::rand([3, 10, 10], (Kind::Float, Device::Cpu));

        let path = writer.add_image("D/conv1", &image, 199).unwrap();
        assert!(path.exists());
        assert!(path.ends_with("images/D_conv1_000199.png"));
    }
}
