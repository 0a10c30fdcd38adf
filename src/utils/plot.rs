//! Scalar plot log
//!
//! Values are buffered per name and written out on `flush`, one CSV file per
//! name with `iteration,value` rows. `tick` advances the iteration counter.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;

/// Buffered per-iteration scalar log
#[derive(Debug)]
pub struct Plotter {
    dir: PathBuf,
    iteration: usize,
    pending: BTreeMap<String, Vec<(usize, f64)>>,
}

impl Plotter {
    /// Log into `dir`, starting at iteration `start`
    pub fn new(dir: impl AsRef<Path>, start: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            iteration: start,
            pending: BTreeMap::new(),
        })
    }

    /// Buffer `value` for `name` at the current iteration
    pub fn plot(&mut self, name: &str, value: f64) {
        self.pending
            .entry(name.to_string())
            .or_default()
            .push((self.iteration, value));
    }

    /// Advance to the next iteration
    pub fn tick(&mut self) {
        self.iteration += 1;
    }

    /// Current iteration
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Write buffered values to disk and return their per-name means
    pub fn flush(&mut self) -> Result<BTreeMap<String, f64>> {
        let mut means = BTreeMap::new();

        for (name, values) in std::mem::take(&mut self.pending) {
            if values.is_empty() {
                continue;
            }
            let path = self.csv_path(&name);
            let is_new = !path.exists();
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            if is_new {
                writer.write_record(["iteration", "value"])?;
            }
            for (iteration, value) in &values {
                writer.write_record([iteration.to_string(), value.to_string()])?;
            }
            writer.flush()?;

            let mean = values.iter().map(|(_, v)| v).sum::<f64>() / values.len() as f64;
            means.insert(name, mean);
        }

        if !means.is_empty() {
            let summary: Vec<String> = means
                .iter()
                .map(|(name, mean)| format!("{} {:.4}", name, mean))
                .collect();
            info!("iter {}\t{}", self.iteration, summary.join("\t"));
        }

        Ok(means)
    }

    /// CSV file holding the history of `name`
    pub fn csv_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }
}
