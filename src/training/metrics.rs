//! Training metrics for monitoring WGAN-GP progress
//!
//! Per-iteration costs, validation costs and simple health checks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Costs observed during one training iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// Iteration number
    pub iteration: usize,
    /// Generator cost, -E[D(G(z))]
    pub gen_cost: f64,
    /// Critic cost including the gradient penalty
    pub disc_cost: f64,
    /// E[D(G(z))] - E[D(x)] from the last critic step
    pub w_dist: f64,
    /// Gradient penalty from the last critic step
    pub gradient_penalty: f64,
    /// Wall-clock time of the iteration in seconds
    pub seconds: f64,
}

impl IterationStats {
    /// All costs are finite numbers
    pub fn is_finite(&self) -> bool {
        self.gen_cost.is_finite()
            && self.disc_cost.is_finite()
            && self.w_dist.is_finite()
            && self.gradient_penalty.is_finite()
    }
}

/// Metrics collected during training
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Per-iteration statistics in training order
    pub iterations: Vec<IterationStats>,
    /// Validation critic cost, (iteration, -E[D(x_val)])
    pub dev_disc_costs: Vec<(usize, f64)>,
}

impl TrainingMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration
    pub fn record(&mut self, stats: IterationStats) {
        self.iterations.push(stats);
    }

    /// Record a validation pass
    pub fn record_dev(&mut self, iteration: usize, dev_disc_cost: f64) {
        self.dev_disc_costs.push((iteration, dev_disc_cost));
    }

    /// Number of recorded iterations
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Most recent iteration
    pub fn latest(&self) -> Option<&IterationStats> {
        self.iterations.last()
    }

    /// Latest generator cost
    pub fn latest_gen_cost(&self) -> Option<f64> {
        self.latest().map(|s| s.gen_cost)
    }

    /// Latest critic cost
    pub fn latest_disc_cost(&self) -> Option<f64> {
        self.latest().map(|s| s.disc_cost)
    }

    /// Latest validation cost
    pub fn latest_dev_cost(&self) -> Option<f64> {
        self.dev_disc_costs.last().map(|&(_, c)| c)
    }

    /// Moving average of the generator cost
    pub fn gen_cost_ma(&self, window: usize) -> f64 {
        moving_average(self.iterations.iter().map(|s| s.gen_cost), window)
    }

    /// Moving average of the critic cost
    pub fn disc_cost_ma(&self, window: usize) -> f64 {
        moving_average(self.iterations.iter().map(|s| s.disc_cost), window)
    }

    /// Moving average of the Wasserstein gap
    pub fn w_dist_ma(&self, window: usize) -> f64 {
        moving_average(self.iterations.iter().map(|s| s.w_dist), window)
    }

    /// Training has produced a NaN or infinite cost
    pub fn has_diverged(&self) -> bool {
        self.latest().map(|s| !s.is_finite()).unwrap_or(false)
    }

    /// Save per-iteration metrics to a CSV file
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for stats in &self.iterations {
            writer.serialize(stats)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load per-iteration metrics from a CSV file
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut metrics = Self::new();

        for result in reader.deserialize() {
            let stats: IterationStats = result?;
            metrics.record(stats);
        }

        Ok(metrics)
    }
}

/// Average of the last `window` values
fn moving_average(values: impl DoubleEndedIterator<Item = f64>, window: usize) -> f64 {
    let recent: Vec<f64> = values.rev().take(window.max(1)).collect();
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().sum::<f64>() / recent.len() as f64
}
