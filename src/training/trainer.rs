//! Training loop implementation for WGAN-GP
//!
//! Each iteration runs the generator update(s) against a frozen critic, then
//! several critic updates with the gradient penalty. Periodically the critic
//! is validated, samples from a fixed noise batch are written out and both
//! networks are checkpointed.

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, Kind, Tensor};
use tracing::{debug, info, warn};

use super::gradient_penalty::gradient_penalty;
use super::losses::{critic_loss, dev_critic_cost, generator_loss, wasserstein_gap};
use super::metrics::{IterationStats, TrainingMetrics};
use crate::data::{BatchStream, DataLoader};
use crate::error::{Result, WganError};
use crate::model::{AdamConfig, WganGp};
use crate::utils::{
    load_checkpoint, make_grid, min_max_scale, save_checkpoint, save_image_grid, Config, Plotter,
    SummaryWriter,
};

/// Per-iteration metrics file inside the output directory
pub const METRICS_FILE: &str = "training_metrics.csv";

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// First iteration to run
    pub start_iter: usize,
    /// Iteration to stop at (exclusive)
    pub end_iter: usize,
    /// Critic updates per iteration
    pub critic_iters: usize,
    /// Generator updates per iteration
    pub gener_iters: usize,
    /// Gradient penalty weight
    pub lambda: f64,
    /// Adam settings for both networks
    pub adam: AdamConfig,
    /// Log costs every N iterations
    pub log_every: usize,
    /// Validate, sample and checkpoint every N iterations
    pub checkpoint_every: usize,
    /// Output directory for samples, logs and weights
    pub output_path: PathBuf,
    /// Load weights from `output_path` before training
    pub restore: bool,
    /// Number of images generated from the fixed noise batch
    pub num_samples: i64,
    /// Draw a progress bar
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            start_iter: 0,
            end_iter: 100_000,
            critic_iters: 5,
            gener_iters: 1,
            lambda: 10.0,
            adam: AdamConfig::default(),
            log_every: 10,
            checkpoint_every: 200,
            output_path: PathBuf::from("output"),
            restore: false,
            num_samples: 64,
            show_progress: true,
        }
    }
}

impl From<&Config> for TrainingConfig {
    fn from(config: &Config) -> Self {
        let t = &config.training;
        Self {
            start_iter: t.start_iter,
            end_iter: t.end_iter,
            critic_iters: t.critic_iters,
            gener_iters: t.gener_iters,
            lambda: t.lambda,
            adam: t.adam,
            log_every: t.log_every,
            checkpoint_every: t.checkpoint_every,
            output_path: t.output_path.clone(),
            restore: t.restore,
            num_samples: config.data.batch_size as i64,
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    /// Iterations on which validation, sampling and checkpointing happen
    pub fn is_checkpoint_iter(&self, iteration: usize) -> bool {
        self.checkpoint_every > 0 && iteration % self.checkpoint_every == self.checkpoint_every - 1
    }
}

/// Outcome of a call to [`Trainer::train`]
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// First iteration run (after restoring)
    pub start_iter: usize,
    /// Iteration the run stopped at
    pub end_iter: usize,
    /// Number of iterations run
    pub iterations_run: usize,
    /// Costs of the last iteration
    pub final_stats: Option<IterationStats>,
    /// Full history of the run
    pub metrics: TrainingMetrics,
}

/// Costs of one critic update
#[derive(Debug, Clone, Copy)]
struct CriticStep {
    disc_cost: f64,
    w_dist: f64,
    gradient_penalty: f64,
}

/// WGAN-GP Trainer
pub struct Trainer {
    config: TrainingConfig,
    metrics: TrainingMetrics,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            metrics: TrainingMetrics::new(),
        }
    }

    /// Train the model
    ///
    /// # Arguments
    ///
    /// * `model` - Generator and critic to train
    /// * `train_data` - Endless stream of real batches
    /// * `val_loader` - Held-out images for the critic's validation cost
    ///
    /// # Returns
    ///
    /// Summary of the run
    pub fn train(
        &mut self,
        model: &mut WganGp,
        train_data: &mut BatchStream,
        mut val_loader: Option<&mut DataLoader>,
    ) -> Result<TrainingSummary> {
        let output = self.config.output_path.clone();
        std::fs::create_dir_all(&output)?;

        let start_iter = self.resume(model)?;
        let end_iter = self.config.end_iter;
        if start_iter >= end_iter {
            warn!(
                "Nothing to do: start iteration {} is not before end iteration {}",
                start_iter, end_iter
            );
            return Ok(self.summary(start_iter, start_iter));
        }

        let mut gen_opt = model.gen_optimizer(&self.config.adam)?;
        let mut critic_opt = model.critic_optimizer(&self.config.adam)?;

        let batch_size = train_data.loader().batch_size() as i64;
        let fixed_noise = model.noise(self.config.num_samples);

        let mut plotter = Plotter::new(&output, start_iter)?;
        let mut writer = SummaryWriter::new(output.join("runs"))?;

        info!(
            "Starting training: iterations {}..{}, {} critic / {} generator steps, lambda={}",
            start_iter, end_iter, self.config.critic_iters, self.config.gener_iters, self.config.lambda
        );

        let pb = self.progress_bar((end_iter - start_iter) as u64);

        for iteration in start_iter..end_iter {
            let started = Instant::now();

            // ========== Train Generator ==========
            let timer = Instant::now();
            let gen_cost = self.generator_step(model, &mut gen_opt, batch_size)?;
            debug!("train G elapsed time: {:?}", timer.elapsed());

            // ========== Train Critic ==========
            let step = self.critic_steps(model, &mut critic_opt, train_data, iteration, &mut writer)?;

            // ========== Visualization ==========
            log_scalar(&mut writer, "data/gen_cost", gen_cost, iteration);

            let seconds = started.elapsed().as_secs_f64();
            plotter.plot("time", seconds);
            plotter.plot("train_disc_cost", step.disc_cost);
            plotter.plot("train_gen_cost", gen_cost);
            plotter.plot("wasserstein_distance", step.w_dist);

            let stats = IterationStats {
                iteration,
                gen_cost,
                disc_cost: step.disc_cost,
                w_dist: step.w_dist,
                gradient_penalty: step.gradient_penalty,
                seconds,
            };
            self.metrics.record(stats);

            if self.metrics.has_diverged() {
                warn!("Non-finite cost at iteration {}: {:?}", iteration, stats);
            }

            if self.config.log_every > 0 && (iteration + 1 - start_iter) % self.config.log_every == 0 {
                info!(
                    "Iter {}: G_cost={:.4}, D_cost={:.4}, W_dist={:.4}, GP={:.4} ({:.2}s/iter)",
                    iteration,
                    gen_cost,
                    step.disc_cost,
                    step.w_dist,
                    step.gradient_penalty,
                    seconds
                );
            }

            if self.config.is_checkpoint_iter(iteration) {
                if let Some(loader) = val_loader.as_deref_mut() {
                    let dev_cost = self.evaluate(model, loader)?;
                    plotter.plot("dev_disc_cost", dev_cost);
                    self.metrics.record_dev(iteration, dev_cost);
                    info!("Iter {}: dev_disc_cost={:.4}", iteration, dev_cost);
                }

                if let Err(e) = plotter.flush() {
                    warn!("Failed to write plot log: {}", e);
                }

                self.write_samples(model, &fixed_noise, iteration, &mut writer);

                if let Err(e) = save_checkpoint(model, Some(&stats), iteration, &output) {
                    warn!("Failed to save checkpoint: {}", e);
                }
                if let Err(e) = self.metrics.save_csv(output.join(METRICS_FILE)) {
                    warn!("Failed to save metrics: {}", e);
                }
            }

            plotter.tick();
            pb.set_message(format!("G: {:.4}, D: {:.4}", gen_cost, step.disc_cost));
            pb.inc(1);
        }

        pb.finish_with_message("done");

        if let Err(e) = plotter.flush() {
            warn!("Failed to write plot log: {}", e);
        }

        if let Err(e) = self.metrics.save_csv(output.join(METRICS_FILE)) {
            warn!("Failed to save metrics: {}", e);
        }

        Ok(self.summary(start_iter, end_iter))
    }

    fn summary(&self, start_iter: usize, end_iter: usize) -> TrainingSummary {
        TrainingSummary {
            start_iter,
            end_iter,
            iterations_run: end_iter - start_iter,
            final_stats: self.metrics.latest().copied(),
            metrics: self.metrics.clone(),
        }
    }

    /// Load weights and metrics history when restoring, and pick the first
    /// iteration to run
    fn resume(&mut self, model: &mut WganGp) -> Result<usize> {
        if !self.config.restore {
            return Ok(self.config.start_iter);
        }

        let meta = load_checkpoint(model, &self.config.output_path)?;
        let start = match meta {
            Some(m) if self.config.start_iter == 0 => m.iteration + 1,
            _ => self.config.start_iter,
        };

        let metrics_path = self.config.output_path.join(METRICS_FILE);
        if metrics_path.exists() {
            let mut history = TrainingMetrics::load_csv(&metrics_path)?;
            history.iterations.retain(|s| s.iteration < start);
            info!("Loaded {} iterations of metrics history", history.len());
            self.metrics = history;
        }

        info!("Restored model, continuing at iteration {}", start);
        Ok(start)
    }

    /// Generator update with the critic frozen; returns -E[D(G(z))]
    ///
    /// Gradients are cleared before each of the `gener_iters` passes, so the
    /// single Adam step taken afterwards uses the last pass only.
    fn generator_step(
        &self,
        model: &mut WganGp,
        gen_opt: &mut nn::Optimizer,
        batch_size: i64,
    ) -> Result<f64> {
        model.freeze_critic();

        let mut gen_cost = 0.0;
        for i in 0..self.config.gener_iters {
            debug!("Generator iter: {}", i);
            gen_opt.zero_grad();

            let noise = model.noise(batch_size);
            let fake = model.generator.forward_t(&noise, true);
            let loss = generator_loss(&model.critic.score(&fake));

            loss.backward();
            gen_cost = loss.double_value(&[]);
        }
        gen_opt.step();

        model.unfreeze_critic();
        Ok(gen_cost)
    }

    /// Critic updates; returns the costs of the last one
    fn critic_steps(
        &self,
        model: &mut WganGp,
        critic_opt: &mut nn::Optimizer,
        train_data: &mut BatchStream,
        iteration: usize,
        writer: &mut SummaryWriter,
    ) -> Result<CriticStep> {
        let mut last = None;

        for i in 0..self.config.critic_iters {
            debug!("Critic iter: {}", i);
            critic_opt.zero_grad();

            let timer = Instant::now();
            let real = train_data.next_batch()?.images;
            debug!("load real imgs elapsed time: {:?}", timer.elapsed());

            // The generator is not trained here
            let timer = Instant::now();
            let noise = model.noise(real.size()[0]);
            let fake = model.generate_t(&noise, true);
            debug!("gen G elapsed time: {:?}", timer.elapsed());

            let timer = Instant::now();
            let real_scores = model.critic.score(&real);
            let fake_scores = model.critic.score(&fake);
            let penalty = gradient_penalty(&model.critic, &real, &fake, self.config.lambda)?;

            let cost = critic_loss(&real_scores, &fake_scores, &penalty);
            cost.backward();
            critic_opt.step();

            let step = CriticStep {
                disc_cost: cost.double_value(&[]),
                w_dist: wasserstein_gap(&real_scores, &fake_scores).double_value(&[]),
                gradient_penalty: penalty.double_value(&[]),
            };
            debug!("train D elapsed time: {:?}", timer.elapsed());

            if i == self.config.critic_iters - 1 {
                log_scalar(writer, "data/disc_cost", step.disc_cost, iteration);
                log_scalar(writer, "data/gradient_pen", step.gradient_penalty, iteration);

                if self.config.is_checkpoint_iter(iteration) {
                    let kernels = min_max_scale(&model.critic.first_conv_weight().detach());
                    match make_grid(&kernels, 8, 1, 0.0) {
                        Ok(grid) => {
                            if let Err(e) = writer.add_image("D/conv1", &grid, iteration) {
                                warn!("Failed to write critic kernels: {}", e);
                            }
                        }
                        Err(e) => warn!("Failed to tile critic kernels: {}", e),
                    }
                }
            }

            last = Some(step);
        }

        last.ok_or_else(|| WganError::config("critic_iters must be > 0"))
    }

    /// Validation cost of the critic: mean over batches of -E[D(x)]
    pub fn evaluate(&self, model: &WganGp, loader: &mut DataLoader) -> Result<f64> {
        let mut costs = Vec::new();

        for batch in loader.iter() {
            let batch = batch?;
            let cost = tch::no_grad(|| dev_critic_cost(&model.score(&batch.images)));
            costs.push(cost.double_value(&[]));
        }

        if costs.is_empty() {
            return Err(WganError::data("validation loader produced no batches"));
        }

        Ok(costs.iter().sum::<f64>() / costs.len() as f64)
    }

    /// Save the fixed-noise sample grid as PNG and as a summary image
    fn write_samples(
        &self,
        model: &WganGp,
        fixed_noise: &Tensor,
        iteration: usize,
        writer: &mut SummaryWriter,
    ) {
        let samples = model.generate_images(fixed_noise, true);

        let path = self
            .config
            .output_path
            .join(format!("samples_{}.png", iteration));
        match save_image_grid(&samples, &path, 8, 2) {
            Ok(()) => info!("Saved samples to {}", path.display()),
            Err(e) => warn!("Failed to save samples: {}", e),
        }

        let written = make_grid(&samples.to_kind(Kind::Float), 8, 2, 0.0)
            .and_then(|grid| writer.add_image("images", &grid, iteration));
        if let Err(e) = written {
            warn!("Failed to write sample summary: {}", e);
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }

    /// Get training metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}

fn log_scalar(writer: &mut SummaryWriter, tag: &str, value: f64, step: usize) {
    if let Err(e) = writer.add_scalar(tag, value, step) {
        warn!("Failed to write {}: {}", tag, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetKind, ImageDataset, ImageTransform};
    use std::path::Path;
    use tch::{nn::VarStore, vision::image, Device};
    use tempfile::tempdir;

    fn image_stream(dir: &Path, count: usize) -> BatchStream {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let img = Tensor::randint(256, [3, 64, 64], (Kind::Uint8, Device::Cpu));
            image::save(&img, dir.join(format!("img_{}.png", i))).unwrap();
        }
        let ds = ImageDataset::open(dir, DatasetKind::Raw, &[]).unwrap();
        let loader = DataLoader::new(ds, ImageTransform::new(64), 2, true, true, Some(3)).unwrap();
        BatchStream::new(loader)
    }

    fn snapshot(vs: &VarStore) -> Vec<Tensor> {
        vs.trainable_variables()
            .iter()
            .map(|v| v.detach().copy())
            .collect()
    }

    fn max_change(before: &[Tensor], vs: &VarStore) -> f64 {
        before
            .iter()
            .zip(vs.trainable_variables().iter())
            .map(|(b, v)| (v.detach() - b).abs().max().double_value(&[]))
            .fold(0.0, f64::max)
    }

    fn quiet_config() -> TrainingConfig {
        TrainingConfig {
            critic_iters: 2,
            show_progress: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_generator_step_only_moves_generator() {
        tch::manual_seed(0);
        let trainer = Trainer::new(quiet_config());
        let mut model = WganGp::with_defaults(8, 2, Device::Cpu);
        let mut gen_opt = model.gen_optimizer(&trainer.config.adam).unwrap();

        let gen_before = snapshot(&model.gen_vs);
        let critic_before = snapshot(&model.critic_vs);

        let cost = trainer.generator_step(&mut model, &mut gen_opt, 2).unwrap();
        assert!(cost.is_finite());

        assert!(max_change(&gen_before, &model.gen_vs) > 0.0);
        assert_eq!(max_change(&critic_before, &model.critic_vs), 0.0);

        // Frozen during the step: no gradient reached the critic, and it is trainable again
        let critic_vars = model.critic_vs.trainable_variables();
        assert!(critic_vars.iter().all(|v| !v.grad().defined()));
        assert!(critic_vars.iter().all(|v| v.requires_grad()));
    }

    #[test]
    fn test_generator_takes_one_adam_step() {
        // Adam moves each weight by at most lr per step
        tch::manual_seed(2);
        let trainer = Trainer::new(TrainingConfig {
            gener_iters: 3,
            ..quiet_config()
        });
        let mut model = WganGp::with_defaults(8, 2, Device::Cpu);
        let mut gen_opt = model.gen_optimizer(&trainer.config.adam).unwrap();
        let gen_before = snapshot(&model.gen_vs);

        trainer.generator_step(&mut model, &mut gen_opt, 2).unwrap();

        let change = max_change(&gen_before, &model.gen_vs);
        assert!(change > 0.0);
        assert!(change <= trainer.config.adam.lr * 1.01);
    }

    #[test]
    fn test_critic_steps_only_move_critic() {
        tch::manual_seed(1);
        let dir = tempdir().unwrap();
        let mut data = image_stream(&dir.path().join("train"), 4);
        let mut writer = SummaryWriter::new(dir.path().join("runs")).unwrap();

        let trainer = Trainer::new(quiet_config());
        let mut model = WganGp::with_defaults(8, 2, Device::Cpu);
        let mut critic_opt = model.critic_optimizer(&trainer.config.adam).unwrap();

        let gen_before = snapshot(&model.gen_vs);
        let critic_before = snapshot(&model.critic_vs);

        let step = trainer
            .critic_steps(&mut model, &mut critic_opt, &mut data, 0, &mut writer)
            .unwrap();

        assert!(max_change(&critic_before, &model.critic_vs) > 0.0);
        assert_eq!(max_change(&gen_before, &model.gen_vs), 0.0);
        assert!(model
            .gen_vs
            .trainable_variables()
            .iter()
            .all(|v| !v.grad().defined()));

        // disc_cost = (fake - real) + penalty
        assert!(step.gradient_penalty >= 0.0);
        assert!((step.disc_cost - (step.w_dist + step.gradient_penalty)).abs() < 1e-3);
    }

    #[test]
    fn test_resume_keeps_history_before_start() {
        let dir = tempdir().unwrap();
        let mut model = WganGp::with_defaults(8, 2, Device::Cpu);
        save_checkpoint(&model, None, 1, dir.path()).unwrap();

        let mut history = TrainingMetrics::new();
        for iteration in 0..3 {
            history.record(IterationStats {
                iteration,
                gen_cost: 0.1,
                disc_cost: -0.2,
                w_dist: -0.3,
                gradient_penalty: 0.05,
                seconds: 0.01,
            });
        }
        history.save_csv(dir.path().join(METRICS_FILE)).unwrap();

        let mut trainer = Trainer::new(TrainingConfig {
            output_path: dir.path().to_path_buf(),
            restore: true,
            show_progress: false,
            ..Default::default()
        });
        let start = trainer.resume(&mut model).unwrap();

        // Iteration 2 ran after the checkpoint and will be run again
        assert_eq!(start, 2);
        assert_eq!(trainer.metrics().len(), 2);
        assert_eq!(trainer.metrics().latest().unwrap().iteration, 1);
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.critic_iters, 5);
        assert_eq!(config.gener_iters, 1);
        assert_eq!(config.checkpoint_every, 200);
    }

    #[test]
    fn test_checkpoint_iterations() {
        let config = TrainingConfig::default();
        assert!(!config.is_checkpoint_iter(0));
        assert!(!config.is_checkpoint_iter(200));
        assert!(config.is_checkpoint_iter(199));
        assert!(config.is_checkpoint_iter(399));
    }

    #[test]
    fn test_from_file_config() {
        let mut config = Config::default();
        config.data.batch_size = 16;
        config.training.end_iter = 7;
        config.training.restore = true;

        let training = TrainingConfig::from(&config);
        assert_eq!(training.end_iter, 7);
        assert_eq!(training.num_samples, 16);
        assert!(training.restore);
    }
}
