//! Critic network for WGAN-GP
//!
//! Scores 64x64 RGB images. Unlike a classic GAN discriminator the output is
//! an unbounded realness score, not a probability.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::layers::{self, ResidualBlock, BASE_SIZE, CHANNELS, IMAGE_SIZE};

/// Critic network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Model width; the widest layer has `8 * dim` channels
    pub dim: i64,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self { dim: 64 }
    }
}

/// Critic network
///
/// Architecture:
/// 1. 3x3 convolution from RGB to `dim` channels
/// 2. Four down-sampling residual blocks with layer norm (64 -> 4 pixels)
/// 3. Flatten and a single linear output
#[derive(Debug)]
pub struct Critic {
    config: CriticConfig,
    conv_in: nn::Conv2D,
    blocks: Vec<ResidualBlock>,
    fc: nn::Linear,
}

impl Critic {
    /// Create a new Critic network
    pub fn new(vs: &nn::Path, config: CriticConfig) -> Self {
        let d = config.dim;

        let conv_in = layers::conv2d(vs / "conv_in", CHANNELS, d, 3, false, true);

        let widths = [
            (d, 2 * d, IMAGE_SIZE),
            (2 * d, 4 * d, IMAGE_SIZE / 2),
            (4 * d, 8 * d, IMAGE_SIZE / 4),
            (8 * d, 8 * d, IMAGE_SIZE / 8),
        ];
        let blocks = widths
            .iter()
            .enumerate()
            .map(|(i, &(input, output, hw))| {
                ResidualBlock::down(&(vs / format!("rb{}", i + 1)), input, output, 3, hw)
            })
            .collect();

        let fc = layers::linear(vs / "fc", BASE_SIZE * BASE_SIZE * 8 * d, 1);

        Self {
            config,
            conv_in,
            blocks,
            fc,
        }
    }

    /// Score a batch of images
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (batch_size, 3, 64, 64)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size,)
    pub fn score(&self, images: &Tensor) -> Tensor {
        let batch_size = images.size()[0];
        let x = images.view([batch_size, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);

        let x = self.conv_in.forward(&x);
        let x = self
            .blocks
            .iter()
            .fold(x, |x, block| block.forward_t(&x, true));

        let x = x.view([batch_size, -1]);
        self.fc.forward(&x).view([-1])
    }

    /// Kernels of the first convolution, shape (dim, 3, 3, 3)
    pub fn first_conv_weight(&self) -> &Tensor {
        &self.conv_in.ws
    }

    /// Get configuration
    pub fn config(&self) -> &CriticConfig {
        &self.config
    }
}

impl Module for Critic {
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.score(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_critic_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let critic = Critic::new(&vs.root(), CriticConfig { dim: 4 });

        let input = Tensor::randn([3, 3, 64, 64], (Kind::Float, Device::Cpu));
        let output = critic.score(&input);

        assert_eq!(output.size(), vec![3]);
        assert_eq!(critic.first_conv_weight().size(), vec![4, 3, 3, 3]);
    }

    #[test]
    fn test_critic_is_per_sample() {
        // Without batch norm a sample's score cannot depend on its batch mates
        let vs = VarStore::new(Device::Cpu);
        let critic = Critic::new(&vs.root(), CriticConfig { dim: 2 });

        let batch = Tensor::randn([4, 3, 64, 64], (Kind::Float, Device::Cpu));
        let together = critic.score(&batch);
        let alone = critic.score(&batch.narrow(0, 0, 1));

        let diff = (together.narrow(0, 0, 1) - alone).abs().max().double_value(&[]);
        assert!(diff < 1e-4);
    }

    #[test]
    fn test_critic_accepts_flat_images() {
        let vs = VarStore::new(Device::Cpu);
        let critic = Critic::new(&vs.root(), CriticConfig { dim: 2 });

        let flat = Tensor::randn([2, 3 * 64 * 64], (Kind::Float, Device::Cpu));
        assert_eq!(critic.forward(&flat).size(), vec![2]);
    }
}
