//! Generator network for WGAN-GP
//!
//! Maps a noise vector to a 64x64 RGB image. A dense projection produces a
//! 4x4 feature map which four up-sampling residual blocks grow to 64x64.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, nn::ModuleT, Device, Kind, Tensor};

use super::layers::{self, ResidualBlock, BASE_SIZE, CHANNELS};

/// Generator network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector
    pub latent_dim: i64,
    /// Model width; the widest layer has `8 * dim` channels
    pub dim: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_dim: 128,
            dim: 64,
        }
    }
}

/// Generator network
///
/// Architecture:
/// 1. Dense layer from latent space to a (8*dim, 4, 4) feature map
/// 2. Four residual blocks with nearest-neighbour upsampling (4 -> 64 pixels)
/// 3. BatchNorm, ReLU, 3x3 convolution to RGB, Tanh
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    fc: nn::Linear,
    blocks: Vec<ResidualBlock>,
    bn: nn::BatchNorm,
    conv_out: nn::Conv2D,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let d = config.dim;

        let fc = layers::linear(vs / "fc", config.latent_dim, BASE_SIZE * BASE_SIZE * 8 * d);

        let widths = [(8 * d, 8 * d), (8 * d, 4 * d), (4 * d, 2 * d), (2 * d, d)];
        let blocks = widths
            .iter()
            .enumerate()
            .map(|(i, &(input, output))| {
                ResidualBlock::up(&(vs / format!("rb{}", i + 1)), input, output, 3)
            })
            .collect();

        let bn = nn::batch_norm2d(vs / "bn", d, Default::default());
        let conv_out = layers::conv2d(vs / "conv_out", d, CHANNELS, 3, true, true);

        Self {
            config,
            fc,
            blocks,
            bn,
            conv_out,
        }
    }

    /// Generate images from noise
    ///
    /// # Arguments
    ///
    /// * `noise` - Tensor of shape (batch_size, latent_dim)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 3, 64, 64) with values in [-1, 1]
    pub fn forward_t(&self, noise: &Tensor, train: bool) -> Tensor {
        let batch_size = noise.size()[0];

        let x = self.fc.forward(noise).view([
            batch_size,
            8 * self.config.dim,
            BASE_SIZE,
            BASE_SIZE,
        ]);

        let x = self
            .blocks
            .iter()
            .fold(x, |x, block| block.forward_t(&x, train));

        let x = self.bn.forward_t(&x, train).relu();
        self.conv_out.forward(&x).tanh()
    }

    /// Draw a standard normal noise batch for this generator
    pub fn noise(&self, num_samples: i64, device: Device) -> Tensor {
        Tensor::randn([num_samples, self.config.latent_dim], (Kind::Float, device))
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layers::IMAGE_SIZE;
    use tch::nn::VarStore;

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            latent_dim: 16,
            dim: 4,
        };
        let gen = Generator::new(&vs.root(), config);

        let noise = gen.noise(2, Device::Cpu);
        assert_eq!(noise.size(), vec![2, 16]);

        let output = gen.forward_t(&noise, false);
        assert_eq!(output.size(), vec![2, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);
    }

    #[test]
    fn test_generator_output_bounded() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(
            &vs.root(),
            GeneratorConfig {
                latent_dim: 8,
                dim: 2,
            },
        );

        let output = gen.forward_t(&gen.noise(3, Device::Cpu), true);
        assert!(output.max().double_value(&[]) <= 1.0);
        assert!(output.min().double_value(&[]) >= -1.0);
    }
}
