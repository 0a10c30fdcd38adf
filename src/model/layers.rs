//! Building blocks shared by the generator and the critic
//!
//! Convolutions keep spatial size (padding `(k - 1) / 2`). Resampling is done
//! around the convolution: nearest-neighbour upsampling before it, 2x2 mean
//! pooling after it.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// Side length of generated and critiqued images
pub const IMAGE_SIZE: i64 = 64;

/// Colour channels
pub const CHANNELS: i64 = 3;

/// Spatial size the generator starts from and the critic ends at
pub const BASE_SIZE: i64 = 4;

/// Xavier (Glorot) uniform initialisation
pub fn xavier_uniform(fan_in: i64, fan_out: i64) -> nn::Init {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    nn::Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// He (Kaiming) uniform initialisation for ReLU networks
pub fn kaiming_uniform(fan_in: i64) -> nn::Init {
    let bound = (6.0 / fan_in as f64).sqrt();
    nn::Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// Same-padding 2D convolution with He or Xavier weights and zero bias
pub fn conv2d(
    vs: nn::Path,
    in_dim: i64,
    out_dim: i64,
    kernel: i64,
    he_init: bool,
    bias: bool,
) -> nn::Conv2D {
    let fan_in = in_dim * kernel * kernel;
    let fan_out = out_dim * kernel * kernel;
    let ws_init = if he_init {
        kaiming_uniform(fan_in)
    } else {
        xavier_uniform(fan_in, fan_out)
    };

    nn::conv2d(
        vs,
        in_dim,
        out_dim,
        kernel,
        nn::ConvConfig {
            padding: (kernel - 1) / 2,
            bias,
            ws_init,
            bs_init: nn::Init::Const(0.0),
            ..Default::default()
        },
    )
}

/// Linear layer with Xavier weights and zero bias
pub fn linear(vs: nn::Path, in_dim: i64, out_dim: i64) -> nn::Linear {
    nn::linear(
        vs,
        in_dim,
        out_dim,
        nn::LinearConfig {
            ws_init: xavier_uniform(in_dim, out_dim),
            bs_init: Some(nn::Init::Const(0.0)),
            bias: true,
        },
    )
}

/// Double height and width by nearest-neighbour repetition
pub fn upsample2x(x: &Tensor) -> Tensor {
    let size = x.size();
    let (h, w) = (size[2], size[3]);
    x.upsample_nearest2d([h * 2, w * 2], 2.0, 2.0)
}

/// Halve height and width by averaging 2x2 windows
pub fn mean_pool2x(x: &Tensor) -> Tensor {
    x.avg_pool2d_default(2)
}

/// Resampling direction of a residual block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resample {
    /// Double resolution (generator)
    Up,
    /// Halve resolution (critic)
    Down,
}

/// Normalisation used inside a residual block
///
/// The critic must not use batch norm: the gradient penalty is computed
/// per sample, so the critic's output for one sample may not depend on the
/// rest of the batch.
#[derive(Debug)]
enum Norm {
    Batch(nn::BatchNorm),
    Layer(nn::LayerNorm),
}

impl Norm {
    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        match self {
            Norm::Batch(bn) => bn.forward_t(x, train),
            Norm::Layer(ln) => ln.forward(x),
        }
    }
}

/// Pre-activation residual block with up- or down-sampling
#[derive(Debug)]
pub struct ResidualBlock {
    resample: Resample,
    shortcut: nn::Conv2D,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    norm1: Norm,
    norm2: Norm,
}

impl ResidualBlock {
    /// Up-sampling block with batch norm, `in_dim -> out_dim`
    pub fn up(vs: &nn::Path, in_dim: i64, out_dim: i64, kernel: i64) -> Self {
        Self {
            resample: Resample::Up,
            shortcut: conv2d(vs / "shortcut", in_dim, out_dim, 1, false, true),
            conv1: conv2d(vs / "conv1", in_dim, out_dim, kernel, true, false),
            conv2: conv2d(vs / "conv2", out_dim, out_dim, kernel, true, true),
            norm1: Norm::Batch(nn::batch_norm2d(vs / "bn1", in_dim, Default::default())),
            norm2: Norm::Batch(nn::batch_norm2d(vs / "bn2", out_dim, Default::default())),
        }
    }

    /// Down-sampling block with layer norm over `[in_dim, hw, hw]`
    pub fn down(vs: &nn::Path, in_dim: i64, out_dim: i64, kernel: i64, hw: i64) -> Self {
        Self {
            resample: Resample::Down,
            shortcut: conv2d(vs / "shortcut", in_dim, out_dim, 1, false, true),
            conv1: conv2d(vs / "conv1", in_dim, in_dim, kernel, true, false),
            conv2: conv2d(vs / "conv2", in_dim, out_dim, kernel, true, true),
            norm1: Norm::Layer(nn::layer_norm(
                vs / "ln1",
                vec![in_dim, hw, hw],
                Default::default(),
            )),
            norm2: Norm::Layer(nn::layer_norm(
                vs / "ln2",
                vec![in_dim, hw, hw],
                Default::default(),
            )),
        }
    }

    /// Resampling direction
    pub fn resample(&self) -> Resample {
        self.resample
    }
}

impl ModuleT for ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        match self.resample {
            Resample::Up => {
                let shortcut = self.shortcut.forward(&upsample2x(xs));

                let x = self.norm1.forward_t(xs, train).relu();
                let x = self.conv1.forward(&upsample2x(&x));
                let x = self.norm2.forward_t(&x, train).relu();
                let x = self.conv2.forward(&x);

                shortcut + x
            }
            Resample::Down => {
                let shortcut = self.shortcut.forward(&mean_pool2x(xs));

                let x = self.norm1.forward_t(xs, train).relu();
                let x = self.conv1.forward(&x);
                let x = self.norm2.forward_t(&x, train).relu();
                let x = mean_pool2x(&self.conv2.forward(&x));

                shortcut + x
            }
        }
    }
}
