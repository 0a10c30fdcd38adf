//! Wasserstein costs for WGAN-GP
//!
//! The critic estimates the Wasserstein distance as the gap between its mean
//! score on real and on generated samples.

use tch::{Kind, Tensor};

/// Generator cost: -E[D(G(z))]
///
/// # Arguments
///
/// * `fake_scores` - Critic scores on generated samples
///
/// # Returns
///
/// Scalar tensor
pub fn generator_loss(fake_scores: &Tensor) -> Tensor {
    -fake_scores.mean(Kind::Float)
}

/// Negated Wasserstein estimate: E[D(G(z))] - E[D(x)]
///
/// This is the critic's cost before regularisation; its negation is the
/// estimated distance between the real and generated distributions.
pub fn wasserstein_gap(real_scores: &Tensor, fake_scores: &Tensor) -> Tensor {
    fake_scores.mean(Kind::Float) - real_scores.mean(Kind::Float)
}

/// Critic cost: E[D(G(z))] - E[D(x)] + gradient penalty
pub fn critic_loss(real_scores: &Tensor, fake_scores: &Tensor, penalty: &Tensor) -> Tensor {
    wasserstein_gap(real_scores, fake_scores) + penalty
}

/// Validation cost of the critic on held-out real images: -E[D(x)]
pub fn dev_critic_cost(real_scores: &Tensor) -> Tensor {
    -real_scores.mean(Kind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn scores(values: &[f32]) -> Tensor {
        Tensor::from_slice(values).to_device(Device::Cpu)
    }

    #[test]
    fn test_generator_loss() {
        let loss = generator_loss(&scores(&[1.0, 3.0]));
        assert_eq!(loss.size(), Vec::<i64>::new());
        assert!((loss.double_value(&[]) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_wasserstein_gap() {
        let real = scores(&[2.0, 4.0]);
        let fake = scores(&[-1.0, 1.0]);
        assert!((wasserstein_gap(&real, &fake).double_value(&[]) + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_critic_loss_adds_penalty() {
        let real = scores(&[1.0]);
        let fake = scores(&[1.0]);
        let penalty = Tensor::from(0.5f32);
        let loss = critic_loss(&real, &fake, &penalty);
        assert!((loss.double_value(&[]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_dev_critic_cost() {
        let cost = dev_critic_cost(&scores(&[0.5, 1.5]));
        assert!((cost.double_value(&[]) + 1.0).abs() < 1e-6);
    }
}
