//! Gradient penalty for the WGAN-GP critic
//!
//! Penalises the critic when the norm of its input gradient, taken at random
//! points between real and generated samples, drifts away from 1.

use tch::{nn::Module, Kind, Tensor};

use crate::error::{Result, WganError};

/// Points on the straight lines between paired real and fake samples
///
/// `alpha` has shape (batch, 1, ..., 1) and weights the real sample.
/// Inputs are detached so the penalty only trains the critic; the result
/// tracks gradients so the critic's input gradient can be taken.
pub fn interpolate(real: &Tensor, fake: &Tensor, alpha: &Tensor) -> Tensor {
    let mixed: Tensor = alpha * real.detach() + (1.0 - alpha) * fake.detach();
    mixed.set_requires_grad(true)
}

/// Uniform interpolation weights, one per sample, broadcastable over `like`
pub fn random_alpha(like: &Tensor) -> Tensor {
    let mut shape = vec![1i64; like.dim()];
    shape[0] = like.size()[0];
    Tensor::rand(shape.as_slice(), (Kind::Float, like.device()))
}

/// `lambda * E[(||grad_x D(x_hat)||_2 - 1)^2]`
///
/// # Arguments
///
/// * `critic` - Network scoring each sample
/// * `real` - Real batch
/// * `fake` - Generated batch, same shape as `real`
/// * `lambda` - Penalty weight
///
/// # Returns
///
/// Scalar tensor with a graph back to the critic's parameters
pub fn gradient_penalty<M: Module>(
    critic: &M,
    real: &Tensor,
    fake: &Tensor,
    lambda: f64,
) -> Result<Tensor> {
    let alpha = random_alpha(real);
    gradient_penalty_at(critic, real, fake, &alpha, lambda)
}

/// Gradient penalty with explicit interpolation weights
pub fn gradient_penalty_at<M: Module>(
    critic: &M,
    real: &Tensor,
    fake: &Tensor,
    alpha: &Tensor,
    lambda: f64,
) -> Result<Tensor> {
    if real.size() != fake.size() {
        return Err(WganError::Shape(format!(
            "real batch {:?} and fake batch {:?} differ",
            real.size(),
            fake.size()
        )));
    }

    let batch_size = real.size()[0];
    let x_hat = interpolate(real, fake, alpha);
    let scores = critic.forward(&x_hat);

    // Summing the scores is the same as back-propagating a vector of ones
    let grads = Tensor::run_backward(&[scores.sum(Kind::Float)], &[&x_hat], true, true);
    let grad = grads
        .into_iter()
        .next()
        .ok_or_else(|| WganError::Shape("no gradient for interpolates".to_string()))?;

    let norm = (grad
        .reshape([batch_size, -1])
        .square()
        .sum_dim_intlist(&[1i64][..], false, Kind::Float)
        + 1e-12)
        .sqrt();

    Ok((norm - 1.0).square().mean(Kind::Float) * lambda)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn, nn::VarStore, Device};

    #[test]
    fn test_interpolate_endpoints() {
        let real = Tensor::ones([2, 3], (Kind::Float, Device::Cpu));
        let fake = Tensor::zeros([2, 3], (Kind::Float, Device::Cpu));

        let all_real = interpolate(&real, &fake, &Tensor::ones([2, 1], (Kind::Float, Device::Cpu)));
        assert!((all_real - &real).abs().max().double_value(&[]) < 1e-6);

        let half = Tensor::full([2, 1], 0.5, (Kind::Float, Device::Cpu));
        let mid = interpolate(&real, &fake, &half);
        assert!((mid.mean(Kind::Float).double_value(&[]) - 0.5).abs() < 1e-6);
        assert!(mid.requires_grad());
    }

    #[test]
    fn test_random_alpha_shape_and_range() {
        let like = Tensor::zeros([5, 3, 8, 8], (Kind::Float, Device::Cpu));
        let alpha = random_alpha(&like);
        assert_eq!(alpha.size(), vec![5, 1, 1, 1]);
        assert!(alpha.min().double_value(&[]) >= 0.0);
        assert!(alpha.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_penalty_of_known_gradient() {
        // D(x) = 3 * sum(x): every input gradient is 3, so ||grad|| = 3 * sqrt(4) = 6
        let critic = nn::func(|x| (x * 3.0).sum_dim_intlist(&[1i64][..], false, Kind::Float));
        let real = Tensor::randn([2, 4], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([2, 4], (Kind::Float, Device::Cpu));

        let gp = gradient_penalty(&critic, &real, &fake, 10.0).unwrap();
        assert!((gp.double_value(&[]) - 250.0).abs() < 1e-3);
    }

    #[test]
    fn test_unit_gradient_has_zero_penalty() {
        // D(x) = x_0: gradient is a unit vector
        let critic = nn::func(|x| x.narrow(1, 0, 1).reshape([-1]));
        let real = Tensor::randn([3, 5], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([3, 5], (Kind::Float, Device::Cpu));

        let gp = gradient_penalty(&critic, &real, &fake, 10.0).unwrap();
        assert!(gp.double_value(&[]).abs() < 1e-4);
    }

    #[test]
    fn test_penalty_reaches_critic_parameters() {
        let vs = VarStore::new(Device::Cpu);
        let linear = nn::linear(vs.root() / "fc", 4, 1, Default::default());
        let critic = nn::func(move |x| linear.forward(x).view([-1]));

        let real = Tensor::randn([3, 4], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([3, 4], (Kind::Float, Device::Cpu));

        let gp = gradient_penalty(&critic, &real, &fake, 10.0).unwrap();
        gp.backward();

        let grad_norm: f64 = vs
            .trainable_variables()
            .iter()
            .map(|v| v.grad())
            .filter(|g| g.defined())
            .map(|g| g.abs().sum(Kind::Float).double_value(&[]))
            .sum();
        assert!(grad_norm > 0.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let critic = nn::func(|x| x.sum_dim_intlist(&[1i64][..], false, Kind::Float));
        let real = Tensor::zeros([2, 4], (Kind::Float, Device::Cpu));
        let fake = Tensor::zeros([3, 4], (Kind::Float, Device::Cpu));
        assert!(gradient_penalty(&critic, &real, &fake, 10.0).is_err());
    }
}
