//! Variance-scaling weight initialization.
//!
//! Each layer kind knows its own scaling rule through [`InitWeights`], so the
//! network never has to inspect layer types at runtime.

use burn::module::Param;
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Re-initializes the learnable parameters of a layer given a scale divisor `bs`.
///
/// The layer is consumed and returned, following how burn modules are updated.
pub trait InitWeights: Sized {
    fn init_weights(self, bs: f64) -> Self;
}

/// Normal distribution centered at zero with the given variance.
fn normal(variance: f64) -> Distribution {
    Distribution::Normal(0., variance.sqrt())
}

impl<B: Backend> InitWeights for Conv2d<B> {
    /// - `bs == 1`: Kaiming normal in fan-out mode, `var = 2 / fan_out`.
    /// - otherwise: `var = 2 / (fan_out * bs)`.
    ///
    /// Where `fan_out = out_channels * kernel_h * kernel_w`. The bias is zeroed in both cases.
    fn init_weights(mut self, bs: f64) -> Self {
        let weight = self.weight.val();
        let device = weight.device();
        let [out_channels, _, kernel_h, kernel_w] = weight.dims();
        let fan_out = (out_channels * kernel_h * kernel_w) as f64;

        let variance = if bs == 1. {
            2. / fan_out
        } else {
            2. / (fan_out * bs)
        };
        let weight = Tensor::random(weight.shape(), normal(variance), &device);
        self.weight = Param::from_tensor(weight);

        self.bias = self
            .bias
            .map(|bias| Param::from_tensor(bias.val().zeros_like()));
        self
    }
}

impl<B: Backend> InitWeights for BatchNorm<B> {
    /// `gamma = bs`, `beta = 0`.
    fn init_weights(mut self, bs: f64) -> Self {
        let gamma = self.gamma.val().ones_like().mul_scalar(bs);
        let beta = self.beta.val().zeros_like();
        self.gamma = Param::from_tensor(gamma);
        self.beta = Param::from_tensor(beta);
        self
    }
}

impl<B: Backend> InitWeights for Linear<B> {
    /// `var = 2 / bs` for the weight, the bias is left as is.
    fn init_weights(mut self, bs: f64) -> Self {
        let weight = self.weight.val();
        let device = weight.device();
        let weight = Tensor::random(weight.shape(), normal(2. / bs), &device);
        self.weight = Param::from_tensor(weight);
        self
    }
}
