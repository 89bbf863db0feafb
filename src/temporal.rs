use crate::init::InitWeights;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;

/// Convolution over the time axis followed by batch normalization.
///
/// No activation is applied, the caller activates after adding its residual.
#[derive(Module, Debug)]
pub struct TemporalConvolution<B: Backend> {
    /// Input channel: [`TemporalConvolutionConfig::in_channels`].
    /// Output channel: [`TemporalConvolutionConfig::out_channels`].
    /// Kernel: [[`TemporalConvolutionConfig::kernel_size`], [`TemporalConvolutionConfig::kernel_size_joint`]].
    /// Stride: [[`TemporalConvolutionConfig::stride`], 1].
    pub t_conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

#[derive(Config, Debug)]
pub struct TemporalConvolutionConfig {
    pub in_channels: usize,
    pub out_channels: usize,

    /// Kernel width over the joint axis.
    ///
    /// Values other than `1` also merge joints, which is only used by a residual path
    /// that changes the joint count.
    #[config(default = 1)]
    pub kernel_size_joint: usize,

    /// Kernel height over the time axis.
    #[config(default = 9)]
    pub kernel_size: usize,

    /// Stride over the time axis.
    #[config(default = 1)]
    pub stride: usize,
}

impl TemporalConvolutionConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> TemporalConvolution<B> {
        assert!(self.kernel_size > 0);
        assert!(self.stride > 0);

        // keeps the time length when stride = 1
        let pad = (self.kernel_size - 1) / 2;
        let t_conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size_joint],
        )
        .with_stride([self.stride, 1])
        .with_padding(PaddingConfig2d::Explicit(pad, 0))
        .init(device)
        .init_weights(1.);
        let bn = BatchNormConfig::new(self.out_channels)
            .init(device)
            .init_weights(1.);

        TemporalConvolution { t_conv, bn }
    }
}

impl<B: Backend> TemporalConvolution<B> {
    /// # Shapes
    ///   - Input [batch, in_channels, time, joints]
    ///   - Output [batch, out_channels, time / stride, joints - kernel_size_joint + 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.t_conv.forward(x);
        self.bn.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn keeps_time_and_joints() {
        let device = Default::default();
        let tcn = TemporalConvolutionConfig::new(4, 8).init::<TestBackend>(&device);

        let x = Tensor::random([2, 4, 30, 51], Distribution::Default, &device);
        assert_eq!(tcn.forward(x).dims(), [2, 8, 30, 51]);
    }

    #[test]
    fn strides_over_time_only() {
        let device = Default::default();
        let tcn = TemporalConvolutionConfig::new(4, 4)
            .with_stride(2)
            .init::<TestBackend>(&device);

        let x = Tensor::random([1, 4, 30, 7], Distribution::Default, &device);
        // (30 + 2 * 4 - 9) / 2 + 1
        assert_eq!(tcn.forward(x).dims(), [1, 4, 15, 7]);
    }

    #[test]
    fn joint_kernel_merges_joints() {
        let device = Default::default();
        let tcn = TemporalConvolutionConfig::new(3, 5)
            .with_kernel_size_joint(7)
            .init::<TestBackend>(&device);

        let x = Tensor::random([2, 3, 12, 7], Distribution::Default, &device);
        assert_eq!(tcn.forward(x).dims(), [2, 5, 12, 1]);
    }

    #[test]
    fn zero_input_gives_zero_output() {
        let device = Default::default();
        let tcn = TemporalConvolutionConfig::new(2, 3).init::<TestBackend>(&device);

        let x = Tensor::zeros([1, 2, 10, 4], &device);
        let out = tcn.forward(x).into_data().to_vec::<f32>().unwrap();
        assert!(out.iter().all(|&v| v == 0.));
    }
}
