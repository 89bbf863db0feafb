use crate::bilinear::{BilinearMapping, BilinearMappingConfig};
use crate::temporal::{TemporalConvolution, TemporalConvolutionConfig};
use burn::nn::Relu;
use burn::prelude::*;

/// One network stage: graph mixing, temporal convolution, residual, activation.
#[derive(Module, Debug)]
pub struct StBlnBlock<B: Backend> {
    pub gcn: BilinearMapping<B>,
    pub tcn: TemporalConvolution<B>,
    /// If missing, the block has no skip connection.
    pub residual: Option<TemporalConvolution<B>>,
    pub relu: Relu,
}

#[derive(Config, Debug)]
pub struct StBlnBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,

    /// Input joint count.
    #[config(default = 25)]
    pub graph_dim1: usize,

    /// Output joint count.
    #[config(default = 25)]
    pub graph_dim2: usize,

    /// Stride over the time axis.
    #[config(default = 1)]
    pub stride: usize,

    /// Whether the block's input is added back to its output.
    #[config(default = true)]
    pub residual: bool,
}

impl StBlnBlockConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> StBlnBlock<B> {
        let gcn = BilinearMappingConfig::new(
            self.in_channels,
            self.out_channels,
            self.graph_dim1,
            self.graph_dim2,
        )
        .init(device);
        let tcn = TemporalConvolutionConfig::new(self.out_channels, self.out_channels)
            .with_stride(self.stride)
            .init(device);

        let residual = self.residual.then(|| {
            // a changed joint count is projected away by spanning every input joint
            let kernel_size_joint = if self.graph_dim1 == self.graph_dim2 {
                1
            } else {
                self.graph_dim1
            };
            TemporalConvolutionConfig::new(self.in_channels, self.out_channels)
                .with_kernel_size_joint(kernel_size_joint)
                .with_stride(self.stride)
                .init(device)
        });

        StBlnBlock {
            gcn,
            tcn,
            residual,
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> StBlnBlock<B> {
    /// # Shapes
    ///   - Input [batch, in_channels, time, graph_dim1]
    ///   - Output [batch, out_channels, time / stride, graph_dim2]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let res = self.residual.as_ref().map(|residual| residual.forward(x.clone()));

        let x = self.tcn.forward(self.gcn.forward(x));
        let x = match res {
            Some(res) => {
                // [batch, out_channels, time, 1] when the joint count changes
                let res = if res.dims() == x.dims() {
                    res
                } else {
                    res.expand(x.shape())
                };
                x + res
            }
            None => x,
        };
        self.relu.forward(x)
    }
}
