//! Graph convolution over joints through learned dense adjacency matrices.
//!
//! The adjacency is not the physical skeleton: each subset is a fully-dense
//! `[graph_dim1, graph_dim2]` matrix learned by gradient descent, and the
//! subsets are aggregated by summation.

use crate::init::InitWeights;
use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, Relu};
use burn::prelude::*;

#[derive(Module, Debug)]
pub struct BilinearMapping<B: Backend> {
    /// Dims: [[`BilinearMappingConfig::num_subset`], [`BilinearMappingConfig::graph_dim1`], [`BilinearMappingConfig::graph_dim2`]].
    pub rand_graph: Param<Tensor<B, 3>>,

    /// One 1x1 convolution per subset.
    ///
    /// Input channel: [`BilinearMappingConfig::in_channels`].
    /// Output channel: [`BilinearMappingConfig::out_channels`].
    pub g_conv: Vec<Conv2d<B>>,

    /// Normalizes the summed subsets.
    pub bn: BatchNorm<B>,

    pub gcn_residual: GraphResidual<B>,

    pub relu: Relu,
}

#[derive(Config, Debug)]
pub struct BilinearMappingConfig {
    pub in_channels: usize,
    pub out_channels: usize,

    /// Input joint count.
    pub graph_dim1: usize,

    /// Output joint count.
    pub graph_dim2: usize,

    /// Number of independently-learned mixing matrices.
    #[config(default = 3)]
    pub num_subset: usize,
}

impl BilinearMappingConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BilinearMapping<B> {
        assert!(self.num_subset > 0);
        assert!(self.graph_dim1 > 0 && self.graph_dim2 > 0);

        let rand_graph = Initializer::Uniform { min: 0., max: 1. }.init::<B, 3, _>(
            [self.num_subset, self.graph_dim1, self.graph_dim2],
            device,
        );

        let g_conv = (0..self.num_subset)
            .map(|_| {
                Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                    .init(device)
                    .init_weights(self.num_subset as f64)
            })
            .collect();

        let gcn_residual = GraphResidualConfig::new(
            self.in_channels,
            self.out_channels,
            self.graph_dim1,
            self.graph_dim2,
        )
        .init(device);

        // near-zero scale, the mapping starts close to its residual path
        let bn = BatchNormConfig::new(self.out_channels)
            .init(device)
            .init_weights(1e-6);

        BilinearMapping {
            rand_graph,
            g_conv,
            bn,
            gcn_residual,
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> BilinearMapping<B> {
    pub fn num_subset(&self) -> usize {
        let [num_subset, _, _] = self.rand_graph.dims();
        num_subset
    }

    /// # Shapes
    ///   - Input [batch, in_channels, time, graph_dim1]
    ///   - Output [batch, out_channels, time, graph_dim2]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, in_channels, time, graph_dim1] = x.dims();

        // the adjacency follows the input's device on every call
        let rand_graph = self.rand_graph.val().to_device(&x.device());
        let [num_subset, graph_dim1_, graph_dim2] = rand_graph.dims();
        debug_assert_eq!(graph_dim1, graph_dim1_);

        let x_a = x.clone().reshape([batch, in_channels * time, graph_dim1]);
        let subset = |i: usize| {
            let a = rand_graph
                .clone()
                .narrow(0, i, 1)
                .expand([batch, graph_dim1, graph_dim2]);
            let z = x_a
                .clone()
                .matmul(a)
                .reshape([batch, in_channels, time, graph_dim2]);
            self.g_conv[i].forward(z)
        };

        let mut hidden = subset(0);
        for i in 1..num_subset {
            hidden = hidden + subset(i);
        }
        let [_, out_channels, _, _] = hidden.dims();
        debug_assert_eq!([batch, out_channels, time, graph_dim2], hidden.dims());

        let hidden = self.bn.forward(hidden) + self.gcn_residual.forward(x);
        self.relu.forward(hidden)
    }
}

/// Projection of the mapping's input onto its output shape.
///
/// When the joint count is kept this is a 1x1 convolution. Otherwise the
/// convolution spans every input joint and emits `out_channels * graph_dim2`
/// channels, which are then unfolded back into the joint axis.
#[derive(Module, Debug)]
pub struct GraphResidual<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub graph_dim1: usize,
    pub graph_dim2: usize,
}

#[derive(Config, Debug)]
pub struct GraphResidualConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub graph_dim1: usize,
    pub graph_dim2: usize,
}

impl GraphResidualConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> GraphResidual<B> {
        let bn = BatchNormConfig::new(self.out_channels).init(device);
        let (conv, bn) = if self.graph_dim1 == self.graph_dim2 {
            // 1x1 projection keeps burn's default init, bias included
            let conv =
                Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1]).init(device);
            (conv, bn)
        } else {
            let conv = Conv2dConfig::new(
                [self.in_channels, self.out_channels * self.graph_dim2],
                [1, self.graph_dim1],
            )
            .init(device)
            .init_weights(1.);
            (conv, bn.init_weights(1.))
        };

        GraphResidual {
            conv,
            bn,
            graph_dim1: self.graph_dim1,
            graph_dim2: self.graph_dim2,
        }
    }
}

impl<B: Backend> GraphResidual<B> {
    /// # Shapes
    ///   - Input [batch, in_channels, time, graph_dim1]
    ///   - Output [batch, out_channels, time, graph_dim2]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _in_channels, time, graph_dim1] = x.dims();
        debug_assert_eq!(graph_dim1, self.graph_dim1);

        let x = self.conv.forward(x);
        let x = if self.graph_dim1 == self.graph_dim2 {
            x
        } else {
            // [batch, out_channels * graph_dim2, time, 1]
            let [_, channels, _, _] = x.dims();
            let out_channels = channels / self.graph_dim2;
            x.reshape([batch, out_channels, self.graph_dim2, time])
                .swap_dims(2, 3)
        };
        self.bn.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn keeps_joint_count() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(2, 8, 51, 51).init::<TestBackend>(&device);

        let x = Tensor::random([2, 2, 30, 51], Distribution::Default, &device);
        assert_eq!(gcn.forward(x).dims(), [2, 8, 30, 51]);
    }

    #[test]
    fn outputs_graph_dim2_joints() {
        let device = Default::default();
        for (graph_dim1, graph_dim2) in [(5, 3), (3, 5)] {
            let gcn = BilinearMappingConfig::new(4, 6, graph_dim1, graph_dim2)
                .init::<TestBackend>(&device);

            let x = Tensor::random([2, 4, 10, graph_dim1], Distribution::Default, &device);
            assert_eq!(gcn.forward(x).dims(), [2, 6, 10, graph_dim2]);
        }
    }

    #[test]
    fn adjacency_is_uniform_unit() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(2, 4, 7, 7).init::<TestBackend>(&device);

        assert_eq!(gcn.num_subset(), 3);
        assert_eq!(gcn.g_conv.len(), 3);
        assert_eq!(gcn.rand_graph.dims(), [3, 7, 7]);
        let values = gcn.rand_graph.val().into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| (0. ..1.).contains(&v)));
    }

    #[test]
    fn subset_count_is_configurable() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(2, 4, 7, 7)
            .with_num_subset(1)
            .init::<TestBackend>(&device);
        assert_eq!(gcn.g_conv.len(), 1);

        let x = Tensor::random([1, 2, 5, 7], Distribution::Default, &device);
        assert_eq!(gcn.forward(x).dims(), [1, 4, 5, 7]);
    }

    #[test]
    fn output_is_non_negative() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(3, 4, 9, 9).init::<TestBackend>(&device);

        let x = Tensor::random([2, 3, 6, 9], Distribution::Normal(0., 1.), &device);
        let values = gcn.forward(x).into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| v >= 0.));
    }

    #[test]
    fn zero_input_passes_residual_bias() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(4, 8, 5, 5).init::<TestBackend>(&device);

        // the 1x1 residual keeps its default, generally nonzero, bias
        let bias = gcn
            .gcn_residual
            .conv
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(bias.iter().any(|&b| b != 0.));

        // zero input: the subsets and their norm vanish, leaving relu(bn(bias))
        let x = Tensor::zeros([2, 4, 3, 5], &device);
        let out = gcn.forward(x).into_data().to_vec::<f32>().unwrap();
        let scale = (1. + 1e-5f32).sqrt();
        for (i, got) in out.iter().enumerate() {
            let channel = (i / (3 * 5)) % 8;
            let expected = (bias[channel] / scale).max(0.);
            assert!((got - expected).abs() < 1e-6, "{got} != {expected}");
        }
    }

    #[test]
    fn changed_joint_count_reinitializes_residual() {
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(4, 8, 5, 3).init::<TestBackend>(&device);

        let bias = gcn.gcn_residual.conv.bias.as_ref().unwrap().val();
        assert_eq!(bias.dims(), [8 * 3]);
        let bias = bias.into_data().to_vec::<f32>().unwrap();
        assert!(bias.iter().all(|&b| b == 0.));
    }

    #[test]
    fn adjacency_receives_gradients() {
        type AutoBackend = Autodiff<TestBackend>;
        let device = Default::default();
        let gcn = BilinearMappingConfig::new(2, 4, 5, 5).init::<AutoBackend>(&device);

        let x = Tensor::random([3, 2, 6, 5], Distribution::Normal(0., 1.), &device);
        let grads = gcn.forward(x).powi_scalar(2).sum().backward();

        let grad = gcn.rand_graph.grad(&grads).expect("rand_graph is tracked");
        assert_eq!(grad.dims(), [3, 5, 5]);
    }
}
