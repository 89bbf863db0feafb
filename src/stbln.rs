//! Spatial-temporal bilinear-mapping network for skeleton-based action recognition.
//!
//! The input skeleton sequence is normalized per (person, joint, coordinate),
//! passed through a stack of [`StBlnBlock`]s, averaged over time, joints and
//! persons, and classified by a final linear layer.

use crate::block::{StBlnBlock, StBlnBlockConfig};
use crate::error::{StblnError, StblnResult};
use crate::init::InitWeights;
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use tracing::{debug, trace};

#[derive(Module, Debug)]
pub struct Stbln<B: Backend> {
    /// Normalizes over `num_person * num_point * in_channels` features.
    pub data_bn: BatchNorm<B>,
    pub dropout: Dropout,
    pub blocks: Vec<StBlnBlock<B>>,
    /// Input channel: last entry of [`StblnConfig::channels`].
    /// Output channel: [`StblnConfig::num_class`].
    pub fc: Linear<B>,

    /// [`StblnConfig::in_channels`].
    pub in_channels: usize,
    /// [`StblnConfig::num_point`].
    pub num_point: usize,
    /// [`StblnConfig::num_person`].
    pub num_person: usize,
}

#[derive(Config, Debug)]
pub struct StblnConfig {
    /// Number of action classes.
    #[config(default = 6)]
    pub num_class: usize,

    /// Number of skeleton joints.
    #[config(default = 51)]
    pub num_point: usize,

    /// Number of persons per sample.
    #[config(default = 1)]
    pub num_person: usize,

    /// Number of coordinates per joint, e.g. 2 for (x, y).
    #[config(default = 2)]
    pub in_channels: usize,

    /// Dropout applied before every block.
    #[config(default = 0.2)]
    pub dropout: f64,

    /// Output width of each block, in order.
    ///
    /// The first block has no residual path since its input is the raw coordinates.
    #[config(default = "default_channels()")]
    pub channels: Vec<usize>,
}

pub fn default_channels() -> Vec<usize> {
    vec![8, 16, 16, 32, 32, 64, 64]
}

impl StblnConfig {
    pub fn validate(&self) -> StblnResult<()> {
        let sizes = [
            ("num_class", self.num_class),
            ("num_point", self.num_point),
            ("num_person", self.num_person),
            ("in_channels", self.in_channels),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(StblnError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.channels.is_empty() {
            return Err(StblnError::InvalidConfig(
                "at least one block is required".into(),
            ));
        }
        if let Some(i) = self.channels.iter().position(|&c| c == 0) {
            return Err(StblnError::InvalidConfig(format!(
                "block {i} has zero channels"
            )));
        }
        if !(0. ..1.).contains(&self.dropout) {
            return Err(StblnError::InvalidConfig(format!(
                "dropout {} is outside [0, 1)",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Returns the initialized model.
    ///
    /// Panics if the config fails [`Self::validate`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> Stbln<B> {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }

        let data_bn = BatchNormConfig::new(self.num_person * self.in_channels * self.num_point)
            .init(device)
            .init_weights(1.);

        let mut blocks = Vec::with_capacity(self.channels.len());
        let mut in_channels = self.in_channels;
        for (i, &out_channels) in self.channels.iter().enumerate() {
            let block = StBlnBlockConfig::new(in_channels, out_channels)
                .with_graph_dim1(self.num_point)
                .with_graph_dim2(self.num_point)
                .with_residual(i != 0)
                .init(device);
            blocks.push(block);
            in_channels = out_channels;
        }

        let fc = LinearConfig::new(in_channels, self.num_class)
            .init(device)
            .init_weights(self.num_class as f64);

        debug!(
            channels = ?self.channels,
            num_point = self.num_point,
            num_person = self.num_person,
            num_class = self.num_class,
            "initialized stbln"
        );

        Stbln {
            data_bn,
            dropout: DropoutConfig::new(self.dropout).init(),
            blocks,
            fc,
            in_channels: self.in_channels,
            num_point: self.num_point,
            num_person: self.num_person,
        }
    }
}

impl<B: Backend> Stbln<B> {
    pub fn num_class(&self) -> usize {
        let [_d_input, num_class] = self.fc.weight.dims();
        num_class
    }

    /// Checks a `[N, C, T, V, M]` input against the configured layout.
    pub fn check_input(&self, dims: &[usize; 5]) -> StblnResult<()> {
        let [batch, channels, time, joints, persons] = *dims;
        let fits = batch > 0
            && time > 0
            && channels == self.in_channels
            && joints == self.num_point
            && persons == self.num_person;
        if fits {
            Ok(())
        } else {
            Err(StblnError::InputShape {
                expected: format!(
                    "[N > 0, {}, T > 0, {}, {}]",
                    self.in_channels, self.num_point, self.num_person
                ),
                actual: *dims,
            })
        }
    }

    /// Returns raw class scores, no softmax is applied.
    ///
    /// # Shapes
    ///   - Input [batch, in_channels, time, num_point, num_person]
    ///   - Output [batch, num_class]
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 2> {
        let [batch, channels, time, joints, persons] = x.dims();

        // normalize each (person, joint, coordinate) across the batch
        let x = x
            .permute([0, 4, 3, 1, 2])
            .reshape([batch, persons * joints * channels, time]);
        let x = self.data_bn.forward(x);

        // persons are folded into the batch
        let mut x = x
            .reshape([batch, persons, joints, channels, time])
            .permute([0, 1, 3, 4, 2])
            .reshape([batch * persons, channels, time, joints]);

        for (i, block) in self.blocks.iter().enumerate() {
            x = self.dropout.forward(x);
            x = block.forward(x);
            trace!(block = i, dims = ?x.dims(), "block output");
        }

        let [_, channels, time, joints] = x.dims();
        let x = x
            .reshape([batch, persons, channels, time * joints])
            .mean_dim(3)
            .mean_dim(1)
            .reshape([batch, channels]);

        let x = self.fc.forward(x);
        debug_assert_eq!([batch, self.num_class()], x.dims());
        x
    }

    /// Index of the highest-scoring class for each sample.
    ///
    /// # Shapes
    ///   - Input [batch, in_channels, time, num_point, num_person]
    ///   - Output [batch]
    pub fn classify(&self, x: Tensor<B, 5>) -> Tensor<B, 1, Int> {
        let [batch, ..] = x.dims();
        self.forward(x).argmax(1).reshape([batch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn default_config() {
        let config = StblnConfig::new();
        assert_eq!(config.num_class, 6);
        assert_eq!(config.num_point, 51);
        assert_eq!(config.num_person, 1);
        assert_eq!(config.in_channels, 2);
        assert_eq!(config.channels, [8, 16, 16, 32, 32, 64, 64]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn builds_seven_blocks() {
        let device = Default::default();
        let model = StblnConfig::new().init::<TestBackend>(&device);

        assert_eq!(model.blocks.len(), 7);
        assert!(model.blocks[0].residual.is_none());
        assert!(model.blocks[1..].iter().all(|b| b.residual.is_some()));
        assert_eq!(model.data_bn.gamma.dims(), [51 * 2]);
        assert_eq!(model.fc.weight.dims(), [64, 6]);
        assert_eq!(model.num_class(), 6);
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = [
            StblnConfig::new().with_num_class(0),
            StblnConfig::new().with_num_point(0),
            StblnConfig::new().with_channels(vec![]),
            StblnConfig::new().with_channels(vec![8, 0]),
            StblnConfig::new().with_dropout(1.),
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(StblnError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn checks_input_layout() {
        let device = Default::default();
        let model = StblnConfig::new()
            .with_num_point(5)
            .with_channels(vec![4])
            .init::<TestBackend>(&device);

        assert_eq!(model.check_input(&[3, 2, 10, 5, 1]), Ok(()));
        for dims in [[3, 3, 10, 5, 1], [3, 2, 10, 6, 1], [3, 2, 10, 5, 2], [0, 2, 10, 5, 1]] {
            assert!(matches!(
                model.check_input(&dims),
                Err(StblnError::InputShape { actual, .. }) if actual == dims
            ));
        }
    }

    #[test]
    fn classifies_batch() {
        let device = Default::default();
        let model = StblnConfig::new().init::<TestBackend>(&device);

        let x = Tensor::random([3, 2, 16, 51, 1], Distribution::Default, &device);
        assert_eq!(model.forward(x.clone()).dims(), [3, 6]);

        let classes = model
            .classify(x)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(classes.len(), 3);
        assert!(classes.iter().all(|&c| (0..6).contains(&c)));
    }

    #[test]
    fn folds_persons_into_batch() {
        let device = Default::default();
        let model = StblnConfig::new()
            .with_num_point(9)
            .with_num_person(2)
            .with_in_channels(3)
            .with_num_class(4)
            .with_channels(vec![8, 8, 16])
            .init::<TestBackend>(&device);

        let x = Tensor::random([2, 3, 12, 9, 2], Distribution::Default, &device);
        assert_eq!(model.forward(x).dims(), [2, 4]);
    }
}
