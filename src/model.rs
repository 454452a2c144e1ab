use burn::{
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use nn::{
    conv::{Conv2d, Conv2dConfig},
    loss::CrossEntropyLossConfig,
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu,
};

use crate::dataset::MnistBatch;

pub const NUM_CLASSES: usize = 10;

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    pool: MaxPool2d,
    conv_dropout: Dropout,
    dense_dropout: Dropout,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = "128")]
    hidden_size: usize,
    #[config(default = "0.25")]
    conv_dropout: f64,
    #[config(default = "0.5")]
    dense_dropout: f64,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            conv1: Conv2dConfig::new([1, 32], [3, 3]).init(device),
            norm1: BatchNormConfig::new(32).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            norm2: BatchNormConfig::new(64).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv_dropout: DropoutConfig::new(self.conv_dropout).init(),
            dense_dropout: DropoutConfig::new(self.dense_dropout).init(),
            linear1: LinearConfig::new(64 * 5 * 5, self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, NUM_CLASSES).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// Forward pass for digit classification.
    /// # Inputs:
    ///   - `images` [batch_size, 1, 28, 28]
    /// # Outputs:
    ///   - Class logits [batch_size, 10]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // First convolutional stage.
        let x = self.conv1.forward(images); // [batch_size, 32, 26, 26]
        let x = self.norm1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, 32, 13, 13]
        let x = self.conv_dropout.forward(x);

        // Second convolutional stage.
        let x = self.conv2.forward(x); // [batch_size, 64, 11, 11]
        let x = self.norm2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, 64, 5, 5]
        let x = self.conv_dropout.forward(x);

        let batch_size = x.dims()[0];
        let x = x.reshape([batch_size, 64 * 5 * 5]);

        // Fully connected head.
        let x = self.linear1.forward(x); // [batch_size, hidden_size]
        let x = self.activation.forward(x);
        let x = self.dense_dropout.forward(x);

        self.linear2.forward(x) // [batch_size, 10]
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<MnistBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: MnistBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<MnistBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn forward_emits_one_logit_per_class() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 28, 28], &device);
        let output = model.forward(images);

        assert_eq!(output.dims(), [3, NUM_CLASSES]);
    }

    #[test]
    fn forward_handles_single_image_batches() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let output = model.forward(images);

        assert_eq!(output.dims(), [1, NUM_CLASSES]);
        let data = output.into_data();
        let logits = data.as_slice::<f32>().unwrap();
        assert!(logits.iter().all(|logit| logit.is_finite()));
    }
}
