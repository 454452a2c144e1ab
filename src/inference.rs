use anyhow::Context;
use burn::{
    config::Config,
    module::Module,
    prelude::Backend,
    record::{CompactRecorder, Recorder},
    tensor::{activation::softmax, ElementConversion, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::{Model, TrainingConfig};

/// Top class and its probability for a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub digit: u8,
    pub confidence: f32,
}

/// Restore a trained model from the artifact directory.
///
/// Failing to load is recoverable: the caller falls back to training a
/// fresh model.
pub fn load<B: Backend>(artifact_dir: &str, device: &B::Device) -> anyhow::Result<Model<B>> {
    let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
        .context("training config not found")?;
    let record = CompactRecorder::new()
        .load(format!("{artifact_dir}/model").into(), device)
        .context("trained model weights not found")?;

    Ok(config.model.init(device).load_record(record))
}

pub fn predict<B: Backend>(model: &Model<B>, input: Tensor<B, 4>) -> Prediction {
    let output = model.forward(input);
    let probabilities = softmax(output, 1);

    let digit = probabilities
        .clone()
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_scalar()
        .elem::<i64>() as u8;
    let confidence = probabilities.max().into_scalar().elem::<f32>();

    Prediction { digit, confidence }
}
