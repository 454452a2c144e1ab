mod dataset;
mod error;
mod inference;
mod model;
mod preprocess;
mod server;
mod training;

pub use dataset::{Augmentation, AugmentationConfig, MnistBatch, MnistBatcher};
pub use inference::{load, predict, Prediction};
pub use model::{Model, ModelConfig};
pub use preprocess::{decode_image, to_input_tensor};
pub use server::{router, AppState, RecognizeRequest};
pub use training::{train, TrainingConfig};
