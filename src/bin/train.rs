use burn::{
    backend::{wgpu::WgpuDevice, Autodiff},
    optim::AdamConfig,
};
use digit_recognition::{AugmentationConfig, ModelConfig, TrainingConfig};

fn main() {
    type MyBackend = burn::backend::Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let device = WgpuDevice::default();

    dotenvy::dotenv().ok();
    let artifact_dir =
        dotenvy::var("DIGITS_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string());

    digit_recognition::train::<MyAutodiffBackend>(
        &artifact_dir,
        TrainingConfig::new(
            ModelConfig::new(),
            AdamConfig::new(),
            AugmentationConfig::new(),
        ),
        device.clone(),
    );
}
