use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::AdamConfig,
};
use digit_recognition::{AugmentationConfig, ModelConfig, TrainingConfig};
use tokio::net::TcpListener;

type ServeBackend = Wgpu<f32, i32>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = tracing_subscriber::fmt::try_init() {
        eprintln!("logger already initialized: {err}");
    }
    dotenvy::dotenv().ok();

    let artifact_dir =
        dotenvy::var("DIGITS_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string());
    let port: u16 = dotenvy::var("DIGITS_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5000);

    let device = WgpuDevice::default();
    let model = match digit_recognition::load::<ServeBackend>(&artifact_dir, &device) {
        Ok(model) => {
            tracing::info!("loaded trained model from {artifact_dir}");
            model
        }
        Err(err) => {
            tracing::warn!("no usable model in {artifact_dir} ({err}), training a new one");
            digit_recognition::train::<Autodiff<ServeBackend>>(
                &artifact_dir,
                TrainingConfig::new(
                    ModelConfig::new(),
                    AdamConfig::new(),
                    AugmentationConfig::new(),
                ),
                device.clone(),
            );
            digit_recognition::load::<ServeBackend>(&artifact_dir, &device)?
        }
    };

    let app = digit_recognition::router(model, device);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
