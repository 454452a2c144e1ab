use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, routing::post, Json, Router};
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::AppError,
    inference::{predict, Prediction},
    preprocess, Model,
};

pub struct AppState<B: Backend> {
    pub model: Model<B>,
    pub device: B::Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeRequest {
    pub image: String,
}

pub fn router<B: Backend>(model: Model<B>, device: B::Device) -> Router {
    Router::new()
        .route("/recognize", post(recognize::<B>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(AppState { model, device }))
}

/// The body is parsed by hand so that malformed JSON takes the same
/// uniform error path as every other request failure.
async fn recognize<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    body: String,
) -> Result<Json<Prediction>, AppError> {
    let request: RecognizeRequest =
        serde_json::from_str(&body).context("invalid request payload")?;

    let image = preprocess::decode_image(&request.image)?;
    let input = preprocess::to_input_tensor::<B>(&image, &state.device)?;

    Ok(Json(predict(&state.model, input)))
}
