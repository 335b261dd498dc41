use crate::server::DemoState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use leaf_classifier::{
    inference_service::InferenceError, model_service::ModelService, response::LabelScore,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Expected an image upload, got content type `{0}`")]
    NotAnImage(String),
    #[error("Classification failed: {0}")]
    Inference(#[from] InferenceError),
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = match self {
            ClassifyError::NotAnImage(_) => StatusCode::BAD_REQUEST,
            ClassifyError::Inference(InferenceError::Decode(_)) => StatusCode::BAD_REQUEST,
            ClassifyError::Inference(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct LabelMap {
    label: String,
    confidences: Vec<LabelScore>,
}

#[instrument(skip(state, headers, image_data), fields(bytes = image_data.len()))]
pub async fn classify<M: ModelService>(
    State(state): State<DemoState<M>>,
    headers: HeaderMap,
    image_data: Bytes,
) -> Result<Json<LabelMap>, ClassifyError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(ClassifyError::NotAnImage(content_type.to_string()));
    }

    let confidences = state
        .inference_service
        .rank(&image_data, state.top_k)
        .await?;

    Ok(Json(LabelMap {
        label: confidences[0].label.clone(),
        confidences,
    }))
}
