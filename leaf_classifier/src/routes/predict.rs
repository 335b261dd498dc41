use crate::{
    inference_service::InferenceError,
    model_service::{ClassifierError, ModelService},
    response::Prediction,
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("Invalid multipart upload: {detail}")]
    Multipart { status: StatusCode, detail: String },
    #[error("Missing `file` field in upload")]
    MissingFile,
    #[error("Uploaded file is not an image: {0}")]
    InvalidContentType(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictImageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictImageError::Multipart { status, .. } => *status,
            PredictImageError::MissingFile
            | PredictImageError::InvalidContentType(_)
            | PredictImageError::Inference(InferenceError::Decode(_)) => StatusCode::BAD_REQUEST,
            PredictImageError::Inference(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PredictImageError::Multipart { .. } | PredictImageError::MissingFile => "upload",
            PredictImageError::InvalidContentType(_) => "content_type",
            PredictImageError::Inference(InferenceError::Decode(_)) => "decode",
            PredictImageError::Inference(InferenceError::EmptyPrediction) => "empty_prediction",
            PredictImageError::Inference(InferenceError::Classifier(err)) => match err {
                ClassifierError::ModelUnavailable(_) => "model_unavailable",
                ClassifierError::UpstreamUnavailable(_) => "upstream_unavailable",
                ClassifierError::Upstream { .. } => "upstream",
                ClassifierError::Inference(_) => "inference",
            },
        }
    }

    fn body(&self) -> serde_json::Value {
        let (error, detail) = match self {
            PredictImageError::Inference(InferenceError::Decode(e)) => {
                ("invalid image".to_string(), e.to_string())
            }
            PredictImageError::Inference(InferenceError::Classifier(err)) => match err {
                ClassifierError::ModelUnavailable(detail) => {
                    ("model failed to load".to_string(), detail.clone())
                }
                ClassifierError::UpstreamUnavailable(detail) => {
                    ("model server unreachable".to_string(), detail.clone())
                }
                ClassifierError::Upstream { message, detail } => (message.clone(), detail.clone()),
                ClassifierError::Inference(detail) => ("inference failed".to_string(), detail.clone()),
            },
            other => {
                let reason = other.status_code().canonical_reason().unwrap_or("Bad Request");
                (reason.to_lowercase(), other.to_string())
            }
        };
        json!({ "error": error, "detail": detail })
    }
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::info!("Rejected upload: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<MultipartError> for PredictImageError {
    // Keeps 413 for uploads over the body limit.
    fn from(e: MultipartError) -> Self {
        PredictImageError::Multipart {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl From<MultipartRejection> for PredictImageError {
    fn from(e: MultipartRejection) -> Self {
        PredictImageError::Multipart {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, PredictImageError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(PredictImageError::InvalidContentType(content_type));
        }

        let data = field.bytes().await?;
        return Ok(data.to_vec());
    }

    Err(PredictImageError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, PredictImageError> {
    state.metrics.record_request("/predict");
    let start = Instant::now();

    let result: Result<Prediction, PredictImageError> = async {
        let multipart = multipart?;
        let image_data = read_image_field(multipart).await?;
        Ok::<_, PredictImageError>(state.inference_service.predict(&image_data).await?)
    }
    .await;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, "/predict");

    match result {
        Ok(prediction) => Ok(Json(prediction)),
        Err(err) => {
            state.metrics.record_prediction_failure(err.kind());
            Err(err)
        }
    }
}
