use crate::{model_service::BackendStatus, model_service::ModelService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct Status {
    status: &'static str,
    message: &'static str,
    #[serde(flatten)]
    backend: BackendStatus,
}

#[instrument(skip(state))]
pub async fn ping<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Status> {
    state.metrics.record_request("/ping");

    Json(Status {
        status: "alive",
        message: "Hello, I am alive!",
        backend: state.inference_service.status().await,
    })
}
