use crate::server::DemoState;
use axum::{extract::State, response::Json};
use leaf_classifier::model_service::{BackendStatus, ModelService};
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    status: String,
    #[serde(flatten)]
    backend: BackendStatus,
}

pub async fn healthcheck<M: ModelService>(State(state): State<DemoState<M>>) -> Json<Status> {
    Json(Status {
        status: "Available".into(),
        backend: state.inference_service.status().await,
    })
}
