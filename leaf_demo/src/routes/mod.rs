mod classify;
mod health;
mod index;

use crate::server::DemoState;
use axum::{
    routing::{get, post},
    Router,
};
use leaf_classifier::model_service::ModelService;

pub use classify::ClassifyError;

pub fn demo_routes<M: ModelService>() -> Router<DemoState<M>> {
    Router::new()
        .route("/", get(index::index))
        .route("/classify", post(classify::classify::<M>))
        .route("/health", get(health::healthcheck::<M>))
}
