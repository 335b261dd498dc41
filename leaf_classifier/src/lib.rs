mod routes;
mod telemetry;

pub mod config;
pub mod image_decoder;
pub mod inference_service;
pub mod labels;
pub mod model_service;
pub mod normalization;
pub mod ort_service;
pub mod remote_service;
pub mod response;
pub mod server;

pub use routes::PredictImageError;
pub use server::start_server;
pub use telemetry::Metrics;
