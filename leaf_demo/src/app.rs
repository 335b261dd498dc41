use crate::{config::Config, server::build_router, server::HttpServer};
use leaf_classifier::{
    inference_service::InferenceService, labels::ClassLabels, ort_service::OrtModelService,
};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let model_service = OrtModelService::load(&config.model.local, config.model.normalization);
    if let Some(e) = model_service.load_error() {
        tracing::error!("Failed to initialize model: {}", e);
        anyhow::bail!(
            "model file {:?} could not be loaded: {}",
            config.model.local.get_path(),
            e
        );
    }

    let labels = ClassLabels::load(&config.labels).map_err(anyhow::Error::msg)?;
    let inference_service = InferenceService::new(model_service, labels);

    let router = build_router(
        inference_service,
        config.top_k,
        config.server.max_upload_bytes,
    );
    HttpServer::new(router, &config.server).await?.run().await
}
