use crate::{
    config::{Backend, Config},
    inference_service::InferenceService,
    labels::ClassLabels,
    model_service::ModelService,
    ort_service::OrtModelService,
    remote_service::RemoteModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};

pub struct SharedState<M: ModelService> {
    pub inference_service: InferenceService<M>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            inference_service: self.inference_service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Router with every endpoint mounted, without binding a listener.
pub fn build_router<M: ModelService>(
    inference_service: InferenceService<M>,
    metrics: Arc<Metrics>,
    max_upload_bytes: usize,
) -> Router {
    let app_state = SharedState {
        inference_service,
        metrics,
    };

    Router::new()
        .merge(api_routes())
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(HttpMetricsLayerBuilder::new().build())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        inference_service: InferenceService<M>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let metrics = Arc::new(Metrics::new()?);
        let router = build_router(inference_service, metrics, config.server.max_upload_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        Ok(())
    }
}

async fn serve<M: ModelService>(model_service: M, config: &Config) -> anyhow::Result<()> {
    let labels = ClassLabels::load(&config.labels).map_err(anyhow::Error::msg)?;
    let inference_service = InferenceService::new(model_service, labels)
        .with_alternate_normalization_retry(config.model.retry_alternate_normalization);

    HttpServer::new(inference_service, config).await?.run().await
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Serving with the {} backend", config.model.backend.as_str());

    match config.model.backend {
        Backend::Local => {
            let model_service =
                OrtModelService::load(&config.model.local, config.model.normalization);
            serve(model_service, &config).await
        }
        Backend::Remote => {
            let model_service =
                RemoteModelService::new(&config.model.remote, config.model.normalization)?;
            serve(model_service, &config).await
        }
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
