use crate::routes::demo_routes;
use axum::{extract::DefaultBodyLimit, Router};
use leaf_classifier::{
    config::ServerConfig, inference_service::InferenceService, model_service::ModelService,
    server::shutdown_signal,
};
use tokio::net::TcpListener;

pub struct DemoState<M: ModelService> {
    pub inference_service: InferenceService<M>,
    pub top_k: usize,
}

impl<M: ModelService> Clone for DemoState<M> {
    fn clone(&self) -> Self {
        Self {
            inference_service: self.inference_service.clone(),
            top_k: self.top_k,
        }
    }
}

pub fn build_router<M: ModelService>(
    inference_service: InferenceService<M>,
    top_k: usize,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .merge(demo_routes())
        .with_state(DemoState {
            inference_service,
            top_k,
        })
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(router: Router, config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.get_address()).await?;
        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Demo available on http://{}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown.");
            })
            .await?;

        Ok(())
    }
}
