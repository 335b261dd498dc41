use crate::{
    config::RemoteModelConfig,
    model_service::{BackendStatus, ClassifierError, DownstreamStatus, ModelService},
    normalization::{InputScale, Normalization},
};
use async_trait::async_trait;
use ndarray::{Array, Axis, Ix4};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<[f32; 3]>>>,
}

impl PredictRequest {
    /// Row-major `[H][W][3]` nesting for each image in the batch.
    fn from_batch(input: &Array<f32, Ix4>) -> Self {
        let instances = input
            .axis_iter(Axis(0))
            .map(|image| {
                image
                    .axis_iter(Axis(0))
                    .map(|row| {
                        row.axis_iter(Axis(0))
                            .map(|px| [px[0], px[1], px[2]])
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Self { instances }
    }
}

/// Proxies inference to a TensorFlow Serving style REST endpoint.
#[derive(Clone)]
pub struct RemoteModelService {
    client: reqwest::Client,
    predict_url: String,
    status_url: String,
    probe_timeout: Duration,
    input_scale: InputScale,
}

impl RemoteModelService {
    pub fn new(
        remote_config: &RemoteModelConfig,
        normalization: Normalization,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(remote_config.timeout_ms))
            .build()?;

        let service = Self {
            client,
            predict_url: remote_config.get_predict_url(),
            status_url: remote_config.get_status_url(),
            probe_timeout: Duration::from_millis(remote_config.probe_timeout_ms),
            input_scale: normalization.resolve_remote(),
        };
        tracing::info!(
            "Proxying predictions to {}, input scale {:?}",
            service.predict_url,
            service.input_scale
        );

        Ok(service)
    }
}

fn parse_predictions(body: serde_json::Value) -> Result<Vec<f32>, ClassifierError> {
    let first = body
        .get("predictions")
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .cloned();

    let Some(first) = first else {
        return Err(ClassifierError::Upstream {
            message: "no predictions in model server response".to_string(),
            detail: body.to_string(),
        });
    };

    serde_json::from_value::<Vec<f32>>(first).map_err(|e| ClassifierError::Upstream {
        message: "malformed predictions in model server response".to_string(),
        detail: e.to_string(),
    })
}

#[async_trait]
impl ModelService for RemoteModelService {
    async fn classify(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let payload = PredictRequest::from_batch(&input);

        let response = self
            .client
            .post(&self.predict_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClassifierError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClassifierError::UpstreamUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(ClassifierError::Upstream {
                message: format!("model server returned {}", status.as_u16()),
                detail: text,
            });
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ClassifierError::Upstream {
                message: format!("model server returned invalid JSON: {}", e),
                detail: text.clone(),
            })?;

        parse_predictions(body)
    }

    fn input_scale(&self) -> InputScale {
        self.input_scale
    }

    async fn status(&self) -> BackendStatus {
        let probe = self
            .client
            .get(&self.status_url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        let downstream = match probe {
            Ok(response) => DownstreamStatus {
                url: self.status_url.clone(),
                reachable: response.status().is_success(),
                status_code: Some(response.status().as_u16()),
                detail: None,
            },
            Err(e) => {
                tracing::warn!("Model server probe failed: {}", e);
                DownstreamStatus {
                    url: self.status_url.clone(),
                    reachable: false,
                    status_code: None,
                    detail: Some(e.to_string()),
                }
            }
        };

        BackendStatus::Remote { downstream }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn serve_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1/models/potatoes_model", addr)
    }

    fn remote_config(base_url: String, timeout_ms: u64) -> RemoteModelConfig {
        RemoteModelConfig {
            base_url,
            timeout_ms,
            probe_timeout_ms: 500,
        }
    }

    fn service(base_url: String, timeout_ms: u64) -> RemoteModelService {
        RemoteModelService::new(&remote_config(base_url, timeout_ms), Normalization::Raw).unwrap()
    }

    #[test]
    fn test_payload_is_nested_hwc() {
        let mut input = Array::zeros((1, 2, 3, 3));
        input[[0, 1, 2, 0]] = 7.0;
        let payload = serde_json::to_value(PredictRequest::from_batch(&input)).unwrap();

        let image = &payload["instances"][0];
        assert_eq!(image.as_array().unwrap().len(), 2);
        assert_eq!(image[0].as_array().unwrap().len(), 3);
        assert_eq!(image[1][2], json!([7.0, 0.0, 0.0]));
    }

    #[test]
    fn test_parse_predictions() {
        let scores = parse_predictions(json!({"predictions": [[0.1, 0.2, 0.7]]})).unwrap();
        assert_eq!(scores, vec![0.1, 0.2, 0.7]);

        assert!(matches!(
            parse_predictions(json!({"outputs": []})),
            Err(ClassifierError::Upstream { .. })
        ));
        assert!(matches!(
            parse_predictions(json!({"predictions": []})),
            Err(ClassifierError::Upstream { .. })
        ));
        assert!(matches!(
            parse_predictions(json!({"predictions": [["a"]]})),
            Err(ClassifierError::Upstream { .. })
        ));
    }

    #[tokio::test]
    async fn test_classify_success() {
        let router = Router::new().route(
            "/v1/models/potatoes_model:predict",
            post(|Json(body): Json<serde_json::Value>| async move {
                let rows = body["instances"][0].as_array().map(|r| r.len()).unwrap_or(0);
                assert_eq!(rows, 4);
                Json(json!({"predictions": [[0.05, 0.05, 0.9]]}))
            }),
        );
        let base = serve_stub(router).await;

        let scores = service(base, 2_000)
            .classify(Array::zeros((1, 4, 4, 3)))
            .await
            .unwrap();
        assert_eq!(scores, vec![0.05, 0.05, 0.9]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let router = Router::new().route(
            "/v1/models/potatoes_model:predict",
            post(|| async { (StatusCode::BAD_REQUEST, "Servable not found") }),
        );
        let base = serve_stub(router).await;

        let err = service(base, 2_000)
            .classify(Array::zeros((1, 2, 2, 3)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClassifierError::Upstream {
                message: "model server returned 400".to_string(),
                detail: "Servable not found".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let svc = service(format!("http://{}/v1/models/m", addr), 2_000);
        let err = svc.classify(Array::zeros((1, 2, 2, 3))).await.unwrap_err();
        assert!(matches!(err, ClassifierError::UpstreamUnavailable(_)));

        match svc.status().await {
            BackendStatus::Remote { downstream } => {
                assert!(!downstream.reachable);
                assert!(downstream.detail.is_some());
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let router = Router::new().route(
            "/v1/models/potatoes_model:predict",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"predictions": [[1.0]]}))
            }),
        );
        let base = serve_stub(router).await;

        let start = Instant::now();
        let err = service(base, 200)
            .classify(Array::zeros((1, 2, 2, 3)))
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifierError::UpstreamUnavailable(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_status_probe_reachable() {
        let router = Router::new().route(
            "/v1/models/potatoes_model",
            get(|| async { Json(json!({"model_version_status": []})) }),
        );
        let base = serve_stub(router).await;

        match service(base.clone(), 2_000).status().await {
            BackendStatus::Remote { downstream } => {
                assert!(downstream.reachable);
                assert_eq!(downstream.status_code, Some(200));
                assert_eq!(downstream.url, base);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }
}
