use crate::{
    image_decoder::{decode_image, DecodeError},
    labels::ClassLabels,
    model_service::{BackendStatus, ClassifierError, ModelService},
    response::{map_scores, top_k, LabelScore, Prediction},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("model returned no usable scores")]
    EmptyPrediction,
}

/// Decode, normalize, classify and label one uploaded image. Built once at
/// startup and shared read-only across requests.
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
    labels: Arc<ClassLabels>,
    retry_alternate_normalization: bool,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            labels: self.labels.clone(),
            retry_alternate_normalization: self.retry_alternate_normalization,
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M, labels: ClassLabels) -> Self {
        Self {
            model_service: Arc::new(model_service),
            labels: Arc::new(labels),
            retry_alternate_normalization: false,
        }
    }

    pub fn with_alternate_normalization_retry(mut self, enabled: bool) -> Self {
        if enabled {
            tracing::warn!(
                "Alternate normalization retry enabled: failed predictions are retried \
                 with the opposite input scale and may return input-shifted results"
            );
        }
        self.retry_alternate_normalization = enabled;
        self
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn scores(&self, image_data: &[u8]) -> Result<Vec<f32>, InferenceError> {
        let raw = decode_image(image_data)?;
        let scale = self.model_service.input_scale();

        match self.model_service.classify(scale.apply(&raw)).await {
            Ok(scores) => Ok(scores),
            Err(err) if self.retry_alternate_normalization && err.is_input_dependent() => {
                let alternate = scale.alternate();
                tracing::warn!(
                    "Prediction failed with {:?} input ({}), retrying with {:?}",
                    scale,
                    err,
                    alternate
                );
                Ok(self.model_service.classify(alternate.apply(&raw)).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn predict(&self, image_data: &[u8]) -> Result<Prediction, InferenceError> {
        let scores = self.scores(image_data).await?;
        let prediction =
            map_scores(&scores, &self.labels).ok_or(InferenceError::EmptyPrediction)?;

        tracing::debug!(
            "Predicted {} with confidence {:.3}",
            prediction.class_label,
            prediction.confidence
        );
        Ok(prediction)
    }

    /// The `k` most likely labels with their scores.
    pub async fn rank(&self, image_data: &[u8], k: usize) -> Result<Vec<LabelScore>, InferenceError> {
        let scores = self.scores(image_data).await?;
        let ranked = top_k(&scores, &self.labels, k);
        if ranked.is_empty() {
            return Err(InferenceError::EmptyPrediction);
        }
        Ok(ranked)
    }

    pub async fn status(&self) -> BackendStatus {
        self.model_service.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_decoder::tests::encode;
    use crate::normalization::InputScale;
    use async_trait::async_trait;
    use image::ImageFormat;
    use ndarray::{Array, Ix4};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed scores, failing unless the input matches `accepts`.
    struct MockModelService {
        scores: Vec<f32>,
        scale: InputScale,
        accepts: Option<InputScale>,
        calls: AtomicUsize,
    }

    impl MockModelService {
        fn returning(scores: Vec<f32>) -> Self {
            Self {
                scores,
                scale: InputScale::Unit,
                accepts: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelService for MockModelService {
        async fn classify(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let max = input.iter().copied().fold(0.0_f32, f32::max);
            let seen = if max > 1.0 { InputScale::Raw } else { InputScale::Unit };
            match self.accepts {
                Some(expected) if expected != seen => Err(ClassifierError::Inference(format!(
                    "expected {:?} input",
                    expected
                ))),
                _ => Ok(self.scores.clone()),
            }
        }

        fn input_scale(&self) -> InputScale {
            self.scale
        }

        async fn status(&self) -> BackendStatus {
            BackendStatus::Local {
                model_loaded: true,
                detail: None,
            }
        }
    }

    fn leaf_jpeg() -> Vec<u8> {
        encode(512, 512, [30, 160, 40], ImageFormat::Jpeg)
    }

    #[tokio::test]
    async fn test_predict() {
        let service = InferenceService::new(
            MockModelService::returning(vec![0.05, 0.05, 0.90]),
            ClassLabels::default(),
        );

        let prediction = service.predict(&leaf_jpeg()).await.unwrap();
        assert_eq!(prediction.class_label, "Healthy");
        assert_eq!(prediction.confidence, 0.90);
    }

    #[tokio::test]
    async fn test_predict_is_idempotent() {
        let service = InferenceService::new(
            MockModelService::returning(vec![0.3, 0.6, 0.1]),
            ClassLabels::default(),
        );
        let image = leaf_jpeg();

        let first = service.predict(&image).await.unwrap();
        let second = service.predict(&image).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_decode_error_skips_model() {
        let service = InferenceService::new(
            MockModelService::returning(vec![1.0]),
            ClassLabels::default(),
        );

        let err = service.predict(b"%PDF-1.4 not an image").await.unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
        assert_eq!(service.model_service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_scores() {
        let service =
            InferenceService::new(MockModelService::returning(vec![]), ClassLabels::default());
        assert!(matches!(
            service.predict(&leaf_jpeg()).await,
            Err(InferenceError::EmptyPrediction)
        ));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let mut model = MockModelService::returning(vec![0.1, 0.8, 0.1]);
        model.accepts = Some(InputScale::Raw);
        let service = InferenceService::new(model, ClassLabels::default());

        let err = service.predict(&leaf_jpeg()).await.unwrap_err();
        assert!(matches!(
            err,
            InferenceError::Classifier(ClassifierError::Inference(_))
        ));
        assert_eq!(service.model_service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opt_in_retry_uses_alternate_scale() {
        let mut model = MockModelService::returning(vec![0.1, 0.8, 0.1]);
        model.accepts = Some(InputScale::Raw);
        let service = InferenceService::new(model, ClassLabels::default())
            .with_alternate_normalization_retry(true);

        let prediction = service.predict(&leaf_jpeg()).await.unwrap();
        assert_eq!(prediction.class_label, "Late Blight");
        assert_eq!(service.model_service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rank() {
        let service = InferenceService::new(
            MockModelService::returning(vec![0.2, 0.1, 0.7]),
            ClassLabels::default(),
        );

        let ranked = service.rank(&leaf_jpeg(), 3).await.unwrap();
        let labels: Vec<_> = ranked.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Healthy", "Early Blight", "Late Blight"]);
    }
}
