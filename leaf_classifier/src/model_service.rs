use crate::normalization::InputScale;
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("model failed to load: {0}")]
    ModelUnavailable(String),
    #[error("model server unreachable: {0}")]
    UpstreamUnavailable(String),
    #[error("{message}")]
    Upstream { message: String, detail: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ClassifierError {
    /// Faults where the model ran and rejected or mangled the input. Only
    /// these are candidates for the alternate-normalization retry.
    pub fn is_input_dependent(&self) -> bool {
        matches!(
            self,
            ClassifierError::Upstream { .. } | ClassifierError::Inference(_)
        )
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DownstreamStatus {
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendStatus {
    Local {
        model_loaded: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Remote {
        downstream: DownstreamStatus,
    },
}

/// An inference backend: takes a preprocessed `[1, H, W, 3]` batch and
/// returns the class scores for its single image.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn classify(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError>;

    /// Value range this backend's model expects.
    fn input_scale(&self) -> InputScale;

    async fn status(&self) -> BackendStatus;
}
