use crate::{
    config::LocalModelConfig,
    model_service::{BackendStatus, ClassifierError, ModelService},
    normalization::{InputScale, Normalization},
};
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

struct SessionPool {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
}

impl SessionPool {
    fn load(model_config: &LocalModelConfig) -> Result<Self, String> {
        if model_config.num_instances == 0 {
            return Err("model.local.num_instances must be at least 1".to_string());
        }

        let sessions = (0..model_config.num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ClassifierError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("failed to extract tensor: {}", e)))?;

        let array = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ClassifierError::Inference(format!("invalid tensor shape: {}", e)))?;

        // Output is `[1, num_classes]`; keep the single row.
        let num_classes = array.shape().last().copied().unwrap_or(0);
        Ok(array.iter().take(num_classes).copied().collect())
    }
}

/// In-process ONNX Runtime backend. A model that failed to load leaves the
/// service in a degraded state instead of aborting startup.
#[derive(Clone)]
pub struct OrtModelService {
    pool: Result<Arc<SessionPool>, String>,
    input_scale: InputScale,
}

impl OrtModelService {
    pub fn load(model_config: &LocalModelConfig, normalization: Normalization) -> Self {
        let path = model_config.get_path();
        let input_scale = normalization.resolve_local(&path);

        let pool = match SessionPool::load(model_config) {
            Ok(pool) => {
                tracing::info!(
                    "Created {} ONNX sessions from {:?}, input scale {:?}",
                    pool.sessions.len(),
                    path,
                    input_scale
                );
                Ok(Arc::new(pool))
            }
            Err(e) => {
                tracing::error!("Failed to load model {:?}: {}", path, e);
                Err(e)
            }
        };

        Self { pool, input_scale }
    }

    pub fn is_loaded(&self) -> bool {
        self.pool.is_ok()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.pool.as_ref().err().map(String::as_str)
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn classify(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let pool = match &self.pool {
            Ok(pool) => pool.clone(),
            Err(e) => return Err(ClassifierError::ModelUnavailable(e.clone())),
        };

        tokio::task::spawn_blocking(move || pool.run_inference(&input))
            .await
            .map_err(|e| ClassifierError::Inference(format!("inference task failed: {}", e)))?
    }

    fn input_scale(&self) -> InputScale {
        self.input_scale
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus::Local {
            model_loaded: self.is_loaded(),
            detail: self.load_error().map(str::to_string),
        }
    }
}
