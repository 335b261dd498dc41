use crate::config::LabelsConfig;
use std::{fs::File, io, path::Path};

pub const DEFAULT_CLASS_NAMES: [&str; 3] = ["Early Blight", "Late Blight", "Healthy"];

/// Ordered class names; index `i` names output `i` of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabels {
    class_names: Vec<String>,
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self {
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassLabels {
    pub fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }

    /// Loads the labels file if present, falling back to the defaults when it
    /// is absent. A present but malformed file is an error.
    pub fn load(labels_cfg: &LabelsConfig) -> Result<Self, String> {
        let path = labels_cfg.get_path();
        if !path.exists() {
            tracing::info!(
                "No labels file at {:?}, using default classes {:?}",
                path,
                DEFAULT_CLASS_NAMES
            );
            return Ok(Self::default());
        }

        let class_names =
            load_class_names(&path).map_err(|e| format!("Failed to load labels: {}", e))?;
        tracing::info!("Loaded {} class labels from {:?}", class_names.len(), path);
        Ok(Self { class_names })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.class_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_names.is_empty()
    }
}

pub fn load_class_names(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let class_names: Vec<String> = serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if class_names.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "labels file contains no class names",
        ));
    }

    Ok(class_names)
}
