use leaf_classifier::{
    config::{
        configuration_sources, LabelsConfig, LocalModelConfig, LogLevel, ServerConfig,
        Validatable,
    },
    normalization::Normalization,
};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: DemoModelConfig,
    pub labels: LabelsConfig,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

fn default_top_k() -> usize {
    3
}

/// The demo only runs the model in-process.
#[derive(Debug, Deserialize, Clone)]
pub struct DemoModelConfig {
    #[serde(default)]
    pub normalization: Normalization,
    pub local: LocalModelConfig,
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }
        self.model.local.validate()
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let config = configuration_sources("DEMO")?.build()?;
    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn demo_config(num_instances: usize, top_k: usize) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_upload_bytes: 1024,
            },
            log_level: LogLevel::Info,
            model: DemoModelConfig {
                normalization: Normalization::Auto,
                local: LocalModelConfig {
                    onnx_file: "model.onnx".to_string(),
                    model_dir: PathBuf::from("models"),
                    num_instances,
                },
            },
            labels: LabelsConfig {
                labels_file: "class_names.json".to_string(),
                labels_dir: PathBuf::from("models"),
            },
            top_k,
        }
    }

    #[test]
    fn test_validation() {
        assert!(demo_config(1, 3).validate().is_ok());
        assert!(demo_config(1, 0).validate().is_err());
        assert!(demo_config(0, 3)
            .validate()
            .is_err_and(|e| e.contains("num_instances")));
    }
}
