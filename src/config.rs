//! Runtime configuration
//!
//! A `QualityConfig` is plain serde data: it can be built in code, loaded from a
//! JSON file, or left at its defaults. The model path may be overridden with the
//! `GAZEQC_MODEL_PATH` environment variable.

use crate::error::QualityError;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default artifact location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "models/gazeqc-model.json";

/// Environment variable overriding the artifact location
pub const MODEL_PATH_ENV: &str = "GAZEQC_MODEL_PATH";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub model_path: PathBuf,
    pub training: TrainingConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            training: TrainingConfig::default(),
        }
    }
}

impl QualityConfig {
    pub fn from_json(json: &str) -> Result<Self, QualityError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, QualityError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, QualityError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Artifact path after applying `GAZEQC_MODEL_PATH`
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path_with_override(std::env::var_os(MODEL_PATH_ENV).map(PathBuf::from))
    }

    fn model_path_with_override(&self, env_path: Option<PathBuf>) -> PathBuf {
        match env_path {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => self.model_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = QualityConfig::default();
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.training.min_samples, 10);
        assert_eq!(config.training.classifier.epochs, 50);
        assert_eq!(config.training.classifier.batch_size, 32);
        assert_eq!(config.training.anomaly.contamination, 0.1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = QualityConfig::from_json(
            r#"{"model_path": "/var/lib/gazeqc/model.json", "training": {"classifier": {"epochs": 5}}}"#,
        )
        .unwrap();
        assert_eq!(config.model_path, PathBuf::from("/var/lib/gazeqc/model.json"));
        assert_eq!(config.training.classifier.epochs, 5);
        assert_eq!(config.training.classifier.batch_size, 32);
        assert_eq!(config.training.min_samples, 10);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gazeqc.json");
        let mut config = QualityConfig::default();
        config.training.anomaly.trees = 25;
        fs::write(&path, config.to_json().unwrap()).unwrap();

        assert_eq!(QualityConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_model_path_override() {
        let config = QualityConfig::default();
        assert_eq!(
            config.model_path_with_override(Some(PathBuf::from("/tmp/m.json"))),
            PathBuf::from("/tmp/m.json")
        );
        assert_eq!(
            config.model_path_with_override(Some(PathBuf::new())),
            config.model_path
        );
        assert_eq!(config.model_path_with_override(None), config.model_path);
    }
}
