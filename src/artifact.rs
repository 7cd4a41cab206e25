//! Model artifact persistence
//!
//! A model artifact bundles everything inference needs: the fitted scaler, the
//! classifier weights and the anomaly detector. It is stored as one JSON
//! document and published atomically (temporary sibling file, fsync, rename)
//! so readers never observe a partially written model.

use crate::anomaly::IsolationForest;
use crate::classifier::Classifier;
use crate::error::QualityError;
use crate::normalizer::StandardScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Artifact format identifier
pub const ARTIFACT_FORMAT: &str = "gazeqc.model.v1";

/// Model id reported by the built-in untrained model
pub const UNTRAINED_MODEL_ID: &str = "untrained-default";

/// Persisted model state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Artifact format identifier
    pub format_version: String,
    /// Unique id of this training run
    pub model_id: String,
    /// When training finished (None for the built-in default)
    pub trained_at: Option<DateTime<Utc>>,
    /// Number of labeled records the model was fitted on
    pub training_samples: usize,
    pub scaler: StandardScaler,
    pub classifier: Classifier,
    /// Absent until the first training run
    pub anomaly_detector: Option<IsolationForest>,
}

impl Default for ModelArtifact {
    fn default() -> Self {
        Self::untrained()
    }
}

impl ModelArtifact {
    /// Default model used before any training: identity scaler, seeded
    /// classifier weights, no anomaly detector
    pub fn untrained() -> Self {
        Self {
            format_version: ARTIFACT_FORMAT.to_string(),
            model_id: UNTRAINED_MODEL_ID.to_string(),
            trained_at: None,
            training_samples: 0,
            scaler: StandardScaler::identity(),
            classifier: Classifier::default(),
            anomaly_detector: None,
        }
    }

    /// Bundle freshly fitted components under a new model id
    pub fn trained(
        scaler: StandardScaler,
        classifier: Classifier,
        anomaly_detector: IsolationForest,
        training_samples: usize,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT.to_string(),
            model_id: Uuid::new_v4().to_string(),
            trained_at: Some(Utc::now()),
            training_samples,
            scaler,
            classifier,
            anomaly_detector: Some(anomaly_detector),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained_at.is_some() && self.classifier.is_trained()
    }

    /// Check format version and component parameters
    pub fn validate(&self) -> Result<(), QualityError> {
        if self.format_version != ARTIFACT_FORMAT {
            return Err(QualityError::IncompatibleArtifact {
                expected: ARTIFACT_FORMAT.to_string(),
                actual: self.format_version.clone(),
            });
        }
        self.scaler.validate()?;
        self.classifier.validate()?;
        if let Some(detector) = &self.anomaly_detector {
            detector.validate()?;
        }
        Ok(())
    }

    /// Parse and validate an artifact from JSON
    pub fn from_json(json: &str) -> Result<Self, QualityError> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Serialize artifact to JSON
    pub fn to_json(&self) -> Result<String, QualityError> {
        serde_json::to_string_pretty(self).map_err(QualityError::JsonError)
    }

    /// Load and validate an artifact from disk
    pub fn load(path: &Path) -> Result<Self, QualityError> {
        let file = File::open(path)?;
        let artifact: Self = serde_json::from_reader(BufReader::new(file))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Write the artifact to `path`, replacing any previous artifact atomically
    pub fn save(&self, path: &Path) -> Result<(), QualityError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = StagingFile::new(path)?;
        {
            let file = File::create(&staging.path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            let file = writer
                .into_inner()
                .map_err(|e| QualityError::IoError(e.into_error()))?;
            file.sync_all()?;
        }
        staging.commit(path)
    }
}

/// Temporary sibling file removed on drop unless committed
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn new(destination: &Path) -> Result<Self, QualityError> {
        let file_name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                QualityError::ArtifactError(format!(
                    "invalid artifact path: {}",
                    destination.display()
                ))
            })?;
        let path = destination.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn commit(mut self, destination: &Path) -> Result<(), QualityError> {
        fs::rename(&self.path, destination)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_untrained_artifact_is_valid() {
        let artifact = ModelArtifact::untrained();
        assert!(artifact.validate().is_ok());
        assert!(!artifact.is_trained());
        assert_eq!(artifact.model_id, UNTRAINED_MODEL_ID);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("gaze_model.json");

        let artifact = ModelArtifact::untrained();
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_save_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gaze_model.json");

        ModelArtifact::untrained().save(&path).unwrap();
        ModelArtifact::untrained().save(&path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let mut artifact = ModelArtifact::untrained();
        artifact.format_version = "gazeqc.model.v0".to_string();
        let json = serde_json::to_string(&artifact).unwrap();

        let result = ModelArtifact::from_json(&json);
        assert!(matches!(result, Err(QualityError::IncompatibleArtifact { .. })));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gaze_model.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(QualityError::JsonError(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = ModelArtifact::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(QualityError::IoError(_))));
    }
}
