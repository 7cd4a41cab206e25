//! Pipeline orchestration
//!
//! This module provides the inference entry point. A [`Predictor`] owns a
//! loaded [`ModelArtifact`] and runs one test record through the full pipeline:
//!
//! 1. FeatureExtractor - Derive the 8-feature vector
//! 2. StandardScaler - Apply the scaler fitted at training time
//! 3. Classifier / AnomalyDetector - Scored independently
//! 4. EvaluationComposer - Narrative and follow-up flag
//!
//! The artifact is shared read-only behind an `Arc`, so a `Predictor` can be
//! cloned into worker threads and used concurrently without locking.

use crate::artifact::ModelArtifact;
use crate::error::QualityError;
use crate::evaluation::EvaluationComposer;
use crate::features::FeatureExtractor;
use crate::schema::RawRecordAdapter;
use crate::scoring::ConsistencyScorer;
use crate::types::{
    Availability, ComponentStatus, PredictionResult, QualityCategory, TestRecord,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inference handle over a loaded model artifact
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: Arc<ModelArtifact>,
    extractor: FeatureExtractor,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(ModelArtifact::untrained())
    }
}

impl Predictor {
    /// Wrap an already loaded artifact
    pub fn new(artifact: ModelArtifact) -> Self {
        Self::from_shared(Arc::new(artifact))
    }

    /// Share an artifact with other predictors
    pub fn from_shared(artifact: Arc<ModelArtifact>) -> Self {
        Self {
            artifact,
            extractor: FeatureExtractor::new(),
        }
    }

    /// Use a custom feature extractor (e.g. a device-specific stability scale)
    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Load an artifact, failing if it is missing or corrupt
    pub fn load(path: &Path) -> Result<Self, QualityError> {
        let artifact = ModelArtifact::load(path)?;
        info!(
            path = %path.display(),
            model_id = %artifact.model_id,
            "loaded model artifact"
        );
        Ok(Self::new(artifact))
    }

    /// Load an artifact, falling back to the untrained default model when it
    /// is missing or cannot be read
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(predictor) => predictor,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "model artifact unavailable, using default model"
                );
                Self::default()
            }
        }
    }

    /// Replace the artifact with the one at `path`; on failure the current
    /// artifact stays in place
    pub fn reload(&mut self, path: &Path) -> Result<(), QualityError> {
        let artifact = ModelArtifact::load(path)?;
        info!(
            previous = %self.artifact.model_id,
            current = %artifact.model_id,
            "reloaded model artifact"
        );
        self.artifact = Arc::new(artifact);
        Ok(())
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn shared_artifact(&self) -> Arc<ModelArtifact> {
        Arc::clone(&self.artifact)
    }

    /// Write the current artifact to `destination` (atomic, like training)
    pub fn export(&self, destination: &Path) -> Result<(), QualityError> {
        self.artifact.save(destination)?;
        info!(
            model_id = %self.artifact.model_id,
            destination = %destination.display(),
            "exported model artifact"
        );
        Ok(())
    }

    /// Run one test record through the pipeline
    pub fn predict(&self, record: &TestRecord) -> PredictionResult {
        let features = self.extractor.extract(record);
        let scaled = self.artifact.scaler.transform(&features);

        let (result, confidence, classifier_status) =
            match self.artifact.classifier.predict(&scaled) {
                Ok((category, confidence)) => (category, confidence, Availability::Available),
                Err(e) => {
                    warn!(error = %e, "classifier unavailable, reporting poor");
                    (
                        QualityCategory::Poor,
                        0.0,
                        Availability::Unavailable {
                            reason: e.to_string(),
                        },
                    )
                }
            };

        let (anomaly_detected, anomaly_score, anomaly_status) =
            match &self.artifact.anomaly_detector {
                Some(detector) => {
                    let score = detector.score(&scaled);
                    if score.is_finite() {
                        (score < 0.0, score, Availability::Available)
                    } else {
                        (
                            false,
                            0.0,
                            Availability::Unavailable {
                                reason: "anomaly score is not finite".to_string(),
                            },
                        )
                    }
                }
                None => (
                    false,
                    0.0,
                    Availability::Unavailable {
                        reason: "anomaly detector has not been trained".to_string(),
                    },
                ),
            };

        let tracking_percentage = features.tracking_percentage().clamp(0.0, 100.0);
        let gaze_stability = features.gaze_stability();
        let gaze_consistency = ConsistencyScorer::score(&record.gaze_history);

        let clinical_evaluation =
            EvaluationComposer::compose(tracking_percentage, gaze_stability, record.fixation_count);

        debug!(
            model_id = %self.artifact.model_id,
            result = %result,
            confidence,
            anomaly_score,
            "prediction complete"
        );

        PredictionResult {
            result,
            confidence,
            features: features.reported_features(),
            anomaly_detected,
            anomaly_score,
            tracking_percentage,
            gaze_stability,
            gaze_consistency,
            clinical_evaluation,
            recommended_follow_up: result.requires_follow_up(),
            components: ComponentStatus {
                classifier: classifier_status,
                anomaly_detector: anomaly_status,
            },
            model_id: self.artifact.model_id.clone(),
        }
    }

    /// Parse a stored record JSON and predict
    pub fn predict_json(&self, json: &str) -> Result<PredictionResult, QualityError> {
        let raw = RawRecordAdapter::parse_record(json)?;
        let record = RawRecordAdapter::to_test_record(&raw)?;
        Ok(self.predict(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{IsolationForest, IsolationForestConfig};
    use crate::classifier::Classifier;
    use crate::types::GazeSample;
    use pretty_assertions::assert_eq;
    use std::thread;
    use tempfile::TempDir;

    fn scenario_a() -> TestRecord {
        TestRecord {
            duration: 10.0,
            gaze_time: 8.0,
            fixation_count: 4,
            left_eye_open: true,
            right_eye_open: true,
            gaze_history: Vec::new(),
        }
    }

    #[test]
    fn test_scenario_a_untrained_model() {
        let prediction = Predictor::default().predict(&scenario_a());

        assert!((prediction.tracking_percentage - 80.0).abs() < 1e-9);
        assert!((prediction.features["avg_fixation"] - 2.0).abs() < 1e-9);
        assert_eq!(prediction.gaze_stability, 0.5);
        assert_eq!(prediction.gaze_consistency, 0.5);
        assert!(prediction
            .clinical_evaluation
            .to_lowercase()
            .contains("excellent tracking"));
        assert!((0.0..=1.0).contains(&prediction.confidence));
        assert!(prediction.components.classifier.is_available());
        assert!(!prediction.components.anomaly_detector.is_available());
        assert!(!prediction.anomaly_detected);
    }

    #[test]
    fn test_follow_up_matches_result() {
        let predictor = Predictor::default();
        let records = [
            scenario_a(),
            TestRecord::default(),
            TestRecord {
                duration: 30.0,
                gaze_time: 12.0,
                fixation_count: 11,
                ..Default::default()
            },
        ];
        for record in &records {
            let prediction = predictor.predict(record);
            assert_eq!(
                prediction.recommended_follow_up,
                matches!(
                    prediction.result,
                    QualityCategory::Poor | QualityCategory::Acceptable
                )
            );
        }
    }

    #[test]
    fn test_zero_duration_record() {
        let prediction = Predictor::default().predict(&TestRecord::default());
        assert_eq!(prediction.tracking_percentage, 0.0);
        assert!(prediction
            .clinical_evaluation
            .contains("Poor tracking"));
    }

    #[test]
    fn test_load_or_default_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let predictor = Predictor::load_or_default(&dir.path().join("missing.json"));
        assert!(!predictor.artifact().is_trained());
        assert!(Predictor::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_load_or_default_corrupt_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "[]").unwrap();
        let predictor = Predictor::load_or_default(&path);
        assert_eq!(predictor.artifact().model_id, ModelArtifact::untrained().model_id);
    }

    #[test]
    fn test_reload_keeps_current_on_failure() {
        let dir = TempDir::new().unwrap();
        let mut predictor = Predictor::default();
        assert!(predictor.reload(&dir.path().join("missing.json")).is_err());
        assert_eq!(predictor.artifact(), &ModelArtifact::untrained());
    }

    #[test]
    fn test_concurrent_predictions_agree() {
        let predictor = Predictor::default();
        let mut record = scenario_a();
        record.gaze_history = (0..40)
            .map(|i| GazeSample::new(200.0 + i as f64, 150.0, i % 5 != 0, i as f64 * 16.0))
            .collect();

        let expected = predictor.predict(&record);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let predictor = predictor.clone();
                let record = record.clone();
                thread::spawn(move || predictor.predict(&record))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    fn fitted_detector() -> IsolationForest {
        let samples: Vec<[f64; 8]> = (0..30)
            .map(|i| {
                let t = i as f64 * 0.1;
                [t, -t, 0.5 * t, 1.0, 1.0, 0.2, t, t]
            })
            .collect();
        IsolationForest::fit(&samples, IsolationForestConfig::default()).unwrap()
    }

    #[test]
    fn test_failing_classifier_degrades_to_poor() {
        let artifact = ModelArtifact {
            classifier: Classifier::default().with_corrupt_output_layer(),
            anomaly_detector: Some(fitted_detector()),
            ..ModelArtifact::untrained()
        };
        let prediction = Predictor::new(artifact).predict(&scenario_a());

        assert_eq!(prediction.result, QualityCategory::Poor);
        assert_eq!(prediction.confidence, 0.0);
        assert!(prediction.recommended_follow_up);
        assert!(matches!(
            prediction.components.classifier,
            Availability::Unavailable { .. }
        ));

        // Anomaly output is still reported
        assert!(prediction.components.anomaly_detector.is_available());
        assert!(prediction.anomaly_score.is_finite());
        assert!((prediction.tracking_percentage - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_failing_anomaly_detector_keeps_classification() {
        let healthy = Predictor::default().predict(&scenario_a());
        let artifact = ModelArtifact {
            anomaly_detector: Some(fitted_detector().with_offset(f64::NAN)),
            ..ModelArtifact::untrained()
        };
        let prediction = Predictor::new(artifact).predict(&scenario_a());

        assert!(!prediction.anomaly_detected);
        assert_eq!(prediction.anomaly_score, 0.0);
        assert!(matches!(
            prediction.components.anomaly_detector,
            Availability::Unavailable { .. }
        ));

        assert!(prediction.components.classifier.is_available());
        assert_eq!(prediction.result, healthy.result);
        assert_eq!(prediction.confidence, healthy.confidence);
    }

    #[test]
    fn test_export_writes_loadable_copy() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("model.json");
        let exported = dir.path().join("exports").join("model-copy.json");

        let artifact = ModelArtifact {
            anomaly_detector: Some(fitted_detector()),
            ..ModelArtifact::untrained()
        };
        artifact.save(&source).unwrap();

        let predictor = Predictor::load(&source).unwrap();
        predictor.export(&exported).unwrap();

        let copy = Predictor::load(&exported).unwrap();
        assert_eq!(copy.artifact(), predictor.artifact());
        assert_eq!(copy.predict(&scenario_a()), predictor.predict(&scenario_a()));
    }

    #[test]
    fn test_predict_json_rejects_bad_telemetry() {
        let predictor = Predictor::default();
        let result = predictor.predict_json(
            r#"{"duration": 10, "raw_data": {"gazeHistory": [{"x": null, "y": 1, "onTarget": true}]}}"#,
        );
        assert!(matches!(result, Err(QualityError::InvalidInput(_))));
    }
}
