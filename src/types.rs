//! Core types for the gazeqc pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: test records, feature vectors, quality categories and the final
//! prediction result.

use crate::error::QualityError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of features produced for every test record
pub const FEATURE_COUNT: usize = 8;

/// Feature names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "tracking_percentage",
    "fixation_count",
    "avg_fixation",
    "left_eye_open",
    "right_eye_open",
    "gaze_stability",
    "duration",
    "gaze_time",
];

/// Number of leading features reported back in `PredictionResult::features`
const REPORTED_FEATURES: usize = 6;

/// A single gaze point captured during a test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Horizontal screen coordinate
    pub x: f64,
    /// Vertical screen coordinate
    pub y: f64,
    /// Whether the gaze landed on the moving target
    pub on_target: bool,
    /// Capture time (milliseconds since test start)
    pub timestamp_ms: f64,
}

impl GazeSample {
    pub fn new(x: f64, y: f64, on_target: bool, timestamp_ms: f64) -> Self {
        Self {
            x,
            y,
            on_target,
            timestamp_ms,
        }
    }
}

/// One clinical gaze-tracking test session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Total test duration (seconds)
    pub duration: f64,
    /// Time the gaze was on target (seconds)
    pub gaze_time: f64,
    /// Number of discrete fixations
    pub fixation_count: u32,
    /// Left eye detected open
    pub left_eye_open: bool,
    /// Right eye detected open
    pub right_eye_open: bool,
    /// Time-ascending gaze samples, may be empty
    pub gaze_history: Vec<GazeSample>,
}

/// Fixed-length feature vector fed to the classifier and anomaly detector.
///
/// Every component is finite; the only ways to build one are
/// [`crate::features::FeatureExtractor`] and [`FeatureVector::try_from_array`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector, rejecting NaN and infinite components
    pub fn try_from_array(values: [f64; FEATURE_COUNT]) -> Result<Self, QualityError> {
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(QualityError::InvalidInput(format!(
                "feature '{}' is not finite",
                FEATURE_NAMES[idx]
            )));
        }
        Ok(Self(values))
    }

    /// Internal constructor for values already known to be finite
    pub(crate) fn from_finite(values: [f64; FEATURE_COUNT]) -> Self {
        debug_assert!(values.iter().all(|v| v.is_finite()));
        Self(values)
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn tracking_percentage(&self) -> f64 {
        self.0[0]
    }

    pub fn fixation_count(&self) -> f64 {
        self.0[1]
    }

    pub fn avg_fixation(&self) -> f64 {
        self.0[2]
    }

    pub fn left_eye_open(&self) -> f64 {
        self.0[3]
    }

    pub fn right_eye_open(&self) -> f64 {
        self.0[4]
    }

    pub fn gaze_stability(&self) -> f64 {
        self.0[5]
    }

    pub fn duration(&self) -> f64 {
        self.0[6]
    }

    pub fn gaze_time(&self) -> f64 {
        self.0[7]
    }

    /// Named view of the features reported alongside a prediction
    pub fn reported_features(&self) -> BTreeMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .zip(self.0.iter())
            .take(REPORTED_FEATURES)
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = QualityError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        let len = values.len();
        let array: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
            QualityError::InvalidInput(format!(
                "feature vector must have {FEATURE_COUNT} components, got {len}"
            ))
        })?;
        Self::try_from_array(array)
    }
}

impl From<FeatureVector> for Vec<f64> {
    fn from(features: FeatureVector) -> Self {
        features.0.to_vec()
    }
}

/// Clinical quality category, in classifier output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityCategory {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl QualityCategory {
    /// All categories in class-index order
    pub const ALL: [QualityCategory; 4] = [
        QualityCategory::Excellent,
        QualityCategory::Good,
        QualityCategory::Acceptable,
        QualityCategory::Poor,
    ];

    pub fn index(self) -> usize {
        match self {
            QualityCategory::Excellent => 0,
            QualityCategory::Good => 1,
            QualityCategory::Acceptable => 2,
            QualityCategory::Poor => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCategory::Excellent => "excellent",
            QualityCategory::Good => "good",
            QualityCategory::Acceptable => "acceptable",
            QualityCategory::Poor => "poor",
        }
    }

    /// Parse a stored label; unrecognised labels return `None`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "excellent" => Some(QualityCategory::Excellent),
            "good" => Some(QualityCategory::Good),
            "acceptable" => Some(QualityCategory::Acceptable),
            "poor" => Some(QualityCategory::Poor),
            _ => None,
        }
    }

    /// Whether a test in this category should be scheduled for follow-up
    pub fn requires_follow_up(self) -> bool {
        matches!(self, QualityCategory::Acceptable | QualityCategory::Poor)
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test record paired with its clinician-assigned category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub record: TestRecord,
    pub label: QualityCategory,
}

impl LabeledRecord {
    pub fn new(record: TestRecord, label: QualityCategory) -> Self {
        Self { record, label }
    }
}

/// Whether a model component contributed to a prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Per-component availability for a single prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub classifier: Availability,
    pub anomaly_detector: Availability,
}

/// Output of the inference pipeline for one test record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted quality category
    pub result: QualityCategory,
    /// Probability of the predicted category (0-1)
    pub confidence: f64,
    /// Named subset of the extracted features
    pub features: BTreeMap<String, f64>,
    /// Whether the anomaly detector flagged this test
    pub anomaly_detected: bool,
    /// Continuous anomaly score, lower is more anomalous
    pub anomaly_score: f64,
    /// Share of test time the gaze was tracked (0-100)
    pub tracking_percentage: f64,
    /// Inverse-dispersion score of on-target gaze (0-1)
    pub gaze_stability: f64,
    /// Windowed on-target hit rate (0-1)
    pub gaze_consistency: f64,
    /// Threshold-bucketed narrative
    pub clinical_evaluation: String,
    /// True for acceptable and poor results
    pub recommended_follow_up: bool,
    /// Which model components produced this result
    pub components: ComponentStatus,
    /// Identifier of the model artifact used
    pub model_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_index_round_trip() {
        for (idx, category) in QualityCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), idx);
            assert_eq!(QualityCategory::from_index(idx), Some(*category));
        }
        assert_eq!(QualityCategory::from_index(4), None);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(QualityCategory::from_label("Good"), Some(QualityCategory::Good));
        assert_eq!(QualityCategory::from_label(" poor "), Some(QualityCategory::Poor));
        assert_eq!(QualityCategory::from_label("bon"), None);
    }

    #[test]
    fn test_follow_up_categories() {
        assert!(!QualityCategory::Excellent.requires_follow_up());
        assert!(!QualityCategory::Good.requires_follow_up());
        assert!(QualityCategory::Acceptable.requires_follow_up());
        assert!(QualityCategory::Poor.requires_follow_up());
    }

    #[test]
    fn test_feature_vector_rejects_non_finite() {
        let mut values = [1.0; FEATURE_COUNT];
        values[5] = f64::NAN;
        let err = FeatureVector::try_from_array(values).unwrap_err();
        assert!(err.to_string().contains("gaze_stability"));

        values[5] = f64::INFINITY;
        assert!(FeatureVector::try_from_array(values).is_err());
    }

    #[test]
    fn test_feature_vector_wrong_length() {
        let result = FeatureVector::try_from(vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(QualityError::InvalidInput(_))));
    }

    #[test]
    fn test_reported_features_subset() {
        let features =
            FeatureVector::try_from_array([80.0, 4.0, 2.0, 1.0, 1.0, 0.5, 10.0, 8.0]).unwrap();
        let named = features.reported_features();
        assert_eq!(named.len(), 6);
        assert_eq!(named["tracking_percentage"], 80.0);
        assert_eq!(named["gaze_stability"], 0.5);
        assert!(!named.contains_key("duration"));
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&QualityCategory::Acceptable).unwrap();
        assert_eq!(json, "\"acceptable\"");
    }
}
