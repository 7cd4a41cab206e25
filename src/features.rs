//! Feature extraction
//!
//! This module derives the fixed 8-dimensional feature vector from a test record:
//! - Tracking percentage and average fixation time
//! - Eye-open flags as 0/1
//! - Gaze stability over the on-target history
//! - Raw duration and gaze time

use crate::scoring::{StabilityScorer, NEUTRAL_SCORE};
use crate::types::{FeatureVector, TestRecord};

/// Feature extractor for test records
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    stability: StabilityScorer,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom stability scorer (e.g. a device-specific scale)
    pub fn with_stability_scorer(stability: StabilityScorer) -> Self {
        Self { stability }
    }

    /// Extract features from a test record
    pub fn extract(&self, record: &TestRecord) -> FeatureVector {
        let duration = finite_or_zero(record.duration);
        let gaze_time = finite_or_zero(record.gaze_time);
        let fixation_count = record.fixation_count as f64;

        let tracking_percentage = compute_tracking_percentage(gaze_time, duration);
        let avg_fixation = compute_avg_fixation(gaze_time, record.fixation_count);

        let gaze_stability = if record.gaze_history.is_empty() {
            NEUTRAL_SCORE
        } else {
            self.stability.score(&record.gaze_history)
        };

        FeatureVector::from_finite([
            tracking_percentage,
            fixation_count,
            avg_fixation,
            flag(record.left_eye_open),
            flag(record.right_eye_open),
            gaze_stability,
            duration,
            gaze_time,
        ])
    }
}

/// Share of the test spent tracking, scaled to 0-100; 0 when duration is 0
fn compute_tracking_percentage(gaze_time: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        finite_or_zero(gaze_time / duration * 100.0)
    } else {
        0.0
    }
}

/// Mean time per fixation; 0 when no fixations were recorded
fn compute_avg_fixation(gaze_time: f64, fixation_count: u32) -> f64 {
    if fixation_count > 0 {
        finite_or_zero(gaze_time / fixation_count as f64)
    } else {
        0.0
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GazeSample;

    fn make_record(duration: f64, gaze_time: f64, fixation_count: u32) -> TestRecord {
        TestRecord {
            duration,
            gaze_time,
            fixation_count,
            left_eye_open: true,
            right_eye_open: true,
            gaze_history: Vec::new(),
        }
    }

    #[test]
    fn test_scenario_excellent_tracking() {
        let features = FeatureExtractor::new().extract(&make_record(10.0, 8.0, 4));

        assert!((features.tracking_percentage() - 80.0).abs() < 1e-9);
        assert!((features.avg_fixation() - 2.0).abs() < 1e-9);
        assert_eq!(features.gaze_stability(), 0.5);
        assert_eq!(features.left_eye_open(), 1.0);
        assert_eq!(features.right_eye_open(), 1.0);
        assert_eq!(features.duration(), 10.0);
        assert_eq!(features.gaze_time(), 8.0);
        assert_eq!(features.fixation_count(), 4.0);
    }

    #[test]
    fn test_zero_duration() {
        let features = FeatureExtractor::new().extract(&make_record(0.0, 0.0, 0));
        assert_eq!(features.tracking_percentage(), 0.0);
        assert_eq!(features.avg_fixation(), 0.0);
    }

    #[test]
    fn test_zero_fixations() {
        let features = FeatureExtractor::new().extract(&make_record(10.0, 5.0, 0));
        assert_eq!(features.avg_fixation(), 0.0);
        assert!((features.tracking_percentage() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_closed_eyes_default_to_zero() {
        let record = TestRecord {
            duration: 5.0,
            gaze_time: 1.0,
            ..Default::default()
        };
        let features = FeatureExtractor::new().extract(&record);
        assert_eq!(features.left_eye_open(), 0.0);
        assert_eq!(features.right_eye_open(), 0.0);
    }

    #[test]
    fn test_stability_from_history() {
        let mut record = make_record(10.0, 8.0, 4);
        record.gaze_history = vec![
            GazeSample::new(120.0, 80.0, true, 0.0),
            GazeSample::new(120.0, 80.0, true, 33.0),
        ];
        let features = FeatureExtractor::new().extract(&record);
        assert_eq!(features.gaze_stability(), 1.0);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let mut record = make_record(12.5, 7.25, 9);
        record.gaze_history = (0..30)
            .map(|i| GazeSample::new(i as f64 * 3.0, 50.0, i % 4 != 0, i as f64 * 16.0))
            .collect();

        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.extract(&record), extractor.extract(&record));
    }

    #[test]
    fn test_non_finite_inputs_are_zeroed() {
        let record = make_record(f64::INFINITY, f64::NAN, 3);
        let features = FeatureExtractor::new().extract(&record);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(features.tracking_percentage(), 0.0);
    }
}
