//! gaze.test_record.v1 wire format
//!
//! Mirrors what the session store persists for each test: top-level timing and
//! fixation totals, an optional clinician label, and the raw capture payload
//! (`eyeStatus`, `gazeHistory`). Numeric fields that are absent default to 0;
//! gaze coordinates are kept as raw JSON so malformed telemetry can be reported
//! precisely instead of being coerced.

use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "gaze.test_record.v1";

/// One raw gaze point as captured by the browser tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGazePoint {
    #[serde(default)]
    pub x: Option<serde_json::Value>,
    #[serde(default)]
    pub y: Option<serde_json::Value>,
    #[serde(default, rename = "onTarget")]
    pub on_target: bool,
    /// Milliseconds since test start
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Tracker confidence (0-1), informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Eye state reported by the tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEyeStatus {
    #[serde(default, rename = "leftEyeOpen")]
    pub left_eye_open: bool,
    #[serde(default, rename = "rightEyeOpen")]
    pub right_eye_open: bool,
}

/// Raw capture payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCapture {
    #[serde(default, rename = "eyeStatus", skip_serializing_if = "Option::is_none")]
    pub eye_status: Option<RawEyeStatus>,
    #[serde(default, rename = "gazeHistory")]
    pub gaze_history: Vec<RawGazePoint>,
}

/// A stored test session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTestRecord {
    /// Store identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Total test duration (seconds)
    #[serde(default)]
    pub duration: Option<f64>,
    /// Time on target (seconds)
    #[serde(default)]
    pub gaze_time: Option<f64>,
    /// Number of fixations; some exporters write it as a float (`4.0`)
    #[serde(default)]
    pub fixation_count: Option<f64>,
    /// Top-level eye flags, used when the capture has no `eyeStatus`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_eye_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_eye_open: Option<bool>,
    /// Clinician-assigned category, present on labeled records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub raw_data: RawCapture,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_record() {
        let json = r#"{
            "id": "t-42",
            "duration": 10.0,
            "gaze_time": 8.0,
            "fixation_count": 4,
            "result": "good",
            "raw_data": {
                "eyeStatus": { "leftEyeOpen": true, "rightEyeOpen": false, "state": 1 },
                "gazeHistory": [
                    { "x": 120.5, "y": 80.0, "onTarget": true, "timestamp": 16, "confidence": 0.9 }
                ]
            }
        }"#;

        let record: RawTestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_deref(), Some("t-42"));
        assert_eq!(record.fixation_count, Some(4.0));
        let eyes = record.raw_data.eye_status.unwrap();
        assert!(eyes.left_eye_open);
        assert!(!eyes.right_eye_open);
        assert_eq!(record.raw_data.gaze_history.len(), 1);
        assert!(record.raw_data.gaze_history[0].on_target);
    }

    #[test]
    fn test_deserialize_sparse_record() {
        let record: RawTestRecord = serde_json::from_str("{}").unwrap();
        assert!(record.duration.is_none());
        assert!(record.raw_data.gaze_history.is_empty());
        assert!(record.raw_data.eye_status.is_none());
    }
}
