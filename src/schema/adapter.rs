//! Adapter for converting stored records into validated test records
//!
//! Absent numeric fields default to 0. Malformed telemetry (non-numeric or
//! non-finite coordinates, negative durations) is rejected with
//! [`QualityError::InvalidInput`]; it is never silently coerced.

use crate::error::QualityError;
use crate::schema::raw_record::*;
use crate::types::{GazeSample, LabeledRecord, QualityCategory, TestRecord};
use tracing::warn;

/// Adapter for converting raw stored records into pipeline inputs
pub struct RawRecordAdapter;

impl RawRecordAdapter {
    /// Parse a single JSON record
    pub fn parse_record(json: &str) -> Result<RawTestRecord, QualityError> {
        serde_json::from_str(json).map_err(classify_json_error)
    }

    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<RawTestRecord>, QualityError> {
        serde_json::from_str(json).map_err(classify_json_error)
    }

    /// Parse NDJSON (newline-delimited JSON) records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawTestRecord>, QualityError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawTestRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(QualityError::InvalidInput(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Validate and convert a raw record
    pub fn to_test_record(raw: &RawTestRecord) -> Result<TestRecord, QualityError> {
        let duration = non_negative("duration", raw.duration)?;
        let gaze_time = non_negative("gaze_time", raw.gaze_time)?;
        let fixation_count = fixation_count(raw.fixation_count)?;

        let (left_eye_open, right_eye_open) = match &raw.raw_data.eye_status {
            Some(status) => (status.left_eye_open, status.right_eye_open),
            None => (
                raw.left_eye_open.unwrap_or(false),
                raw.right_eye_open.unwrap_or(false),
            ),
        };

        let gaze_history = raw
            .raw_data
            .gaze_history
            .iter()
            .enumerate()
            .map(|(idx, point)| to_sample(idx, point))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TestRecord {
            duration,
            gaze_time,
            fixation_count,
            left_eye_open,
            right_eye_open,
            gaze_history,
        })
    }

    /// Convert a stored record into a labeled training example.
    ///
    /// Returns `Ok(None)` for unlabeled records. Unknown labels are treated as
    /// `poor`.
    pub fn to_labeled(raw: &RawTestRecord) -> Result<Option<LabeledRecord>, QualityError> {
        let Some(label) = raw.result.as_deref() else {
            return Ok(None);
        };
        let category = QualityCategory::from_label(label).unwrap_or_else(|| {
            warn!(
                record_id = raw.id.as_deref().unwrap_or("unknown"),
                label, "unrecognised label, treating as poor"
            );
            QualityCategory::Poor
        });
        let record = Self::to_test_record(raw)?;
        Ok(Some(LabeledRecord::new(record, category)))
    }

    /// Validate a batch of records, returning only the failures
    pub fn validate_records(records: &[RawTestRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                Self::to_test_record(record)
                    .err()
                    .map(|error| ValidationResult {
                        index: idx,
                        record_id: record.id.clone(),
                        error,
                    })
            })
            .collect()
    }
}

/// Failed record validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub record_id: Option<String>,
    pub error: QualityError,
}

/// Data errors (wrong types, bad values) are input problems; syntax errors stay JSON errors
fn classify_json_error(e: serde_json::Error) -> QualityError {
    if e.is_data() {
        QualityError::InvalidInput(e.to_string())
    } else {
        QualityError::JsonError(e)
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<f64, QualityError> {
    let value = value.unwrap_or(0.0);
    if !value.is_finite() || value < 0.0 {
        return Err(QualityError::InvalidInput(format!(
            "{field} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(value)
}

fn fixation_count(value: Option<f64>) -> Result<u32, QualityError> {
    let n = value.unwrap_or(0.0);
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 {
        return Err(QualityError::InvalidInput(format!(
            "fixation_count must be a non-negative whole number, got {n}"
        )));
    }
    if n > f64::from(u32::MAX) {
        return Err(QualityError::InvalidInput(format!(
            "fixation_count {n} is out of range"
        )));
    }
    Ok(n as u32)
}

fn to_sample(idx: usize, point: &RawGazePoint) -> Result<GazeSample, QualityError> {
    let x = coordinate(idx, "x", point.x.as_ref())?;
    let y = coordinate(idx, "y", point.y.as_ref())?;
    let timestamp_ms = point.timestamp.unwrap_or(0.0);
    if !timestamp_ms.is_finite() {
        return Err(QualityError::InvalidInput(format!(
            "gazeHistory[{idx}].timestamp is not finite"
        )));
    }
    Ok(GazeSample::new(x, y, point.on_target, timestamp_ms))
}

fn coordinate(
    idx: usize,
    axis: &str,
    value: Option<&serde_json::Value>,
) -> Result<f64, QualityError> {
    let value = value.ok_or_else(|| {
        QualityError::InvalidInput(format!("gazeHistory[{idx}].{axis} is missing"))
    })?;
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(QualityError::InvalidInput(format!(
            "gazeHistory[{idx}].{axis} is not a finite number: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "id": "t-1",
        "duration": 10.0,
        "gaze_time": 8.0,
        "fixation_count": 4,
        "result": "excellent",
        "raw_data": {
            "eyeStatus": { "leftEyeOpen": true, "rightEyeOpen": true },
            "gazeHistory": [
                { "x": 100, "y": 100, "onTarget": true, "timestamp": 0 },
                { "x": 100, "y": 100, "onTarget": true, "timestamp": 33 }
            ]
        }
    }"#;

    #[test]
    fn test_to_test_record() {
        let raw = RawRecordAdapter::parse_record(RECORD).unwrap();
        let record = RawRecordAdapter::to_test_record(&raw).unwrap();

        assert_eq!(record.duration, 10.0);
        assert_eq!(record.gaze_time, 8.0);
        assert_eq!(record.fixation_count, 4);
        assert!(record.left_eye_open && record.right_eye_open);
        assert_eq!(record.gaze_history.len(), 2);
        assert_eq!(record.gaze_history[1].timestamp_ms, 33.0);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let raw = RawRecordAdapter::parse_record("{}").unwrap();
        let record = RawRecordAdapter::to_test_record(&raw).unwrap();
        assert_eq!(record, TestRecord::default());
    }

    #[test]
    fn test_top_level_eye_flags_fallback() {
        let raw =
            RawRecordAdapter::parse_record(r#"{"left_eye_open": true, "right_eye_open": false}"#)
                .unwrap();
        let record = RawRecordAdapter::to_test_record(&raw).unwrap();
        assert!(record.left_eye_open);
        assert!(!record.right_eye_open);
    }

    #[test]
    fn test_non_numeric_coordinate_rejected() {
        let raw = RawRecordAdapter::parse_record(
            r#"{"raw_data": {"gazeHistory": [{"x": 1, "y": 2, "onTarget": true},
                                             {"x": "left", "y": 2, "onTarget": true}]}}"#,
        )
        .unwrap();
        let err = RawRecordAdapter::to_test_record(&raw).unwrap_err();
        match err {
            QualityError::InvalidInput(msg) => assert!(msg.contains("gazeHistory[1].x")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_coordinate_rejected() {
        let raw = RawRecordAdapter::parse_record(
            r#"{"raw_data": {"gazeHistory": [{"x": 1, "onTarget": false}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            RawRecordAdapter::to_test_record(&raw),
            Err(QualityError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let raw = RawRecordAdapter::parse_record(r#"{"duration": -1.0}"#).unwrap();
        assert!(RawRecordAdapter::to_test_record(&raw).is_err());

        let raw = RawRecordAdapter::parse_record(r#"{"fixation_count": -3}"#).unwrap();
        assert!(RawRecordAdapter::to_test_record(&raw).is_err());
    }

    #[test]
    fn test_fixation_count_accepts_whole_floats() {
        let raw = RawRecordAdapter::parse_record(r#"{"fixation_count": 4.0}"#).unwrap();
        assert_eq!(RawRecordAdapter::to_test_record(&raw).unwrap().fixation_count, 4);

        let raw = RawRecordAdapter::parse_record(r#"{"fixation_count": 7}"#).unwrap();
        assert_eq!(RawRecordAdapter::to_test_record(&raw).unwrap().fixation_count, 7);

        for bad in ["4.5", "-3", "1e12"] {
            let json = format!(r#"{{"fixation_count": {bad}}}"#);
            let raw = RawRecordAdapter::parse_record(&json).unwrap();
            assert!(
                matches!(
                    RawRecordAdapter::to_test_record(&raw),
                    Err(QualityError::InvalidInput(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_wrong_type_is_invalid_input() {
        let result = RawRecordAdapter::parse_record(r#"{"duration": "ten"}"#);
        assert!(matches!(result, Err(QualityError::InvalidInput(_))));

        let result = RawRecordAdapter::parse_record("{ not json");
        assert!(matches!(result, Err(QualityError::JsonError(_))));
    }

    #[test]
    fn test_labels() {
        let raw = RawRecordAdapter::parse_record(RECORD).unwrap();
        let labeled = RawRecordAdapter::to_labeled(&raw).unwrap().unwrap();
        assert_eq!(labeled.label, QualityCategory::Excellent);

        let mut unknown = raw.clone();
        unknown.result = Some("faible".to_string());
        let labeled = RawRecordAdapter::to_labeled(&unknown).unwrap().unwrap();
        assert_eq!(labeled.label, QualityCategory::Poor);

        let mut unlabeled = raw;
        unlabeled.result = None;
        assert!(RawRecordAdapter::to_labeled(&unlabeled).unwrap().is_none());
    }

    #[test]
    fn test_parse_ndjson_and_validate() {
        let ndjson = format!(
            "{}\n\n{}\n",
            r#"{"id": "a", "duration": 5}"#, r#"{"id": "b", "duration": -5}"#
        );
        let records = RawRecordAdapter::parse_ndjson(&ndjson).unwrap();
        assert_eq!(records.len(), 2);

        let failures = RawRecordAdapter::validate_records(&records);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].record_id.as_deref(), Some("b"));
    }
}
