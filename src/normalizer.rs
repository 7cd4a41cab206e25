//! Feature scaling
//!
//! Per-feature z-score scaling fitted once on a training corpus and persisted
//! with the model. A freshly constructed scaler is the identity transform.

use crate::error::QualityError;
use crate::types::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Standard-deviation floor below which a feature is treated as constant
const MIN_SCALE: f64 = 1e-12;

/// Z-score scaler over the feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
    fitted: bool,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::identity()
    }
}

impl StandardScaler {
    /// Scaler that leaves features unchanged
    pub fn identity() -> Self {
        Self {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0; FEATURE_COUNT],
            fitted: false,
        }
    }

    /// Fit mean and population standard deviation per feature.
    ///
    /// Constant features get a scale of 1 so they map to 0 instead of NaN.
    pub fn fit(samples: &[FeatureVector]) -> Result<Self, QualityError> {
        if samples.is_empty() {
            return Err(QualityError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = samples.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for sample in samples {
            for (m, v) in mean.iter_mut().zip(sample.as_array()) {
                *m += v / n;
            }
        }

        let mut scale = [0.0; FEATURE_COUNT];
        for sample in samples {
            for ((s, v), m) in scale.iter_mut().zip(sample.as_array()).zip(mean.iter()) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            let std = s.sqrt();
            *s = if std.is_finite() && std > MIN_SCALE { std } else { 1.0 };
        }

        Ok(Self {
            mean,
            scale,
            fitted: true,
        })
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Scale a single feature vector
    pub fn transform(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in features.as_array().iter().enumerate() {
            out[i] = (value - self.mean[i]) / self.scale[i];
        }
        out
    }

    /// Scale a batch of feature vectors
    pub fn transform_all(&self, samples: &[FeatureVector]) -> Vec<[f64; FEATURE_COUNT]> {
        samples.iter().map(|s| self.transform(s)).collect()
    }

    /// Check persisted parameters before use
    pub(crate) fn validate(&self) -> Result<(), QualityError> {
        let finite = self.mean.iter().all(|m| m.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0);
        if finite {
            Ok(())
        } else {
            Err(QualityError::ArtifactError(
                "scaler contains non-finite or non-positive parameters".to_string(),
            ))
        }
    }
}
