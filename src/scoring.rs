//! Gaze quality scores
//!
//! Pure functions over a gaze sample sequence:
//! - Stability: inverse dispersion of on-target points around their centroid
//! - Consistency: windowed on-target hit rate across the whole history

use crate::types::GazeSample;

/// Score returned when there is not enough signal to measure anything
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Default dispersion scale, in screen coordinate units.
///
/// A standard deviation of this many units maps to a stability of 0. Tied to
/// the capture screen's coordinate system; tune per device rather than derive.
pub const DEFAULT_STABILITY_SCALE: f64 = 100.0;

/// Window length used by the consistency score
pub const CONSISTENCY_WINDOW: usize = 10;

/// Dispersion-based stability scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityScorer {
    scale: f64,
}

impl Default for StabilityScorer {
    fn default() -> Self {
        Self {
            scale: DEFAULT_STABILITY_SCALE,
        }
    }
}

impl StabilityScorer {
    /// Create a scorer with a custom dispersion scale. Non-positive or
    /// non-finite scales fall back to the default.
    pub fn with_scale(scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            Self { scale }
        } else {
            Self::default()
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Stability in [0, 1]; 1 means every on-target point sits on the centroid
    pub fn score(&self, history: &[GazeSample]) -> f64 {
        let on_target: Vec<&GazeSample> = history.iter().filter(|g| g.on_target).collect();
        if on_target.len() < 2 {
            return NEUTRAL_SCORE;
        }

        let n = on_target.len() as f64;
        let mean_x = on_target.iter().map(|g| g.x).sum::<f64>() / n;
        let mean_y = on_target.iter().map(|g| g.y).sum::<f64>() / n;

        let variance = on_target
            .iter()
            .map(|g| (g.x - mean_x).powi(2) + (g.y - mean_y).powi(2))
            .sum::<f64>()
            / n;

        let stability = (1.0 - variance.sqrt() / self.scale).max(0.0);
        if stability.is_finite() {
            stability.min(1.0)
        } else {
            0.0
        }
    }
}

/// Sliding-window on-target consistency scorer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsistencyScorer;

impl ConsistencyScorer {
    /// Mean on-target fraction over windows of [`CONSISTENCY_WINDOW`] samples.
    ///
    /// Windows start at every position in `0..len - CONSISTENCY_WINDOW`, so a
    /// history of exactly one window length has no start position and scores
    /// neutral.
    pub fn score(history: &[GazeSample]) -> f64 {
        if history.len() < CONSISTENCY_WINDOW {
            return NEUTRAL_SCORE;
        }

        let starts = history.len() - CONSISTENCY_WINDOW;
        if starts == 0 {
            return NEUTRAL_SCORE;
        }

        let total: f64 = (0..starts)
            .map(|start| {
                let window = &history[start..start + CONSISTENCY_WINDOW];
                let hits = window.iter().filter(|g| g.on_target).count();
                hits as f64 / CONSISTENCY_WINDOW as f64
            })
            .sum();

        (total / starts as f64).clamp(0.0, 1.0)
    }
}
