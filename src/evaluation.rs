//! Clinical evaluation narrative
//!
//! Buckets tracking percentage, gaze stability and fixation count into fixed
//! tiers and joins the per-axis messages into one narrative line.

use serde::{Deserialize, Serialize};

/// Separator between per-axis messages
pub const SEPARATOR: &str = " | ";

/// Tracking percentage at or above which tracking is excellent
pub const TRACKING_EXCELLENT_MIN: f64 = 80.0;
/// Tracking percentage at or above which tracking is acceptable
pub const TRACKING_ACCEPTABLE_MIN: f64 = 60.0;
/// Stability strictly above which gaze is very stable
pub const STABILITY_HIGH_ABOVE: f64 = 0.8;
/// Stability strictly above which gaze is moderately stable
pub const STABILITY_MODERATE_ABOVE: f64 = 0.6;
/// Fixation count from which the count is considered elevated
pub const FIXATION_ELEVATED_MIN: u32 = 5;

/// Whether an axis reading is reassuring or worth a closer look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warning,
}

impl Severity {
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "✅",
            Severity::Warning => "⚠️",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingTier {
    Excellent,
    Acceptable,
    Poor,
}

impl TrackingTier {
    pub fn classify(tracking_percentage: f64) -> Self {
        if tracking_percentage >= TRACKING_EXCELLENT_MIN {
            TrackingTier::Excellent
        } else if tracking_percentage >= TRACKING_ACCEPTABLE_MIN {
            TrackingTier::Acceptable
        } else {
            TrackingTier::Poor
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            TrackingTier::Excellent => "Excellent tracking",
            TrackingTier::Acceptable => "Acceptable tracking",
            TrackingTier::Poor => "Poor tracking",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TrackingTier::Excellent => Severity::Ok,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityTier {
    VeryStable,
    ModeratelyStable,
    Unstable,
}

impl StabilityTier {
    pub fn classify(gaze_stability: f64) -> Self {
        if gaze_stability > STABILITY_HIGH_ABOVE {
            StabilityTier::VeryStable
        } else if gaze_stability > STABILITY_MODERATE_ABOVE {
            StabilityTier::ModeratelyStable
        } else {
            StabilityTier::Unstable
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StabilityTier::VeryStable => "Very stable gaze",
            StabilityTier::ModeratelyStable => "Moderately stable gaze",
            StabilityTier::Unstable => "Unstable gaze",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StabilityTier::VeryStable => Severity::Ok,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixationTier {
    Normal,
    Elevated,
}

impl FixationTier {
    pub fn classify(fixation_count: u32) -> Self {
        if fixation_count < FIXATION_ELEVATED_MIN {
            FixationTier::Normal
        } else {
            FixationTier::Elevated
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FixationTier::Normal => "Normal fixation count",
            FixationTier::Elevated => "Elevated fixation count",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FixationTier::Normal => Severity::Ok,
            FixationTier::Elevated => Severity::Warning,
        }
    }
}

/// Tier of one evaluation axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "axis", content = "tier", rename_all = "snake_case")]
pub enum AxisTier {
    Tracking(TrackingTier),
    Stability(StabilityTier),
    Fixation(FixationTier),
}

impl AxisTier {
    pub fn message(&self) -> &'static str {
        match self {
            AxisTier::Tracking(t) => t.message(),
            AxisTier::Stability(t) => t.message(),
            AxisTier::Fixation(t) => t.message(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AxisTier::Tracking(t) => t.severity(),
            AxisTier::Stability(t) => t.severity(),
            AxisTier::Fixation(t) => t.severity(),
        }
    }

    /// Message prefixed with its severity icon
    pub fn render(&self) -> String {
        format!("{} {}", self.severity().icon(), self.message())
    }
}

/// Evaluation across all three axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalEvaluation {
    pub tracking: TrackingTier,
    pub stability: StabilityTier,
    pub fixation: FixationTier,
}

impl ClinicalEvaluation {
    pub fn axes(&self) -> [AxisTier; 3] {
        [
            AxisTier::Tracking(self.tracking),
            AxisTier::Stability(self.stability),
            AxisTier::Fixation(self.fixation),
        ]
    }

    /// Pipe-joined narrative
    pub fn narrative(&self) -> String {
        self.axes()
            .iter()
            .map(AxisTier::render)
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

/// Rule-based evaluation composer
pub struct EvaluationComposer;

impl EvaluationComposer {
    pub fn evaluate(
        tracking_percentage: f64,
        gaze_stability: f64,
        fixation_count: u32,
    ) -> ClinicalEvaluation {
        ClinicalEvaluation {
            tracking: TrackingTier::classify(tracking_percentage),
            stability: StabilityTier::classify(gaze_stability),
            fixation: FixationTier::classify(fixation_count),
        }
    }

    /// Compose the narrative string directly
    pub fn compose(tracking_percentage: f64, gaze_stability: f64, fixation_count: u32) -> String {
        Self::evaluate(tracking_percentage, gaze_stability, fixation_count).narrative()
    }
}
