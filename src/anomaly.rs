//! Anomaly detection
//!
//! An isolation forest over the scaled feature vector. Points that are isolated
//! by few random splits are unusual. Scores follow the convention
//! `score = raw_score - offset`, where the offset is the contamination
//! percentile of the training scores: negative scores are outliers.

use crate::error::QualityError;
use crate::types::FEATURE_COUNT;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Expected share of outliers in the training corpus
pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Number of isolation trees
pub const DEFAULT_TREES: usize = 100;

/// Maximum subsample size per tree
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Seed for subsampling and split selection
pub const DEFAULT_SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(
        data: &[[f64; FEATURE_COUNT]],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        if depth >= max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        let ranges: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &r| {
                    (acc.0.min(data[r][f]), acc.1.max(data[r][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();

        if ranges.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(data, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Node::Leaf { .. } => true,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                *feature < FEATURE_COUNT
                    && threshold.is_finite()
                    && left.is_valid()
                    && right.is_valid()
            }
        }
    }
}

/// Fitted isolation forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    subsample_size: usize,
    offset: f64,
    trees: Vec<Node>,
}

impl IsolationForest {
    /// Fit on scaled training features
    pub fn fit(
        samples: &[[f64; FEATURE_COUNT]],
        config: IsolationForestConfig,
    ) -> Result<Self, QualityError> {
        if samples.is_empty() {
            return Err(QualityError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if !(0.0..=0.5).contains(&config.contamination) {
            return Err(QualityError::InvalidInput(format!(
                "contamination must be within [0, 0.5], got {}",
                config.contamination
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let subsample_size = config.max_samples.max(1).min(samples.len());
        let max_depth = (subsample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..config.trees.max(1))
            .map(|_| {
                let rows = index::sample(&mut rng, samples.len(), subsample_size).into_vec();
                Node::build(samples, rows, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            config,
            subsample_size,
            offset: 0.0,
            trees,
        };

        let mut scores: Vec<f64> = samples.iter().map(|s| forest.raw_score(s)).collect();
        forest.offset = percentile(&mut scores, forest.config.contamination * 100.0);
        Ok(forest)
    }

    pub fn contamination(&self) -> f64 {
        self.config.contamination
    }

    /// Anomaly score; negative values are outliers, lower is more anomalous
    pub fn score(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.raw_score(x) - self.offset
    }

    pub fn is_outlier(&self, x: &[f64; FEATURE_COUNT]) -> bool {
        self.score(x) < 0.0
    }

    /// Opposite of the normalised isolation depth, in [-1, 0]
    fn raw_score(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let normaliser = average_path_length(self.subsample_size);
        if normaliser <= 0.0 {
            return -0.5;
        }
        -(2f64.powf(-mean_depth / normaliser))
    }

    /// Check persisted parameters before use
    pub(crate) fn validate(&self) -> Result<(), QualityError> {
        if self.trees.is_empty() {
            return Err(QualityError::ArtifactError(
                "anomaly detector has no trees".to_string(),
            ));
        }
        if !self.offset.is_finite() || !self.trees.iter().all(Node::is_valid) {
            return Err(QualityError::ArtifactError(
                "anomaly detector contains invalid parameters".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the decision offset, e.g. with NaN to force unusable scores
    #[cfg(test)]
    pub(crate) fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile; sorts `values` in place
fn percentile(values: &mut [f64], pct: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}
