//! Training and evaluation
//!
//! [`TrainingLoop::train`] fits the scaler, anomaly detector and classifier on
//! a labeled corpus and publishes a new [`ModelArtifact`]. Only one training
//! run may target a given artifact path at a time; this is enforced with a
//! `<artifact>.lock` file held for the duration of the run. Nothing is written
//! unless the whole fit succeeds.

use crate::anomaly::{IsolationForest, IsolationForestConfig};
use crate::artifact::ModelArtifact;
use crate::classifier::{Classifier, FitOptions};
use crate::error::QualityError;
use crate::features::FeatureExtractor;
use crate::normalizer::StandardScaler;
use crate::pipeline::Predictor;
use crate::types::{FeatureVector, LabeledRecord, QualityCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Minimum labeled records required to train
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Labeled records required before a run starts. Values below
    /// [`MIN_TRAINING_SAMPLES`] are raised to it.
    pub min_samples: usize,
    pub classifier: FitOptions,
    pub anomaly: IsolationForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_TRAINING_SAMPLES,
            classifier: FitOptions::default(),
            anomaly: IsolationForestConfig::default(),
        }
    }
}

/// Cooperative cancellation for long training runs.
///
/// Clones share the same flag. An optional deadline cancels automatically once
/// it has passed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_id: String,
    pub destination: PathBuf,
    pub samples: usize,
    pub epochs_run: usize,
    pub final_loss: f64,
    pub train_accuracy: f64,
    pub validation_accuracy: Option<f64>,
    /// Training records the fitted anomaly detector itself flags
    pub corpus_outliers: usize,
}

/// Hit counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub correct: usize,
}

/// Accuracy of a model over a labeled corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub correct: usize,
    /// `correct / total`, 0 when the corpus is empty
    pub accuracy: f64,
    /// False when the corpus was empty and `accuracy` carries no information
    pub has_data: bool,
    pub per_category: BTreeMap<QualityCategory, CategoryCounts>,
}

/// Batch trainer for the quality model
#[derive(Debug, Clone, Default)]
pub struct TrainingLoop {
    config: TrainingConfig,
    extractor: FeatureExtractor,
}

impl TrainingLoop {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    /// Use a custom feature extractor; it must match the one used at inference
    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit a new model on `corpus` and publish it at `destination`
    pub fn train(
        &self,
        corpus: &[LabeledRecord],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(ModelArtifact, TrainingReport), QualityError> {
        let required = self.config.min_samples.max(MIN_TRAINING_SAMPLES);
        if corpus.len() < required {
            return Err(QualityError::InsufficientData {
                required,
                actual: corpus.len(),
            });
        }

        let _lock = TrainingLock::acquire(destination)?;
        info!(samples = corpus.len(), destination = %destination.display(), "training started");

        let features: Vec<FeatureVector> = corpus
            .iter()
            .map(|labeled| self.extractor.extract(&labeled.record))
            .collect();
        let labels: Vec<QualityCategory> = corpus.iter().map(|l| l.label).collect();

        let scaler = StandardScaler::fit(&features)?;
        let scaled = scaler.transform_all(&features);

        let detector = IsolationForest::fit(&scaled, self.config.anomaly.clone())?;
        let corpus_outliers = scaled.iter().filter(|x| detector.is_outlier(x)).count();

        let mut classifier = Classifier::new(self.config.classifier.seed);
        let history = classifier.fit(&scaled, &labels, &self.config.classifier, &|| {
            cancel.is_cancelled()
        })?;

        if cancel.is_cancelled() {
            return Err(QualityError::Cancelled {
                epochs_completed: history.epochs_run,
            });
        }

        let artifact = ModelArtifact::trained(scaler, classifier, detector, corpus.len());
        artifact.save(destination)?;

        let report = TrainingReport {
            model_id: artifact.model_id.clone(),
            destination: destination.to_path_buf(),
            samples: corpus.len(),
            epochs_run: history.epochs_run,
            final_loss: history.final_loss,
            train_accuracy: history.train_accuracy,
            validation_accuracy: history.validation_accuracy,
            corpus_outliers,
        };
        info!(
            model_id = %report.model_id,
            loss = report.final_loss,
            train_accuracy = report.train_accuracy,
            "training finished, artifact published"
        );
        Ok((artifact, report))
    }
}

/// Re-run inference over a labeled corpus and report accuracy
pub fn evaluate(corpus: &[LabeledRecord], predictor: &Predictor) -> EvaluationSummary {
    let mut per_category: BTreeMap<QualityCategory, CategoryCounts> = BTreeMap::new();
    let mut correct = 0;

    for labeled in corpus {
        let prediction = predictor.predict(&labeled.record);
        let counts = per_category.entry(labeled.label).or_default();
        counts.total += 1;
        if prediction.result == labeled.label {
            counts.correct += 1;
            correct += 1;
        }
    }

    let total = corpus.len();
    if total == 0 {
        warn!("evaluation corpus is empty, no accuracy to report");
    }

    EvaluationSummary {
        total,
        correct,
        accuracy: if total > 0 {
            correct as f64 / total as f64
        } else {
            0.0
        },
        has_data: total > 0,
        per_category,
    }
}

/// Exclusive lock on an artifact path, released on drop
struct TrainingLock {
    path: PathBuf,
}

impl TrainingLock {
    /// Fails with `TrainingInProgress` if the lock file already exists. A lock
    /// left behind by a crashed run must be removed by hand.
    fn acquire(destination: &Path) -> Result<Self, QualityError> {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                QualityError::ArtifactError(format!(
                    "invalid artifact path: {}",
                    destination.display()
                ))
            })?;
        name.push(".lock");
        let path = destination.with_file_name(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(QualityError::TrainingInProgress(path.display().to_string()))
            }
            Err(e) => Err(QualityError::IoError(e)),
        }
    }
}

impl Drop for TrainingLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
