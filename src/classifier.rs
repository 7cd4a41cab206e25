//! Quality classifier
//!
//! A small feed-forward network mapping the scaled feature vector to a
//! probability distribution over the four quality categories:
//!
//! ```text
//! 8 → Dense(64, relu) → Dropout(0.3) → Dense(32, relu) → Dropout(0.2)
//!   → Dense(16, relu) → Dense(4, softmax)
//! ```
//!
//! Trained with categorical cross-entropy and Adam. Weights are initialised
//! from a seeded RNG, so an untrained model is deterministic and still yields
//! well-formed predictions.

use crate::error::QualityError;
use crate::types::{QualityCategory, FEATURE_COUNT};
use ndarray::{Array, Array1, Array2, ArrayView1, Axis, Dimension, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hidden layer widths
pub const HIDDEN_LAYERS: [usize; 3] = [64, 32, 16];

/// Number of output classes
pub const OUTPUT_CLASSES: usize = 4;

/// Dropout rate applied after each hidden layer during training
const HIDDEN_DROPOUT: [f64; 3] = [0.3, 0.2, 0.0];

/// Seed used for the default (untrained) model
pub const DEFAULT_SEED: u64 = 42;

/// Probability floor for the cross-entropy loss
const LOSS_EPSILON: f64 = 1e-7;

/// Options for a classifier fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of samples held out for validation (0 disables)
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            seed: DEFAULT_SEED,
        }
    }
}

/// Summary of a completed fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    pub epochs_run: usize,
    pub final_loss: f64,
    pub train_accuracy: f64,
    pub validation_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    /// `outputs x inputs`
    weights: Array2<f64>,
    biases: Array1<f64>,
    dropout: f64,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero biases
    fn new(inputs: usize, outputs: usize, dropout: f64, rng: &mut ChaCha8Rng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((outputs, inputs), |_| rng.gen_range(-limit..limit)),
            biases: Array1::zeros(outputs),
            dropout,
        }
    }

    /// Pre-activations for a batch of row vectors
    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights.t()) + &self.biases
    }
}

/// Feed-forward quality classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    layers: Vec<DenseLayer>,
    trained: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Classifier {
    /// Create an untrained classifier with seeded weights
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let layers = layer_widths()
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let dropout = HIDDEN_DROPOUT.get(i).copied().unwrap_or(0.0);
                DenseLayer::new(pair[0], pair[1], dropout, &mut rng)
            })
            .collect();

        Self {
            layers,
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Class probabilities for a scaled feature vector (no dropout)
    pub fn probabilities(&self, input: &[f64; FEATURE_COUNT]) -> [f64; OUTPUT_CLASSES] {
        let batch = ArrayView1::from(&input[..]).insert_axis(Axis(0)).to_owned();
        let probs = self.forward(batch);

        let mut out = [0.0; OUTPUT_CLASSES];
        for (o, p) in out.iter_mut().zip(probs.row(0).iter()) {
            *o = *p;
        }
        out
    }

    /// Most likely category and its probability
    pub fn predict(
        &self,
        input: &[f64; FEATURE_COUNT],
    ) -> Result<(QualityCategory, f64), QualityError> {
        let probs = self.probabilities(input);
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(QualityError::ModelError(
                "classifier produced non-finite probabilities".to_string(),
            ));
        }

        let (best, confidence) = argmax(probs.iter().copied());
        let category = QualityCategory::from_index(best).ok_or_else(|| {
            QualityError::ModelError(format!("class index {best} out of range"))
        })?;
        Ok((category, confidence.clamp(0.0, 1.0)))
    }

    /// Fit on scaled features with mini-batch Adam.
    ///
    /// `should_stop` is polled before each epoch; returning true aborts the
    /// fit with [`QualityError::Cancelled`] and leaves `self` partially updated,
    /// so callers must discard the classifier in that case.
    pub fn fit(
        &mut self,
        inputs: &[[f64; FEATURE_COUNT]],
        labels: &[QualityCategory],
        options: &FitOptions,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<FitHistory, QualityError> {
        if inputs.len() != labels.len() {
            return Err(QualityError::InvalidInput(format!(
                "{} feature rows but {} labels",
                inputs.len(),
                labels.len()
            )));
        }
        if inputs.is_empty() {
            return Err(QualityError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = inputs.len();
        let data = Array2::from_shape_fn((n, FEATURE_COUNT), |(i, j)| inputs[i][j]);
        let targets: Vec<usize> = labels.iter().map(|l| l.index()).collect();

        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);

        let split = options.validation_split.clamp(0.0, 0.9);
        let val_count = ((n as f64) * split).floor() as usize;
        let val_count = val_count.min(n - 1);
        let (train_idx, val_idx) = order.split_at(n - val_count);
        let mut train_idx = train_idx.to_vec();
        let val_idx = val_idx.to_vec();

        let mut adam = Adam::new(&self.layers, options.learning_rate);
        let batch_size = options.batch_size.max(1);
        let mut final_loss = 0.0;

        for epoch in 0..options.epochs {
            if should_stop() {
                return Err(QualityError::Cancelled {
                    epochs_completed: epoch,
                });
            }

            train_idx.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in train_idx.chunks(batch_size) {
                let x = data.select(Axis(0), batch);
                let y: Vec<usize> = batch.iter().map(|&i| targets[i]).collect();
                let (grads, loss) = self.backprop(&x, &y, &mut rng);
                epoch_loss += loss;
                adam.step(&mut self.layers, &grads);
            }

            final_loss = epoch_loss / train_idx.len() as f64;
            if !final_loss.is_finite() {
                return Err(QualityError::ModelError(format!(
                    "training diverged at epoch {}",
                    epoch + 1
                )));
            }
            debug!(epoch = epoch + 1, loss = final_loss, "classifier epoch complete");
        }

        self.trained = true;

        let train_accuracy = self.accuracy(&data, &targets, &train_idx);
        let validation_accuracy = if val_idx.is_empty() {
            None
        } else {
            Some(self.accuracy(&data, &targets, &val_idx))
        };

        Ok(FitHistory {
            epochs_run: options.epochs,
            final_loss,
            train_accuracy,
            validation_accuracy,
        })
    }

    /// Inference pass over a batch of rows
    fn forward(&self, input: Array2<f64>) -> Array2<f64> {
        let last = self.layers.len() - 1;
        let mut activation = input;
        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activation);
            activation = if l == last {
                softmax_rows(z)
            } else {
                z.mapv(relu)
            };
        }
        activation
    }

    /// Training pass with dropout; returns batch-mean gradients and summed loss
    fn backprop(
        &self,
        input: &Array2<f64>,
        targets: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> (Gradients, f64) {
        let last = self.layers.len() - 1;
        let mut activations: Vec<Array2<f64>> = vec![input.clone()];
        // d(activation)/d(z) per hidden layer, including the dropout mask
        let mut derivatives: Vec<Array2<f64>> = Vec::with_capacity(last);

        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[l]);
            if l == last {
                activations.push(softmax_rows(z));
                continue;
            }

            let keep = 1.0 - layer.dropout;
            let mask = Array2::from_shape_fn(z.raw_dim(), |_| {
                if layer.dropout > 0.0 && rng.gen::<f64>() >= keep {
                    0.0
                } else {
                    1.0 / keep
                }
            });
            let derivative = Zip::from(&z)
                .and(&mask)
                .map_collect(|&v, &m| if v > 0.0 { m } else { 0.0 });
            activations.push(z.mapv(relu) * &mask);
            derivatives.push(derivative);
        }

        // Softmax with cross-entropy: dL/dz = p - onehot
        let mut delta = activations[last + 1].clone();
        let mut loss = 0.0;
        for (row, &target) in targets.iter().enumerate() {
            loss -= delta[[row, target]].max(LOSS_EPSILON).ln();
            delta[[row, target]] -= 1.0;
        }

        let scale = 1.0 / targets.len() as f64;
        let mut layers = Vec::with_capacity(self.layers.len());
        for l in (0..=last).rev() {
            layers.push(LayerGradient {
                weights: delta.t().dot(&activations[l]) * scale,
                biases: delta.sum_axis(Axis(0)) * scale,
            });
            if l > 0 {
                delta = delta.dot(&self.layers[l].weights) * &derivatives[l - 1];
            }
        }
        layers.reverse();

        (Gradients { layers }, loss)
    }

    fn accuracy(&self, data: &Array2<f64>, targets: &[usize], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let probs = self.forward(data.select(Axis(0), indices));
        let correct = probs
            .rows()
            .into_iter()
            .zip(indices)
            .filter(|(row, i)| argmax(row.iter().copied()).0 == targets[**i])
            .count();
        correct as f64 / indices.len() as f64
    }

    /// Check persisted weights match the fixed topology and are finite
    pub(crate) fn validate(&self) -> Result<(), QualityError> {
        let widths = layer_widths();

        if self.layers.len() != widths.len() - 1 {
            return Err(QualityError::ArtifactError(format!(
                "classifier has {} layers, expected {}",
                self.layers.len(),
                widths.len() - 1
            )));
        }

        for (l, (layer, pair)) in self.layers.iter().zip(widths.windows(2)).enumerate() {
            let shape_ok =
                layer.weights.dim() == (pair[1], pair[0]) && layer.biases.len() == pair[1];
            if !shape_ok {
                return Err(QualityError::ArtifactError(format!(
                    "classifier layer {l} has unexpected shape"
                )));
            }
            let finite = layer.weights.iter().chain(layer.biases.iter()).all(|v| v.is_finite());
            if !finite {
                return Err(QualityError::ArtifactError(format!(
                    "classifier layer {l} contains non-finite weights"
                )));
            }
        }
        Ok(())
    }

    /// Output layer that produces NaN probabilities for every input
    #[cfg(test)]
    pub(crate) fn with_corrupt_output_layer(mut self) -> Self {
        if let Some(layer) = self.layers.last_mut() {
            layer.biases.fill(f64::NAN);
        }
        self
    }
}

#[derive(Debug, Clone)]
struct LayerGradient {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

#[derive(Debug, Clone)]
struct Gradients {
    layers: Vec<LayerGradient>,
}

impl Gradients {
    fn zeros_like(layers: &[DenseLayer]) -> Self {
        Self {
            layers: layers
                .iter()
                .map(|l| LayerGradient {
                    weights: Array2::zeros(l.weights.raw_dim()),
                    biases: Array1::zeros(l.biases.raw_dim()),
                })
                .collect(),
        }
    }
}

/// Adam optimiser state
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    first_moment: Gradients,
    second_moment: Gradients,
}

impl Adam {
    fn new(layers: &[DenseLayer], learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            first_moment: Gradients::zeros_like(layers),
            second_moment: Gradients::zeros_like(layers),
        }
    }

    fn step(&mut self, layers: &mut [DenseLayer], grads: &Gradients) {
        self.step += 1;
        let step = AdamStep {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            lr_t: self.learning_rate * (1.0 - self.beta2.powi(self.step)).sqrt()
                / (1.0 - self.beta1.powi(self.step)),
        };

        for (l, layer) in layers.iter_mut().enumerate() {
            let g = &grads.layers[l];
            let m = &mut self.first_moment.layers[l];
            let v = &mut self.second_moment.layers[l];

            step.apply(&mut layer.weights, &g.weights, &mut m.weights, &mut v.weights);
            step.apply(&mut layer.biases, &g.biases, &mut m.biases, &mut v.biases);
        }
    }
}

/// Bias-corrected hyperparameters for one Adam update
struct AdamStep {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    lr_t: f64,
}

impl AdamStep {
    fn apply<D: Dimension>(
        &self,
        params: &mut Array<f64, D>,
        grads: &Array<f64, D>,
        first: &mut Array<f64, D>,
        second: &mut Array<f64, D>,
    ) {
        Zip::from(params)
            .and(grads)
            .and(first)
            .and(second)
            .for_each(|p, &g, m, v| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                *p -= self.lr_t * *m / (v.sqrt() + self.epsilon);
            });
    }
}

fn layer_widths() -> Vec<usize> {
    let mut widths = vec![FEATURE_COUNT];
    widths.extend_from_slice(&HIDDEN_LAYERS);
    widths.push(OUTPUT_CLASSES);
    widths
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

/// Numerically stable softmax applied to each row
fn softmax_rows(mut z: Array2<f64>) -> Array2<f64> {
    for mut row in z.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    z
}

fn argmax(values: impl Iterator<Item = f64>) -> (usize, f64) {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn never() -> bool {
        false
    }

    /// Four well-separated clusters, one per category
    fn clustered_data() -> (Vec<[f64; FEATURE_COUNT]>, Vec<QualityCategory>) {
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for (c, category) in QualityCategory::ALL.iter().enumerate() {
            let center = 1.5 - c as f64;
            for k in 0..15 {
                let jitter = (k as f64 - 7.0) * 0.02;
                inputs.push([center + jitter, -center, center, 0.0, 0.0, center, jitter, -jitter]);
                labels.push(*category);
            }
        }
        (inputs, labels)
    }

    #[test]
    fn test_default_model_is_well_formed() {
        let classifier = Classifier::default();
        assert!(!classifier.is_trained());
        assert!(classifier.validate().is_ok());

        let probs = classifier.probabilities(&[0.0; FEATURE_COUNT]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);

        let (_, confidence) = classifier.predict(&[1.0, -2.0, 0.5, 1.0, 0.0, 0.3, 2.0, 1.0]).unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn test_seeded_initialisation_is_deterministic() {
        assert_eq!(Classifier::new(7), Classifier::new(7));
        assert_ne!(Classifier::new(7), Classifier::new(8));
    }

    #[test]
    fn test_fit_learns_separable_clusters() {
        let (inputs, labels) = clustered_data();
        let mut classifier = Classifier::default();
        let options = FitOptions {
            epochs: 150,
            batch_size: 8,
            learning_rate: 0.01,
            ..Default::default()
        };

        let history = classifier.fit(&inputs, &labels, &options, &never).unwrap();
        assert!(classifier.is_trained());
        assert_eq!(history.epochs_run, 150);
        assert!(history.final_loss.is_finite());
        assert!(history.train_accuracy > 0.5, "accuracy {}", history.train_accuracy);
        assert!(history.validation_accuracy.is_some());
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (inputs, labels) = clustered_data();
        let options = FitOptions {
            epochs: 5,
            ..Default::default()
        };

        let mut first = Classifier::default();
        let mut second = Classifier::default();
        first.fit(&inputs, &labels, &options, &never).unwrap();
        second.fit(&inputs, &labels, &options, &never).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_cancelled() {
        let (inputs, labels) = clustered_data();
        let mut classifier = Classifier::default();
        let result = classifier.fit(&inputs, &labels, &FitOptions::default(), &|| true);
        assert!(matches!(
            result,
            Err(QualityError::Cancelled { epochs_completed: 0 })
        ));
    }

    #[test]
    fn test_fit_rejects_mismatched_labels() {
        let mut classifier = Classifier::default();
        let result = classifier.fit(
            &[[0.0; FEATURE_COUNT]],
            &[],
            &FitOptions::default(),
            &never,
        );
        assert!(matches!(result, Err(QualityError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_corrupt_weights() {
        let mut classifier = Classifier::default();
        classifier.layers[1].weights[[0, 3]] = f64::NAN;
        assert!(classifier.validate().is_err());

        let mut classifier = Classifier::default();
        classifier.layers.pop();
        assert!(classifier.validate().is_err());
    }

    #[test]
    fn test_softmax_is_stable() {
        let probs = softmax_rows(array![[1000.0, 1000.0, -1000.0, 0.0]]);
        assert!((probs[[0, 0]] - 0.5).abs() < 1e-9);
        assert!(probs.iter().all(|p| p.is_finite()));
    }
}
