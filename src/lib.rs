//! gazeqc - Quality triage for clinical gaze-tracking tests
//!
//! gazeqc turns one recorded gaze-tracking test into a quality verdict through a
//! deterministic pipeline: record adaptation → feature extraction → scaling →
//! classification and anomaly scoring → clinical narrative.
//!
//! ## Modules
//!
//! - **Inference**: [`Predictor`] loads a model artifact and scores test records
//! - **Training**: [`TrainingLoop`] fits and publishes a new artifact from a
//!   labeled corpus; [`evaluate`] measures accuracy against one

pub mod anomaly;
pub mod artifact;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod normalizer;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod scoring;
pub mod training;
pub mod types;

pub use artifact::ModelArtifact;
pub use config::QualityConfig;
pub use error::QualityError;
pub use evaluation::EvaluationComposer;
pub use features::FeatureExtractor;
pub use pipeline::Predictor;
pub use repository::{InMemoryRepository, TestRecordRepository};
pub use training::{evaluate, CancellationToken, TrainingConfig, TrainingLoop};
pub use types::{PredictionResult, QualityCategory, TestRecord};

// Schema exports
pub use schema::{RawRecordAdapter, RawTestRecord, SCHEMA_VERSION};

/// gazeqc version recorded by the CLI
pub const GAZEQC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "gazeqc";
