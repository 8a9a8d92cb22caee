#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

//! PhishGuard training stack: dataset loading, stratified hold-out, feature
//! scaling, tree ensembles and logistic regression, evaluation, model selection
//! and artifact persistence.

/// CSV dataset loading.
#[path = "../dataset.rs"]
pub mod dataset;

/// Label canonicalisation.
#[path = "../labels.rs"]
pub mod labels;

/// Seeded stratified train/test split.
#[path = "../split.rs"]
pub mod split;

/// Standardization fitted on training rows.
#[path = "../scaler.rs"]
pub mod scaler;

/// Classifier implementations.
#[path = "../models/main.rs"]
pub mod models;

/// Test-set metrics.
#[path = "../evaluation.rs"]
pub mod evaluation;

/// Best-model selection.
#[path = "../selection.rs"]
pub mod selection;

/// Artifact persistence.
#[path = "../artifacts.rs"]
pub mod artifacts;

/// Telemetry helpers for structured logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Run configuration.
#[path = "../config.rs"]
pub mod config;

/// Stage orchestration.
#[path = "../pipeline.rs"]
pub mod pipeline;

/// Console report rendering.
#[path = "../reporter.rs"]
pub mod reporter;

pub use artifacts::{ArtifactBundle, ArtifactError, ArtifactPaths, ArtifactWriter, ModelMetadata};
pub use config::PipelineConfig;
pub use dataset::{Dataset, DatasetError};
pub use evaluation::{ConfusionMatrix, EvaluationError, EvaluationRecord};
pub use models::{Classifier, ModelError, ModelKind, ModelSuite, TrainedModel};
pub use pipeline::{FeatureImportance, TrainingOutcome, TrainingPipeline};
pub use reporter::TrainingReport;
pub use scaler::{ScalerError, ScalerState};
pub use split::{train_test_split, Split, SplitConfig, SplitError, TestSet, TrainSet};
pub use telemetry::{TrainingTelemetry, TrainingTelemetryBuilder};
