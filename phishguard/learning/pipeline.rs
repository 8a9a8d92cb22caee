//! End-to-end training run: load, split, scale, train, evaluate, select, persist.

use anyhow::{Context, Result};
use chrono::Utc;
use indexmap::IndexMap;
use ndarray::{Array2, ArrayView2};
use phishguard_logging::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    artifacts::{ArtifactPaths, ArtifactWriter, ModelMetadata},
    config::PipelineConfig,
    dataset::Dataset,
    evaluation::EvaluationRecord,
    labels::{count_positive, normalize_labels},
    models::{Classifier, ModelKind, ModelSuite, TrainedModel},
    scaler::ScalerState,
    selection::select_best,
    split::{train_test_split, Split},
    telemetry::{emit, TrainingTelemetry},
};

/// One feature and its importance in the winning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Feature column name.
    pub feature: String,
    /// Normalized importance.
    pub importance: f64,
}

/// Everything a run produced, for reporting.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// `(rows, columns)` of the input table.
    pub dataset_shape: (usize, usize),
    /// Raw label counts, most frequent first.
    pub class_distribution: IndexMap<String, usize>,
    /// Feature names in column order.
    pub feature_names: Vec<String>,
    /// Rows labelled 1 after normalization.
    pub phishing: usize,
    /// Rows labelled 0 after normalization.
    pub legitimate: usize,
    /// Training rows.
    pub training_samples: usize,
    /// Test rows.
    pub testing_samples: usize,
    /// Per-model scores in training order.
    pub evaluations: Vec<EvaluationRecord>,
    /// Selected model family.
    pub winner: ModelKind,
    /// Winner importances, highest first; empty for models without them.
    pub importances: Vec<FeatureImportance>,
    /// Metadata as persisted.
    pub metadata: ModelMetadata,
    /// Written files.
    pub artifacts: ArtifactPaths,
}

impl TrainingOutcome {
    /// Scores of the selected model.
    #[must_use]
    pub fn winner_record(&self) -> Option<&EvaluationRecord> {
        self.evaluations
            .iter()
            .find(|record| record.model == self.winner)
    }
}

/// Training pipeline orchestrator.
#[derive(Debug, Default)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    telemetry: Option<TrainingTelemetry>,
}

impl TrainingPipeline {
    /// Creates a pipeline for the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks for structured logging.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: TrainingTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. Artifacts are written only after all three models
    /// trained and were scored.
    pub fn run(&self) -> Result<TrainingOutcome> {
        let telemetry = self.telemetry.as_ref();
        let path = &self.config.dataset_path;
        let dataset = Dataset::from_path(path)
            .with_context(|| format!("loading dataset {}", path.display()))?;
        emit(
            telemetry,
            LogLevel::Info,
            "dataset_loaded",
            json!({
                "path": path.display().to_string(),
                "rows": dataset.n_rows(),
                "columns": dataset.shape().1,
                "features": dataset.n_features(),
                "class_distribution": dataset.class_distribution(),
            }),
        );
        self.run_on(&dataset)
    }

    /// Runs every stage after loading, on an in-memory dataset.
    pub fn run_on(&self, dataset: &Dataset) -> Result<TrainingOutcome> {
        let telemetry = self.telemetry.as_ref();
        let labels = normalize_labels(dataset.raw_labels());
        let phishing = count_positive(&labels);

        let split = train_test_split(dataset.features(), &labels, &self.config.split)
            .context("splitting dataset")?;
        emit(
            telemetry,
            LogLevel::Info,
            "split_complete",
            json!({
                "train": split.train.len(),
                "test": split.test.len(),
                "test_size": self.config.split.test_size,
                "seed": self.config.split.seed,
            }),
        );

        let scaler = ScalerState::fit(&split.train).context("fitting feature scaler")?;
        let scaled = ScaledViews::new(&split, &scaler)?;

        let (models, evaluations) =
            train_and_evaluate(&self.config.models, &split, &scaled, telemetry)?;
        let winner_idx = select_best(&evaluations).context("no model was evaluated")?;
        let winner = &evaluations[winner_idx];
        emit(
            telemetry,
            LogLevel::Info,
            "model_selected",
            json!({ "model": winner.model.name(), "accuracy": winner.accuracy }),
        );

        let metadata = ModelMetadata::from_record(
            winner,
            split.train.len(),
            split.test.len(),
            dataset.feature_names(),
        );
        let winning_model = &models[winner_idx];
        let writer = ArtifactWriter::new(&self.config.output_dir);
        let artifacts = writer
            .write(winning_model, &scaler, dataset.feature_names(), &metadata)
            .with_context(|| format!("writing artifacts to {}", writer.dir().display()))?;
        emit(
            telemetry,
            LogLevel::Info,
            "artifacts_written",
            json!({ "dir": writer.dir().display().to_string() }),
        );

        let importances = winning_model
            .feature_importances()
            .map(|values| rank_importances(dataset.feature_names(), &values.to_vec()))
            .unwrap_or_default();

        Ok(TrainingOutcome {
            dataset_shape: dataset.shape(),
            class_distribution: dataset.class_distribution(),
            feature_names: dataset.feature_names().to_vec(),
            phishing,
            legitimate: labels.len() - phishing,
            training_samples: split.train.len(),
            testing_samples: split.test.len(),
            winner: winner.model,
            evaluations,
            importances,
            metadata,
            artifacts,
        })
    }
}

/// Standardized copies of both partitions, for the models that want them.
struct ScaledViews {
    train: Array2<f64>,
    test: Array2<f64>,
}

impl ScaledViews {
    fn new(split: &Split, scaler: &ScalerState) -> Result<Self> {
        Ok(Self {
            train: scaler
                .transform(split.train.features())
                .context("scaling training features")?,
            test: scaler
                .transform(split.test.features())
                .context("scaling test features")?,
        })
    }
}

/// Fits every configured model in order and scores it on the test rows.
fn train_and_evaluate(
    suite: &ModelSuite,
    split: &Split,
    scaled: &ScaledViews,
    telemetry: Option<&TrainingTelemetry>,
) -> Result<(Vec<TrainedModel>, Vec<EvaluationRecord>)> {
    let mut models = Vec::with_capacity(ModelKind::ALL.len());
    let mut evaluations = Vec::with_capacity(ModelKind::ALL.len());
    for kind in ModelKind::ALL {
        let (train_x, test_x): (ArrayView2<'_, f64>, ArrayView2<'_, f64>) =
            if kind.uses_scaled_features() {
                (scaled.train.view(), scaled.test.view())
            } else {
                (split.train.features(), split.test.features())
            };

        emit(
            telemetry,
            LogLevel::Info,
            "model_training",
            json!({ "model": kind.name(), "scaled": kind.uses_scaled_features() }),
        );
        let started = Utc::now();
        let mut model = suite.build(kind);
        model
            .fit(train_x, split.train.labels())
            .with_context(|| format!("training {kind}"))?;
        if let TrainedModel::LogisticRegression(inner) = &model {
            if !inner.converged() {
                emit(
                    telemetry,
                    LogLevel::Warn,
                    "solver_not_converged",
                    json!({ "model": kind.name(), "max_iter": inner.config().max_iter }),
                );
            }
        }
        emit(
            telemetry,
            LogLevel::Info,
            "model_trained",
            json!({
                "model": kind.name(),
                "duration_ms": (Utc::now() - started).num_milliseconds(),
            }),
        );

        let predictions = model
            .predict(test_x)
            .with_context(|| format!("predicting with {kind}"))?;
        let record = EvaluationRecord::evaluate(kind, split.test.labels(), &predictions)
            .with_context(|| format!("evaluating {kind}"))?;
        if !record.undefined.is_empty() {
            emit(
                telemetry,
                LogLevel::Warn,
                "metric_zero_division",
                json!({ "model": kind.name(), "metrics": record.undefined }),
            );
        }
        emit(
            telemetry,
            LogLevel::Info,
            "model_evaluated",
            json!({
                "model": kind.name(),
                "accuracy": record.accuracy,
                "precision": record.precision,
                "recall": record.recall,
                "f1": record.f1,
                "confusion": record.confusion,
            }),
        );
        models.push(model);
        evaluations.push(record);
    }
    Ok((models, evaluations))
}

/// Pairs names with importances, highest first.
#[must_use]
pub fn rank_importances(names: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance: *importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactBundle, FEATURE_NAMES_FILE, METADATA_FILE};
    use phishguard_logging::LogRecord;
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use serde_json::Value;
    use std::{fmt::Write as _, fs, path::Path};
    use tempfile::tempdir;

    /// 100 rows, `Index`, five features, `class` with 60 x 1 and 40 x -1.
    fn write_synthetic_csv(path: &Path) {
        let mut rng = SmallRng::seed_from_u64(2024);
        let mut csv = String::from("Index,f1,f2,f3,f4,f5,class\n");
        for row in 0..100 {
            let label = if row % 5 < 3 { 1 } else { -1 };
            let signal = f64::from(label);
            let values: Vec<String> = (0..5)
                .map(|col| {
                    let noise: f64 = rng.gen_range(-1.0..1.0);
                    let value = if col < 2 { signal * 1.5 + noise } else { noise * 3.0 };
                    format!("{value:.4}")
                })
                .collect();
            writeln!(csv, "{row},{},{label}", values.join(",")).unwrap();
        }
        fs::write(path, csv).unwrap();
    }

    fn small_suite() -> ModelSuite {
        let mut suite = ModelSuite::default();
        suite.forest.n_estimators = 25;
        suite.boosting.n_estimators = 20;
        suite
    }

    #[test]
    fn end_to_end_synthetic_run() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("phishing.csv");
        write_synthetic_csv(&csv_path);
        let out = dir.path().join("out");
        let log_path = dir.path().join("train.log");

        let mut config = PipelineConfig::default()
            .with_dataset(&csv_path)
            .with_output_dir(&out);
        config.models = small_suite();
        let telemetry = TrainingTelemetry::builder("learning")
            .log_path(&log_path)
            .build()
            .unwrap();
        let outcome = TrainingPipeline::new(config)
            .with_telemetry(telemetry)
            .run()
            .unwrap();

        assert_eq!(outcome.dataset_shape, (100, 7));
        assert_eq!((outcome.phishing, outcome.legitimate), (60, 40));
        assert_eq!(outcome.training_samples, 80);
        assert_eq!(outcome.testing_samples, 20);
        assert_eq!(outcome.evaluations.len(), 3);
        let kinds: Vec<ModelKind> = outcome.evaluations.iter().map(|r| r.model).collect();
        assert_eq!(kinds, ModelKind::ALL.to_vec());
        for record in &outcome.evaluations {
            let cm = record.confusion;
            assert_eq!(cm.total(), 20);
            assert_eq!(cm.tp + cm.fn_, 12);
            assert_eq!(cm.tn + cm.fp, 8);
            assert_eq!(record.accuracy, (cm.tp + cm.tn) as f64 / 20.0);
        }
        let best = outcome
            .evaluations
            .iter()
            .map(|record| record.accuracy)
            .fold(f64::MIN, f64::max);
        assert_eq!(outcome.winner_record().unwrap().accuracy, best);

        let metadata: Value =
            serde_json::from_str(&fs::read_to_string(out.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(metadata["training_samples"], 80);
        assert_eq!(metadata["testing_samples"], 20);
        assert_eq!(metadata["model_type"], outcome.winner.name());
        assert_eq!(metadata["features"], json!(["f1", "f2", "f3", "f4", "f5"]));

        let names: Vec<String> =
            serde_json::from_str(&fs::read_to_string(out.join(FEATURE_NAMES_FILE)).unwrap())
                .unwrap();
        assert_eq!(names, outcome.feature_names);

        let bundle = ArtifactBundle::load(&out).unwrap();
        assert_eq!(bundle.model.kind(), outcome.winner);
        assert_eq!(bundle.scaler.n_features(), 5);
        assert_eq!(bundle.scaler.n_samples_seen(), 80);

        let log = fs::read_to_string(&log_path).unwrap();
        let events: Vec<String> = log
            .lines()
            .map(|line| serde_json::from_str::<LogRecord>(line).unwrap().message)
            .collect();
        assert_eq!(events.first().map(String::as_str), Some("dataset_loaded"));
        assert_eq!(events.iter().filter(|e| *e == "model_evaluated").count(), 3);
        assert_eq!(events.last().map(String::as_str), Some("artifacts_written"));
    }

    #[test]
    fn end_to_end_with_configured_model_table() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("phishing.csv");
        write_synthetic_csv(&csv_path);
        let out = dir.path().join("out");
        let config = PipelineConfig::default()
            .with_dataset(&csv_path)
            .with_output_dir(&out);
        assert_eq!(config.models, ModelSuite::default());

        let dataset = Dataset::from_path(&csv_path).unwrap();
        let labels = normalize_labels(dataset.raw_labels());
        let split = train_test_split(dataset.features(), &labels, &config.split).unwrap();
        let scaler = ScalerState::fit(&split.train).unwrap();
        let scaled = ScaledViews::new(&split, &scaler).unwrap();
        let (models, evaluations) =
            train_and_evaluate(&config.models, &split, &scaled, None).unwrap();
        assert_eq!(evaluations.len(), 3);
        for model in &models {
            match model {
                TrainedModel::RandomForest(forest) => assert_eq!(forest.trees().len(), 200),
                TrainedModel::GradientBoosting(boosting) => {
                    assert_eq!(boosting.stages().len(), 100);
                }
                TrainedModel::LogisticRegression(logistic) => {
                    assert!(logistic.n_iter() <= 1000);
                }
            }
        }

        let outcome = TrainingPipeline::new(config).run().unwrap();
        assert_eq!(outcome.evaluations, evaluations);
        assert_eq!(outcome.metadata.training_samples, 80);
        assert_eq!(outcome.metadata.testing_samples, 20);
        let bundle = ArtifactBundle::load(&out).unwrap();
        assert_eq!(bundle.model, models[select_best(&evaluations).unwrap()]);
    }

    #[test]
    fn split_is_reproducible_across_runs() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("phishing.csv");
        write_synthetic_csv(&csv_path);
        let dataset = Dataset::from_path(&csv_path).unwrap();
        let labels = normalize_labels(dataset.raw_labels());
        let config = PipelineConfig::default();
        let first = train_test_split(dataset.features(), &labels, &config.split).unwrap();
        let second = train_test_split(dataset.features(), &labels, &config.split).unwrap();
        assert_eq!(first.test.indices(), second.test.indices());
        assert_eq!(first.train.indices(), second.train.indices());
    }

    #[test]
    fn missing_dataset_aborts_before_writing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let config = PipelineConfig::default()
            .with_dataset(dir.path().join("absent.csv"))
            .with_output_dir(&out);
        let err = TrainingPipeline::new(config).run().unwrap_err();
        assert!(format!("{err:#}").contains("loading dataset"));
        assert!(!out.exists());
    }

    #[test]
    fn degenerate_labels_abort_before_writing() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("phishing.csv");
        fs::write(&csv_path, "a,class\n1,1\n2,-1\n3,-1\n4,-1\n5,-1\n").unwrap();
        let out = dir.path().join("out");
        let config = PipelineConfig::default()
            .with_dataset(&csv_path)
            .with_output_dir(&out);
        let err = TrainingPipeline::new(config).run().unwrap_err();
        assert!(format!("{err:#}").contains("too few"));
        assert!(!out.exists());
    }

    #[test]
    fn importances_rank_highest_first() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = rank_importances(&names, &[0.2, 0.5, 0.3]);
        let order: Vec<&str> = ranked.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }
}
