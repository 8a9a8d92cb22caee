use std::fmt::Write as _;

use crate::{evaluation::EvaluationRecord, pipeline::TrainingOutcome};

/// Number of features listed in the importance ranking.
pub const TOP_FEATURES: usize = 10;

/// Renders a finished run for humans.
#[derive(Debug, Clone, Copy)]
pub struct TrainingReport<'a> {
    outcome: &'a TrainingOutcome,
}

impl<'a> TrainingReport<'a> {
    /// Wraps an outcome for rendering.
    #[must_use]
    pub const fn new(outcome: &'a TrainingOutcome) -> Self {
        Self { outcome }
    }

    /// Renders a concise one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let outcome = self.outcome;
        match outcome.winner_record() {
            Some(record) => format!(
                "[phishguard] winner={} accuracy={} f1={} train={} test={}",
                record.model,
                percent(record.accuracy),
                percent(record.f1),
                outcome.training_samples,
                outcome.testing_samples
            ),
            None => format!("[phishguard] winner={} (unscored)", outcome.winner),
        }
    }

    /// Renders the full multi-section report.
    #[must_use]
    pub fn render(&self) -> String {
        let outcome = self.outcome;
        let mut out = String::new();
        let (rows, columns) = outcome.dataset_shape;

        heading(&mut out, "Dataset");
        let _ = writeln!(out, "Shape: {rows} rows x {columns} columns");
        let _ = writeln!(out, "Class distribution:");
        for (label, count) in &outcome.class_distribution {
            let _ = writeln!(out, "  {label:>6}: {count}");
        }
        let _ = writeln!(
            out,
            "Features ({}): {}",
            outcome.feature_names.len(),
            outcome.feature_names.join(", ")
        );
        let _ = writeln!(out, "Phishing samples: {}", outcome.phishing);
        let _ = writeln!(out, "Legitimate samples: {}", outcome.legitimate);
        let _ = writeln!(out, "Training set: {} samples", outcome.training_samples);
        let _ = writeln!(out, "Test set: {} samples", outcome.testing_samples);

        heading(&mut out, "Models");
        for record in &outcome.evaluations {
            write_record(&mut out, record);
        }

        heading(&mut out, "Selection");
        match outcome.winner_record() {
            Some(record) => {
                let _ = writeln!(
                    out,
                    "Best model: {} (accuracy {})",
                    record.model,
                    percent(record.accuracy)
                );
            }
            None => {
                let _ = writeln!(out, "Best model: {}", outcome.winner);
            }
        }
        let _ = writeln!(out, "Artifacts:");
        for path in outcome.artifacts.all() {
            let _ = writeln!(out, "  {}", path.display());
        }

        if !outcome.importances.is_empty() {
            heading(
                &mut out,
                &format!("Top {} features", TOP_FEATURES.min(outcome.importances.len())),
            );
            for (rank, item) in outcome.importances.iter().take(TOP_FEATURES).enumerate() {
                let _ = writeln!(
                    out,
                    "{:>2}. {:<32} {:.4}",
                    rank + 1,
                    item.feature,
                    item.importance
                );
            }
        }
        out
    }
}

fn heading(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "== {title} ==");
}

fn write_record(out: &mut String, record: &EvaluationRecord) {
    let cm = record.confusion;
    let _ = writeln!(out, "{}", record.model);
    let _ = writeln!(out, "  Accuracy:  {}", percent(record.accuracy));
    let _ = writeln!(out, "  Precision: {}", percent(record.precision));
    let _ = writeln!(out, "  Recall:    {}", percent(record.recall));
    let _ = writeln!(out, "  F1 score:  {}", percent(record.f1));
    let _ = writeln!(
        out,
        "  Confusion: TN={} FP={} FN={} TP={}",
        cm.tn, cm.fp, cm.fn_, cm.tp
    );
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::{ArtifactPaths, ModelMetadata},
        evaluation::ConfusionMatrix,
        models::ModelKind,
        pipeline::FeatureImportance,
    };
    use indexmap::IndexMap;
    use std::path::Path;

    fn outcome() -> TrainingOutcome {
        let evaluations: Vec<EvaluationRecord> = [
            (ModelKind::RandomForest, 17),
            (ModelKind::GradientBoosting, 18),
            (ModelKind::LogisticRegression, 16),
        ]
        .into_iter()
        .map(|(kind, tp)| {
            EvaluationRecord::from_confusion(
                kind,
                ConfusionMatrix {
                    tn: 8,
                    fp: 0,
                    fn_: 20 - tp,
                    tp,
                },
            )
        })
        .collect();
        let feature_names: Vec<String> = (0..12).map(|idx| format!("f{idx}")).collect();
        let importances = feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| FeatureImportance {
                feature: name.clone(),
                importance: 1.0 / (idx + 1) as f64,
            })
            .collect();
        let metadata =
            ModelMetadata::from_record(&evaluations[1], 112, 28, &feature_names);
        TrainingOutcome {
            dataset_shape: (140, 14),
            class_distribution: IndexMap::from([("1".to_string(), 84), ("-1".to_string(), 56)]),
            feature_names,
            phishing: 84,
            legitimate: 56,
            training_samples: 112,
            testing_samples: 28,
            evaluations,
            winner: ModelKind::GradientBoosting,
            importances,
            metadata,
            artifacts: ArtifactPaths::in_dir(Path::new("out")),
        }
    }

    #[test]
    fn report_lists_every_section() {
        let outcome = outcome();
        let text = TrainingReport::new(&outcome).render();
        assert!(text.contains("Shape: 140 rows x 14 columns"));
        assert!(text.contains("Phishing samples: 84"));
        assert!(text.contains("Legitimate samples: 56"));
        assert!(text.contains("Confusion: TN=8 FP=0 FN=2 TP=18"));
        assert!(text.contains("Best model: GradientBoosting (accuracy 92.86%)"));
        assert!(text.contains("phishguard_model.pkl"));
        assert!(text.contains("== Top 10 features =="));
        assert!(text.contains(" 1. f0 "));
        assert!(text.contains("10. f9 "));
        assert!(!text.contains("11. f10"));
    }

    #[test]
    fn report_omits_ranking_without_importances() {
        let mut outcome = outcome();
        outcome.importances.clear();
        let text = TrainingReport::new(&outcome).render();
        assert!(!text.contains("Top"));
    }

    #[test]
    fn summary_is_single_line() {
        let outcome = outcome();
        let summary = TrainingReport::new(&outcome).summary();
        assert_eq!(
            summary,
            "[phishguard] winner=GradientBoosting accuracy=92.86% f1=94.74% train=112 test=28"
        );
    }
}
