use crate::evaluation::EvaluationRecord;

/// Index of the record with the highest accuracy. A later record must be
/// strictly better to replace an earlier one, so ties go to the first model
/// in training order. `None` for an empty slice.
#[must_use]
pub fn select_best(records: &[EvaluationRecord]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, record) in records.iter().enumerate() {
        match best {
            Some(current) if record.accuracy <= records[current].accuracy => {}
            _ => best = Some(idx),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ConfusionMatrix;
    use crate::models::ModelKind;

    fn record(model: ModelKind, correct: usize) -> EvaluationRecord {
        EvaluationRecord::from_confusion(
            model,
            ConfusionMatrix {
                tn: correct / 2,
                fp: (20 - correct) / 2,
                fn_: 20 - correct - (20 - correct) / 2,
                tp: correct - correct / 2,
            },
        )
    }

    #[test]
    fn picks_highest_accuracy() {
        let records = vec![
            record(ModelKind::RandomForest, 15),
            record(ModelKind::GradientBoosting, 19),
            record(ModelKind::LogisticRegression, 17),
        ];
        assert_eq!(select_best(&records), Some(1));
    }

    #[test]
    fn ties_go_to_first_configured_model() {
        let records = vec![
            record(ModelKind::RandomForest, 18),
            record(ModelKind::GradientBoosting, 18),
            record(ModelKind::LogisticRegression, 18),
        ];
        assert_eq!(select_best(&records), Some(0));

        let later_tie = vec![
            record(ModelKind::RandomForest, 12),
            record(ModelKind::GradientBoosting, 18),
            record(ModelKind::LogisticRegression, 18),
        ];
        assert_eq!(select_best(&later_tie), Some(1));
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert_eq!(select_best(&[]), None);
    }
}
