use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{PredictorError, PredictorResult};
use crate::models::{EvaluationReport, MatchRecord};
use crate::services::dataset::{self, Dataset};
use crate::services::features::{Feature, TeamCodes, TRAINING_FORM_WINDOW};
use crate::services::forest::{ForestParams, RandomForest};
use crate::services::metrics::ClassificationMetrics;
use crate::services::model::{ClassSet, TrainedModel};

pub struct ModelTrainer {
    params: ForestParams,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

/// Maps declared names to known columns, dropping duplicates. Unknown names
/// come back as `FeatureMismatch` for the caller to report.
pub fn resolve_features(names: &[String]) -> (Vec<Feature>, Vec<PredictorError>) {
    let mut features = Vec::new();
    let mut mismatches = Vec::new();
    for name in names {
        match Feature::from_name(name) {
            Some(feature) if !features.contains(&feature) => features.push(feature),
            Some(_) => {}
            None => mismatches.push(PredictorError::FeatureMismatch(name.clone())),
        }
    }
    (features, mismatches)
}

/// Timestamp plus a random suffix, so two fits in the same second differ.
fn model_version(trained_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("rf-{}-{}", trained_at.format("%Y%m%d%H%M%S"), &suffix[..8])
}

impl ModelTrainer {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }

    /// Assembles every team's history, splits at `cutoff` and trains on the
    /// default feature list.
    pub fn train_on_histories(
        &self,
        histories: &BTreeMap<String, Vec<MatchRecord>>,
        cutoff: NaiveDate,
    ) -> PredictorResult<(TrainedModel, EvaluationReport)> {
        let assembled = dataset::assemble(histories, cutoff, TRAINING_FORM_WINDOW)?;
        self.train(
            &assembled.train,
            &assembled.test,
            &Feature::default_names(),
            assembled.team_codes,
        )
    }

    /// Fits on `train` and scores on `test`. Nothing is returned on failure,
    /// so a caller's current model stays in place.
    pub fn train(
        &self,
        train: &Dataset,
        test: &Dataset,
        feature_names: &[String],
        team_codes: TeamCodes,
    ) -> PredictorResult<(TrainedModel, EvaluationReport)> {
        if train.is_empty() || test.is_empty() {
            return Err(PredictorError::InsufficientData(format!(
                "{} training rows and {} test rows",
                train.len(),
                test.len()
            )));
        }

        let (features, mismatches) = resolve_features(feature_names);
        for mismatch in &mismatches {
            tracing::warn!("Excluding feature from training: {}", mismatch);
        }
        if features.is_empty() {
            return Err(PredictorError::TrainingFailed(
                "none of the declared features are available".to_string(),
            ));
        }

        let targets = train.targets();
        let classes = ClassSet::from_observed(&targets);
        let labels: Vec<usize> = targets
            .iter()
            .map(|&t| classes.index_of(t).unwrap_or_default())
            .collect();

        tracing::info!(
            "Training {} trees on {} rows x {} features ({} classes)",
            self.params.n_trees,
            train.len(),
            features.len(),
            classes.len()
        );

        let x = train.design_matrix(&features);
        let forest = RandomForest::fit(&x, &labels, classes.len(), &self.params)
            .map_err(|e| PredictorError::TrainingFailed(e.to_string()))?;

        let trained_at = Utc::now();
        let model = TrainedModel {
            model_version: model_version(trained_at),
            trained_at,
            features,
            classes,
            team_codes,
            training_window: TRAINING_FORM_WINDOW,
            forest,
        };

        let predicted: Vec<_> = test
            .rows()
            .iter()
            .map(|row| model.outcome_probabilities(&row.inputs.vector(&model.features)).most_likely().0)
            .collect();
        let metrics = ClassificationMetrics::compute(&test.targets(), &predicted);
        tracing::info!("Model {} evaluated on held-out matches: {}", model.model_version, metrics);

        let report = EvaluationReport {
            model_version: model.model_version.clone(),
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            test_matches_count: test.len(),
            train_matches_count: train.len(),
            created_at: trained_at,
        };

        Ok((model, report))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::services::dataset::assemble;

    fn trainer() -> ModelTrainer {
        ModelTrainer::new(ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        })
    }

    #[test]
    fn test_trains_and_reports_metrics() {
        let (model, report) = trainer().train_on_histories(&league(), cutoff()).unwrap();

        assert_eq!(model.features, Feature::default_order());
        assert_eq!(model.training_window, 3);
        assert!(model.team_codes.contains("Brighton"));
        assert!(report.test_matches_count > 0);
        assert!(report.train_matches_count > 0);
        for metric in [report.accuracy, report.precision, report.recall, report.f1_score] {
            assert!(metric >= 0.0 && metric <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_back_to_back_trainings_get_distinct_versions() {
        let full = league();
        let mut truncated = league();
        for matches in truncated.values_mut() {
            matches.truncate(25);
        }

        let (a, report) = trainer().train_on_histories(&full, cutoff()).unwrap();
        let (b, _) = trainer().train_on_histories(&truncated, cutoff()).unwrap();

        assert!(a.model_version.starts_with("rf-"));
        assert_ne!(a.model_version, b.model_version);
        assert_eq!(report.model_version, a.model_version);
    }

    #[test]
    fn test_unknown_feature_names_are_excluded() {
        let assembled = assemble(&league(), cutoff(), TRAINING_FORM_WINDOW).unwrap();
        let names = vec![
            "gf_rolling".to_string(),
            "xg_rolling".to_string(),
            "venue_code".to_string(),
            "gf_rolling".to_string(),
        ];
        let (model, _) = trainer()
            .train(&assembled.train, &assembled.test, &names, assembled.team_codes)
            .unwrap();
        assert_eq!(model.feature_names(), vec!["gf_rolling", "venue_code"]);
        assert_eq!(model.forest.n_features(), 2);
    }

    #[test]
    fn test_no_usable_features_fails_training() {
        let assembled = assemble(&league(), cutoff(), TRAINING_FORM_WINDOW).unwrap();
        let result = trainer().train(
            &assembled.train,
            &assembled.test,
            &["possession".to_string()],
            assembled.team_codes,
        );
        assert!(matches!(result, Err(PredictorError::TrainingFailed(_))));
    }

    #[test]
    fn test_empty_partitions_are_insufficient_data() {
        let assembled = assemble(&league(), cutoff(), TRAINING_FORM_WINDOW).unwrap();
        let empty = Dataset::default();
        let names = Feature::default_names();

        let no_train = trainer().train(&empty, &assembled.test, &names, TeamCodes::default());
        assert!(matches!(no_train, Err(PredictorError::InsufficientData(_))));

        let no_test = trainer().train(&assembled.train, &empty, &names, TeamCodes::default());
        assert!(matches!(no_test, Err(PredictorError::InsufficientData(_))));
    }

    #[test]
    fn test_training_without_draws_records_partial_class_set() {
        let mut histories = league();
        for matches in histories.values_mut() {
            matches.retain(|m| m.result != crate::models::Outcome::Draw);
        }
        let (model, _) = trainer().train_on_histories(&histories, cutoff()).unwrap();
        assert_eq!(
            model.classes,
            ClassSet::Partial(vec![crate::models::Outcome::Loss, crate::models::Outcome::Win])
        );
        assert_eq!(model.forest.n_classes(), 2);
    }
}
