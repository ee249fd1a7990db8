use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{Outcome, OutcomeProbabilities};
use crate::services::features::{Feature, TeamCodes};
use crate::services::forest::RandomForest;

pub const MODEL_KIND: &str = "RandomForestClassifier";

/// Outcomes a model learned to emit, in class-index order.
///
/// A training window without draws yields a two-class model; callers branch
/// on this instead of on the width of the probability vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "outcomes", rename_all = "snake_case")]
pub enum ClassSet {
    /// Loss, Draw and Win
    Ternary,
    /// Proper subset of outcomes, ascending by target code
    Partial(Vec<Outcome>),
}

impl ClassSet {
    pub fn from_observed(targets: &[Outcome]) -> Self {
        let seen: BTreeSet<Outcome> = targets.iter().copied().collect();
        if seen.len() == Outcome::ALL.len() {
            ClassSet::Ternary
        } else {
            ClassSet::Partial(seen.into_iter().collect())
        }
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        match self {
            ClassSet::Ternary => Outcome::ALL.to_vec(),
            ClassSet::Partial(outcomes) => outcomes.clone(),
        }
    }

    pub fn index_of(&self, outcome: Outcome) -> Option<usize> {
        match self {
            ClassSet::Ternary => Some(outcome.target() as usize),
            ClassSet::Partial(outcomes) => outcomes.iter().position(|&o| o == outcome),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ClassSet::Ternary => Outcome::ALL.len(),
            ClassSet::Partial(outcomes) => outcomes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fitted classifier together with everything needed to rebuild its
/// inputs: column order, class set and the team-code table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub features: Vec<Feature>,
    pub classes: ClassSet,
    pub team_codes: TeamCodes,
    pub training_window: usize,
    pub forest: RandomForest,
}

impl TrainedModel {
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    /// Classifier output mapped onto W/D/L; outcomes outside the class set
    /// get probability 0.
    pub fn outcome_probabilities(&self, vector: &[f64]) -> OutcomeProbabilities {
        let raw = self.forest.predict_proba(vector);
        let mut probabilities = OutcomeProbabilities {
            win: 0.0,
            draw: 0.0,
            loss: 0.0,
        };
        for (outcome, p) in self.classes.outcomes().into_iter().zip(raw) {
            probabilities.set(outcome, p);
        }
        probabilities
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).with_context(|| format!("writing model to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading model from {}", path.display()))?;
        let model: TrainedModel = serde_json::from_str(&json)
            .with_context(|| format!("parsing model file {}", path.display()))?;
        if model.classes.is_empty() || model.team_codes.is_empty() {
            anyhow::bail!("model file {} has no classes or team codes", path.display());
        }
        if model.forest.n_features() != model.features.len() || model.forest.n_classes() != model.classes.len() {
            anyhow::bail!(
                "model file {} is inconsistent: {} features / {} classes recorded, forest expects {} / {}",
                path.display(),
                model.features.len(),
                model.classes.len(),
                model.forest.n_features(),
                model.forest.n_classes()
            );
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Outcome::*;

    #[test]
    fn test_class_set_from_observed_targets() {
        assert_eq!(ClassSet::from_observed(&[Win, Loss, Draw, Win]), ClassSet::Ternary);

        let no_draws = ClassSet::from_observed(&[Win, Loss, Win]);
        assert_eq!(no_draws, ClassSet::Partial(vec![Loss, Win]));
        assert_eq!(no_draws.len(), 2);
        assert_eq!(no_draws.index_of(Win), Some(1));
        assert_eq!(no_draws.index_of(Draw), None);

        assert_eq!(ClassSet::Ternary.index_of(Draw), Some(1));
        assert_eq!(ClassSet::Ternary.outcomes(), vec![Loss, Draw, Win]);
    }

    #[test]
    fn test_load_rejects_model_without_team_codes() {
        use crate::services::forest::ForestParams;
        use crate::services::trainer::test_support::{cutoff, league};
        use crate::services::trainer::ModelTrainer;

        let params = ForestParams { n_trees: 5, ..ForestParams::default() };
        let (mut model, _) = ModelTrainer::new(params).train_on_histories(&league(), cutoff()).unwrap();
        let path = std::env::temp_dir().join(format!("matchcast-model-{}.json", uuid::Uuid::new_v4()));

        model.save(&path).unwrap();
        assert!(TrainedModel::load(&path).is_ok());

        model.team_codes = TeamCodes::default();
        model.save(&path).unwrap();
        let err = TrainedModel::load(&path).unwrap_err();
        assert!(err.to_string().contains("no classes or team codes"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_class_set_serializes_tagged() {
        let json = serde_json::to_value(ClassSet::Partial(vec![Loss, Win])).unwrap();
        assert_eq!(json["kind"], "partial");
        assert_eq!(json["outcomes"], serde_json::json!(["L", "W"]));
        let back: ClassSet = serde_json::from_value(serde_json::json!({"kind": "ternary"})).unwrap();
        assert_eq!(back, ClassSet::Ternary);
    }
}
