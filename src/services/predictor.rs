use chrono::NaiveDate;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::{PredictorError, PredictorResult};
use crate::models::{EvaluationReport, Fixture, ModelInfo, PredictionResult};
use crate::services::collaborators::{EvaluationSink, MatchHistory};
use crate::services::features::Feature;
use crate::services::forest::ForestParams;
use crate::services::inference::{self, INFERENCE_FORM_WINDOW};
use crate::services::model::{TrainedModel, MODEL_KIND};
use crate::services::trainer::ModelTrainer;

/// Owns the current model and serves predictions from it.
///
/// Predictions take a cheap `Arc` snapshot of the model, so a retrain never
/// blocks them and they never observe a half-installed model. Retrains are
/// serialized; a failed retrain leaves the previous model in place.
pub struct PredictionService {
    model: RwLock<Option<Arc<TrainedModel>>>,
    training: Mutex<()>,
    params: ForestParams,
    cutoff: NaiveDate,
}

impl PredictionService {
    pub fn new(params: ForestParams, cutoff: NaiveDate) -> Self {
        Self {
            model: RwLock::new(None),
            training: Mutex::new(()),
            params,
            cutoff,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.forest, settings.train_cutoff)
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn install(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let model = Arc::new(model);
        *self.model.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&model));
        tracing::info!("Installed model {}", model.model_version);
        model
    }

    pub fn model_info(&self) -> ModelInfo {
        match self.snapshot() {
            Some(model) => ModelInfo {
                is_trained: true,
                feature_names: model.feature_names(),
                model_kind: MODEL_KIND.to_string(),
                classes: model.classes.outcomes(),
                model_version: Some(model.model_version.clone()),
                trained_at: Some(model.trained_at),
            },
            None => ModelInfo {
                is_trained: false,
                feature_names: Feature::default_names(),
                model_kind: MODEL_KIND.to_string(),
                classes: Vec::new(),
                model_version: None,
                trained_at: None,
            },
        }
    }

    /// Retrains on every team's history and installs the result.
    ///
    /// The evaluation report is handed to `store` after the swap; a failure to
    /// record it is logged and does not undo the new model.
    pub async fn train<S>(&self, store: &S) -> PredictorResult<(Arc<TrainedModel>, EvaluationReport)>
    where
        S: MatchHistory + EvaluationSink + ?Sized,
    {
        let histories = store.get_all_team_histories().await?;
        tracing::info!("Retraining on {} team histories", histories.len());

        let (model, report) = {
            let _guard = self.training.lock().await;
            let params = self.params;
            let cutoff = self.cutoff;
            let (model, report) = tokio::task::spawn_blocking(move || {
                ModelTrainer::new(params).train_on_histories(&histories, cutoff)
            })
            .await
            .map_err(|e| PredictorError::TrainingFailed(format!("training task aborted: {}", e)))??;
            (self.install(model), report)
        };

        if let Err(e) = store.record_evaluation(&report).await {
            tracing::warn!("Failed to record evaluation for {}: {}", report.model_version, e);
        }
        Ok((model, report))
    }

    pub async fn predict<H>(&self, history: &H, fixture: &Fixture) -> PredictorResult<PredictionResult>
    where
        H: MatchHistory + ?Sized,
    {
        let model = self.snapshot().ok_or(PredictorError::ModelNotTrained)?;
        let mut matches = history.get_recent_history(&fixture.team, INFERENCE_FORM_WINDOW).await?;
        if matches.iter().any(|m| m.date() >= fixture.date) {
            // back-dated fixture: form must come from before its date
            matches = history.get_history(&fixture.team).await?;
        }
        let result = inference::predict(&model, fixture, &matches);

        tracing::info!(
            "Predicted {} vs {} on {}: {} ({:.1}%)",
            result.team,
            result.opponent,
            result.date,
            result.predicted_result,
            result.confidence * 100.0
        );
        Ok(result)
    }

    pub fn save_model(&self, path: &Path) -> PredictorResult<()> {
        let model = self.snapshot().ok_or(PredictorError::ModelNotTrained)?;
        model.save(path)?;
        tracing::info!("Saved model {} to {}", model.model_version, path.display());
        Ok(())
    }

    pub fn load_model(&self, path: &Path) -> PredictorResult<Arc<TrainedModel>> {
        let model = TrainedModel::load(path)?;
        Ok(self.install(model))
    }
}
