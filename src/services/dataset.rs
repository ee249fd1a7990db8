use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::collections::BTreeMap;

use crate::error::{PredictorError, PredictorResult};
use crate::models::{MatchRecord, Outcome};
use crate::services::features::{Feature, FeatureBuilder, FeatureRow, TeamCodes};

/// Feature rows ordered by kickoff.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<FeatureRow>,
}

impl Dataset {
    pub fn new(mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.team.cmp(&b.team)));
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One row per match, one column per feature, in `features` order.
    pub fn design_matrix(&self, features: &[Feature]) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows.len(), features.len(), |i, j| {
            self.rows[i].inputs.value(features[j])
        })
    }

    pub fn targets(&self) -> Vec<Outcome> {
        self.rows.iter().map(|r| r.target).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AssembledDataset {
    pub train: Dataset,
    pub test: Dataset,
    pub team_codes: TeamCodes,
}

/// Builds feature rows for every team and splits them at `cutoff`: matches
/// dated before the cutoff train, the rest evaluate.
pub fn assemble(
    histories: &BTreeMap<String, Vec<MatchRecord>>,
    cutoff: NaiveDate,
    window: usize,
) -> PredictorResult<AssembledDataset> {
    let team_codes = TeamCodes::from_histories(histories);
    let builder = FeatureBuilder::with_window(&team_codes, window);

    let rows: Vec<FeatureRow> = histories
        .values()
        .flat_map(|history| builder.build_features(history))
        .collect();

    let total = rows.len();
    let (train, test): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| row.kickoff.date() < cutoff);

    tracing::debug!(
        "Assembled {} feature rows from {} teams, {} team codes ({} train, {} test, cutoff {})",
        total,
        histories.len(),
        team_codes.len(),
        train.len(),
        test.len(),
        cutoff
    );

    if train.is_empty() || test.is_empty() {
        return Err(PredictorError::InsufficientData(format!(
            "{} training rows before {} and {} test rows from it; both are required",
            train.len(),
            cutoff,
            test.len()
        )));
    }

    Ok(AssembledDataset {
        train: Dataset::new(train),
        test: Dataset::new(test),
        team_codes,
    })
}
