use chrono::Datelike;

use crate::models::{Fixture, MatchRecord, PredictionResult};
use crate::services::features::{FeatureInputs, RollingForm};
use crate::services::model::TrainedModel;

/// Most recent matches averaged for a fixture's form values.
pub const INFERENCE_FORM_WINDOW: usize = 5;

/// Kickoff hour assumed when the caller does not know it.
pub const DEFAULT_KICKOFF_HOUR: u32 = 15;

/// Form used for a team with no recorded matches.
pub const LEAGUE_AVERAGE_FORM: RollingForm = RollingForm {
    gf: 1.5,
    ga: 1.5,
    sh: 12.0,
    sot: 4.0,
    dist: 0.0,
    fk: 0.0,
    pk: 0.0,
    pkatt: 0.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureInputs {
    pub inputs: FeatureInputs,
    pub form_matches: usize,
    pub used_fallback_form: bool,
}

/// Encodes `fixture` for `model`. `history` is the team's record in any order;
/// matches on or after the fixture date are ignored.
pub fn fixture_inputs(model: &TrainedModel, fixture: &Fixture, history: &[MatchRecord]) -> FixtureInputs {
    let mut earlier: Vec<MatchRecord> = history
        .iter()
        .filter(|m| m.date() < fixture.date)
        .cloned()
        .collect();
    earlier.sort_by_key(|m| m.kickoff);
    let recent = &earlier[earlier.len().saturating_sub(INFERENCE_FORM_WINDOW)..];

    let (form, used_fallback_form) = match RollingForm::from_matches(recent) {
        Some(form) => (form, false),
        None => {
            tracing::debug!("No history for {}, using league-average form", fixture.team);
            (LEAGUE_AVERAGE_FORM, true)
        }
    };

    let opponent_code = model.team_codes.code(&fixture.opponent);
    if !model.team_codes.contains(&fixture.opponent) {
        tracing::warn!(
            "Opponent '{}' was not seen in training, encoding as unknown",
            fixture.opponent
        );
    }

    let hour = fixture
        .kickoff_hour
        .filter(|h| *h < 24)
        .unwrap_or(DEFAULT_KICKOFF_HOUR);

    FixtureInputs {
        inputs: FeatureInputs {
            venue_code: fixture.venue.code(),
            opponent_code,
            hour,
            day_of_week: fixture.date.weekday().num_days_from_monday(),
            form,
        },
        form_matches: recent.len(),
        used_fallback_form,
    }
}

pub fn predict(model: &TrainedModel, fixture: &Fixture, history: &[MatchRecord]) -> PredictionResult {
    let encoded = fixture_inputs(model, fixture, history);
    let vector = encoded.inputs.vector(&model.features);

    let mut probabilities = model.outcome_probabilities(&vector);
    let total = probabilities.total();
    if total > 0.0 {
        probabilities.win /= total;
        probabilities.draw /= total;
        probabilities.loss /= total;
    }
    let (predicted_result, confidence) = probabilities.most_likely();

    PredictionResult {
        team: fixture.team.clone(),
        opponent: fixture.opponent.clone(),
        date: fixture.date,
        venue: fixture.venue,
        predicted_result,
        confidence,
        probabilities,
        form_matches: encoded.form_matches,
        used_fallback_form: encoded.used_fallback_form,
        model_version: model.model_version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Venue};
    use crate::services::features::test_support::record_on;
    use crate::services::features::{Feature, TeamCodes};
    use crate::services::forest::ForestParams;
    use crate::services::model::ClassSet;
    use crate::services::trainer::test_support::{cutoff, league};
    use crate::services::trainer::ModelTrainer;
    use chrono::{Duration, NaiveDate};

    fn trained() -> TrainedModel {
        let trainer = ModelTrainer::new(ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        });
        trainer.train_on_histories(&league(), cutoff()).unwrap().0
    }

    fn fixture(team: &str, opponent: &str) -> Fixture {
        Fixture {
            team: team.to_string(),
            opponent: opponent.to_string(),
            // a Saturday
            date: NaiveDate::from_ymd_opt(2022, 8, 6).unwrap(),
            venue: Venue::Home,
            kickoff_hour: None,
        }
    }

    #[test]
    fn test_zero_history_uses_league_average_form() {
        let model = trained();
        let encoded = fixture_inputs(&model, &fixture("Fulham", "Arsenal"), &[]);

        assert!(encoded.used_fallback_form);
        assert_eq!(encoded.form_matches, 0);
        assert_eq!(encoded.inputs.form.gf, 1.5);
        assert_eq!(encoded.inputs.form, LEAGUE_AVERAGE_FORM);

        let result = predict(&model, &fixture("Fulham", "Arsenal"), &[]);
        assert!(result.used_fallback_form);
    }

    #[test]
    fn test_form_averages_five_most_recent_matches() {
        let model = trained();
        let start = NaiveDate::from_ymd_opt(2022, 5, 1).unwrap();
        let goals = [3, 3, 0, 1, 2, 3, 0];
        let history: Vec<MatchRecord> = goals
            .iter()
            .enumerate()
            .map(|(i, &g)| record_on("Arsenal", "Chelsea", start + Duration::weeks(i as i64), g))
            .rev()
            .collect();

        let encoded = fixture_inputs(&model, &fixture("Arsenal", "Chelsea"), &history);
        assert!(!encoded.used_fallback_form);
        assert_eq!(encoded.form_matches, 5);
        assert!((encoded.inputs.form.gf - 6.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_matches_after_fixture_date_are_ignored() {
        let model = trained();
        let date = fixture("Arsenal", "Chelsea").date;
        let history = vec![
            record_on("Arsenal", "Chelsea", date - Duration::days(7), 2),
            record_on("Arsenal", "Chelsea", date, 3),
            record_on("Arsenal", "Chelsea", date + Duration::days(7), 3),
        ];
        let encoded = fixture_inputs(&model, &fixture("Arsenal", "Chelsea"), &history);
        assert_eq!(encoded.form_matches, 1);
        assert_eq!(encoded.inputs.form.gf, 2.0);
    }

    #[test]
    fn test_categorical_encoding() {
        let model = trained();
        let mut away = fixture("Arsenal", "Brighton");
        away.venue = Venue::Away;
        away.kickoff_hour = Some(20);

        let encoded = fixture_inputs(&model, &away, &[]).inputs;
        assert_eq!(encoded.venue_code, 0);
        assert_eq!(encoded.opponent_code, model.team_codes.code("Brighton"));
        assert_ne!(encoded.opponent_code, TeamCodes::UNKNOWN);
        assert_eq!(encoded.hour, 20);
        assert_eq!(encoded.day_of_week, 5);

        let home = fixture_inputs(&model, &fixture("Arsenal", "Nowhere FC"), &[]).inputs;
        assert_eq!(home.venue_code, 1);
        assert_eq!(home.opponent_code, TeamCodes::UNKNOWN);
        assert_eq!(home.hour, DEFAULT_KICKOFF_HOUR);
    }

    #[test]
    fn test_vector_follows_recorded_feature_order() {
        let mut model = trained();
        model.features = vec![Feature::GfRolling, Feature::VenueCode];
        let encoded = fixture_inputs(&model, &fixture("Arsenal", "Chelsea"), &[]);
        assert_eq!(encoded.inputs.vector(&model.features), vec![1.5, 1.0]);
    }

    #[test]
    fn test_probabilities_sum_to_one_and_label_is_argmax() {
        let model = trained();
        let histories = league();
        for team in ["Arsenal", "Brighton", "Chelsea", "Fulham"] {
            for opponent in ["Arsenal", "Brighton", "Chelsea", "Fulham"] {
                let history = histories.get(team).cloned().unwrap_or_default();
                let result = predict(&model, &fixture(team, opponent), &history);
                let p = result.probabilities;

                assert!((p.total() - 1.0).abs() < 1e-9);
                let max = p.win.max(p.draw).max(p.loss);
                assert_eq!(result.confidence, max);
                assert_eq!(p.get(result.predicted_result), max);
            }
        }
    }

    #[test]
    fn test_two_class_model_reports_zero_draw_probability() {
        let mut histories = league();
        for matches in histories.values_mut() {
            matches.retain(|m| m.result != Outcome::Draw);
        }
        let model = ModelTrainer::new(ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        })
        .train_on_histories(&histories, cutoff())
        .unwrap()
        .0;
        assert!(matches!(model.classes, ClassSet::Partial(_)));

        let result = predict(&model, &fixture("Arsenal", "Chelsea"), &histories["Arsenal"]);
        assert_eq!(result.probabilities.draw, 0.0);
        assert_ne!(result.predicted_result, Outcome::Draw);
        assert!((result.probabilities.total() - 1.0).abs() < 1e-9);
    }
}
