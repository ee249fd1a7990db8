use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{MatchRecord, Outcome};

/// Trailing window used when building training rows. Only strictly earlier
/// matches of the same team are averaged.
pub const TRAINING_FORM_WINDOW: usize = 3;

/// Model input columns. The declaration order is the default training order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    VenueCode,
    OpponentCode,
    Hour,
    DayOfWeek,
    GfRolling,
    GaRolling,
    ShRolling,
    SotRolling,
    DistRolling,
    FkRolling,
    PkRolling,
    PkattRolling,
}

impl Feature {
    pub const CATEGORICAL: [Feature; 4] = [
        Feature::VenueCode,
        Feature::OpponentCode,
        Feature::Hour,
        Feature::DayOfWeek,
    ];

    pub const ROLLING: [Feature; 8] = [
        Feature::GfRolling,
        Feature::GaRolling,
        Feature::ShRolling,
        Feature::SotRolling,
        Feature::DistRolling,
        Feature::FkRolling,
        Feature::PkRolling,
        Feature::PkattRolling,
    ];

    pub fn default_order() -> Vec<Feature> {
        Self::CATEGORICAL.iter().chain(Self::ROLLING.iter()).copied().collect()
    }

    pub fn default_names() -> Vec<String> {
        Self::default_order().iter().map(|f| f.name().to_string()).collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::VenueCode => "venue_code",
            Feature::OpponentCode => "opponent_code",
            Feature::Hour => "hour",
            Feature::DayOfWeek => "day_of_week",
            Feature::GfRolling => "gf_rolling",
            Feature::GaRolling => "ga_rolling",
            Feature::ShRolling => "sh_rolling",
            Feature::SotRolling => "sot_rolling",
            Feature::DistRolling => "dist_rolling",
            Feature::FkRolling => "fk_rolling",
            Feature::PkRolling => "pk_rolling",
            Feature::PkattRolling => "pkatt_rolling",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        let feature = match name.trim() {
            // older exports call the venue flag home_away
            "venue_code" | "home_away" => Feature::VenueCode,
            "opponent_code" => Feature::OpponentCode,
            "hour" => Feature::Hour,
            "day_of_week" => Feature::DayOfWeek,
            "gf_rolling" => Feature::GfRolling,
            "ga_rolling" => Feature::GaRolling,
            "sh_rolling" => Feature::ShRolling,
            "sot_rolling" => Feature::SotRolling,
            "dist_rolling" => Feature::DistRolling,
            "fk_rolling" => Feature::FkRolling,
            "pk_rolling" => Feature::PkRolling,
            "pkatt_rolling" => Feature::PkattRolling,
            _ => return None,
        };
        Some(feature)
    }
}

/// Stable integer code per team name: the 1-based lexicographic rank among all
/// names seen. Code 0 is reserved for names outside the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamCodes {
    codes: BTreeMap<String, u32>,
}

impl TeamCodes {
    pub const UNKNOWN: u32 = 0;

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(rank, name)| (name, rank as u32 + 1))
            .collect();
        Self { codes }
    }

    /// Codes over every team and opponent appearing in `histories`.
    pub fn from_histories(histories: &BTreeMap<String, Vec<MatchRecord>>) -> Self {
        let names = histories.iter().flat_map(|(team, matches)| {
            std::iter::once(team.as_str()).chain(matches.iter().flat_map(|m| [m.team.as_str(), m.opponent.as_str()]))
        });
        Self::from_names(names)
    }

    pub fn code(&self, name: &str) -> u32 {
        self.codes.get(name).copied().unwrap_or(Self::UNKNOWN)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Mean of each raw statistic over a run of matches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingForm {
    pub gf: f64,
    pub ga: f64,
    pub sh: f64,
    pub sot: f64,
    pub dist: f64,
    pub fk: f64,
    pub pk: f64,
    pub pkatt: f64,
}

impl RollingForm {
    /// `None` for an empty slice.
    pub fn from_matches(matches: &[MatchRecord]) -> Option<Self> {
        if matches.is_empty() {
            return None;
        }
        let mean_of = |stat: fn(&MatchRecord) -> f64| matches.iter().map(stat).mean();

        Some(Self {
            gf: mean_of(|m| m.stats.goals_for as f64),
            ga: mean_of(|m| m.stats.goals_against as f64),
            sh: mean_of(|m| m.stats.shots as f64),
            sot: mean_of(|m| m.stats.shots_on_target as f64),
            dist: mean_of(|m| m.stats.distance),
            fk: mean_of(|m| m.stats.free_kicks as f64),
            pk: mean_of(|m| m.stats.penalties as f64),
            pkatt: mean_of(|m| m.stats.penalty_attempts as f64),
        })
    }
}

/// Everything the model can read for one match, keyed by [`Feature`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureInputs {
    pub venue_code: u8,
    pub opponent_code: u32,
    pub hour: u32,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    pub form: RollingForm,
}

impl FeatureInputs {
    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::VenueCode => self.venue_code as f64,
            Feature::OpponentCode => self.opponent_code as f64,
            Feature::Hour => self.hour as f64,
            Feature::DayOfWeek => self.day_of_week as f64,
            Feature::GfRolling => self.form.gf,
            Feature::GaRolling => self.form.ga,
            Feature::ShRolling => self.form.sh,
            Feature::SotRolling => self.form.sot,
            Feature::DistRolling => self.form.dist,
            Feature::FkRolling => self.form.fk,
            Feature::PkRolling => self.form.pk,
            Feature::PkattRolling => self.form.pkatt,
        }
    }

    /// Values in the given column order.
    pub fn vector(&self, features: &[Feature]) -> Vec<f64> {
        features.iter().map(|&f| self.value(f)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub team: String,
    pub opponent: String,
    pub kickoff: NaiveDateTime,
    pub inputs: FeatureInputs,
    pub target: Outcome,
}

pub struct FeatureBuilder<'a> {
    window: usize,
    team_codes: &'a TeamCodes,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(team_codes: &'a TeamCodes) -> Self {
        Self::with_window(team_codes, TRAINING_FORM_WINDOW)
    }

    pub fn with_window(team_codes: &'a TeamCodes, window: usize) -> Self {
        Self {
            window: window.max(1),
            team_codes,
        }
    }

    /// Feature rows for one team's history. The input need not be sorted.
    /// Matches with fewer than `window` earlier matches produce no row.
    pub fn build_features(&self, history: &[MatchRecord]) -> Vec<FeatureRow> {
        let mut sorted = history.to_vec();
        sorted.sort_by_key(|m| m.kickoff);

        (self.window..sorted.len())
            .filter_map(|i| {
                let form = RollingForm::from_matches(&sorted[i - self.window..i])?;
                Some(self.row(&sorted[i], form))
            })
            .collect()
    }

    fn row(&self, record: &MatchRecord, form: RollingForm) -> FeatureRow {
        FeatureRow {
            team: record.team.clone(),
            opponent: record.opponent.clone(),
            kickoff: record.kickoff,
            inputs: FeatureInputs {
                venue_code: record.venue.code(),
                opponent_code: self.team_codes.code(&record.opponent),
                hour: record.kickoff.hour(),
                day_of_week: record.kickoff.weekday().num_days_from_monday(),
                form,
            },
            target: record.result,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

    use crate::models::{MatchRecord, MatchStats, Outcome, Venue};

    pub fn kickoff_on(date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(15, 0, 0).unwrap())
    }

    /// A match `day` days after 2021-08-01, with `goals_for` goals and
    /// every other statistic derived from it.
    pub fn record(team: &str, opponent: &str, day: i64, goals_for: u32) -> MatchRecord {
        let date = NaiveDate::from_ymd_opt(2021, 8, 1).unwrap() + Duration::days(day);
        record_on(team, opponent, date, goals_for)
    }

    pub fn record_on(team: &str, opponent: &str, date: NaiveDate, goals_for: u32) -> MatchRecord {
        let goals_against = (2 * goals_for + 1) % 4;
        let result = match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Less => Outcome::Loss,
        };
        MatchRecord {
            team: team.to_string(),
            opponent: opponent.to_string(),
            kickoff: kickoff_on(date),
            venue: if goals_for % 2 == 0 { Venue::Home } else { Venue::Away },
            result,
            stats: MatchStats {
                goals_for,
                goals_against,
                shots: 10 + goals_for,
                shots_on_target: 3 + goals_for,
                distance: 16.5 + goals_for as f64,
                free_kicks: goals_for % 2,
                penalties: 0,
                penalty_attempts: goals_for % 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn history(goals: &[u32]) -> Vec<MatchRecord> {
        goals
            .iter()
            .enumerate()
            .map(|(i, &gf)| record("Arsenal", "Chelsea", i as i64 * 7, gf))
            .collect()
    }

    fn codes() -> TeamCodes {
        TeamCodes::from_names(["Arsenal", "Chelsea"])
    }

    #[test]
    fn test_rolling_goals_use_three_previous_matches() {
        let codes = codes();
        let rows = FeatureBuilder::new(&codes).build_features(&history(&[2, 1, 0, 3, 1]));

        assert_eq!(rows.len(), 2);
        assert!((rows[0].inputs.form.gf - 1.0).abs() < 1e-12);
        assert!((rows[1].inputs.form.gf - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(rows[0].target, Outcome::Draw);
    }

    #[test]
    fn test_short_histories_produce_no_rows() {
        let codes = codes();
        let builder = FeatureBuilder::new(&codes);
        assert!(builder.build_features(&[]).is_empty());
        assert!(builder.build_features(&history(&[1, 2])).is_empty());
        assert!(builder.build_features(&history(&[1, 2, 3])).is_empty());
        assert_eq!(builder.build_features(&history(&[1, 2, 3, 4])).len(), 1);
    }

    #[test]
    fn test_unsorted_input_is_sorted_by_kickoff() {
        let codes = codes();
        let builder = FeatureBuilder::new(&codes);
        let ordered = history(&[2, 1, 0, 3, 1]);
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        shuffled.swap(1, 3);

        assert_eq!(builder.build_features(&ordered), builder.build_features(&shuffled));
    }

    #[test]
    fn test_categorical_codes() {
        let codes = TeamCodes::from_names(["Chelsea", "Arsenal", "Brighton", "Arsenal"]);
        assert_eq!(codes.code("Arsenal"), 1);
        assert_eq!(codes.code("Brighton"), 2);
        assert_eq!(codes.code("Chelsea"), 3);
        assert_eq!(codes.code("Nowhere FC"), TeamCodes::UNKNOWN);

        // 2021-08-22 is a Sunday
        let date = NaiveDate::from_ymd_opt(2021, 8, 22).unwrap();
        let mut matches: Vec<MatchRecord> = (0..3)
            .map(|i| record_on("Arsenal", "Brighton", date - chrono::Duration::days(7 * (3 - i)), 1))
            .collect();
        matches.push(record_on("Arsenal", "Chelsea", date, 2));

        let rows = FeatureBuilder::new(&codes).build_features(&matches);
        assert_eq!(rows.len(), 1);
        let inputs = rows[0].inputs;
        assert_eq!(inputs.opponent_code, 3);
        assert_eq!(inputs.venue_code, 1);
        assert_eq!(inputs.hour, 15);
        assert_eq!(inputs.day_of_week, 6);
    }

    #[test]
    fn test_feature_names_round_trip_in_default_order() {
        let names = Feature::default_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "venue_code");
        assert_eq!(names[4], "gf_rolling");
        for (name, feature) in names.iter().zip(Feature::default_order()) {
            assert_eq!(Feature::from_name(name), Some(feature));
        }
        assert_eq!(Feature::from_name("home_away"), Some(Feature::VenueCode));
        assert_eq!(Feature::from_name("xg_rolling"), None);
    }

    proptest! {
        #[test]
        fn prop_rolling_values_are_mean_of_preceding_window(
            goals in proptest::collection::vec(0u32..8, 0..30),
            window in 1usize..6,
        ) {
            let codes = codes();
            let matches = history(&goals);
            let rows = FeatureBuilder::with_window(&codes, window).build_features(&matches);

            prop_assert_eq!(rows.len(), goals.len().saturating_sub(window));
            for (offset, row) in rows.iter().enumerate() {
                let i = offset + window;
                prop_assert_eq!(row.kickoff, matches[i].kickoff);
                let expected = goals[i - window..i].iter().map(|&g| g as f64).sum::<f64>() / window as f64;
                prop_assert!((row.inputs.form.gf - expected).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_build_features_is_idempotent(goals in proptest::collection::vec(0u32..8, 0..20)) {
            let codes = codes();
            let builder = FeatureBuilder::new(&codes);
            let matches = history(&goals);
            prop_assert_eq!(builder.build_features(&matches), builder.build_features(&matches));
        }
    }
}
