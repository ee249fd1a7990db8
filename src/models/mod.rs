use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Match outcome from the perspective of the team the record belongs to.
///
/// The numeric encoding is the training target: Loss = 0, Draw = 1, Win = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "L")]
    Loss,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "W")]
    Win,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Loss, Outcome::Draw, Outcome::Win];

    pub fn target(self) -> u8 {
        match self {
            Outcome::Loss => 0,
            Outcome::Draw => 1,
            Outcome::Win => 2,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Outcome::Loss => 'L',
            Outcome::Draw => 'D',
            Outcome::Win => 'W',
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "W" | "w" => Ok(Outcome::Win),
            "D" | "d" => Ok(Outcome::Draw),
            "L" | "l" => Ok(Outcome::Loss),
            other => Err(format!("invalid result '{}', expected W, D or L", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    #[serde(rename = "H", alias = "Home")]
    Home,
    #[serde(rename = "A", alias = "Away")]
    Away,
}

impl Venue {
    /// 1 for home, 0 for away.
    pub fn code(self) -> u8 {
        match self {
            Venue::Home => 1,
            Venue::Away => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Venue::Home => "H",
            Venue::Away => "A",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h" | "home" => Ok(Venue::Home),
            "a" | "away" => Ok(Venue::Away),
            other => Err(format!("invalid venue '{}', expected Home or Away", other)),
        }
    }
}

/// Raw per-match statistics for one side of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub goals_for: u32,
    pub goals_against: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    /// Average shot distance in yards
    pub distance: f64,
    pub free_kicks: u32,
    pub penalties: u32,
    pub penalty_attempts: u32,
}

/// One team's view of a played match. Unique on (team, opponent, kickoff).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub team: String,
    pub opponent: String,
    pub kickoff: NaiveDateTime,
    pub venue: Venue,
    pub result: Outcome,
    pub stats: MatchStats,
}

impl MatchRecord {
    pub fn date(&self) -> NaiveDate {
        self.kickoff.date()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub created_at: DateTime<Utc>,
}

/// A future fixture to predict, as seen from `team`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub team: String,
    pub opponent: String,
    pub date: NaiveDate,
    pub venue: Venue,
    /// Kickoff hour when known; otherwise the default afternoon slot is used
    #[serde(default)]
    pub kickoff_hour: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    #[serde(rename = "W")]
    pub win: f64,
    #[serde(rename = "D")]
    pub draw: f64,
    #[serde(rename = "L")]
    pub loss: f64,
}

impl OutcomeProbabilities {
    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Win => self.win,
            Outcome::Draw => self.draw,
            Outcome::Loss => self.loss,
        }
    }

    pub fn set(&mut self, outcome: Outcome, probability: f64) {
        match outcome {
            Outcome::Win => self.win = probability,
            Outcome::Draw => self.draw = probability,
            Outcome::Loss => self.loss = probability,
        }
    }

    pub fn total(&self) -> f64 {
        self.win + self.draw + self.loss
    }

    /// Most likely outcome. Ties resolve in W, D, L order.
    pub fn most_likely(&self) -> (Outcome, f64) {
        let mut best = (Outcome::Win, self.win);
        for outcome in [Outcome::Draw, Outcome::Loss] {
            let p = self.get(outcome);
            if p > best.1 {
                best = (outcome, p);
            }
        }
        best
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub team: String,
    pub opponent: String,
    pub date: NaiveDate,
    pub venue: Venue,
    pub predicted_result: Outcome,
    pub confidence: f64,
    pub probabilities: OutcomeProbabilities,
    /// Number of past matches the form values were averaged over
    pub form_matches: usize,
    /// True when the league-average form was used for lack of history
    pub used_fallback_form: bool,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_version: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub test_matches_count: usize,
    pub train_matches_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub is_trained: bool,
    pub feature_names: Vec<String>,
    pub model_kind: String,
    pub classes: Vec<Outcome>,
    pub model_version: Option<String>,
    pub trained_at: Option<DateTime<Utc>>,
}

/// A served prediction as stored in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub team: String,
    pub opponent: String,
    pub match_date: NaiveDate,
    pub venue: Venue,
    pub predicted_result: Outcome,
    pub win_probability: f64,
    pub draw_probability: f64,
    pub loss_probability: f64,
    pub confidence: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_result(result: &PredictionResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            team: result.team.clone(),
            opponent: result.opponent.clone(),
            match_date: result.date,
            venue: result.venue,
            predicted_result: result.predicted_result,
            win_probability: result.probabilities.win,
            draw_probability: result.probabilities.draw,
            loss_probability: result.probabilities.loss,
            confidence: result.confidence,
            model_version: result.model_version.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    pub team: Team,
    pub total_matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub win_rate: f64,
    /// Last 5 results, most recent first, e.g. "WLWDW"
    pub recent_form: String,
    pub recent_matches: Vec<MatchRecord>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
