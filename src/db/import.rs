use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::io;
use std::path::Path;

use crate::db::{insert_match, upsert_team};
use crate::models::{MatchRecord, MatchStats, Outcome, Venue};
use crate::utils;

/// One team's view of a match in the scraper export. Unused columns are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    #[serde(default)]
    time: Option<String>,
    venue: String,
    result: String,
    #[serde(default)]
    gf: Option<f64>,
    #[serde(default)]
    ga: Option<f64>,
    opponent: String,
    #[serde(default)]
    sh: Option<f64>,
    #[serde(default)]
    sot: Option<f64>,
    #[serde(default)]
    dist: Option<f64>,
    #[serde(default)]
    fk: Option<f64>,
    #[serde(default)]
    pk: Option<f64>,
    #[serde(default)]
    pkatt: Option<f64>,
    team: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub teams_created: usize,
    pub created: usize,
    /// Rows already stored under the same team, opponent and kickoff
    pub skipped: usize,
    pub errored: usize,
    pub errors: Vec<String>,
}

/// Missing, negative or NaN counts become 0.
fn count(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.round() as u32,
        _ => 0,
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").with_context(|| format!("invalid date '{}'", raw))
}

impl CsvRow {
    fn into_record(self) -> Result<MatchRecord> {
        let date = parse_date(&self.date)?;
        let time = utils::parse_kickoff_time(self.time.as_deref().unwrap_or_default());
        let venue: Venue = self.venue.parse().map_err(anyhow::Error::msg)?;
        let result: Outcome = self.result.parse().map_err(anyhow::Error::msg)?;

        Ok(MatchRecord {
            team: self.team.trim().to_string(),
            opponent: self.opponent.trim().to_string(),
            kickoff: date.and_time(time),
            venue,
            result,
            stats: MatchStats {
                goals_for: count(self.gf),
                goals_against: count(self.ga),
                shots: count(self.sh),
                shots_on_target: count(self.sot),
                distance: self.dist.filter(|d| d.is_finite()).unwrap_or(0.0),
                free_kicks: count(self.fk),
                penalties: count(self.pk),
                penalty_attempts: count(self.pkatt),
            },
        })
    }
}

pub async fn import_csv<R: io::Read>(pool: &SqlitePool, mut reader: csv::Reader<R>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let outcome = match row {
            Ok(row) => store_row(pool, row, &mut summary).await,
            Err(e) => Err(anyhow::Error::from(e)),
        };
        if let Err(e) = outcome {
            tracing::warn!("Skipping CSV line {}: {:#}", line, e);
            summary.errored += 1;
            summary.errors.push(format!("line {}: {:#}", line, e));
        }
    }

    tracing::info!(
        "Import completed: {} matches created, {} already present, {} rows failed, {} new teams",
        summary.created,
        summary.skipped,
        summary.errored,
        summary.teams_created
    );
    Ok(summary)
}

async fn store_row(pool: &SqlitePool, row: CsvRow, summary: &mut ImportSummary) -> Result<()> {
    let mut record = row.into_record()?;

    let (team, team_created) = upsert_team(pool, &record.team).await?;
    let (opponent, opponent_created) = upsert_team(pool, &record.opponent).await?;
    summary.teams_created += team_created as usize + opponent_created as usize;
    record.team = team.name;
    record.opponent = opponent.name;

    if insert_match(pool, &record).await? {
        summary.created += 1;
    } else {
        summary.skipped += 1;
    }
    Ok(())
}

pub async fn import_csv_file(pool: &SqlitePool, path: &Path) -> Result<ImportSummary> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    tracing::info!("Importing matches from {}", path.display());
    import_csv(pool, reader).await
}
