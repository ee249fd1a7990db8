pub mod import;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{PredictorError, PredictorResult};
use crate::models::*;
use crate::services::collaborators::{EvaluationSink, MatchHistory};
use crate::services::features::{FeatureBuilder, TeamCodes, TRAINING_FORM_WINDOW};
use crate::utils;

/// Kickoffs are stored as sortable TEXT in this format.
const KICKOFF_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            short_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team TEXT NOT NULL,
            opponent TEXT NOT NULL,
            kickoff TEXT NOT NULL,
            venue TEXT NOT NULL,
            result TEXT NOT NULL,
            goals_for INTEGER NOT NULL DEFAULT 0,
            goals_against INTEGER NOT NULL DEFAULT 0,
            shots INTEGER NOT NULL DEFAULT 0,
            shots_on_target INTEGER NOT NULL DEFAULT 0,
            distance REAL NOT NULL DEFAULT 0.0,
            free_kicks INTEGER NOT NULL DEFAULT 0,
            penalties INTEGER NOT NULL DEFAULT 0,
            penalty_attempts INTEGER NOT NULL DEFAULT 0,
            gf_rolling REAL,
            ga_rolling REAL,
            sh_rolling REAL,
            sot_rolling REAL,
            dist_rolling REAL,
            fk_rolling REAL,
            pk_rolling REAL,
            pkatt_rolling REAL,
            created_at TEXT NOT NULL,
            UNIQUE (team, opponent, kickoff),
            FOREIGN KEY (team) REFERENCES teams (name),
            FOREIGN KEY (opponent) REFERENCES teams (name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            team TEXT NOT NULL,
            opponent TEXT NOT NULL,
            match_date TEXT NOT NULL,
            venue TEXT NOT NULL,
            predicted_result TEXT NOT NULL,
            win_probability REAL NOT NULL,
            draw_probability REAL NOT NULL,
            loss_probability REAL NOT NULL,
            confidence REAL NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_performance (
            id TEXT PRIMARY KEY,
            model_version TEXT NOT NULL,
            accuracy REAL NOT NULL,
            precision_score REAL NOT NULL,
            recall REAL NOT NULL,
            f1_score REAL NOT NULL,
            test_matches_count INTEGER NOT NULL,
            train_matches_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_team_kickoff ON matches(team, kickoff)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_team ON predictions(team, created_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<Utc>> {
    Ok(chrono::DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    Ok(Team {
        id: row.get("id"),
        name: row.get("name"),
        short_name: row.get("short_name"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<MatchRecord> {
    let count = |column: &str| row.get::<i64, _>(column).max(0) as u32;
    Ok(MatchRecord {
        team: row.get("team"),
        opponent: row.get("opponent"),
        kickoff: NaiveDateTime::parse_from_str(&row.get::<String, _>("kickoff"), KICKOFF_FORMAT)?,
        venue: row.get::<String, _>("venue").parse().map_err(anyhow::Error::msg)?,
        result: row.get::<String, _>("result").parse().map_err(anyhow::Error::msg)?,
        stats: MatchStats {
            goals_for: count("goals_for"),
            goals_against: count("goals_against"),
            shots: count("shots"),
            shots_on_target: count("shots_on_target"),
            distance: row.get("distance"),
            free_kicks: count("free_kicks"),
            penalties: count("penalties"),
            penalty_attempts: count("penalty_attempts"),
        },
    })
}

// Team operations

/// Returns the stored team and whether it was created by this call.
pub async fn upsert_team(pool: &SqlitePool, name: &str) -> Result<(Team, bool)> {
    let name = name.trim();
    if !utils::validate_team_name(name) {
        anyhow::bail!("invalid team name '{}'", name);
    }
    if let Some(team) = get_team_by_name(pool, name).await? {
        return Ok((team, false));
    }

    let team = Team {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        short_name: utils::short_name(name),
        created_at: Utc::now(),
    };
    sqlx::query("INSERT OR IGNORE INTO teams (id, name, short_name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.short_name)
        .bind(team.created_at.to_rfc3339())
        .execute(pool)
        .await?;

    tracing::debug!("Created team {}", team.name);
    Ok((team, true))
}

/// Case-insensitive lookup by name.
pub async fn get_team_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE name = ? COLLATE NOCASE")
        .bind(name.trim())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(team_from_row).transpose()
}

pub async fn get_all_teams(pool: &SqlitePool) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(team_from_row).collect()
}

/// Canonical team for `name`, or `UnknownEntity` carrying the closest known name.
pub async fn resolve_team(pool: &SqlitePool, name: &str) -> PredictorResult<Team> {
    if let Some(team) = get_team_by_name(pool, name).await? {
        return Ok(team);
    }
    let teams = get_all_teams(pool).await?;
    let suggestion = utils::closest_match(name, teams.iter().map(|t| t.name.as_str()));
    Err(PredictorError::UnknownEntity {
        name: name.trim().to_string(),
        suggestion,
    })
}

// Match operations

/// Inserts `record` unless (team, opponent, kickoff) is already stored.
/// Returns whether a row was written.
pub async fn insert_match(pool: &SqlitePool, record: &MatchRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO matches
        (team, opponent, kickoff, venue, result, goals_for, goals_against, shots,
         shots_on_target, distance, free_kicks, penalties, penalty_attempts, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.team)
    .bind(&record.opponent)
    .bind(record.kickoff.format(KICKOFF_FORMAT).to_string())
    .bind(record.venue.as_str())
    .bind(record.result.as_char().to_string())
    .bind(record.stats.goals_for as i64)
    .bind(record.stats.goals_against as i64)
    .bind(record.stats.shots as i64)
    .bind(record.stats.shots_on_target as i64)
    .bind(record.stats.distance)
    .bind(record.stats.free_kicks as i64)
    .bind(record.stats.penalties as i64)
    .bind(record.stats.penalty_attempts as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Every match for `team`, ascending by kickoff.
pub async fn get_team_history(pool: &SqlitePool, team: &str) -> Result<Vec<MatchRecord>> {
    let rows = sqlx::query("SELECT * FROM matches WHERE team = ? ORDER BY kickoff ASC")
        .bind(team)
        .fetch_all(pool)
        .await?;

    rows.iter().map(match_from_row).collect()
}

/// The `limit` most recent matches for `team`, ascending by kickoff.
pub async fn get_recent_history(pool: &SqlitePool, team: &str, limit: i64) -> Result<Vec<MatchRecord>> {
    let rows = sqlx::query("SELECT * FROM matches WHERE team = ? ORDER BY kickoff DESC LIMIT ?")
        .bind(team)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut matches = rows.iter().map(match_from_row).collect::<Result<Vec<_>>>()?;
    matches.reverse();
    Ok(matches)
}

pub async fn get_all_team_histories(pool: &SqlitePool) -> Result<BTreeMap<String, Vec<MatchRecord>>> {
    let rows = sqlx::query("SELECT * FROM matches ORDER BY team, kickoff ASC")
        .fetch_all(pool)
        .await?;

    let mut histories: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();
    for row in &rows {
        let record = match_from_row(row)?;
        histories.entry(record.team.clone()).or_default().push(record);
    }
    Ok(histories)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchFilter {
    pub team: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub result: Option<Outcome>,
    pub limit: Option<i64>,
}

/// Matches newest first, narrowed by `filter`. Dates are inclusive. The team
/// filter is a case-insensitive substring of either side.
pub async fn list_matches(pool: &SqlitePool, filter: &MatchFilter) -> Result<Vec<MatchRecord>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM matches WHERE 1 = 1");
    if let Some(team) = &filter.team {
        let pattern = format!("%{}%", team.trim());
        query
            .push(" AND (team LIKE ")
            .push_bind(pattern.clone())
            .push(" COLLATE NOCASE OR opponent LIKE ")
            .push_bind(pattern)
            .push(" COLLATE NOCASE)");
    }
    if let Some(start) = filter.start_date {
        query.push(" AND kickoff >= ").push_bind(start.format("%Y-%m-%d").to_string());
    }
    if let Some(end) = filter.end_date {
        if let Some(next_day) = end.succ_opt() {
            query.push(" AND kickoff < ").push_bind(next_day.format("%Y-%m-%d").to_string());
        }
    }
    if let Some(result) = filter.result {
        query.push(" AND result = ").push_bind(result.as_char().to_string());
    }
    query
        .push(" ORDER BY kickoff DESC LIMIT ")
        .push_bind(filter.limit.unwrap_or(100).clamp(1, 1000));

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(match_from_row).collect()
}

/// Matches on or after `from`, soonest first.
pub async fn upcoming_matches(pool: &SqlitePool, from: NaiveDate, limit: i64) -> Result<Vec<MatchRecord>> {
    let rows = sqlx::query("SELECT * FROM matches WHERE kickoff >= ? ORDER BY kickoff ASC, team ASC LIMIT ?")
        .bind(from.format("%Y-%m-%d").to_string())
        .bind(limit.clamp(1, 1000))
        .fetch_all(pool)
        .await?;

    rows.iter().map(match_from_row).collect()
}

pub async fn get_team_summary(pool: &SqlitePool, name: &str) -> PredictorResult<TeamSummary> {
    let team = resolve_team(pool, name).await?;
    let history = get_team_history(pool, &team.name).await?;

    let count = |outcome: Outcome| history.iter().filter(|m| m.result == outcome).count();
    let (wins, draws, losses) = (count(Outcome::Win), count(Outcome::Draw), count(Outcome::Loss));

    let results: Vec<(Outcome, NaiveDateTime)> = history.iter().map(|m| (m.result, m.kickoff)).collect();
    let recent_matches: Vec<MatchRecord> = history.iter().rev().take(5).cloned().collect();

    Ok(TeamSummary {
        total_matches: history.len(),
        wins,
        draws,
        losses,
        win_rate: utils::win_rate(wins, history.len()),
        recent_form: utils::results_to_form(&results),
        recent_matches,
        team,
    })
}

/// Recomputes the stored rolling columns for one team over the training
/// window. Matches without enough earlier history are reset to NULL.
pub async fn persist_rolling_features(pool: &SqlitePool, name: &str) -> PredictorResult<usize> {
    let team = resolve_team(pool, name).await?;
    let history = get_team_history(pool, &team.name).await?;

    let codes = TeamCodes::default();
    let rows = FeatureBuilder::new(&codes).build_features(&history);

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;
    sqlx::query(
        r#"UPDATE matches SET gf_rolling = NULL, ga_rolling = NULL, sh_rolling = NULL, sot_rolling = NULL,
           dist_rolling = NULL, fk_rolling = NULL, pk_rolling = NULL, pkatt_rolling = NULL
           WHERE team = ?"#,
    )
    .bind(&team.name)
    .execute(&mut *tx)
    .await
    .map_err(anyhow::Error::from)?;

    for row in &rows {
        let form = row.inputs.form;
        sqlx::query(
            r#"UPDATE matches SET gf_rolling = ?, ga_rolling = ?, sh_rolling = ?, sot_rolling = ?,
               dist_rolling = ?, fk_rolling = ?, pk_rolling = ?, pkatt_rolling = ?
               WHERE team = ? AND opponent = ? AND kickoff = ?"#,
        )
        .bind(form.gf)
        .bind(form.ga)
        .bind(form.sh)
        .bind(form.sot)
        .bind(form.dist)
        .bind(form.fk)
        .bind(form.pk)
        .bind(form.pkatt)
        .bind(&row.team)
        .bind(&row.opponent)
        .bind(row.kickoff.format(KICKOFF_FORMAT).to_string())
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;
    }
    tx.commit().await.map_err(anyhow::Error::from)?;

    tracing::debug!(
        "Stored {}-match rolling form for {} of {} {} matches",
        TRAINING_FORM_WINDOW,
        rows.len(),
        history.len(),
        team.name
    );
    Ok(rows.len())
}

/// Runs [`persist_rolling_features`] for every team. Returns the number of
/// match rows that received rolling values.
pub async fn refresh_all_rolling_features(pool: &SqlitePool) -> PredictorResult<usize> {
    let mut updated = 0;
    for team in get_all_teams(pool).await? {
        updated += persist_rolling_features(pool, &team.name).await?;
    }
    tracing::info!("Rolling features refreshed for {} matches", updated);
    Ok(updated)
}

// Prediction operations

pub async fn insert_prediction(pool: &SqlitePool, prediction: &PredictionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO predictions
        (id, team, opponent, match_date, venue, predicted_result, win_probability,
         draw_probability, loss_probability, confidence, model_version, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&prediction.id)
    .bind(&prediction.team)
    .bind(&prediction.opponent)
    .bind(prediction.match_date.format("%Y-%m-%d").to_string())
    .bind(prediction.venue.as_str())
    .bind(prediction.predicted_result.as_char().to_string())
    .bind(prediction.win_probability)
    .bind(prediction.draw_probability)
    .bind(prediction.loss_probability)
    .bind(prediction.confidence)
    .bind(&prediction.model_version)
    .bind(prediction.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent predictions first, optionally for fixtures whose team or
/// opponent contains `team`, ignoring case.
pub async fn get_predictions(pool: &SqlitePool, team: Option<&str>, limit: i64) -> Result<Vec<PredictionRecord>> {
    let query = if team.is_some() {
        "SELECT * FROM predictions \
         WHERE (team LIKE ? COLLATE NOCASE OR opponent LIKE ? COLLATE NOCASE) \
         ORDER BY created_at DESC LIMIT ?"
    } else {
        "SELECT * FROM predictions ORDER BY created_at DESC LIMIT ?"
    };

    let mut query_builder = sqlx::query(query);
    if let Some(team) = team {
        let pattern = format!("%{}%", team.trim());
        query_builder = query_builder.bind(pattern.clone()).bind(pattern);
    }
    let rows = query_builder.bind(limit).fetch_all(pool).await?;

    let mut predictions = Vec::new();
    for row in rows {
        predictions.push(PredictionRecord {
            id: row.get("id"),
            team: row.get("team"),
            opponent: row.get("opponent"),
            match_date: NaiveDate::parse_from_str(&row.get::<String, _>("match_date"), "%Y-%m-%d")?,
            venue: row.get::<String, _>("venue").parse().map_err(anyhow::Error::msg)?,
            predicted_result: row.get::<String, _>("predicted_result").parse().map_err(anyhow::Error::msg)?,
            win_probability: row.get("win_probability"),
            draw_probability: row.get("draw_probability"),
            loss_probability: row.get("loss_probability"),
            confidence: row.get("confidence"),
            model_version: row.get("model_version"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        });
    }
    Ok(predictions)
}

// Model performance operations

pub async fn insert_model_performance(pool: &SqlitePool, report: &EvaluationReport) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO model_performance
        (id, model_version, accuracy, precision_score, recall, f1_score,
         test_matches_count, train_matches_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&report.model_version)
    .bind(report.accuracy)
    .bind(report.precision)
    .bind(report.recall)
    .bind(report.f1_score)
    .bind(report.test_matches_count as i64)
    .bind(report.train_matches_count as i64)
    .bind(report.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Evaluation history, newest first.
pub async fn get_model_performance(pool: &SqlitePool, limit: i64) -> Result<Vec<EvaluationReport>> {
    let rows = sqlx::query("SELECT * FROM model_performance ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(EvaluationReport {
            model_version: row.get("model_version"),
            accuracy: row.get("accuracy"),
            precision: row.get("precision_score"),
            recall: row.get("recall"),
            f1_score: row.get("f1_score"),
            test_matches_count: row.get::<i64, _>("test_matches_count") as usize,
            train_matches_count: row.get::<i64, _>("train_matches_count") as usize,
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        });
    }
    Ok(reports)
}

/// SQLite-backed history provider and evaluation sink for the prediction service.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MatchHistory for SqliteStore {
    async fn get_history(&self, team: &str) -> Result<Vec<MatchRecord>> {
        get_team_history(&self.pool, team).await
    }

    async fn get_recent_history(&self, team: &str, limit: usize) -> Result<Vec<MatchRecord>> {
        get_recent_history(&self.pool, team, limit as i64).await
    }

    async fn get_all_team_histories(&self) -> Result<BTreeMap<String, Vec<MatchRecord>>> {
        get_all_team_histories(&self.pool).await
    }
}

#[async_trait]
impl EvaluationSink for SqliteStore {
    async fn record_evaluation(&self, report: &EvaluationReport) -> Result<()> {
        insert_model_performance(&self.pool, report).await
    }
}
