use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::services::forest::ForestParams;

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub model_path: PathBuf,
    /// Matches on or after this date form the evaluation set
    pub train_cutoff: NaiveDate,
    pub forest: ForestParams,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:../data/matchcast.db".to_string());
        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("../data/model.json"));

        let train_cutoff = match env::var("TRAIN_CUTOFF") {
            Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("TRAIN_CUTOFF must be YYYY-MM-DD, got '{}'", raw))?,
            Err(_) => default_cutoff(),
        };

        let defaults = ForestParams::default();
        let forest = ForestParams {
            n_trees: parse_var("FOREST_TREES", defaults.n_trees)?,
            min_samples_split: parse_var("FOREST_MIN_SAMPLES_SPLIT", defaults.min_samples_split)?,
            seed: parse_var("FOREST_SEED", defaults.seed)?,
        };

        Ok(Self {
            database_url,
            model_path,
            train_cutoff,
            forest,
        })
    }
}

fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid calendar date")
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: usize = parse_var("MATCHCAST_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_default_cutoff_is_start_of_2022() {
        assert_eq!(default_cutoff().to_string(), "2022-01-01");
    }
}
