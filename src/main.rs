mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::models::Venue;

#[derive(Parser)]
#[command(name = "matchcast")]
#[command(about = "Win/draw/loss predictions for football fixtures from rolling team form")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Initialize the database
    InitDb,
    /// Import scraped match logs from a CSV file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Train the model and save it to MODEL_PATH
    Train,
    /// Predict a single fixture
    Predict {
        #[arg(short, long)]
        team: String,
        #[arg(short, long)]
        opponent: String,
        /// Fixture date, YYYY-MM-DD
        #[arg(short, long)]
        date: NaiveDate,
        /// Home or Away
        #[arg(short, long, default_value = "Home")]
        venue: Venue,
        /// Kickoff hour (defaults to 15)
        #[arg(long)]
        hour: Option<u32>,
    },
    /// Show the saved model and its latest evaluation
    ModelInfo,
    /// Query team statistics
    Team {
        #[arg(short, long)]
        name: String,
    },
    /// Recompute the stored rolling averages
    RefreshFeatures,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --help and argument errors must not depend on the environment
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting Matchcast API server on port {}", port);
            api::serve(settings, port).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&settings).await?;
        }
        Some(Commands::Import { file }) => {
            cli::import_matches(&settings, &file).await?;
        }
        Some(Commands::Train) => {
            cli::train_model(&settings).await?;
        }
        Some(Commands::Predict {
            team,
            opponent,
            date,
            venue,
            hour,
        }) => {
            let args = cli::PredictArgs {
                team,
                opponent,
                date,
                venue,
                hour,
            };
            cli::predict_fixture(&settings, args).await?;
        }
        Some(Commands::ModelInfo) => {
            cli::show_model_info(&settings).await?;
        }
        Some(Commands::Team { name }) => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&settings, &name).await?;
        }
        Some(Commands::RefreshFeatures) => {
            cli::refresh_features(&settings).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting Matchcast API server on port 3000");
            api::serve(settings, 3000).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_help_is_handled_by_the_parser() {
        let err = Cli::try_parse_from(["matchcast", "--help"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_predict_arguments_parse() {
        let cli = Cli::try_parse_from([
            "matchcast", "predict", "-t", "Arsenal", "-o", "Chelsea", "-d", "2022-08-06", "--hour", "20",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Predict {
                team,
                date,
                venue,
                hour,
                ..
            }) => {
                assert_eq!(team, "Arsenal");
                assert_eq!(date, NaiveDate::from_ymd_opt(2022, 8, 6).unwrap());
                assert_eq!(venue, Venue::Home);
                assert_eq!(hour, Some(20));
            }
            _ => panic!("expected the predict subcommand"),
        }
        assert!(Cli::try_parse_from(["matchcast", "predict", "-t", "Arsenal"]).is_err());
    }
}
