use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;

use crate::config::Settings;
use crate::db::{self, import, SqliteStore};
use crate::error::PredictorError;
use crate::models::{Fixture, PredictionRecord, Venue};
use crate::services::PredictionService;

pub async fn init_db(settings: &Settings) -> Result<()> {
    db::init_database(&settings.database_url).await?;
    println!("✅ Database ready at {}", settings.database_url);
    Ok(())
}

pub async fn import_matches(settings: &Settings, file: &Path) -> Result<()> {
    let pool = db::init_database(&settings.database_url).await?;

    println!("📥 Importing matches from {}...", file.display());
    let summary = import::import_csv_file(&pool, file).await?;

    println!("✅ Import completed:");
    println!("   Matches created: {}", summary.created);
    println!("   Already present: {}", summary.skipped);
    println!("   New teams: {}", summary.teams_created);
    if summary.errored > 0 {
        println!("⚠️  {} rows could not be imported:", summary.errored);
        for error in summary.errors.iter().take(10) {
            println!("   • {}", error);
        }
        if summary.errors.len() > 10 {
            println!("   ... and {} more", summary.errors.len() - 10);
        }
    }

    println!("\n🧮 Calculating rolling averages...");
    let updated = db::refresh_all_rolling_features(&pool).await?;
    println!("✅ Rolling averages stored for {} matches", updated);

    Ok(())
}

pub async fn train_model(settings: &Settings) -> Result<()> {
    let pool = db::init_database(&settings.database_url).await?;
    let store = SqliteStore::new(pool);
    let service = PredictionService::from_settings(settings);

    println!(
        "🧠 Training random forest ({} trees, cutoff {})...",
        settings.forest.n_trees,
        service.cutoff()
    );

    let (model, report) = match service.train(&store).await {
        Ok(trained) => trained,
        Err(PredictorError::InsufficientData(reason)) => {
            println!("❌ Not enough data to train: {}", reason);
            println!("💡 Import match logs first with: matchcast import --file <matches.csv>");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    service.save_model(&settings.model_path)?;

    println!("✅ Model {} trained and saved to {}", model.model_version, settings.model_path.display());
    println!("\n📊 Held-out evaluation:");
    println!("   Training matches: {}", report.train_matches_count);
    println!("   Test matches: {}", report.test_matches_count);
    println!("   Accuracy: {:.1}%", report.accuracy * 100.0);
    println!("   Precision: {:.1}%", report.precision * 100.0);
    println!("   Recall: {:.1}%", report.recall * 100.0);
    println!("   F1 score: {:.1}%", report.f1_score * 100.0);

    Ok(())
}

pub struct PredictArgs {
    pub team: String,
    pub opponent: String,
    pub date: NaiveDate,
    pub venue: Venue,
    pub hour: Option<u32>,
}

pub async fn predict_fixture(settings: &Settings, args: PredictArgs) -> Result<()> {
    let pool = db::init_database(&settings.database_url).await?;
    let store = SqliteStore::new(pool.clone());
    let service = PredictionService::from_settings(settings);

    if !settings.model_path.exists() {
        println!("📭 No trained model at {}", settings.model_path.display());
        println!("💡 Train one first with: matchcast train");
        return Ok(());
    }
    service.load_model(&settings.model_path)?;

    let resolved = async {
        let team = db::resolve_team(&pool, &args.team).await?;
        let opponent = db::resolve_team(&pool, &args.opponent).await?;
        Ok::<_, PredictorError>((team.name, opponent.name))
    }
    .await;
    let (team, opponent) = match resolved {
        Ok(names) => names,
        Err(e @ PredictorError::UnknownEntity { .. }) => {
            println!("❌ {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let fixture = Fixture {
        team,
        opponent,
        date: args.date,
        venue: args.venue,
        kickoff_hour: args.hour,
    };
    let prediction = service.predict(&store, &fixture).await?;
    db::insert_prediction(&pool, &PredictionRecord::from_result(&prediction)).await?;

    let venue = match prediction.venue {
        Venue::Home => "vs",
        Venue::Away => "at",
    };
    println!(
        "🔮 {} {} {} ({}):",
        prediction.team,
        venue,
        prediction.opponent,
        prediction.date.format("%Y-%m-%d")
    );
    println!(
        "   Win: {:.1}% | Draw: {:.1}% | Loss: {:.1}%",
        prediction.probabilities.win * 100.0,
        prediction.probabilities.draw * 100.0,
        prediction.probabilities.loss * 100.0
    );
    println!(
        "   Predicted result: {} ({:.1}% confidence)",
        prediction.predicted_result,
        prediction.confidence * 100.0
    );
    if prediction.used_fallback_form {
        println!("   ⚠️  No match history for {}, league-average form used", prediction.team);
    } else {
        println!("   Form from last {} matches", prediction.form_matches);
    }

    Ok(())
}

pub async fn show_model_info(settings: &Settings) -> Result<()> {
    let service = PredictionService::from_settings(settings);
    if settings.model_path.exists() {
        service.load_model(&settings.model_path)?;
    }
    let info = service.model_info();

    println!("🧠 Model: {}", info.model_kind);
    match (&info.model_version, info.trained_at) {
        (Some(version), Some(trained_at)) => {
            println!("   Version: {}", version);
            println!("   Trained: {}", trained_at.format("%Y-%m-%d %H:%M:%S"));
            let classes: Vec<String> = info.classes.iter().map(|c| c.to_string()).collect();
            println!("   Classes: {}", classes.join(", "));
        }
        _ => println!("   Not trained yet"),
    }
    println!("   Features ({}):", info.feature_names.len());
    for name in &info.feature_names {
        println!("   • {}", name);
    }

    let pool = db::init_database(&settings.database_url).await?;
    if let Some(latest) = db::get_model_performance(&pool, 1).await?.first() {
        println!(
            "\n📊 Last evaluation ({}): accuracy {:.1}%, F1 {:.1}% on {} matches",
            latest.model_version,
            latest.accuracy * 100.0,
            latest.f1_score * 100.0,
            latest.test_matches_count
        );
    }

    Ok(())
}

pub async fn query_team(settings: &Settings, team_name: &str) -> Result<()> {
    let pool = db::init_database(&settings.database_url).await?;

    println!("🔍 Searching for team: {}", team_name);

    let summary = match db::get_team_summary(&pool, team_name).await {
        Ok(summary) => summary,
        Err(e @ PredictorError::UnknownEntity { .. }) => {
            println!("❌ {}", e);

            println!("\n💡 Available teams:");
            for team in db::get_all_teams(&pool).await?.iter().take(20) {
                println!("   • {}", team.name);
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("📊 Team Details:");
    println!("   Name: {} ({})", summary.team.name, summary.team.short_name);
    println!("   Matches: {}", summary.total_matches);
    println!("   Record: {}W {}D {}L", summary.wins, summary.draws, summary.losses);
    println!("   Win rate: {:.2}%", summary.win_rate);
    println!("   Form: {}", summary.recent_form);

    println!("\n📅 Recent Matches:");
    if summary.recent_matches.is_empty() {
        println!("   No recent matches found");
    } else {
        for m in &summary.recent_matches {
            let venue = match m.venue {
                Venue::Home => "vs",
                Venue::Away => "at",
            };
            println!(
                "   {} {} {} ({}-{}) {}",
                m.kickoff.format("%Y-%m-%d"),
                venue,
                m.opponent,
                m.stats.goals_for,
                m.stats.goals_against,
                m.result
            );
        }
    }

    Ok(())
}

pub async fn refresh_features(settings: &Settings) -> Result<()> {
    let pool = db::init_database(&settings.database_url).await?;

    println!("🧮 Recomputing rolling averages for all teams...");
    let updated = db::refresh_all_rolling_features(&pool).await?;
    println!("✅ Rolling averages stored for {} matches", updated);

    Ok(())
}
