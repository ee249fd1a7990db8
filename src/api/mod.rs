use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Settings;
use crate::db::{self, MatchFilter, SqliteStore};
use crate::error::PredictorError;
use crate::models::{
    ApiResponse, EvaluationReport, Fixture, MatchRecord, ModelInfo, PredictionRecord, PredictionResult, Team,
    TeamSummary,
};
use crate::services::PredictionService;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub service: Arc<PredictionService>,
    pub model_path: PathBuf,
}

impl AppState {
    pub fn new(pool: SqlitePool, service: Arc<PredictionService>, model_path: PathBuf) -> Self {
        Self {
            store: SqliteStore::new(pool),
            service,
            model_path,
        }
    }

    fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }
}

type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(status: StatusCode, data: T) -> ApiReply<T> {
    (status, Json(ApiResponse::success(data)))
}

fn status_for(err: &PredictorError) -> StatusCode {
    match err {
        PredictorError::ModelNotTrained => StatusCode::SERVICE_UNAVAILABLE,
        PredictorError::InsufficientData(_) | PredictorError::FeatureMismatch(_) => StatusCode::BAD_REQUEST,
        PredictorError::UnknownEntity { .. } => StatusCode::NOT_FOUND,
        PredictorError::TrainingFailed(_) | PredictorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fail<T>(context: &str, err: PredictorError) -> ApiReply<T> {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("{}: {:#}", context, err);
    } else {
        tracing::debug!("{}: {}", context, err);
    }
    // store failures stay in the log
    let message = match err {
        PredictorError::Store(_) => "Internal server error".to_string(),
        other => other.to_string(),
    };
    (status, Json(ApiResponse::error(message)))
}

pub async fn serve(settings: Settings, port: u16) -> anyhow::Result<()> {
    let pool = db::create_pool(&settings.database_url).await?;
    db::init_database_with_pool(&pool).await?;

    let service = Arc::new(PredictionService::from_settings(&settings));
    if settings.model_path.exists() {
        match service.load_model(&settings.model_path) {
            Ok(model) => tracing::info!("Restored model {} from {}", model.model_version, settings.model_path.display()),
            Err(e) => tracing::warn!("Could not restore model from {}: {}", settings.model_path.display(), e),
        }
    } else {
        tracing::info!("No saved model at {}, train with POST /model/train", settings.model_path.display());
    }

    let app = create_router(AppState::new(pool, service, settings.model_path.clone()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Matchcast API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/teams", get(list_teams_handler))
        .route("/teams/{name}/stats", get(team_stats_handler))
        .route("/matches", get(list_matches_handler))
        .route("/matches/upcoming", get(upcoming_matches_handler))
        .route("/predict", post(predict_handler))
        .route("/predictions", get(list_predictions_handler))
        .route("/model/train", post(train_model_handler))
        .route("/model/info", get(model_info_handler))
        .route("/model/performance", get(model_performance_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("Matchcast API is running"))
}

// GET /teams
async fn list_teams_handler(State(state): State<AppState>) -> ApiReply<Vec<Team>> {
    match db::get_all_teams(state.pool()).await {
        Ok(teams) => ok(StatusCode::OK, teams),
        Err(e) => fail("Failed to list teams", e.into()),
    }
}

// GET /teams/{name}/stats
async fn team_stats_handler(State(state): State<AppState>, Path(name): Path<String>) -> ApiReply<TeamSummary> {
    match db::get_team_summary(state.pool(), &name).await {
        Ok(summary) => ok(StatusCode::OK, summary),
        Err(e) => fail("Failed to fetch team stats", e),
    }
}

// GET /matches?team&start_date&end_date&result&limit
async fn list_matches_handler(
    State(state): State<AppState>,
    Query(filter): Query<MatchFilter>,
) -> ApiReply<Vec<MatchRecord>> {
    match db::list_matches(state.pool(), &filter).await {
        Ok(matches) => ok(StatusCode::OK, matches),
        Err(e) => fail("Failed to list matches", e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct UpcomingQuery {
    limit: Option<i64>,
}

// GET /matches/upcoming?limit
async fn upcoming_matches_handler(
    State(state): State<AppState>,
    Query(params): Query<UpcomingQuery>,
) -> ApiReply<Vec<MatchRecord>> {
    let today = Utc::now().date_naive();
    match db::upcoming_matches(state.pool(), today, params.limit.unwrap_or(50)).await {
        Ok(matches) => ok(StatusCode::OK, matches),
        Err(e) => fail("Failed to list upcoming matches", e.into()),
    }
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    id: String,
    #[serde(flatten)]
    prediction: PredictionResult,
    created_at: DateTime<Utc>,
}

// POST /predict
async fn predict_handler(State(state): State<AppState>, Json(fixture): Json<Fixture>) -> ApiReply<PredictResponse> {
    match predict_and_record(&state, fixture).await {
        Ok(response) => ok(StatusCode::CREATED, response),
        Err(e) => fail("Failed to predict fixture", e),
    }
}

async fn predict_and_record(state: &AppState, mut fixture: Fixture) -> Result<PredictResponse, PredictorError> {
    fixture.team = db::resolve_team(state.pool(), &fixture.team).await?.name;
    fixture.opponent = db::resolve_team(state.pool(), &fixture.opponent).await?.name;

    let prediction = state.service.predict(&state.store, &fixture).await?;
    let record = PredictionRecord::from_result(&prediction);
    db::insert_prediction(state.pool(), &record).await?;

    Ok(PredictResponse {
        id: record.id,
        prediction,
        created_at: record.created_at,
    })
}

#[derive(Debug, Deserialize)]
struct PredictionsQuery {
    team: Option<String>,
    limit: Option<i64>,
}

// GET /predictions?team&limit
async fn list_predictions_handler(
    State(state): State<AppState>,
    Query(params): Query<PredictionsQuery>,
) -> ApiReply<Vec<PredictionRecord>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    match db::get_predictions(state.pool(), params.team.as_deref(), limit).await {
        Ok(predictions) => ok(StatusCode::OK, predictions),
        Err(e) => fail("Failed to list predictions", e.into()),
    }
}

// POST /model/train
async fn train_model_handler(State(state): State<AppState>) -> ApiReply<EvaluationReport> {
    match state.service.train(&state.store).await {
        Ok((model, report)) => {
            if let Err(e) = state.service.save_model(&state.model_path) {
                tracing::warn!("Trained model {} could not be saved: {:#}", model.model_version, e);
            }
            ok(StatusCode::OK, report)
        }
        Err(e) => fail("Failed to train model", e),
    }
}

// GET /model/info
async fn model_info_handler(State(state): State<AppState>) -> ApiReply<ModelInfo> {
    ok(StatusCode::OK, state.service.model_info())
}

// GET /model/performance
async fn model_performance_handler(State(state): State<AppState>) -> ApiReply<Vec<EvaluationReport>> {
    match db::get_model_performance(state.pool(), 20).await {
        Ok(reports) => ok(StatusCode::OK, reports),
        Err(e) => fail("Failed to fetch model performance", e.into()),
    }
}
