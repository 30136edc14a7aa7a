//! Stockcast — prediction assessment, rating ledger and leaderboard service
//!
//! Usage:
//!   stockcast serve --port 3002          — Launch the job schedulers + API
//!   stockcast assess                     — Run one assessment batch from CLI
//!   stockcast rank --cadence daily       — Run one rank cadence from CLI
//!   stockcast recalc --user-id 42        — Rebuild one user's ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::{
    recalculate_user, run_assessment, run_rank_cadence, BadgeCatalog, Horizon,
    MarketDataProvider, PredictionStatus, RankCadence, RankCategory, ScoringConfig, YahooClient,
};
use persistence::repository::{
    BadgeRepository, PredictionRecord, PredictionRepository, RatingLedger, UserRepository,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "Prediction assessment, rating ledger and leaderboard engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database path
    #[arg(long, global = true, env = "STOCKCAST_DB", default_value = "data/stockcast.db")]
    db: String,

    /// Badge catalog JSON (built-in defaults when omitted)
    #[arg(long, global = true, env = "STOCKCAST_BADGES")]
    badges: Option<String>,

    /// Market data gateway base URL override
    #[arg(long, global = true, env = "STOCKCAST_GATEWAY_URL")]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the API server and background job schedulers
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
        /// Seconds between assessment runs
        #[arg(long, default_value_t = 300)]
        assess_interval: u64,
    },
    /// Run one assessment batch and exit
    Assess,
    /// Run one rank cadence (hourly, daily, weekly, monthly) and exit
    Rank {
        #[arg(long)]
        cadence: String,
    },
    /// Rebuild one user's ledger and badge set from their assessed predictions
    Recalc {
        #[arg(long)]
        user_id: i64,
    },
    /// Insert demo users and due predictions for local development
    Seed,
}

#[derive(Clone)]
struct AppState {
    db: Arc<persistence::Database>,
    provider: Arc<dyn MarketDataProvider>,
    catalog: Arc<BadgeCatalog>,
    scoring: ScoringConfig,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,stockcast=debug")
    } else {
        EnvFilter::new("info,engine=info,stockcast=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn load_catalog(path: &Option<String>) -> anyhow::Result<BadgeCatalog> {
    match path {
        Some(path) => {
            let catalog = BadgeCatalog::from_file(path)?;
            info!(path, badges = catalog.badges.len(), "Loaded badge catalog");
            Ok(catalog)
        }
        None => Ok(BadgeCatalog::default()),
    }
}

fn build_provider(gateway_url: &Option<String>) -> YahooClient {
    match gateway_url {
        Some(url) => YahooClient::with_base_url(url.clone()),
        None => YahooClient::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let db = Arc::new(persistence::Database::new(&cli.db).await?);
    let catalog = Arc::new(load_catalog(&cli.badges)?);
    let provider: Arc<dyn MarketDataProvider> = Arc::new(build_provider(&cli.gateway_url));
    let state = AppState {
        db,
        provider,
        catalog,
        scoring: ScoringConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            assess_interval,
        } => {
            cmd_serve(state, &host, port, assess_interval).await?;
        }
        Commands::Assess => {
            let report = run_assessment(
                state.db.pool(),
                state.provider.as_ref(),
                &state.catalog,
                &state.scoring,
                Utc::now(),
            )
            .await?;
            info!(?report, "Assessment finished");
        }
        Commands::Rank { cadence } => {
            let cadence = RankCadence::parse(&cadence)
                .ok_or_else(|| anyhow::anyhow!("unknown cadence {cadence:?}"))?;
            let awards = run_rank_cadence(state.db.pool(), cadence).await?;
            info!(awards, "Rank cadence finished");
        }
        Commands::Recalc { user_id } => {
            recalculate_user(state.db.pool(), &state.catalog, user_id).await?;
            info!(user_id, "Recalculation finished");
        }
        Commands::Seed => {
            cmd_seed(&state).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server + job schedulers
// ============================================================================

async fn cmd_serve(
    state: AppState,
    host: &str,
    port: u16,
    assess_interval: u64,
) -> anyhow::Result<()> {
    info!("Stockcast v{} starting...", APP_VERSION);

    spawn_schedulers(state.clone(), assess_interval);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(api_health))
        .route("/jobs/assess", post(api_run_assessment))
        .route("/jobs/rank/:cadence", post(api_run_rank))
        .route("/jobs/recalculate", post(api_recalculate))
        .route("/leaderboard", get(api_leaderboard))
        .route("/users/:id/ledger", get(api_user_ledger))
        .route("/users/:id/predictions", get(api_user_predictions))
        .route("/users/:id/analytics", get(api_user_analytics))
        .layer(cors)
        .with_state(state);

    let addr = format!("{host}:{port}");
    info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Background schedules: assessment every few minutes, rank cadences on their
/// own clocks. The first tick of each loop is one full period out so a restart
/// never double-awards rank bonuses.
fn spawn_schedulers(state: AppState, assess_interval: u64) {
    let assess_state = state.clone();
    tokio::spawn(async move {
        let period = Duration::from_secs(assess_interval.max(30));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let result = run_assessment(
                assess_state.db.pool(),
                assess_state.provider.as_ref(),
                &assess_state.catalog,
                &assess_state.scoring,
                Utc::now(),
            )
            .await;
            match result {
                Ok(report) => info!(?report, "Scheduled assessment finished"),
                Err(e) => error!(error = %e, "Scheduled assessment failed"),
            }
        }
    });

    for cadence in RankCadence::ALL {
        let rank_state = state.clone();
        let period = match cadence {
            RankCadence::Hourly => Duration::from_secs(60 * 60),
            RankCadence::Daily => Duration::from_secs(24 * 60 * 60),
            RankCadence::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
            RankCadence::Monthly => Duration::from_secs(30 * 24 * 60 * 60),
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match run_rank_cadence(rank_state.db.pool(), cadence).await {
                    Ok(awards) => {
                        info!(cadence = cadence.as_str(), awards, "Scheduled rank job finished")
                    }
                    Err(e) => {
                        error!(cadence = cadence.as_str(), error = %e, "Scheduled rank job failed")
                    }
                }
            }
        });
    }
}

// ============================================================================
// API handlers
// ============================================================================

async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": APP_VERSION,
    }))
}

async fn api_run_assessment(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let report = run_assessment(
        state.db.pool(),
        state.provider.as_ref(),
        &state.catalog,
        &state.scoring,
        Utc::now(),
    )
    .await
    .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true, "report": report })))
}

async fn api_run_rank(
    State(state): State<AppState>,
    Path(cadence): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let cadence = RankCadence::parse(&cadence)
        .ok_or((StatusCode::BAD_REQUEST, format!("unknown cadence {cadence:?}")))?;
    let awards = run_rank_cadence(state.db.pool(), cadence)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true, "awards": awards })))
}

#[derive(Deserialize)]
struct RecalcParams {
    user_id: i64,
}

async fn api_recalculate(
    State(state): State<AppState>,
    Query(params): Query<RecalcParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    recalculate_user(state.db.pool(), &state.catalog, params.user_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true, "userId": params.user_id })))
}

#[derive(Deserialize)]
struct LeaderboardParams {
    /// "Overall" (default) or a horizon name
    category: Option<String>,
}

async fn api_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let category = match params.category.as_deref() {
        None | Some("Overall") => RankCategory::Overall,
        Some(name) => Horizon::parse(name)
            .map(RankCategory::Horizon)
            .ok_or((StatusCode::BAD_REQUEST, format!("unknown category {name:?}")))?,
    };

    let rows = PredictionRepository::new(state.db.pool())
        .leaderboard(category.horizon_filter(), None)
        .await
        .map_err(internal_error)?;

    let entries: Vec<serde_json::Value> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::json!({
                "rank": index + 1,
                "userId": row.user_id,
                "avgScore": row.avg_score,
                "predictionCount": row.prediction_count,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "category": category.key(),
        "competitors": rows.len(),
        "entries": entries,
    })))
}

async fn api_user_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let users = UserRepository::new(state.db.pool());
    let record = users
        .get(user_id)
        .await
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, format!("no user {user_id}")))?;
    let ledger = RatingLedger::from_record(&record).map_err(internal_error)?;
    let badges = BadgeRepository::new(state.db.pool())
        .for_user(user_id)
        .await
        .map_err(internal_error)?;
    let consistent = ledger.is_consistent();

    Ok(Json(serde_json::json!({
        "userId": user_id,
        "username": record.username,
        "totalRating": record.total_rating,
        "avgScore": record.avg_score,
        "ledger": ledger,
        "ledgerConsistent": consistent,
        "badges": badges,
    })))
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn api_user_predictions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let predictions = PredictionRepository::new(state.db.pool())
        .list_for_user(user_id, limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "userId": user_id,
        "predictions": predictions,
    })))
}

async fn api_user_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let predictions = PredictionRepository::new(state.db.pool())
        .list_for_user(user_id, 500)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "userId": user_id,
        "directionAccuracy": engine::direction_accuracy(&predictions),
        "aggressiveness": engine::aggressiveness(&predictions),
    })))
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    error!(error = %err, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

// ============================================================================
// Seed command — demo data for local development
// ============================================================================

async fn cmd_seed(state: &AppState) -> anyhow::Result<()> {
    let users = UserRepository::new(state.db.pool());
    let predictions = PredictionRepository::new(state.db.pool());
    let now = Utc::now().timestamp();

    let demo = [
        ("ada", "AAPL", 210.0, 205.0, Horizon::Daily),
        ("grace", "MSFT", 430.0, 425.0, Horizon::Weekly),
        ("alan", "NVDA", 130.0, 120.0, Horizon::Hourly),
    ];

    for (username, ticker, target, creation, horizon) in demo {
        let user_id = match users.get_by_username(username).await? {
            Some(existing) => existing.id.unwrap_or_default(),
            None => users.insert(username).await?,
        };
        let prediction_id = predictions
            .insert(&PredictionRecord {
                id: None,
                user_id,
                ticker: ticker.to_string(),
                target_price: target,
                price_at_creation: Some(creation),
                currency: "USD".to_string(),
                horizon: horizon.as_str().to_string(),
                deadline: now - 60,
                status: PredictionStatus::Active.as_str().to_string(),
                actual_price: None,
                score: None,
                score_cap: 100.0,
                target_hit: None,
                created_at: Some(now - 86_400),
            })
            .await?;
        info!(username, ticker, prediction_id, "Seeded due prediction");
    }

    // A couple of follower edges so badge notifications fan out
    if let (Some(ada), Some(grace)) = (
        users.get_by_username("ada").await?,
        users.get_by_username("grace").await?,
    ) {
        users
            .add_follower(ada.id.unwrap_or_default(), grace.id.unwrap_or_default())
            .await?;
    }

    info!("Seed complete — run `stockcast assess` to resolve the demo predictions");
    Ok(())
}
