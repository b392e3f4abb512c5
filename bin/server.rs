// Catalog Match - Web Server
// REST API over the matcher and duplicate scanner. Never writes catalog rows.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_match::{
    record_match_events, record_scan_event, BatchEntry, BatchOutcome, BatchSummary, CancelFlag,
    CandidateRanker, CatalogEntry, CatalogStore, Category, EngineConfig, EngineTables,
    GroupingMode, Listing, MatchOutcome, ScanReport, SqliteCatalogStore,
};

#[derive(Parser)]
#[command(name = "catalog-server")]
#[command(about = "REST API for listing matching and duplicate scans")]
#[command(version)]
struct Args {
    #[arg(long, env = "CATALOG_MATCH_DB", default_value = "catalog.db")]
    db: PathBuf,

    #[arg(long, env = "CATALOG_MATCH_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    #[arg(long, env = "CATALOG_MATCH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CATALOG_MATCH_TABLES")]
    tables: Option<PathBuf>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteCatalogStore>,
    ranker: Arc<CandidateRanker>,
    config: Arc<EngineConfig>,
    tables: Arc<EngineTables>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    error!("{}", message);
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Body of POST /api/match: one listing, or `{ "listings": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum MatchRequest {
    Batch { listings: Vec<Listing> },
    One(Listing),
}

#[derive(Serialize)]
struct BatchResponse {
    summary: BatchSummary,
    results: Vec<BatchEntry>,
}

#[derive(Deserialize)]
struct ScanParams {
    #[serde(default)]
    fuzzy: bool,
}

#[derive(Deserialize)]
struct EntryParams {
    brand: Option<String>,
    category: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/match - Match one listing or a batch
async fn match_listings(State(state): State<AppState>, Json(request): Json<MatchRequest>) -> Response {
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<MatchReply> {
        match request {
            MatchRequest::One(listing) => {
                let outcome = state.ranker.match_with_store(&listing, state.store.as_ref());
                let logged = match &outcome {
                    Ok(MatchOutcome::Matched(m)) => BatchOutcome::Matched(m.clone()),
                    Ok(MatchOutcome::Unmatched { reason }) => BatchOutcome::Unmatched {
                        reason: reason.clone(),
                    },
                    Err(e) => BatchOutcome::Failed {
                        error: e.to_string(),
                    },
                };
                let entry = BatchEntry {
                    index: 0,
                    title: listing.title.clone(),
                    outcome: logged,
                };
                state
                    .store
                    .with_connection(|conn| record_match_events(conn, &[entry], "catalog_server"))?;
                Ok(MatchReply::One(outcome?))
            }
            MatchRequest::Batch { listings } => {
                let results = state.ranker.match_batch(&listings, state.store.as_ref());
                state
                    .store
                    .with_connection(|conn| record_match_events(conn, &results, "catalog_server"))?;
                Ok(MatchReply::Batch(BatchResponse {
                    summary: BatchSummary::from_entries(&results),
                    results,
                }))
            }
        }
    })
    .await;

    match result {
        Ok(Ok(MatchReply::One(outcome))) => Json(ApiResponse::ok(outcome)).into_response(),
        Ok(Ok(MatchReply::Batch(batch))) => Json(ApiResponse::ok(batch)).into_response(),
        Ok(Err(e)) => error_response(StatusCode::SERVICE_UNAVAILABLE, format!("Match failed: {:#}", e)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Match task failed: {}", e)),
    }
}

enum MatchReply {
    One(MatchOutcome),
    Batch(BatchResponse),
}

/// GET /api/scan?fuzzy=bool - Full duplicate scan
async fn scan_catalog(State(state): State<AppState>, Query(params): Query<ScanParams>) -> Response {
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<ScanReport> {
        let mut config = (*state.config).clone();
        if params.fuzzy {
            config.grouping_mode = GroupingMode::ExactAndFuzzy;
        }
        let scanner = config.build_scanner(&state.tables, Utc::now());
        let report = scanner.run(state.store.as_ref(), &CancelFlag::new())?;
        state
            .store
            .with_connection(|conn| record_scan_event(conn, &report, "catalog_server"))?;
        Ok(report)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            info!("{}", report.summary());
            Json(ApiResponse::ok(report)).into_response()
        }
        Ok(Err(e)) => error_response(StatusCode::SERVICE_UNAVAILABLE, format!("Scan failed: {:#}", e)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Scan task failed: {}", e)),
    }
}

/// GET /api/entries?brand=&category= - Browse the catalog
async fn get_entries(State(state): State<AppState>, Query(params): Query<EntryParams>) -> Response {
    let category = match params.category.as_deref().map(str::parse::<Category>) {
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
        Some(Ok(c)) => Some(c),
        None => None,
    };

    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<CatalogEntry>> {
        let entries = match params.brand.as_deref() {
            Some(brand) => state.store.fetch(brand, category)?,
            None => state
                .store
                .scan()?
                .into_iter()
                .filter(|e| category.map_or(true, |c| e.category == c))
                .collect(),
        };
        Ok(entries)
    })
    .await;

    match result {
        Ok(Ok(entries)) => Json(ApiResponse::ok(entries)).into_response(),
        Ok(Err(e)) => error_response(StatusCode::SERVICE_UNAVAILABLE, format!("Catalog read failed: {:#}", e)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Catalog task failed: {}", e)),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_match=info,catalog_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if !args.db.exists() {
        anyhow::bail!(
            "Database not found at {:?}. Run `catalog-match import <csv> --db {:?}` first",
            args.db,
            args.db
        );
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let tables = Arc::new(match &args.tables {
        Some(path) => EngineTables::from_file(path)?,
        None => EngineTables::with_defaults(),
    });

    let store = SqliteCatalogStore::open(&args.db)?;
    info!("Database opened: {:?} ({} entries)", args.db, store.count()?);

    // Quality recency is pinned at startup; restart to move the window
    let state = AppState {
        ranker: Arc::new(config.build_ranker(tables.clone(), Utc::now())),
        store: Arc::new(store),
        config: Arc::new(config),
        tables,
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/match", post(match_listings))
        .route("/scan", get(scan_catalog))
        .route("/entries", get(get_entries))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("Server running on http://{}", args.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
