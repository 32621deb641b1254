// Broadband Reconciliation - Web Server
// Read-only JSON API over one pipeline run; the map views call it on slider
// movement and filter clicks.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use broadband_reconcile::{
    aggregate, classify, compare_with_reference, count_selected, load_features,
    load_group_averages, load_tabular, select_ranked_by, GroupAverages, Identifier, MergedEntity,
    MetricRecord, Pipeline, PipelineConfig, RankOrder, ReconciliationReport, Selection, Threshold,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Built once at startup, never mutated
struct ViewState {
    merged: Vec<MergedEntity>,
    records: Vec<MetricRecord>,
    report: ReconciliationReport,
    averages: Option<GroupAverages>,
}

type AppState = Arc<ViewState>;

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
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

/// County response (geometry omitted unless requested)
#[derive(Serialize)]
struct CountyResponse<'a> {
    id: Identifier,
    name: &'a str,
    state: &'a str,
    metrics: &'a BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geometry: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct ClassifyResponse {
    metric: String,
    label: String,
    selected_count: usize,
    total: usize,
    selections: BTreeMap<Identifier, Selection>,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Deserialize)]
struct CountiesQuery {
    #[serde(default)]
    geometry: bool,
}

#[derive(Deserialize)]
struct ClassifyQuery {
    #[serde(default = "default_classify_metric")]
    metric: String,
    #[serde(default = "default_percent")]
    percent: u8,
}

fn default_classify_metric() -> String {
    "availability".to_string()
}

fn default_percent() -> u8 {
    50
}

#[derive(Deserialize)]
struct StatsQuery {
    group_by: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/report - Reconciliation report for the loaded data
async fn get_report(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.report.clone()))
}

/// GET /api/counties?geometry=true - Merged entities
async fn get_counties(
    State(state): State<AppState>,
    Query(query): Query<CountiesQuery>,
) -> impl IntoResponse {
    let counties: Vec<CountyResponse> = state
        .merged
        .iter()
        .map(|m| CountyResponse {
            id: m.id,
            name: &m.name,
            state: &m.state,
            metrics: &m.metrics,
            geometry: query.geometry.then_some(&m.geometry),
        })
        .collect();

    Json(ApiResponse::ok(counties)).into_response()
}

/// GET /api/classify?metric=usage&percent=40 - Threshold selection
async fn get_classification(
    State(state): State<AppState>,
    Query(query): Query<ClassifyQuery>,
) -> impl IntoResponse {
    let selections = Threshold::from_percent(query.percent).and_then(|threshold| {
        classify(&state.merged, &query.metric, threshold.fraction()).map(|s| (threshold, s))
    });

    match selections {
        Ok((threshold, selections)) => {
            let response = ClassifyResponse {
                metric: query.metric,
                label: threshold.label(),
                selected_count: count_selected(&state.merged, &selections),
                total: state.merged.len(),
                selections,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<ClassifyResponse>::err(e.to_string())),
        )
            .into_response(),
    }
}

/// GET /api/stats?group_by=area_type - Mean/median per group
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(aggregate(&state.records, query.group_by.as_deref())))
}

/// GET /api/averages?group_by=area_type - Computed vs. published group averages
async fn get_averages(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    match &state.averages {
        Some(reference) => {
            let stats = aggregate(&state.records, query.group_by.as_deref());
            Json(ApiResponse::ok(compare_with_reference(&stats, reference))).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::err("no averages table loaded".to_string())),
        )
            .into_response(),
    }
}

/// GET /api/ranked?metric=usage&limit=10&area_type=rural - Top-K table
///
/// Every parameter other than metric/limit/order is a tag filter.
async fn get_ranked(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let metric = params.remove("metric").unwrap_or_else(|| "usage".to_string());
    let limit = match params.remove("limit").map(|l| l.parse::<usize>()) {
        None => 10,
        Some(Ok(limit)) => limit,
        Some(Err(e)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::err(format!("invalid limit: {}", e))),
            )
                .into_response();
        }
    };
    let order = match params.remove("order").as_deref() {
        Some("desc") => RankOrder::Descending,
        _ => RankOrder::Ascending,
    };

    let filters: BTreeMap<String, String> = params.into_iter().collect();
    let ranked: Vec<&MetricRecord> =
        select_ranked_by(&state.records, &metric, &filters, limit, order);

    (StatusCode::OK, Json(ApiResponse::ok(ranked))).into_response()
}

// ============================================================================
// Main Server
// ============================================================================

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).unwrap_or_else(|_| default.to_string()).into()
}

fn build_state() -> Result<ViewState> {
    let config = match std::env::var("BROADBAND_CONFIG") {
        Ok(path) => PipelineConfig::from_file(path)?,
        Err(_) => PipelineConfig::default(),
    };

    let geo = load_features(&env_path("BROADBAND_GEO", "data/counties.geojson"))?;
    let load = load_tabular(
        &env_path("BROADBAND_DATA", "data/broadband.csv"),
        &config.schema,
        config.max_primary_code,
    )?;
    let averages = match std::env::var("BROADBAND_AVERAGES") {
        Ok(path) => Some(load_group_averages(&PathBuf::from(path))?),
        Err(_) => None,
    };

    let output = Pipeline::new(config)
        .run(geo, &load.records)
        .context("Pipeline run failed")?;
    println!("✓ {}", output.report.summary());

    Ok(ViewState {
        merged: output.merged,
        records: load.records,
        report: output.report,
        averages,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🌐 Broadband Reconciliation - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state: AppState = match build_state() {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("{:?}", e);
            eprintln!("❌ Failed to load data: {:#}", e);
            eprintln!("   Set BROADBAND_GEO and BROADBAND_DATA to the input files.");
            std::process::exit(1);
        }
    };
    info!(counties = state.merged.len(), "view state ready");

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/report", get(get_report))
        .route("/counties", get(get_counties))
        .route("/classify", get(get_classification))
        .route("/stats", get(get_stats))
        .route("/averages", get(get_averages))
        .route("/ranked", get(get_ranked))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("BROADBAND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/counties", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
