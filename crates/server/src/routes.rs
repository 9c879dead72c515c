use std::str::FromStr;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use phonix_matcher::{DateFilter, MatchRecord};
use phonix_storage::OverlayStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::session::{LoadMode, LoadSummary, StatusReport};
use crate::source::TableSource;
use crate::state::AppState;

const BODY_LIMIT: usize = 64 * 1024;

pub fn router<S, O>(state: AppState<S, O>) -> Router
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/google-sheets", get(sheets_handler::<S, O>))
        .route("/api/records/search", get(search_handler::<S, O>))
        .route("/api/records/status", get(status_handler::<S, O>))
        .route("/api/records/refresh", post(refresh_handler::<S, O>))
        .route("/api/records/cancellations", post(cancel_handler::<S, O>))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

pub async fn sheets_handler<S, O>(
    State(state): State<AppState<S, O>>,
) -> Result<Json<Value>, ApiError>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    Ok(Json(state.upstream.fetch_raw().await?))
}

/// Query-string parameters arrive as text so that blank fields mean "unset".
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub name: String,
    pub day: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
}

impl SearchParams {
    fn date_filter(&self) -> Result<DateFilter, ApiError> {
        Ok(DateFilter::new(
            parse_param("day", self.day.as_deref())?,
            parse_param("month", self.month.as_deref())?,
            parse_param("year", self.year.as_deref())?,
        ))
    }
}

fn parse_param<T: FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidParam { field, value: v.to_string() }),
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub count: usize,
    pub records: Vec<MatchRecord>,
    pub loaded_at: DateTime<Utc>,
}

pub async fn search_handler<S, O>(
    State(state): State<AppState<S, O>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    let date = params.date_filter()?;
    let results = state.session.search(&params.name, date)?;
    Ok(Json(SearchResponse {
        count: results.records.len(),
        records: results.records,
        loaded_at: results.loaded_at,
    }))
}

pub async fn status_handler<S, O>(State(state): State<AppState<S, O>>) -> Json<StatusReport>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    Json(state.session.status())
}

pub async fn refresh_handler<S, O>(
    State(state): State<AppState<S, O>>,
) -> Result<Json<LoadSummary>, ApiError>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    Ok(Json(state.session.load(LoadMode::Manual).await?))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub name: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub newly_added: bool,
}

pub async fn cancel_handler<S, O>(
    State(state): State<AppState<S, O>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    let newly_added = state.session.cancel(&req.name, &req.date).await?;
    Ok(Json(CancelResponse { cancelled: true, newly_added }))
}
