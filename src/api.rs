//! HTTP routes for the dashboard front end.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::cache::cache_key_for;
use crate::connection::ConnectionReport;
use crate::dashboard::Dashboard;
use crate::error::{ConnectionError, ExtractionError, FetchError};
use crate::schema::{ExtractedData, Position, TimeInterval, Widget, WidgetDraft, WidgetPatch};

type ApiError = (StatusCode, String);

pub fn router(dashboard: Dashboard) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/connections/test", post(test_connection))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/export", get(export_dashboard))
        .route("/dashboard/import", post(import_dashboard))
        .route("/widgets", get(list_widgets).post(add_widget))
        .route(
            "/widgets/{id}",
            get(get_widget).patch(update_widget).delete(remove_widget),
        )
        .route("/widgets/{id}/position", put(update_position))
        .route("/widgets/{id}/refresh", post(refresh_widget))
        .route("/widgets/{id}/series", get(widget_series))
        .route("/selection", put(set_selection))
        .route("/edit-mode", put(set_edit_mode))
        .route("/cache", delete(clear_cache))
        .route("/cache-key", get(cache_key))
        .route(
            "/cache/{key}",
            get(get_cached).put(set_cached).delete(remove_cached),
        )
        .with_state(dashboard)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct ConnectionRequest {
    endpoint: String,
}

async fn test_connection(
    State(dashboard): State<Dashboard>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<ConnectionReport>, ApiError> {
    dashboard
        .test_connection(&request.endpoint)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match &e {
                ConnectionError::Fetch(fetch) => fetch_status(fetch),
                ConnectionError::Discovery(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, e.to_string())
        })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardView {
    widgets: Vec<Widget>,
    is_edit_mode: bool,
    selected_widget: Option<String>,
}

async fn get_dashboard(State(dashboard): State<Dashboard>) -> Json<DashboardView> {
    Json(dashboard.read(|store| DashboardView {
        widgets: store.widgets().to_vec(),
        is_edit_mode: store.is_edit_mode(),
        selected_widget: store.selected_widget().map(str::to_string),
    }))
}

async fn export_dashboard(State(dashboard): State<Dashboard>) -> Result<impl IntoResponse, ApiError> {
    let text = dashboard.read(|store| store.export_dashboard()).map_err(|e| {
        error!("Dashboard export failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {}", e))
    })?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text))
}

async fn import_dashboard(
    State(dashboard): State<Dashboard>,
    body: String,
) -> Result<Json<Vec<Widget>>, ApiError> {
    let refreshes = dashboard
        .write(|store| store.import_dashboard(&body))
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    dashboard.persist().await;
    dashboard.spawn_refreshes(refreshes);
    Ok(Json(dashboard.read(|store| store.widgets().to_vec())))
}

async fn list_widgets(State(dashboard): State<Dashboard>) -> Json<Vec<Widget>> {
    Json(dashboard.read(|store| store.widgets().to_vec()))
}

async fn add_widget(
    State(dashboard): State<Dashboard>,
    Json(draft): Json<WidgetDraft>,
) -> (StatusCode, Json<Widget>) {
    let (widget, refreshes) = dashboard.write(|store| store.add_widget(draft));
    dashboard.persist().await;
    dashboard.spawn_refreshes(refreshes);
    (StatusCode::CREATED, Json(widget))
}

async fn get_widget(
    State(dashboard): State<Dashboard>,
    Path(id): Path<String>,
) -> Result<Json<Widget>, StatusCode> {
    dashboard
        .read(|store| store.widget(&id).cloned())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_widget(
    State(dashboard): State<Dashboard>,
    Path(id): Path<String>,
    Json(patch): Json<WidgetPatch>,
) -> Result<Json<Widget>, StatusCode> {
    let widget = dashboard
        .write(|store| store.update_widget(&id, patch).cloned())
        .ok_or(StatusCode::NOT_FOUND)?;
    dashboard.persist().await;
    Ok(Json(widget))
}

async fn remove_widget(State(dashboard): State<Dashboard>, Path(id): Path<String>) -> StatusCode {
    if dashboard.write(|store| store.remove_widget(&id)).is_none() {
        return StatusCode::NOT_FOUND;
    }
    dashboard.persist().await;
    StatusCode::NO_CONTENT
}

async fn update_position(
    State(dashboard): State<Dashboard>,
    Path(id): Path<String>,
    Json(position): Json<Position>,
) -> StatusCode {
    if !dashboard.write(|store| store.update_widget_position(&id, position)) {
        return StatusCode::NOT_FOUND;
    }
    dashboard.persist().await;
    StatusCode::NO_CONTENT
}

/// Refresh now and return the settled widget, error state included.
async fn refresh_widget(
    State(dashboard): State<Dashboard>,
    Path(id): Path<String>,
) -> Result<Json<Widget>, StatusCode> {
    if !dashboard.refresh_widget_data(&id).await {
        return Err(StatusCode::NOT_FOUND);
    }
    dashboard
        .read(|store| store.widget(&id).cloned())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct SeriesQuery {
    interval: Option<TimeInterval>,
}

async fn widget_series(
    State(dashboard): State<Dashboard>,
    Path(id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<ExtractedData>, ApiError> {
    let configured = dashboard
        .read(|store| store.widget(&id).map(|w| w.config.time_interval))
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown widget: {}", id)))?;
    let interval = query.interval.or(configured).unwrap_or(TimeInterval::Daily);

    match dashboard.interval_series(&id, interval).await {
        Some(Ok(data)) => Ok(Json(data)),
        Some(Err(ExtractionError::Fetch(e))) => Err((fetch_status(&e), e.to_string())),
        None => Err((StatusCode::NOT_FOUND, format!("Unknown widget: {}", id))),
    }
}

#[derive(Deserialize)]
struct SelectionRequest {
    id: Option<String>,
}

async fn set_selection(
    State(dashboard): State<Dashboard>,
    Json(request): Json<SelectionRequest>,
) -> StatusCode {
    dashboard.write(|store| store.set_selected_widget(request.id));
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct EditModeRequest {
    enabled: bool,
}

async fn set_edit_mode(
    State(dashboard): State<Dashboard>,
    Json(request): Json<EditModeRequest>,
) -> StatusCode {
    dashboard.write(|store| store.set_edit_mode(request.enabled));
    info!("Edit mode {}", if request.enabled { "on" } else { "off" });
    StatusCode::NO_CONTENT
}

async fn get_cached(
    State(dashboard): State<Dashboard>,
    Path(key): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    dashboard
        .write(|store| store.get_cached_data(&key).cloned())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct CacheQuery {
    ttl_ms: Option<u64>,
}

async fn set_cached(
    State(dashboard): State<Dashboard>,
    Path(key): Path<String>,
    Query(query): Query<CacheQuery>,
    Json(payload): Json<Value>,
) -> StatusCode {
    dashboard.write(|store| store.set_cached_data(&key, payload, query.ttl_ms));
    dashboard.persist().await;
    StatusCode::NO_CONTENT
}

async fn remove_cached(State(dashboard): State<Dashboard>, Path(key): Path<String>) -> StatusCode {
    if !dashboard.write(|store| store.remove_cached_data(&key)) {
        return StatusCode::NOT_FOUND;
    }
    dashboard.persist().await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct CacheKeyQuery {
    endpoint: String,
}

/// Cache key a client should use for an endpoint's response.
async fn cache_key(Query(query): Query<CacheKeyQuery>) -> Json<Value> {
    Json(serde_json::json!({ "key": cache_key_for(&query.endpoint) }))
}

async fn clear_cache(State(dashboard): State<Dashboard>) -> StatusCode {
    dashboard.write(|store| store.clear_cache());
    dashboard.persist().await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// Helper functions
// ============================================================================

fn fetch_status(e: &FetchError) -> StatusCode {
    if e.is_retryable() {
        StatusCode::TOO_MANY_REQUESTS
    } else {
        StatusCode::BAD_GATEWAY
    }
}
