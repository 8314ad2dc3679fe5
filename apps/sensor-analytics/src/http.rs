use crate::alerts::ThresholdConfig;
use crate::controller::AnalyticsView;
use crate::error::{AnalyticsError, StoreError};
use crate::export;
use crate::ingest::IngestSubmission;
use crate::reading::Reading;
use crate::session::{SessionHandle, SessionStatsSnapshot};
use crate::store::ReadingStore;
use crate::window::RangeToken;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct HttpState<S: ReadingStore> {
    pub store: Arc<S>,
    pub session: SessionHandle,
}

impl<S: ReadingStore> Clone for HttpState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            session: self.session.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WindowRequest {
    range: String,
}

#[derive(Debug, Serialize)]
struct WindowResponse {
    range: RangeToken,
    generation: u64,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    removed: u64,
}

type HttpResult<T> = Result<T, (StatusCode, String)>;

fn session_error(err: AnalyticsError) -> (StatusCode, String) {
    tracing::error!(error = %err, "analytics session unavailable");
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    let status = match err {
        StoreError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    tracing::warn!(error = %err, status = %status, "reading store error");
    (status, err.to_string())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_analytics<S: ReadingStore>(State(state): State<HttpState<S>>) -> Json<AnalyticsView> {
    Json(state.session.view().as_ref().clone())
}

async fn get_status<S: ReadingStore>(
    State(state): State<HttpState<S>>,
) -> Json<SessionStatsSnapshot> {
    Json(state.session.stats().snapshot())
}

async fn post_window<S: ReadingStore>(
    State(state): State<HttpState<S>>,
    Json(payload): Json<WindowRequest>,
) -> HttpResult<Json<WindowResponse>> {
    let range = payload
        .range
        .parse::<RangeToken>()
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    let generation = state
        .session
        .select_window(range)
        .await
        .map_err(session_error)?;
    Ok(Json(WindowResponse { range, generation }))
}

async fn post_reading<S: ReadingStore>(
    State(state): State<HttpState<S>>,
    Json(submission): Json<IngestSubmission>,
) -> HttpResult<(StatusCode, Json<Reading>)> {
    let reading = submission
        .into_new_reading(Utc::now())
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    let stored = state.store.insert(reading).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn delete_readings<S: ReadingStore>(
    State(state): State<HttpState<S>>,
) -> HttpResult<Json<ClearResponse>> {
    let removed = state.store.clear_all().await.map_err(store_error)?;
    tracing::info!(removed, "cleared all readings");
    refresh_after_clear(&state.session).await;
    Ok(Json(ClearResponse { removed }))
}

async fn delete_device_readings<S: ReadingStore>(
    State(state): State<HttpState<S>>,
    Path(device_id): Path<String>,
) -> HttpResult<Json<ClearResponse>> {
    if device_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "device id is required".to_string()));
    }
    let removed = state
        .store
        .clear_device(&device_id)
        .await
        .map_err(store_error)?;
    tracing::info!(removed, device = %device_id, "cleared device readings");
    refresh_after_clear(&state.session).await;
    Ok(Json(ClearResponse { removed }))
}

async fn refresh_after_clear(session: &SessionHandle) {
    if let Err(err) = session.refresh().await {
        tracing::warn!(error = %err, "failed to refresh window after clear");
    }
}

async fn put_thresholds<S: ReadingStore>(
    State(state): State<HttpState<S>>,
    Json(thresholds): Json<ThresholdConfig>,
) -> HttpResult<Json<ThresholdConfig>> {
    thresholds
        .validate()
        .map_err(|err| (StatusCode::BAD_REQUEST, err))?;
    state
        .session
        .replace_thresholds(thresholds)
        .await
        .map_err(session_error)?;
    Ok(Json(thresholds))
}

async fn get_export<S: ReadingStore>(
    State(state): State<HttpState<S>>,
) -> HttpResult<impl IntoResponse> {
    let snapshot = state.session.snapshot().await.map_err(session_error)?;
    let body = export::to_csv_string(&snapshot).map_err(|err| {
        tracing::error!(error = %err, "csv export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Export failed".to_string())
    })?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"readings.csv\"",
            ),
        ],
        body,
    ))
}

pub fn router<S: ReadingStore>(state: HttpState<S>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(get_status::<S>))
        .route("/v1/analytics", get(get_analytics::<S>))
        .route("/v1/window", post(post_window::<S>))
        .route(
            "/v1/readings",
            post(post_reading::<S>).delete(delete_readings::<S>),
        )
        .route("/v1/readings/{device_id}", delete(delete_device_readings::<S>))
        .route("/v1/thresholds", put(put_thresholds::<S>))
        .route("/v1/export.csv", get(get_export::<S>))
        .with_state(state)
}
