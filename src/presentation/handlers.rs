// HTTP request handlers
use crate::domain::timeframe::{Tab, Timeframe};
use crate::domain::units::NetworkUnit;
use crate::error::FetchError;
use crate::infrastructure::chunked_json::chunked_json_stream;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::infrastructure::http_source::fetch_vm_chart;
use crate::presentation::app_state::AppState;
use crate::presentation::render::{rendered_stream, RenderedDashboard};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
pub struct TimeframeQuery {
    pub timeframe: Option<String>,
}

#[derive(Serialize)]
struct RefreshBody {
    sources: Vec<String>,
    elapsed_ms: u128,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(ErrorBody { error: message.into() })).into_response()
}

fn into_response(result: Result<Response, StatusCode>) -> Response {
    match result {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current view model rendered in the current unit preference
pub async fn get_dashboard(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let rendered = RenderedDashboard::new(state.scheduler.snapshot(), state.network_unit());
    into_response(json_response(&rendered, accepts_brotli(&headers)).await)
}

/// One frame per published snapshot or unit change, starting with the current one
pub async fn stream_dashboard(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    let frames = rendered_stream(state.scheduler.subscribe(), state.units.subscribe());
    tracing::debug!("Dashboard stream opened (compress: {})", compress);
    into_response(chunked_json_stream(frames, compress))
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    match state.scheduler.refresh().await {
        Ok(report) => axum::Json(RefreshBody {
            sources: report.sources.iter().map(|id| id.to_string()).collect(),
            elapsed_ms: report.elapsed.as_millis(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn activate_tab(Path(tab): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let tab: Tab = match tab.parse() {
        Ok(tab) => tab,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.scheduler.activate_tab(tab).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn set_timeframe(Path(timeframe): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let timeframe: Timeframe = match timeframe.parse() {
        Ok(timeframe) => timeframe,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.scheduler.set_timeframe(timeframe).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn set_units(Path(unit): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let unit: NetworkUnit = match unit.parse() {
        Ok(unit) => unit,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    state.units.send_if_modified(|current| {
        let changed = *current != unit;
        *current = unit;
        changed
    });
    tracing::info!("Network unit preference set to {}", unit);
    StatusCode::NO_CONTENT.into_response()
}

/// On-demand time-series for one guest
pub async fn vm_metrics(
    Path(vmid): Path<u64>,
    Query(query): Query<TimeframeQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let timeframe = match query.timeframe.as_deref().map(str::parse::<Timeframe>) {
        None => Timeframe::Day,
        Some(Ok(timeframe)) => timeframe,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let chart = fetch_vm_chart(
        &state.fetch,
        vmid,
        timeframe,
        &state.vm_retry,
        &state.chart,
        state.network_unit(),
        &CancellationToken::new(),
    )
    .await;

    match chart {
        Ok(chart) => into_response(json_response(&chart, accepts_brotli(&headers)).await),
        Err(e @ FetchError::MalformedPayload { .. }) => {
            tracing::warn!("VM {} metrics unusable: {}", vmid, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => {
            tracing::warn!("VM {} metrics unavailable: {}", vmid, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
