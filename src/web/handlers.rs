//! HTTP handlers for pages and JSON API endpoints.

use crate::auth::CurrentUser;
use crate::error::{DashboardError, Result};
use crate::live::{latest_with_status, ConnectionStatus};
use crate::model::time::{parse_date, parse_timestamp};
use crate::model::{Profile, Role, SensorReading};
use crate::store::{
    daily_trends, dashboard_summary, day_bounds, deployment_stats_by_device, history_log, DashboardSummary, DeviceOverview,
    LogEntry, Order, ReadingQuery, TrendPoint, DEFAULT_HISTORY_LIMIT, MAX_QUERY_LIMIT,
};
use crate::web::pages::{self, HistoryFilterEcho, HistoryView, LiveView, Nav, Notice, SettingsView};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Unwrap a page listing, logging failures and rendering them as empty.
fn or_empty<T: Default>(result: Result<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("Failed to load {}: {}", what, e);
        T::default()
    })
}

/// The signed-in user's profile, or one derived from the account.
pub(crate) async fn profile_for(state: &AppState, current: &CurrentUser) -> Profile {
    match state.store.get_profile(current.user.id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => fallback_profile(current),
        Err(e) => {
            warn!("Failed to load profile for {}: {}", current.user.id, e);
            fallback_profile(current)
        }
    }
}

fn fallback_profile(current: &CurrentUser) -> Profile {
    Profile {
        id: current.user.id,
        full_name: None,
        email: Some(current.user.email.clone()),
        role: Role::Viewer,
        company: None,
        updated_at: None,
    }
}

fn nav<'a>(active: &'a str, profile: &'a Profile) -> Nav<'a> {
    Nav {
        active,
        user_name: profile.display_name(),
    }
}

fn blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `GET /` for visitors without a session.
pub async fn landing() -> Redirect {
    Redirect::to("/login")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    pub redirected_from: Option<String>,
}

/// `GET /login`
pub async fn login(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(pages::login_page(blank(&query.redirected_from), None))
}

/// `GET /dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Html<String> {
    let profile = profile_for(&state, &current).await;
    let summary = dashboard_summary(
        state.store.as_ref(),
        Utc::now(),
        state.config.offline_secs_per_device,
    )
    .await
    .unwrap_or_else(|e| {
        warn!("Failed to build dashboard summary: {}", e);
        DashboardSummary {
            total_devices: 0,
            online_devices: 0,
            active_deployments: 0,
            readings_last_24h: 0,
            threshold_secs: 0,
            devices: Vec::new(),
        }
    });
    Html(pages::dashboard_page(&nav("/dashboard", &profile), &profile, &summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    pub device: Option<String>,
}

/// `GET /live-readings[?device=ID]`
pub async fn live_readings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<LiveQuery>,
) -> Html<String> {
    let profile = profile_for(&state, &current).await;
    let devices = or_empty(state.store.list_devices().await, "devices");

    let mut notice = None;
    let requested = blank(&query.device).map(|raw| {
        Uuid::parse_str(raw)
            .ok()
            .and_then(|id| devices.iter().find(|d| d.id == id))
    });
    let selected = match requested {
        Some(Some(device)) => Some(device),
        Some(None) => {
            notice = Some(Notice::Error("Unknown device, showing the first one".to_string()));
            devices.first()
        }
        None => devices.first(),
    };

    let (reading, status, threshold_secs) = match selected {
        Some(device) => latest_with_status(
            state.store.as_ref(),
            device.id,
            state.config.offline_secs_per_device,
        )
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to load latest reading for {}: {}", device.id, e);
            (None, ConnectionStatus::Never, 0)
        }),
        None => (None, ConnectionStatus::Never, 0),
    };

    Html(pages::live_page(
        &nav("/live-readings", &profile),
        &LiveView {
            devices: &devices,
            selected,
            reading: reading.as_ref(),
            status,
            threshold_secs,
            notice,
        },
    ))
}

/// Query parameters shared by the history page and the readings API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub device: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
}

/// A day (`YYYY-MM-DD`, whole day inclusive) or an exact timestamp.
fn bound(raw: Option<&str>, end: bool) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Some(day) = parse_date(raw) {
        let (start, finish) = day_bounds(Some(day), Some(day));
        return Ok(if end { finish } else { start });
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| DashboardError::validation(format!("Invalid date: {}", raw)))
}

impl HistoryParams {
    /// Validate into a newest-first query and the values to echo back.
    pub fn to_query(&self) -> Result<(ReadingQuery, HistoryFilterEcho)> {
        let device = match blank(&self.device) {
            None => None,
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| DashboardError::validation("Device ID is not valid"))?,
            ),
        };
        let from = bound(blank(&self.from), false)?;
        let to = bound(blank(&self.to), true)?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(DashboardError::validation(
                    "Start date must not be after end date",
                ));
            }
        }
        let limit = match blank(&self.limit) {
            None => DEFAULT_HISTORY_LIMIT,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|limit| (1..=MAX_QUERY_LIMIT).contains(limit))
                .ok_or_else(|| {
                    DashboardError::validation(format!(
                        "Limit must be between 1 and {}",
                        MAX_QUERY_LIMIT
                    ))
                })?,
        };

        let mut query = ReadingQuery::default()
            .with_range(from, to)
            .with_order(Order::Descending)
            .with_limit(limit);
        query.device_id = device;

        let echo = HistoryFilterEcho {
            device,
            from: blank(&self.from).unwrap_or_default().to_string(),
            to: blank(&self.to).unwrap_or_default().to_string(),
            limit,
        };
        Ok((query, echo))
    }
}

/// Same filter as `query` without a limit, oldest first, for trends.
fn trend_query(query: &ReadingQuery) -> ReadingQuery {
    let mut trend = ReadingQuery::default()
        .with_range(query.from, query.to)
        .with_order(Order::Ascending);
    trend.device_id = query.device_id;
    trend
}

/// Render the history page for `params`, with an optional notice.
pub(crate) async fn render_history_page(
    state: &AppState,
    current: &CurrentUser,
    params: &HistoryParams,
    notice: Option<Notice>,
) -> Response {
    let profile = profile_for(state, current).await;
    let devices = or_empty(state.store.list_devices().await, "devices");
    let stats = or_empty(
        deployment_stats_by_device(state.store.as_ref(), &devices).await,
        "deployment stats",
    );

    let (status, entries, trends, filter, notice) = match params.to_query() {
        Ok((query, filter)) => {
            let entries = or_empty(history_log(state.store.as_ref(), &query).await, "history");
            let readings = or_empty(
                state.store.query_readings(&trend_query(&query)).await,
                "trend readings",
            );
            let status = match notice {
                Some(Notice::Error(_)) => StatusCode::BAD_REQUEST,
                _ => StatusCode::OK,
            };
            (status, entries, daily_trends(&readings), filter, notice)
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Vec::new(),
            Vec::new(),
            HistoryFilterEcho {
                limit: DEFAULT_HISTORY_LIMIT,
                ..Default::default()
            },
            Some(Notice::Error(e.to_string())),
        ),
    };

    let page = pages::history_page(
        &nav("/historical-logs", &profile),
        &HistoryView {
            filter,
            devices: &devices,
            entries: &entries,
            trends: &trends,
            stats: &stats,
            notice,
        },
    );
    (status, Html(page)).into_response()
}

/// `GET /historical-logs`
pub async fn historical_logs(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<HistoryParams>,
) -> Response {
    render_history_page(&state, &current, &params, None).await
}

pub(crate) async fn render_export_page(
    state: &AppState,
    current: &CurrentUser,
    notice: Option<Notice>,
) -> Html<String> {
    let profile = profile_for(state, current).await;
    let devices = or_empty(state.store.list_devices().await, "devices");
    Html(pages::export_page(
        &nav("/export-data", &profile),
        &devices,
        notice.as_ref(),
    ))
}

/// `GET /export-data`
pub async fn export_data(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Html<String> {
    render_export_page(&state, &current, None).await
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsQuery {
    pub saved: Option<String>,
}

pub(crate) async fn render_settings_page(
    state: &AppState,
    current: &CurrentUser,
    notice: Option<Notice>,
) -> Html<String> {
    let profile = profile_for(state, current).await;
    let devices = or_empty(state.store.list_devices().await, "devices");
    let preferences = state
        .store
        .get_preferences(current.user.id)
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to load preferences for {}: {}", current.user.id, e);
            crate::model::UserPreferences::defaults_for(current.user.id)
        });

    Html(pages::settings_page(
        &nav("/settings", &profile),
        &SettingsView {
            profile: &profile,
            devices: &devices,
            preferences: &preferences,
            notice,
        },
    ))
}

/// `GET /settings`
pub async fn settings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<SettingsQuery>,
) -> Html<String> {
    let notice = match blank(&query.saved) {
        Some("profile") => Some(Notice::Info("Profile saved".to_string())),
        Some("device") => Some(Notice::Info("Device settings saved".to_string())),
        Some("preferences") => Some(Notice::Info("Preferences saved".to_string())),
        _ => None,
    };
    render_settings_page(&state, &current, notice).await
}

/// `GET /about`
pub async fn about(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Html<String> {
    let profile = profile_for(&state, &current).await;
    Html(pages::about_page(&nav("/about", &profile)))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "agrina",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "websocket_clients": state.clients.count().await
    }))
}

/// `GET /api/devices`: every device with its latest reading and status.
pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<DeviceOverview>>> {
    let summary = dashboard_summary(
        state.store.as_ref(),
        Utc::now(),
        state.config.offline_secs_per_device,
    )
    .await?;
    Ok(Json(summary.devices))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestResponse {
    pub device_id: Uuid,
    pub reading: Option<SensorReading>,
    pub status: ConnectionStatus,
    pub threshold_secs: i64,
}

/// `GET /api/devices/:id/latest`
pub async fn device_latest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LatestResponse>> {
    if state.store.get_device(id).await?.is_none() {
        return Err(DashboardError::not_found(format!("device {}", id)));
    }
    let (reading, status, threshold_secs) =
        latest_with_status(state.store.as_ref(), id, state.config.offline_secs_per_device).await?;
    Ok(Json(LatestResponse {
        device_id: id,
        reading,
        status,
        threshold_secs,
    }))
}

/// `GET /api/readings?device&from&to&limit`
pub async fn list_readings(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<LogEntry>>> {
    let (query, _) = params.to_query()?;
    Ok(Json(history_log(state.store.as_ref(), &query).await?))
}

/// `GET /api/trends?device&from&to`
pub async fn trends(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TrendPoint>>> {
    let (query, _) = params.to_query()?;
    let readings = state.store.query_readings(&trend_query(&query)).await?;
    Ok(Json(daily_trends(&readings)))
}
