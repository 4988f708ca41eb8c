//! Reading export as CSV or JSON downloads.

use crate::auth::CurrentUser;
use crate::error::{DashboardError, Result};
use crate::store::{history_log, LogEntry, Order, ReadingQuery};
use crate::web::handlers::render_export_page;
use crate::web::pages::Notice;
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const CSV_HEADER: &str =
    "recorded_at,device_serial,device_name,ph,temperature,nitrogen,phosphorus,potassium,signal_quality";

/// Time window of an export, counted back from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportRange {
    #[default]
    LastWeek,
    LastMonth,
    LastQuarter,
    All,
}

impl ExportRange {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "7d" => Some(Self::LastWeek),
            "30d" => Some(Self::LastMonth),
            "90d" => Some(Self::LastQuarter),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::LastWeek => "7d",
            Self::LastMonth => "30d",
            Self::LastQuarter => "90d",
            Self::All => "all",
        }
    }

    /// Earliest instant included, or `None` for everything.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::LastWeek => Some(now - Duration::days(7)),
            Self::LastMonth => Some(now - Duration::days(30)),
            Self::LastQuarter => Some(now - Duration::days(90)),
            Self::All => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub recorded_at: Option<String>,
    pub device_serial: Option<String>,
    pub device_name: Option<String>,
    pub ph: f64,
    pub temperature: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub signal_quality: Option<i32>,
}

impl From<&LogEntry> for ExportRow {
    fn from(entry: &LogEntry) -> Self {
        let r = &entry.reading;
        Self {
            recorded_at: r.recorded_at.clone(),
            device_serial: entry.device_serial.clone(),
            device_name: entry.device_name.clone(),
            ph: r.ph,
            temperature: r.temperature,
            nitrogen: r.nitrogen,
            phosphorus: r.phosphorus,
            potassium: r.potassium,
            signal_quality: r.signal_quality,
        }
    }
}

/// Quote a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render rows as CSV with a header line and CRLF line endings.
pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 96);
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");
    for row in rows {
        let fields = [
            csv_field(row.recorded_at.as_deref().unwrap_or("")),
            csv_field(row.device_serial.as_deref().unwrap_or("")),
            csv_field(row.device_name.as_deref().unwrap_or("")),
            row.ph.to_string(),
            row.temperature.to_string(),
            row.nitrogen.to_string(),
            row.phosphorus.to_string(),
            row.potassium.to_string(),
            row.signal_quality.map(|q| q.to_string()).unwrap_or_default(),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

pub fn to_json(rows: &[ExportRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

/// Download file name, e.g. `agrina-readings-7d-20250301.csv`.
pub fn export_filename(range: ExportRange, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "agrina-readings-{}-{}.{}",
        range.code(),
        now.format("%Y%m%d"),
        format.extension()
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
    pub range: Option<String>,
    pub device: Option<String>,
}

/// A validated export request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub range: ExportRange,
    pub device: Option<Uuid>,
}

impl ExportParams {
    pub fn validate(self) -> Result<ExportRequest> {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        let format = match blank(&self.format) {
            None => ExportFormat::default(),
            Some(raw) => ExportFormat::parse(&raw)
                .ok_or_else(|| DashboardError::validation(format!("Unsupported export format: {}", raw)))?,
        };
        let range = match blank(&self.range) {
            None => ExportRange::default(),
            Some(raw) => ExportRange::parse(&raw)
                .ok_or_else(|| DashboardError::validation(format!("Unsupported export range: {}", raw)))?,
        };
        let device = match blank(&self.device) {
            None => None,
            Some(raw) => Some(
                Uuid::parse_str(&raw)
                    .map_err(|_| DashboardError::validation("Device ID is not valid"))?,
            ),
        };
        Ok(ExportRequest {
            format,
            range,
            device,
        })
    }
}

/// Build the export file for `request` as of `now`.
pub async fn build_export(
    state: &AppState,
    request: &ExportRequest,
    now: DateTime<Utc>,
) -> Result<(String, String)> {
    let mut query = ReadingQuery::default()
        .with_range(request.range.since(now), None)
        .with_order(Order::Ascending);
    query.device_id = request.device;

    let entries = history_log(state.store.as_ref(), &query).await?;
    let rows: Vec<ExportRow> = entries.iter().map(ExportRow::from).collect();
    let body = match request.format {
        ExportFormat::Csv => to_csv(&rows),
        ExportFormat::Json => to_json(&rows)?,
    };
    Ok((export_filename(request.range, request.format, now), body))
}

/// `GET /export-data/download`
///
/// Invalid parameters re-render the export page with the error inline.
pub async fn download(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<ExportParams>,
) -> Response {
    let request = match params.validate() {
        Ok(request) => request,
        Err(e) => {
            let page = render_export_page(&state, &current, Some(Notice::Error(e.to_string()))).await;
            return (StatusCode::BAD_REQUEST, page).into_response();
        }
    };

    let (filename, body) = match build_export(&state, &request, Utc::now()).await {
        Ok(export) => export,
        Err(e) => return e.into_response(),
    };
    info!(
        "User {} exported {} ({} bytes)",
        current.user.id,
        filename,
        body.len()
    );

    let disposition = match HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        Ok(value) => value,
        Err(e) => return DashboardError::web_server_error(e.to_string()).into_response(),
    };
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(request.format.content_type()),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
