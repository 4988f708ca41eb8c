//! Server-rendered HTML pages.
//!
//! Every page is plain HTML built from a shared layout; the live-readings page
//! adds a small script that follows the `/ws/live` channel.

use crate::live::ConnectionStatus;
use crate::model::agronomy::{assess_reading, nutrient_level, ph_level, temperature_level, Nutrient};
use crate::model::time::format_age;
use crate::model::{Device, Profile, SensorReading, TemperatureUnit, UserPreferences};
use crate::store::{DashboardSummary, DeploymentStats, LogEntry, TrendPoint, ValueStats};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Write;
use uuid::Uuid;

/// Navigation context for signed-in pages.
pub struct Nav<'a> {
    pub active: &'a str,
    pub user_name: &'a str,
}

/// Inline message shown above a page's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    fn render(&self) -> String {
        match self {
            Self::Info(msg) => format!(r#"<div class="notice info">{}</div>"#, escape(msg)),
            Self::Error(msg) => format!(r#"<div class="notice error">{}</div>"#, escape(msg)),
        }
    }
}

fn notice_html(notice: Option<&Notice>) -> String {
    notice.map(Notice::render).unwrap_or_default()
}

/// Escape text for use in HTML content and attribute values.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const NAV_ITEMS: [(&str, &str); 6] = [
    ("/dashboard", "Dashboard"),
    ("/live-readings", "Live Readings"),
    ("/historical-logs", "Historical Logs"),
    ("/export-data", "Export Data"),
    ("/settings", "Settings"),
    ("/about", "About"),
];

fn layout(title: &str, nav: Option<&Nav<'_>>, body: &str) -> String {
    let nav_html = match nav {
        Some(nav) => {
            let mut links = String::new();
            for (href, label) in NAV_ITEMS {
                let class = if href == nav.active { " class=\"active\"" } else { "" };
                let _ = write!(links, r#"<a href="{}"{}>{}</a>"#, href, class, label);
            }
            format!(
                r#"<nav class="nav"><span class="brand">🌱 AGRIna</span>{}<span class="user">{}</span><form method="post" action="/logout"><button type="submit">Sign out</button></form></nav>"#,
                links,
                escape(nav.user_name)
            )
        }
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} · AGRIna</title>
    <style>{css}</style>
</head>
<body>
    {nav_html}
    <main class="container">
{body}
    </main>
</body>
</html>"#,
        title = escape(title),
        css = STYLE,
        nav_html = nav_html,
        body = body
    )
}

fn format_instant(at: Option<DateTime<Utc>>, raw: Option<&str>) -> String {
    match (at, raw) {
        (Some(at), _) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        (None, Some(raw)) => escape(raw),
        (None, None) => "—".to_string(),
    }
}

fn status_badge(status: &ConnectionStatus) -> String {
    let detail = match status.age_secs() {
        Some(age) => format!(" · {} ago", format_age(age)),
        None => String::new(),
    };
    format!(
        r#"<span class="badge {}">{}{}</span>"#,
        status.label().to_ascii_lowercase(),
        status.label(),
        detail
    )
}

fn device_options(devices: &[Device], selected: Option<uuid::Uuid>, with_all: bool) -> String {
    let mut html = String::new();
    if with_all {
        html.push_str(r#"<option value="">All devices</option>"#);
    }
    for device in devices {
        let chosen = if Some(device.id) == selected { " selected" } else { "" };
        let _ = write!(
            html,
            r#"<option value="{}"{}>{} ({})</option>"#,
            device.id,
            chosen,
            escape(&device.name),
            escape(&device.serial_number)
        );
    }
    html
}

/// Sign-in and sign-up page.
pub fn login_page(redirected_from: Option<&str>, notice: Option<&Notice>) -> String {
    let hidden = redirected_from
        .map(|path| {
            format!(
                r#"<input type="hidden" name="redirectedFrom" value="{}">"#,
                escape(path)
            )
        })
        .unwrap_or_default();

    let body = format!(
        r#"<section class="auth">
    <h1>🌱 AGRIna</h1>
    <p class="muted">Soil telemetry for your fields</p>
    {notice}
    <div class="grid two">
        <form class="card" method="post" action="/login">
            <h3>Sign in</h3>
            {hidden}
            <label>E-mail <input type="email" name="email" required></label>
            <label>Password <input type="password" name="password" required></label>
            <button type="submit">Sign in</button>
        </form>
        <form class="card" method="post" action="/signup">
            <h3>Create account</h3>
            <label>Full name <input type="text" name="name"></label>
            <label>E-mail <input type="email" name="email" required></label>
            <label>Password <input type="password" name="password" minlength="6" required></label>
            <button type="submit">Sign up</button>
        </form>
    </div>
</section>"#,
        notice = notice_html(notice),
        hidden = hidden
    );
    layout("Sign in", None, &body)
}

/// Dashboard with totals and one card per device.
pub fn dashboard_page(nav: &Nav<'_>, profile: &Profile, summary: &DashboardSummary) -> String {
    let mut cards = String::new();
    for overview in &summary.devices {
        let device = &overview.device;
        let reading = match &overview.latest {
            Some(r) => format!(
                r#"<div class="metric"><span>pH</span><b>{:.2}</b></div>
<div class="metric"><span>Temperature</span><b>{:.1}{}</b></div>
<div class="metric"><span>N / P / K</span><b>{:.0} / {:.0} / {:.0} ppm</b></div>
<div class="metric"><span>Recorded</span><b>{}</b></div>"#,
                r.ph,
                device.temperature_unit.from_celsius(r.temperature),
                device.temperature_unit.symbol(),
                r.nitrogen,
                r.phosphorus,
                r.potassium,
                format_instant(r.recorded_instant(), r.recorded_at.as_deref())
            ),
            None => r#"<p class="muted">No readings yet</p>"#.to_string(),
        };
        let _ = write!(
            cards,
            r#"<div class="card"><h3>{name}</h3><p class="muted">{serial} · {crop}</p>{badge}{reading}<a href="/live-readings?device={id}">Open live view →</a></div>"#,
            name = escape(&device.name),
            serial = escape(&device.serial_number),
            crop = escape(device.crop_type.as_deref().unwrap_or("No crop set")),
            badge = status_badge(&overview.status),
            reading = reading,
            id = device.id
        );
    }
    if summary.devices.is_empty() {
        cards.push_str(
            r#"<div class="card"><p>No devices registered yet. Add a deployment from <a href="/historical-logs">Historical Logs</a>.</p></div>"#,
        );
    }

    let body = format!(
        r#"<h1>Welcome back, {name}</h1>
<div class="grid four">
    <div class="stat"><span>Devices</span><b>{total}</b></div>
    <div class="stat"><span>Online</span><b>{online}</b></div>
    <div class="stat"><span>Active deployments</span><b>{active}</b></div>
    <div class="stat"><span>Readings (24h)</span><b>{last_day}</b></div>
</div>
<h2>Devices</h2>
<div class="grid">{cards}</div>
<h2>Quick links</h2>
<div class="links">
    <a href="/live-readings">Live readings</a>
    <a href="/historical-logs">Historical logs</a>
    <a href="/export-data">Export data</a>
    <a href="/settings">Settings</a>
</div>"#,
        name = escape(profile.display_name()),
        total = summary.total_devices,
        online = summary.online_devices,
        active = summary.active_deployments,
        last_day = summary.readings_last_24h,
        cards = cards
    );
    layout("Dashboard", Some(nav), &body)
}

/// What the live page shows before the WebSocket takes over.
pub struct LiveView<'a> {
    pub devices: &'a [Device],
    pub selected: Option<&'a Device>,
    pub reading: Option<&'a SensorReading>,
    pub status: ConnectionStatus,
    pub threshold_secs: i64,
    pub notice: Option<Notice>,
}

/// Live readings for one device with recommendations.
pub fn live_page(nav: &Nav<'_>, view: &LiveView<'_>) -> String {
    let Some(device) = view.selected else {
        let body = format!(
            r#"<h1>Live Readings</h1>{}<div class="card"><p>No devices registered yet.</p></div>"#,
            notice_html(view.notice.as_ref())
        );
        return layout("Live Readings", Some(nav), &body);
    };

    let unit = device.temperature_unit;
    let mut selector = String::new();
    for d in view.devices {
        let class = if d.id == device.id { " class=\"active\"" } else { "" };
        let _ = write!(
            selector,
            r#"<a href="/live-readings?device={}"{}>{}</a>"#,
            d.id,
            class,
            escape(&d.name)
        );
    }

    let value = |v: Option<f64>, digits: usize| match v {
        Some(v) => format!("{:.*}", digits, v),
        None => "—".to_string(),
    };
    let reading = view.reading;
    let mut advice = String::new();
    if let Some(r) = reading {
        for assessment in assess_reading(r, unit) {
            let _ = write!(
                advice,
                r#"<li><span class="level {}">{}</span> <b>{}</b>: {}</li>"#,
                assessment.level.css_class(),
                assessment.level.label(),
                escape(&assessment.title),
                escape(&assessment.advice)
            );
        }
    }
    let level_class = |level: Option<crate::model::agronomy::Level>| {
        level.map(|l| l.css_class()).unwrap_or("")
    };

    let body = format!(
        r#"<h1>Live Readings</h1>
{notice}
<div class="links">{selector}</div>
<section id="live" data-device="{id}" data-unit="{unit_code}">
    <div class="card">
        <h3>{name}</h3>
        <p class="muted">{serial} · update interval {interval}s</p>
        <p>Status: <span id="status">{badge}</span></p>
        <p class="muted">Last reading: <span id="recorded-at">{recorded}</span> · Offline after <span id="threshold">{threshold}</span>s of silence</p>
    </div>
    <div class="grid">
        <div class="card value {ph_class}" id="card-ph"><span>pH</span><b id="ph">{ph}</b><small>optimal 6.0 – 7.0</small></div>
        <div class="card value {temp_class}" id="card-temperature"><span>Temperature</span><b id="temperature">{temp}</b><small>{symbol}, optimal 25 – 30 °C</small></div>
        <div class="card value {n_class}" id="card-nitrogen"><span>Nitrogen</span><b id="nitrogen">{n}</b><small>ppm, optimal 40 – 60</small></div>
        <div class="card value {p_class}" id="card-phosphorus"><span>Phosphorus</span><b id="phosphorus">{p}</b><small>ppm, optimal 20 – 35</small></div>
        <div class="card value {k_class}" id="card-potassium"><span>Potassium</span><b id="potassium">{k}</b><small>ppm, optimal 150 – 250</small></div>
    </div>
    <div class="card">
        <h3>Recommendations</h3>
        <ul id="advice">{advice}</ul>
    </div>
</section>
<script>{script}</script>"#,
        notice = notice_html(view.notice.as_ref()),
        selector = selector,
        id = device.id,
        unit_code = unit.code(),
        name = escape(&device.name),
        serial = escape(&device.serial_number),
        interval = device.update_interval_seconds,
        badge = status_badge(&view.status),
        recorded = reading
            .map(|r| format_instant(r.recorded_instant(), r.recorded_at.as_deref()))
            .unwrap_or_else(|| "never".to_string()),
        threshold = view.threshold_secs,
        ph = value(reading.map(|r| r.ph), 2),
        ph_class = level_class(reading.map(|r| ph_level(r.ph))),
        temp = value(reading.map(|r| unit.from_celsius(r.temperature)), 1),
        temp_class = level_class(reading.map(|r| temperature_level(r.temperature))),
        symbol = unit.symbol(),
        n = value(reading.map(|r| r.nitrogen), 0),
        n_class = level_class(reading.map(|r| nutrient_level(Nutrient::Nitrogen, r.nitrogen))),
        p = value(reading.map(|r| r.phosphorus), 0),
        p_class = level_class(reading.map(|r| nutrient_level(Nutrient::Phosphorus, r.phosphorus))),
        k = value(reading.map(|r| r.potassium), 0),
        k_class = level_class(reading.map(|r| nutrient_level(Nutrient::Potassium, r.potassium))),
        advice = advice,
        script = LIVE_SCRIPT
    );
    layout("Live Readings", Some(nav), &body)
}

/// Filter values echoed back into the history form.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilterEcho {
    pub device: Option<uuid::Uuid>,
    pub from: String,
    pub to: String,
    pub limit: usize,
}

pub struct HistoryView<'a> {
    pub filter: HistoryFilterEcho,
    pub devices: &'a [Device],
    pub entries: &'a [LogEntry],
    pub trends: &'a [TrendPoint],
    pub stats: &'a HashMap<Uuid, DeploymentStats>,
    pub notice: Option<Notice>,
}

/// `avg (min–max)` to one decimal, or `N/A` without data.
fn stats_cell(stats: Option<ValueStats>) -> String {
    match stats {
        Some(s) => format!("{:.1} ({:.1}–{:.1})", s.avg, s.min, s.max),
        None => "N/A".to_string(),
    }
}

/// Historical logs, daily trends, deployments and the new deployment form.
pub fn history_page(nav: &Nav<'_>, view: &HistoryView<'_>) -> String {
    let mut rows = String::new();
    for entry in view.entries {
        let r = &entry.reading;
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}</td><td>{:.0}</td><td>{:.0}</td><td>{:.0}</td></tr>",
            format_instant(r.recorded_instant(), r.recorded_at.as_deref()),
            escape(entry.device_name.as_deref().unwrap_or("Unknown device")),
            escape(entry.lot_owner.as_deref().unwrap_or("—")),
            r.ph,
            r.temperature,
            r.nitrogen,
            r.phosphorus,
            r.potassium
        );
    }
    if view.entries.is_empty() {
        rows.push_str(r#"<tr><td colspan="8" class="muted">No readings match this filter</td></tr>"#);
    }

    let mut trend_rows = String::new();
    for point in view.trends {
        let _ = write!(
            trend_rows,
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td></tr>",
            point.day.format("%Y-%m-%d"),
            point.samples,
            point.ph,
            point.temperature,
            point.nitrogen,
            point.phosphorus,
            point.potassium
        );
    }
    if view.trends.is_empty() {
        trend_rows.push_str(r#"<tr><td colspan="7" class="muted">No trend data</td></tr>"#);
    }

    let mut deployments = String::new();
    for device in view.devices {
        let window = match (device.start_date, device.end_date) {
            (None, None) => "open-ended".to_string(),
            (start, end) => format!(
                "{} → {}",
                start.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
                end.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
            ),
        };
        let location = device
            .coordinates
            .map(|c| format!("{:.5}, {:.5}", c.lat, c.lng))
            .unwrap_or_else(|| "—".to_string());
        let stats = view.stats.get(&device.id).cloned().unwrap_or_default();
        let npk = stats
            .npk_ratio()
            .map(|(n, p, k)| format!("{}:{}:{}", n, p, k))
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            deployments,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&device.serial_number),
            escape(&device.name),
            escape(device.lot_owner.as_deref().unwrap_or("—")),
            escape(device.crop_type.as_deref().unwrap_or("—")),
            escape(&device.status),
            window,
            location,
            stats.readings,
            stats_cell(stats.ph),
            stats_cell(stats.temperature),
            npk,
            format_instant(stats.latest_at, None)
        );
    }

    let body = format!(
        r#"<h1>Historical Logs</h1>
{notice}
<form class="card filters" method="get" action="/historical-logs">
    <label>Device <select name="device">{device_options}</select></label>
    <label>From <input type="date" name="from" value="{from}"></label>
    <label>To <input type="date" name="to" value="{to}"></label>
    <label>Rows <input type="number" name="limit" min="1" max="1000" value="{limit}"></label>
    <button type="submit">Apply</button>
</form>
<div class="card">
    <h3>Readings</h3>
    <table>
        <thead><tr><th>Recorded</th><th>Device</th><th>Owner</th><th>pH</th><th>Temp °C</th><th>N</th><th>P</th><th>K</th></tr></thead>
        <tbody>{rows}</tbody>
    </table>
</div>
<div class="card">
    <h3>Daily trends</h3>
    <table>
        <thead><tr><th>Day</th><th>Samples</th><th>pH</th><th>Temp °C</th><th>N</th><th>P</th><th>K</th></tr></thead>
        <tbody>{trend_rows}</tbody>
    </table>
</div>
<div class="card">
    <h3>Deployments</h3>
    <table>
        <thead><tr><th>Serial</th><th>Name</th><th>Owner</th><th>Crop</th><th>Status</th><th>Window</th><th>Location</th><th>Readings</th><th>pH</th><th>Temp °C</th><th>NPK ratio</th><th>Latest</th></tr></thead>
        <tbody>{deployments}</tbody>
    </table>
</div>
<form class="card" method="post" action="/devices">
    <h3>New deployment</h3>
    <div class="grid two">
        <label>Name <input type="text" name="name"></label>
        <label>Serial number <input type="text" name="serial_number"></label>
        <label>Lot owner <input type="text" name="lot_owner"></label>
        <label>Crop <input type="text" name="crop_type"></label>
        <label>Start date <input type="date" name="start_date"></label>
        <label>End date <input type="date" name="end_date"></label>
        <label>Latitude <input type="text" name="lat"></label>
        <label>Longitude <input type="text" name="lng"></label>
        <label>Update interval (s) <input type="number" name="update_interval_seconds" min="1" max="86400" value="300"></label>
        <label>Status <select name="status"><option>Active</option><option>Inactive</option><option>Maintenance</option></select></label>
    </div>
    <label>Field description <textarea name="field_description"></textarea></label>
    <label>Notes <textarea name="notes"></textarea></label>
    <label><input type="checkbox" name="auto_sync" checked> Auto sync</label>
    <button type="submit">Register device</button>
</form>"#,
        notice = notice_html(view.notice.as_ref()),
        device_options = device_options(view.devices, view.filter.device, true),
        from = escape(&view.filter.from),
        to = escape(&view.filter.to),
        limit = view.filter.limit,
        rows = rows,
        trend_rows = trend_rows,
        deployments = deployments
    );
    layout("Historical Logs", Some(nav), &body)
}

/// Export form.
pub fn export_page(nav: &Nav<'_>, devices: &[Device], notice: Option<&Notice>) -> String {
    let body = format!(
        r#"<h1>Export Data</h1>
{notice}
<form class="card" method="get" action="/export-data/download">
    <label>Format
        <select name="format"><option value="csv">CSV</option><option value="json">JSON</option></select>
    </label>
    <label>Range
        <select name="range">
            <option value="7d">Last 7 days</option>
            <option value="30d">Last 30 days</option>
            <option value="90d">Last 3 months</option>
            <option value="all">All time</option>
        </select>
    </label>
    <label>Device <select name="device">{device_options}</select></label>
    <button type="submit">Download</button>
</form>"#,
        notice = notice_html(notice),
        device_options = device_options(devices, None, true)
    );
    layout("Export Data", Some(nav), &body)
}

pub struct SettingsView<'a> {
    pub profile: &'a Profile,
    pub devices: &'a [Device],
    pub preferences: &'a UserPreferences,
    pub notice: Option<Notice>,
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked"
    } else {
        ""
    }
}

/// Profile, device and preference forms.
pub fn settings_page(nav: &Nav<'_>, view: &SettingsView<'_>) -> String {
    let mut device_forms = String::new();
    for device in view.devices {
        let unit_option = |unit: TemperatureUnit, label: &str| {
            let chosen = if unit == device.temperature_unit { " selected" } else { "" };
            format!(r#"<option value="{}"{}>{}</option>"#, unit.code(), chosen, label)
        };
        let _ = write!(
            device_forms,
            r#"<form class="card" method="post" action="/settings/device">
    <h3>{serial}</h3>
    <input type="hidden" name="device_id" value="{id}">
    <label>Name <input type="text" name="device_name" value="{name}"></label>
    <label>Update interval (s) <input type="number" name="update_interval" min="1" max="86400" value="{interval}"></label>
    <label>Temperature unit <select name="temperature_unit">{celsius}{fahrenheit}</select></label>
    <label><input type="checkbox" name="auto_sync"{auto_sync}> Auto sync</label>
    <p class="muted">Firmware {firmware}</p>
    <button type="submit">Save device</button>
</form>"#,
            serial = escape(&device.serial_number),
            id = device.id,
            name = escape(&device.name),
            interval = device.update_interval_seconds,
            celsius = unit_option(TemperatureUnit::Celsius, "Celsius"),
            fahrenheit = unit_option(TemperatureUnit::Fahrenheit, "Fahrenheit"),
            auto_sync = checked(device.auto_sync),
            firmware = escape(device.firmware_version.as_deref().unwrap_or("unknown"))
        );
    }
    if view.devices.is_empty() {
        device_forms.push_str(r#"<div class="card"><p class="muted">No devices to configure.</p></div>"#);
    }

    let profile = view.profile;
    let prefs = view.preferences;
    let body = format!(
        r#"<h1>Settings</h1>
{notice}
<form class="card" method="post" action="/settings/profile">
    <h3>Profile</h3>
    <p class="muted">{email} · {role}</p>
    <label>Full name <input type="text" name="full_name" value="{full_name}"></label>
    <label>Company <input type="text" name="company" value="{company}"></label>
    <button type="submit">Save profile</button>
</form>
<h2>Devices</h2>
<div class="grid">{device_forms}</div>
<form class="card" method="post" action="/settings/preferences">
    <h3>Preferences</h3>
    <label><input type="checkbox" name="alerts_enabled"{alerts}> Alerts</label>
    <label><input type="checkbox" name="email_notifications"{email_notifications}> E-mail notifications</label>
    <label>Data retention (days) <input type="number" name="data_retention" min="1" max="3650" value="{retention}"></label>
    <label>Timezone <input type="text" name="timezone" value="{timezone}"></label>
    <button type="submit">Save preferences</button>
</form>"#,
        notice = notice_html(view.notice.as_ref()),
        email = escape(profile.email.as_deref().unwrap_or("")),
        role = profile.role,
        full_name = escape(profile.full_name.as_deref().unwrap_or("")),
        company = escape(profile.company.as_deref().unwrap_or("")),
        device_forms = device_forms,
        alerts = checked(prefs.alerts_enabled),
        email_notifications = checked(prefs.email_notifications),
        retention = prefs.data_retention_days,
        timezone = escape(&prefs.timezone)
    );
    layout("Settings", Some(nav), &body)
}

pub fn about_page(nav: &Nav<'_>) -> String {
    let body = format!(
        r#"<h1>About AGRIna</h1>
<div class="card">
    <p>AGRIna monitors soil conditions in the field. Each sensor unit reports pH, soil temperature and nitrogen, phosphorus and potassium levels, and the dashboard turns those readings into live status, history and recommendations.</p>
    <p>A device is shown offline when its latest reading is older than {per_device} seconds for every registered device.</p>
    <p class="muted">Version {version}</p>
</div>"#,
        per_device = crate::live::DEFAULT_OFFLINE_SECS_PER_DEVICE,
        version = env!("CARGO_PKG_VERSION")
    );
    layout("About", Some(nav), &body)
}

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f3f7f2; color: #233; min-height: 100vh; }
.nav { display: flex; gap: 16px; align-items: center; padding: 12px 24px; background: #2f6b3a; color: white; flex-wrap: wrap; }
.nav a { color: #dfeedd; text-decoration: none; }
.nav a.active { color: white; font-weight: bold; }
.nav .brand { font-weight: bold; margin-right: 12px; }
.nav .user { margin-left: auto; }
.nav button { background: transparent; color: white; border: 1px solid #dfeedd; }
.container { max-width: 1200px; margin: 0 auto; padding: 24px; }
h1 { margin-bottom: 16px; color: #2f6b3a; }
h2 { margin: 24px 0 12px; }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); gap: 16px; }
.grid.two { grid-template-columns: repeat(auto-fit, minmax(320px, 1fr)); }
.grid.four { grid-template-columns: repeat(4, 1fr); }
.card { background: white; border-radius: 12px; padding: 20px; margin-bottom: 16px; box-shadow: 0 4px 14px rgba(0,0,0,0.06); }
.card h3 { color: #2f6b3a; margin-bottom: 10px; }
.card.value b { display: block; font-size: 2rem; margin: 8px 0; }
.card.level-optimal { border-top: 4px solid #3c9a4e; }
.card.level-acceptable { border-top: 4px solid #d8b23a; }
.card.level-attention { border-top: 4px solid #d2553f; }
.stat { background: white; border-radius: 12px; padding: 16px; }
.stat b { display: block; font-size: 1.8rem; }
.metric { display: flex; justify-content: space-between; padding: 6px 0; border-bottom: 1px solid #eee; }
.muted { color: #789; }
.badge { padding: 2px 8px; border-radius: 8px; font-size: 0.85rem; }
.badge.online { background: #dff3e2; color: #23693a; }
.badge.offline { background: #fbe3de; color: #a33b2a; }
.badge.never, .badge.unknown { background: #eceff1; color: #556; }
.level.level-optimal { color: #23693a; }
.level.level-acceptable { color: #9a7b12; }
.level.level-attention { color: #a33b2a; }
.notice { padding: 12px 16px; border-radius: 8px; margin-bottom: 16px; }
.notice.info { background: #dff3e2; }
.notice.error { background: #fbe3de; }
.links { display: flex; gap: 12px; flex-wrap: wrap; margin-bottom: 16px; }
.links a { padding: 6px 12px; background: white; border-radius: 8px; color: #2f6b3a; text-decoration: none; }
.links a.active { background: #2f6b3a; color: white; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #eee; }
label { display: block; margin-bottom: 10px; }
input, select, textarea { display: block; width: 100%; padding: 6px 8px; margin-top: 4px; }
input[type=checkbox] { display: inline; width: auto; }
button { padding: 8px 16px; border: none; border-radius: 8px; background: #2f6b3a; color: white; cursor: pointer; }
.auth { max-width: 760px; margin: 40px auto; text-align: center; }
.auth form { text-align: left; }
.filters { display: flex; gap: 12px; align-items: end; flex-wrap: wrap; }
"#;

const LIVE_SCRIPT: &str = r#"
(function () {
    const root = document.getElementById('live');
    if (!root) return;
    const unit = root.dataset.unit;
    let ws;
    let reconnectAttempts = 0;
    const maxReconnectAttempts = 5;

    function toUnit(celsius) {
        return unit === 'F' ? celsius * 9 / 5 + 32 : celsius;
    }

    function setText(id, text) {
        const el = document.getElementById(id);
        if (el) el.textContent = text;
    }

    function formatAge(seconds) {
        if (seconds < 60) return `${seconds}s`;
        if (seconds < 3600) return `${Math.floor(seconds / 60)}m ${seconds % 60}s`;
        if (seconds < 86400) return `${Math.floor(seconds / 3600)}h ${Math.floor((seconds % 3600) / 60)}m`;
        return `${Math.floor(seconds / 86400)}d ${Math.floor((seconds % 86400) / 3600)}h`;
    }

    function renderStatus(status) {
        const label = status.state.toUpperCase();
        const age = status.age_secs !== undefined ? ` · ${formatAge(status.age_secs)} ago` : '';
        document.getElementById('status').innerHTML =
            `<span class="badge ${status.state}">${label}${age}</span>`;
    }

    function update(data) {
        if (data.error) {
            console.error('Live channel error:', data.error);
            return;
        }
        if (data.device_id !== root.dataset.device) return;
        renderStatus(data.status);
        setText('threshold', data.threshold_secs);
        const r = data.reading;
        if (!r) return;
        setText('ph', r.ph.toFixed(2));
        setText('temperature', toUnit(r.temperature).toFixed(1));
        setText('nitrogen', r.nitrogen.toFixed(0));
        setText('phosphorus', r.phosphorus.toFixed(0));
        setText('potassium', r.potassium.toFixed(0));
        setText('recorded-at', r.recorded_at || 'unknown');
    }

    function connect() {
        const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
        ws = new WebSocket(`${protocol}//${window.location.host}/ws/live?device=${root.dataset.device}`);
        ws.onopen = function () { reconnectAttempts = 0; };
        ws.onmessage = function (event) {
            try {
                update(JSON.parse(event.data));
            } catch (e) {
                console.error('Failed to parse live update:', e);
            }
        };
        ws.onclose = function () {
            if (reconnectAttempts < maxReconnectAttempts) {
                reconnectAttempts++;
                setTimeout(connect, 2000 * reconnectAttempts);
            }
        };
    }

    connect();
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use uuid::Uuid;

    fn nav() -> Nav<'static> {
        Nav {
            active: "/dashboard",
            user_name: "Ana <admin>",
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b a="1">Tom & 'Jerry'</b>"#),
            "&lt;b a=&quot;1&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_layout_escapes_user_name() {
        let html = about_page(&nav());
        assert!(html.contains("Ana &lt;admin&gt;"));
        assert!(!html.contains("Ana <admin>"));
        assert!(html.contains(r#"href="/live-readings""#));
    }

    #[test]
    fn test_login_page_keeps_return_path() {
        let html = login_page(
            Some("/settings\"><script>"),
            Some(&Notice::Error("Invalid login credentials".to_string())),
        );
        assert!(html.contains(r#"name="redirectedFrom" value="/settings&quot;&gt;&lt;script&gt;""#));
        assert!(html.contains("notice error"));
    }

    #[test]
    fn test_settings_page_renders_forms() {
        let user = Uuid::new_v4();
        let profile = Profile {
            id: user,
            full_name: Some("Ana Reyes".to_string()),
            email: Some("ana@farm.ph".to_string()),
            role: Role::Admin,
            company: None,
            updated_at: None,
        };
        let prefs = UserPreferences::defaults_for(user);
        let html = settings_page(
            &nav(),
            &SettingsView {
                profile: &profile,
                devices: &[],
                preferences: &prefs,
                notice: Some(Notice::Info("Profile saved".to_string())),
            },
        );
        assert!(html.contains("System Administrator"));
        assert!(html.contains(r#"value="Ana Reyes""#));
        assert!(html.contains(r#"name="data_retention" min="1" max="3650" value="90""#));
        assert!(html.contains("Profile saved"));
    }

    #[test]
    fn test_live_page_without_devices() {
        let html = live_page(
            &nav(),
            &LiveView {
                devices: &[],
                selected: None,
                reading: None,
                status: ConnectionStatus::Never,
                threshold_secs: 60,
                notice: None,
            },
        );
        assert!(html.contains("No devices registered yet."));
        assert!(!html.contains("new WebSocket"));
    }
}
