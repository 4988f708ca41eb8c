//! Session gate: resolves the session cookie on every request and decides
//! whether the request may proceed.
//!
//! Pages in the protected set redirect anonymous visitors to `/login` with
//! the original path in `redirectedFrom`; API and WebSocket routes answer
//! 401 instead. A failed session lookup is treated exactly like a missing
//! cookie, so the gate itself never fails a request.

use crate::auth::cookies::{append_set_cookie, removal_cookie, session_cookie, session_token};
use crate::auth::provider::{AuthUser, Session};
use crate::web::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

/// Page prefixes only signed-in users may visit.
pub const PROTECTED_PAGES: [&str; 10] = [
    "/dashboard",
    "/home",
    "/live-readings",
    "/historical-logs",
    "/history",
    "/export-data",
    "/export",
    "/settings",
    "/about",
    "/devices",
];

/// Prefixes of machine endpoints that answer 401 instead of redirecting.
/// `/api/health` stays public.
pub const PROTECTED_ENDPOINTS: [&str; 2] = ["/api", "/ws"];

const PUBLIC_ENDPOINTS: [&str; 1] = ["/api/health"];

/// Identity attached to a request by the gate.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: AuthUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for CurrentUser {
    fn from(session: Session) -> Self {
        Self {
            user: session.user,
            token: session.token,
            expires_at: session.expires_at,
        }
    }
}

/// What the gate does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    RedirectToLogin { return_to: String },
    RedirectToDashboard,
    Unauthorized,
}

/// Whether `path` is `prefix` or lies below it.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn is_protected_page(path: &str) -> bool {
    PROTECTED_PAGES.iter().any(|prefix| under(path, prefix))
}

pub fn is_protected_endpoint(path: &str) -> bool {
    if PUBLIC_ENDPOINTS.iter().any(|public| under(path, public)) {
        return false;
    }
    PROTECTED_ENDPOINTS.iter().any(|prefix| under(path, prefix))
}

/// Decide what happens to a request for `path`.
pub fn decide(path: &str, authenticated: bool) -> GateDecision {
    if authenticated {
        return match path {
            "/" | "/login" => GateDecision::RedirectToDashboard,
            _ => GateDecision::Continue,
        };
    }

    if is_protected_endpoint(path) {
        GateDecision::Unauthorized
    } else if is_protected_page(path) {
        GateDecision::RedirectToLogin {
            return_to: path.to_string(),
        }
    } else {
        GateDecision::Continue
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRedirect<'a> {
    redirected_from: &'a str,
}

/// `/login` URL that returns to `return_to` after sign-in.
pub fn login_url(return_to: &str) -> String {
    match serde_qs::to_string(&LoginRedirect {
        redirected_from: return_to,
    }) {
        Ok(query) => format!("/login?{}", query),
        Err(e) => {
            warn!("Failed to encode login redirect for {}: {}", return_to, e);
            "/login".to_string()
        }
    }
}

/// Where to go after sign-in: `candidate` when it is a local path, else the
/// dashboard.
pub fn safe_return_path(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && path != "/login" =>
        {
            path.to_string()
        }
        _ => "/dashboard".to_string(),
    }
}

/// Cookie change the gate attaches to the response.
enum CookieSync {
    None,
    Refresh(Session),
    Remove,
}

/// Middleware resolving the session and enforcing [`decide`].
pub async fn session_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let config = &state.config;
    let path = request.uri().path().to_string();
    let token = session_token(request.headers(), &config.cookie_name);

    let mut sync = CookieSync::None;
    let mut current: Option<CurrentUser> = None;
    if let Some(token) = token {
        match state.auth.get_user(&token).await {
            Ok(session) => {
                if session.expires_at - Utc::now() <= config.refresh_window() {
                    match state.auth.refresh(&token).await {
                        Ok(fresh) => {
                            debug!("Session for {} refreshed", fresh.user.id);
                            current = Some(fresh.clone().into());
                            sync = CookieSync::Refresh(fresh);
                        }
                        Err(e) => {
                            warn!("Session refresh failed: {}", e);
                            current = Some(session.into());
                        }
                    }
                } else {
                    current = Some(session.into());
                }
            }
            Err(e) => {
                debug!("Discarding session cookie for {}: {}", path, e);
                sync = CookieSync::Remove;
            }
        }
    }

    let mut response = match decide(&path, current.is_some()) {
        GateDecision::Continue => {
            if let Some(user) = current {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        GateDecision::RedirectToLogin { return_to } => {
            Redirect::to(&login_url(&return_to)).into_response()
        }
        GateDecision::RedirectToDashboard => Redirect::to("/dashboard").into_response(),
        GateDecision::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Not authenticated" })),
        )
            .into_response(),
    };

    match sync {
        CookieSync::None => {}
        CookieSync::Refresh(session) => {
            let max_age = (session.expires_at - Utc::now()).num_seconds();
            append_set_cookie(
                response.headers_mut(),
                &session_cookie(&config.cookie_name, &session.token, max_age, config.cookie_secure),
            );
        }
        CookieSync::Remove => append_set_cookie(
            response.headers_mut(),
            &removal_cookie(&config.cookie_name, config.cookie_secure),
        ),
    }

    response
}
