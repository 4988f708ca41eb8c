//! Form submission handlers.
//!
//! Successful submissions redirect (303); failures re-render the page they
//! came from with the error shown inline.

use crate::auth::cookies::{append_set_cookie, removal_cookie, session_cookie};
use crate::auth::{safe_return_path, CurrentUser};
use crate::error::DashboardError;
use crate::model::forms::{
    DeploymentForm, DeviceSettingsForm, LoginForm, PreferencesForm, ProfileForm, SignupForm,
};
use crate::model::{Profile, Role};
use crate::web::handlers::{profile_for, render_history_page, render_settings_page, HistoryParams};
use crate::web::pages::{self, Notice};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use chrono::Utc;
use tracing::{info, warn};

/// `POST /login`
pub async fn sign_in(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let redirected_from = form
        .redirected_from
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty());

    match state.auth.sign_in(&form.email, &form.password).await {
        Ok(session) => {
            let target = safe_return_path(redirected_from);
            let config = &state.config;
            let max_age = (session.expires_at - Utc::now()).num_seconds();
            let mut response = Redirect::to(&target).into_response();
            append_set_cookie(
                response.headers_mut(),
                &session_cookie(&config.cookie_name, &session.token, max_age, config.cookie_secure),
            );
            response
        }
        Err(e) => {
            let message = match e {
                DashboardError::InvalidCredentials => e.to_string(),
                other => {
                    warn!("Sign-in failed: {}", other);
                    "Sign-in failed, please try again".to_string()
                }
            };
            (
                StatusCode::UNAUTHORIZED,
                Html(pages::login_page(redirected_from, Some(&Notice::Error(message)))),
            )
                .into_response()
        }
    }
}

/// `POST /signup`
pub async fn sign_up(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let failure = |status: StatusCode, message: String| {
        (status, Html(pages::login_page(None, Some(&Notice::Error(message))))).into_response()
    };

    let (full_name, email, password) = match form.validate() {
        Ok(fields) => fields,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let user = match state.auth.sign_up(&email, &password).await {
        Ok(user) => user,
        Err(DashboardError::Conflict(message)) => return failure(StatusCode::CONFLICT, message),
        Err(e) => {
            warn!("Sign-up failed for {}: {}", email, e);
            return failure(e.status_code(), "Sign-up failed, please try again".to_string());
        }
    };

    let profile = Profile {
        id: user.id,
        full_name,
        email: Some(user.email.clone()),
        role: Role::Viewer,
        company: None,
        updated_at: Some(Utc::now()),
    };
    if let Err(e) = state.store.upsert_profile(profile).await {
        warn!("Failed to create profile for {}: {}", user.id, e);
    }

    Html(pages::login_page(
        None,
        Some(&Notice::Info(
            "Account created. Sign in with your new credentials.".to_string(),
        )),
    ))
    .into_response()
}

/// `POST /logout`
pub async fn sign_out(
    State(state): State<AppState>,
    current: Option<Extension<CurrentUser>>,
) -> Response {
    if let Some(Extension(current)) = current {
        match state.auth.sign_out(&current.token).await {
            Ok(()) => info!("Signed out user {}", current.user.id),
            Err(e) => warn!("Sign-out failed for {}: {}", current.user.id, e),
        }
    }

    let mut response = Redirect::to("/login").into_response();
    append_set_cookie(
        response.headers_mut(),
        &removal_cookie(&state.config.cookie_name, state.config.cookie_secure),
    );
    response
}

/// `POST /devices`: register a new deployment.
pub async fn create_device(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<DeploymentForm>,
) -> Response {
    let result = match form.validate() {
        Ok(new_device) => state.store.create_device(new_device).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(device) => {
            info!(
                "User {} registered device {} ({})",
                current.user.id, device.serial_number, device.id
            );
            Redirect::to("/historical-logs").into_response()
        }
        Err(e) => {
            render_history_page(
                &state,
                &current,
                &HistoryParams::default(),
                Some(Notice::Error(e.to_string())),
            )
            .await
        }
    }
}

fn settings_failure(page: Html<String>) -> Response {
    (StatusCode::BAD_REQUEST, page).into_response()
}

/// `POST /settings/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<ProfileForm>,
) -> Response {
    let update = form.into_update();
    let result = match state.store.update_profile(current.user.id, update.clone()).await {
        Err(DashboardError::NotFound(_)) => {
            let mut profile = profile_for(&state, &current).await;
            profile.full_name = update.full_name;
            profile.company = update.company;
            profile.updated_at = Some(Utc::now());
            state.store.upsert_profile(profile).await
        }
        other => other.map(|_| ()),
    };

    match result {
        Ok(()) => Redirect::to("/settings?saved=profile").into_response(),
        Err(e) => settings_failure(
            render_settings_page(&state, &current, Some(Notice::Error(e.to_string()))).await,
        ),
    }
}

/// `POST /settings/device`
pub async fn update_device(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<DeviceSettingsForm>,
) -> Response {
    let result = match form.validate() {
        Ok((device_id, update)) => state.store.update_device_settings(device_id, update).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(device) => {
            info!("User {} updated settings of device {}", current.user.id, device.id);
            Redirect::to("/settings?saved=device").into_response()
        }
        Err(e) => settings_failure(
            render_settings_page(&state, &current, Some(Notice::Error(e.to_string()))).await,
        ),
    }
}

/// `POST /settings/preferences`
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Form(form): Form<PreferencesForm>,
) -> Response {
    let result = match form.validate(current.user.id) {
        Ok(preferences) => state.store.upsert_preferences(preferences).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Redirect::to("/settings?saved=preferences").into_response(),
        Err(e) => settings_failure(
            render_settings_page(&state, &current, Some(Notice::Error(e.to_string()))).await,
        ),
    }
}
