use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{debug, error};

use super::session::Session;
use super::state::*;
use crate::scheduler::WeeklyTrigger;
use crate::store::{SettingsStore, UserSettings};

async fn get_settings(session: Session, State(store): State<GuardedStore>) -> Response {
    match store.get_user_settings(session.user_id) {
        Ok(settings) => Json(settings.unwrap_or_default()).into_response(),
        Err(err) => {
            error!("Failed to load settings: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Persists the settings and synchronously reconciles the user's reminder
/// trigger, so the response only goes out once the schedule matches what was
/// saved.
async fn put_settings(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<UserSettings>,
) -> Response {
    if let Err(err) = WeeklyTrigger::new(
        body.notification_day,
        body.notification_hour,
        body.notification_minute,
    ) {
        debug!("Rejecting settings for user {}: {}", session.user_id, err);
        return (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response();
    }

    if let Err(err) = state.store.upsert_user_settings(session.user_id, &body) {
        error!("Failed to save settings: {}", err);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Err(err) = state.scheduler.refresh(session.user_id).await {
        error!(
            "Failed to reschedule reminder for user {}: {}",
            session.user_id, err
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    Json(body).into_response()
}

async fn post_test_email(session: Session, State(state): State<ServerState>) -> Response {
    let config = match state.store.get_notification_config(session.user_id) {
        Ok(Some(config)) => config,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "no smtp settings saved").into_response();
        }
        Err(err) => {
            error!("Failed to load settings: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(smtp) = config.smtp() else {
        return (StatusCode::BAD_REQUEST, "smtp settings are incomplete").into_response();
    };

    if let Err(err) = state.mailer.test_connection(&smtp).await {
        debug!(
            "SMTP connection check for user {} failed: {}",
            session.user_id, err
        );
        return (StatusCode::BAD_GATEWAY, err.to_string()).into_response();
    }

    match state.mailer.send_test(&config.recipient, &smtp).await {
        Ok(ack) => Json(serde_json::json!({ "message": ack })).into_response(),
        Err(err) => {
            debug!("Test mail for user {} failed: {}", session.user_id, err);
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

pub fn make_settings_routes() -> Router<ServerState> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/settings", put(put_settings))
        .route("/settings/test-email", post(post_test_email))
}
