use super::state::ServerState;
use crate::store::{User, UserStore};

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

/// Header set by the Cloudflare Access proxy on every forwarded request.
pub const HEADER_CF_JWT: &str = "Cf-Access-Jwt-Assertion";

/// The authenticated caller, provisioned on first sight.
///
/// The token's signature is not verified here: the app is only reachable
/// through the Access proxy, which has already validated it. The claims are
/// still checked for expiry and, when configured, for the expected audience.
#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub email: String,
    pub name: String,
}

pub enum SessionExtractionError {
    AccessDenied,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::UNAUTHORIZED.into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct AccessClaims {
    email: String,
    name: Option<String>,
    exp: Option<i64>,
    aud: Option<Audience>,
}

impl AccessClaims {
    fn has_audience(&self, expected: &str) -> bool {
        match &self.aud {
            Some(Audience::One(aud)) => aud == expected,
            Some(Audience::Many(auds)) => auds.iter().any(|a| a == expected),
            None => false,
        }
    }
}

fn decode_claims(token: &str) -> Option<AccessClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(segments[1]).ok()?;
    serde_json::from_slice(&payload).ok()
}

fn validate_claims(claims: &AccessClaims, expected_audience: Option<&str>) -> bool {
    if let Some(exp) = claims.exp {
        if exp <= Utc::now().timestamp() {
            debug!("Access token expired at {}", exp);
            return false;
        }
    }
    if let Some(expected) = expected_audience {
        if !claims.has_audience(expected) {
            debug!("Access token audience mismatch");
            return false;
        }
    }
    true
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Session, SessionExtractionError> {
    let token = parts
        .headers
        .get(HEADER_CF_JWT)
        .and_then(|v| v.to_str().ok())
        .ok_or(SessionExtractionError::AccessDenied)?;

    let claims = decode_claims(token).ok_or(SessionExtractionError::AccessDenied)?;
    if !validate_claims(&claims, ctx.config.cf_audience.as_deref()) {
        return Err(SessionExtractionError::AccessDenied);
    }

    let name = claims.name.clone().unwrap_or_else(|| claims.email.clone());
    let User { id, email, name } = ctx
        .store
        .get_or_create_user(&claims.email, &name)
        .map_err(|err| {
            debug!("Failed to provision user {}: {}", claims.email, err);
            SessionExtractionError::InternalError
        })?;

    Ok(Session {
        user_id: id,
        email,
        name,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}
