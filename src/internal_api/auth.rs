use std::{fs, path::Path};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::typed_header::{TypedHeader, TypedHeaderRejection};
use headers::{authorization::Basic, Authorization};
use serde::Deserialize;
use tracing::{error, warn};

use crate::state::AppState;

/// Basic-auth credentials guarding `/internal/*`.
#[derive(Debug, Deserialize)]
pub struct InternalAuthConfig {
    pub username: String,
    pub password: String,
}

pub async fn require_internal_auth(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    req: Request,
    next: Next,
) -> Response {
    let Some(config) = state.internal_auth.as_deref() else {
        error!("internal credentials are missing; internal routes refuse all requests");
        return internal_error_response();
    };

    let Ok(TypedHeader(Authorization(basic))) = auth else {
        return unauthorized_response();
    };

    if basic.username() != config.username || basic.password() != config.password {
        return unauthorized_response();
    }

    next.run(req).await
}

/// Read the credentials file; `None` disables the internal routes.
pub fn load_auth_config(path: &Path) -> Option<InternalAuthConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "internal auth file not found; internal routes disabled"
        );
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            error!(?err, path = %path.display(), "failed to read internal auth file");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(config) => Some(config),
        Err(err) => {
            error!(?err, "failed to parse internal auth file");
            None
        }
    }
}

fn unauthorized_response() -> Response {
    let mut res = Response::new(Body::from("unauthorized"));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Internal\""),
    );
    res
}

fn internal_error_response() -> Response {
    let mut res = Response::new(Body::from("internal auth not configured"));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}
