//! API key guard in front of `/api/*`.
//!
//! Keys come from `REDISMAN_API_KEYS`. With no key configured the guard lets
//! every request through. A request without a key gets `401`, a request with
//! an unknown key gets `403`. Handlers behind the guard never see the key.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::server::errors::ApiError;

/// Alternative header for clients that cannot send `Authorization: Bearer`.
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, Default)]
pub struct ApiKeyGuard {
    keys: Arc<Vec<String>>,
}

impl ApiKeyGuard {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            keys: Arc::new(config.api_keys.clone()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let Some(provided) = provided_key(headers) else {
            tracing::warn!("Missing API key in request");
            return Err(ApiError::Unauthorized);
        };

        // No short-circuit, every configured key is compared
        let accepted = self
            .keys
            .iter()
            .fold(false, |found, key| found | constant_time_compare(provided, key));

        if accepted {
            Ok(())
        } else {
            tracing::warn!("Invalid API key provided");
            Err(ApiError::Forbidden)
        }
    }
}

/// Middleware entry point, see `axum::middleware::from_fn_with_state`.
pub async fn require_api_key(
    State(guard): State<ApiKeyGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    guard.check(request.headers())?;
    Ok(next.run(request).await)
}

fn provided_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim);

    bearer
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|value| value.to_str().ok()))
        .filter(|key| !key.is_empty())
}

/// Length is not secret, only the content comparison runs in constant time.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}
