// SPDX-License-Identifier: Apache-2.0

pub(crate) mod agents;
pub(crate) mod apps;
pub(crate) mod core;
pub(crate) mod llm;
pub(crate) mod migration;
pub(crate) mod studio;
pub(crate) mod tools;
pub(crate) mod ui;

use crate::{api_error, AppState};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use std::collections::HashMap;
use vda_model::Claims;

/// Authenticate from the `Authorization` header. On failure the error
/// response is ready to return as-is.
pub(crate) fn require_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, Response> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    state
        .auth
        .authenticate(header)
        .map_err(|err| api_error(err.status(), &err.to_string(), None))
}

/// Streaming and preview routes also accept `?token=` when no
/// `Authorization` header was sent.
pub(crate) fn require_claims_for_stream(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<Claims, Response> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !header.trim().is_empty() {
        return require_claims(state, headers);
    }
    let token = params.get("token").map(String::as_str).unwrap_or("").trim();
    if token.is_empty() {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing_authorization_header",
            None,
        ));
    }
    state
        .auth
        .authenticate(&format!("Bearer {token}"))
        .map_err(|err| api_error(err.status(), &err.to_string(), None))
}

/// Every mutating route requires a non-empty `Idempotency-Key` header.
pub(crate) fn require_idempotency_key(headers: &HeaderMap) -> Result<String, Response> {
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if key.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "missing_idempotency_key",
            None,
        ));
    }
    Ok(key.to_string())
}

/// Strict JSON decode; any failure is a 400 `invalid_json`.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid_json", None))
}
