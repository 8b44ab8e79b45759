// SPDX-License-Identifier: Apache-2.0

//! Health, decisions, replay, and feedback.

use super::{decode_json, require_claims, require_idempotency_key};
use crate::{api_error, stored_response, with_idempotency, AppState};
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use vda_model::{DecisionRequest, FeedbackEvent};

pub(crate) async fn health_handler(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "service": crate::SERVICE_NAME,
        "policy_version": state.cfg.policy_version,
        "data_version": state.cfg.data_version,
        "idempotency_cleanup_deleted_total": state.store.idempotency_cleanup_deleted_total(),
    }))
    .into_response()
}

pub(crate) async fn decisions_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let key = match require_idempotency_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let mut req: DecisionRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.tenant_id.is_empty() {
        req.tenant_id = claims.tenant_id.clone();
    }
    if req.tenant_id != claims.tenant_id {
        return api_error(StatusCode::FORBIDDEN, "tenant_mismatch", None);
    }

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let exec = async {
        let resp = state.engine.decide(&req).await?;
        let payload = serde_json::to_vec(&resp)?;
        state
            .store
            .save_decision(
                &resp.decision_id,
                &tenant_id,
                &resp.decision_hash,
                &resp.policy_version,
                &resp.data_version,
                resp.generated_at,
                &payload,
            )
            .await?;
        Ok((StatusCode::OK, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

#[derive(Deserialize)]
struct ReplayRequest {
    #[serde(default)]
    decision_id: String,
}

pub(crate) async fn replay_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let req: ReplayRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.decision_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "invalid_request", None);
    }

    match state
        .store
        .get_decision_payload(req.decision_id.trim(), &claims.tenant_id)
        .await
    {
        Ok(Some(payload)) => stored_response(200, payload),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "decision_not_found", None),
        Err(err) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "replay_read_failed",
            Some(json!({"details": err.to_string()})),
        ),
    }
}

pub(crate) async fn feedback_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let key = match require_idempotency_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let event: FeedbackEvent = match decode_json(&body) {
        Ok(event) => event,
        Err(resp) => return resp,
    };

    let endpoint = uri.path().to_string();
    let exec = async {
        let payload = serde_json::to_vec(&json!({
            "status": "accepted",
            "decision_id": event.decision_id,
            "event_type": event.event_type,
            "actor": claims.subject,
            "tenant_id": claims.tenant_id,
        }))?;
        Ok((StatusCode::ACCEPTED, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}
