// SPDX-License-Identifier: Apache-2.0

use super::require_claims;
use crate::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Static machine-readable catalog of the operator surfaces.
pub(crate) async fn catalog_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_claims(&state, &headers) {
        return resp;
    }
    Json(json!({
        "tools": [
            {
                "name": "agent.plan",
                "description": "Create deterministic app blueprint from prompt",
                "method": "POST",
                "path": "/v1/agents/plan",
            },
            {
                "name": "agent.clarify",
                "description": "Run structured clarification loop and return targeted follow-up questions",
                "method": "POST",
                "path": "/v1/agents/clarify",
            },
            {
                "name": "agent.act",
                "description": "Apply one policy-checked mutation",
                "method": "POST",
                "path": "/v1/agents/act",
            },
            {
                "name": "agent.verify",
                "description": "Run machine-readable verification checks",
                "method": "POST",
                "path": "/v1/agents/verify",
            },
            {
                "name": "agent.deploy",
                "description": "Request self-host or managed deploy intent",
                "method": "POST",
                "path": "/v1/agents/deploy",
            },
            {
                "name": "llm.providers",
                "description": "List configured model providers with health and models",
                "method": "GET",
                "path": "/v1/llm/providers",
            },
            {
                "name": "llm.infer",
                "description": "Run one model call against local or frontier provider",
                "method": "POST",
                "path": "/v1/llm/infer",
            },
            {
                "name": "studio.bundle",
                "description": "Download the generated application bundle as a tarball",
                "method": "GET",
                "path": "/v1/studio/jobs/{id}/bundle",
            },
        ],
    }))
    .into_response()
}
