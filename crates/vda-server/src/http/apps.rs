// SPDX-License-Identifier: Apache-2.0

//! App lifecycle: create, read, patch, classed mutation, verification,
//! deploy intents. The executors are shared with the agent wrappers.

use super::{decode_json, require_claims, require_idempotency_key};
use crate::{api_error, with_idempotency, AppState, HandlerError};
use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use vda_core::stable_id;
use vda_engine::PolicyInput;
use vda_model::{apply_mutation, App};

#[derive(Deserialize)]
struct CreateAppRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    blueprint: Option<Map<String, Value>>,
}

pub(crate) async fn create_app_handler(
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
    let req: CreateAppRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name_required", None);
    }

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let idem_key = key.clone();
    let exec = async {
        let now = Utc::now();
        let app = App {
            id: stable_id("app", &[&tenant_id, &idem_key, &name]),
            tenant_id: tenant_id.clone(),
            name,
            blueprint: req.blueprint.unwrap_or_default(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        state.store.create_app(&app).await?;
        let payload = serde_json::to_vec(&json!({
            "app": app,
            "policy_version": state.cfg.policy_version,
            "data_version": state.cfg.data_version,
        }))?;
        Ok((StatusCode::CREATED, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

pub(crate) async fn get_app_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if app_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "app_id_required", None);
    }
    match state.store.get_app(&claims.tenant_id, app_id.trim()).await {
        Ok(Some(app)) => Json(json!({"app": app})).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "app_not_found", None),
        Err(err) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "app_read_failed",
            Some(json!({"details": err.to_string()})),
        ),
    }
}

#[derive(Deserialize)]
struct PatchAppRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    blueprint_patch: Option<Map<String, Value>>,
}

pub(crate) async fn patch_app_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(app_id): Path<String>,
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
    let req: PatchAppRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let exec = async {
        let Some(mut app) = state.store.get_app(&tenant_id, app_id.trim()).await? else {
            return Ok((
                StatusCode::NOT_FOUND,
                serde_json::to_vec(&json!({"error": "app_not_found"}))?,
            ));
        };
        if let Some(name) = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            app.name = name.to_string();
        }
        if let Some(patch) = req.blueprint_patch {
            for (key, value) in patch {
                app.blueprint.insert(key, value);
            }
        }
        app.version += 1;
        app.updated_at = Utc::now();
        state.store.update_app(&app).await?;
        let payload = serde_json::to_vec(&json!({"app": app}))?;
        Ok((StatusCode::OK, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

#[derive(Deserialize)]
pub(crate) struct MutationRequest {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Value,
}

pub(crate) async fn mutation_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(app_id): Path<String>,
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
    let req: MutationRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let idem_key = key.clone();
    let exec = async {
        let (status, value) = execute_mutation(&state, &tenant_id, &app_id, &idem_key, &req).await?;
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

/// Policy-gated mutation with before/after snapshots and an audit row.
pub(crate) async fn execute_mutation(
    state: &AppState,
    tenant_id: &str,
    app_id: &str,
    idem_key: &str,
    req: &MutationRequest,
) -> Result<(StatusCode, Value), HandlerError> {
    let Some(mut app) = state.store.get_app(tenant_id, app_id).await? else {
        return Ok((StatusCode::NOT_FOUND, json!({"error": "app_not_found"})));
    };

    let policy_out = state
        .policy
        .evaluate(tenant_id, &PolicyInput::for_mutation(&req.class))
        .await?;
    if !policy_out.allowed {
        return Ok((
            StatusCode::FORBIDDEN,
            json!({"error": "mutation_not_allowed", "class": req.class}),
        ));
    }

    let before = serde_json::to_vec(&app)?;
    if let Err(err) = apply_mutation(&mut app, &req.class, req.path.as_deref(), &req.value) {
        return Ok((
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_mutation", "details": err.to_string()}),
        ));
    }
    app.version += 1;
    app.updated_at = Utc::now();
    state.store.update_app(&app).await?;
    let after = serde_json::to_vec(&app)?;
    let mutation_payload = serde_json::to_vec(&json!({
        "class": req.class,
        "path": req.path,
        "value": req.value,
    }))?;

    let mutation_id = stable_id("mut", &[tenant_id, app_id, idem_key, &req.class]);
    state
        .store
        .save_mutation(
            &mutation_id,
            tenant_id,
            app_id,
            &req.class,
            &before,
            &after,
            &mutation_payload,
        )
        .await?;

    Ok((
        StatusCode::OK,
        json!({
            "mutation_id": mutation_id,
            "policy_version": state.cfg.policy_version,
            "app": app,
        }),
    ))
}

pub(crate) async fn verify_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(app_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let key = match require_idempotency_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let idem_key = key.clone();
    let exec = async {
        let (status, value) = execute_verify(&state, &tenant_id, &app_id, &idem_key).await?;
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

pub(crate) async fn execute_verify(
    state: &AppState,
    tenant_id: &str,
    app_id: &str,
    idem_key: &str,
) -> Result<(StatusCode, Value), HandlerError> {
    let Some(app) = state.store.get_app(tenant_id, app_id).await? else {
        return Ok((StatusCode::NOT_FOUND, json!({"error": "app_not_found"})));
    };

    let schema_pass = !app.name.trim().is_empty();
    let mut checks = vec![json!({
        "id": "schema",
        "status": pass_fail(schema_pass),
        "evidence": "app name and blueprint present",
    })];

    let policy_out = state
        .policy
        .evaluate(tenant_id, &PolicyInput::for_surface("verify"))
        .await?;
    checks.push(json!({
        "id": "policy",
        "status": pass_fail(policy_out.allowed),
        "evidence": format!("policy_version={}", state.cfg.policy_version),
    }));

    let preflight_pass = app.blueprint.contains_key("plan") && app.blueprint.contains_key("region");
    checks.push(json!({
        "id": "deploy_preflight",
        "status": pass_fail(preflight_pass),
        "evidence": "plan and region set",
    }));

    let verdict = if checks.iter().all(|c| c["status"] == "pass") {
        "pass"
    } else {
        "fail"
    };
    let report_id = stable_id(
        "vrf",
        &[tenant_id, app_id, idem_key, &app.version.to_string()],
    );
    let resp = json!({
        "report_id": report_id,
        "app_id": app_id,
        "tenant_id": tenant_id,
        "verdict": verdict,
        "checks": checks,
        "policy_version": state.cfg.policy_version,
        "data_version": state.cfg.data_version,
        "generated_at": Utc::now(),
    });
    let payload = serde_json::to_vec(&resp)?;
    state
        .store
        .save_verify_report(&report_id, tenant_id, app_id, &payload)
        .await?;
    Ok((StatusCode::OK, resp))
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "pass"
    } else {
        "fail"
    }
}

#[derive(Deserialize, Default)]
pub(crate) struct DeployIntentRequest {
    #[serde(default)]
    pub profile: Option<Map<String, Value>>,
}

pub(crate) async fn deploy_self_host_handler(
    state: State<AppState>,
    uri: OriginalUri,
    path: Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    deploy_intent_handler(state, uri, path, headers, body, "self-host").await
}

pub(crate) async fn deploy_managed_handler(
    state: State<AppState>,
    uri: OriginalUri,
    path: Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    deploy_intent_handler(state, uri, path, headers, body, "managed").await
}

async fn deploy_intent_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(app_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
    target: &'static str,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let key = match require_idempotency_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let req: DeployIntentRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let tenant_id = claims.tenant_id.clone();
    let endpoint = uri.path().to_string();
    let idem_key = key.clone();
    let exec = async {
        let (status, value) =
            execute_deploy(&state, &tenant_id, &app_id, &idem_key, target, &req).await?;
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

/// Deploy intents never execute anything: preflight, then persist a
/// pending-approval record.
pub(crate) async fn execute_deploy(
    state: &AppState,
    tenant_id: &str,
    app_id: &str,
    idem_key: &str,
    target: &str,
    req: &DeployIntentRequest,
) -> Result<(StatusCode, Value), HandlerError> {
    let Some(app) = state.store.get_app(tenant_id, app_id).await? else {
        return Ok((StatusCode::NOT_FOUND, json!({"error": "app_not_found"})));
    };

    if !app.blueprint.contains_key("plan") || !app.blueprint.contains_key("region") {
        return Ok((
            StatusCode::BAD_REQUEST,
            json!({
                "error": "preflight_failed",
                "details": "app blueprint must include plan and region before deploy intent",
            }),
        ));
    }

    let intent_id = stable_id("dep", &[tenant_id, app_id, target, idem_key]);
    let resp = json!({
        "intent_id": intent_id,
        "app_id": app_id,
        "tenant_id": tenant_id,
        "target": target,
        "approval_required": true,
        "status": "pending_approval",
        "profile": req.profile,
        "policy_version": state.cfg.policy_version,
        "data_version": state.cfg.data_version,
        "requested_at": Utc::now(),
        "orchestration_hints": {"next": ["human_approval", "execution"]},
    });
    let payload = serde_json::to_vec(&resp)?;
    state
        .store
        .save_deploy_intent(&intent_id, tenant_id, app_id, target, &payload)
        .await?;
    Ok((StatusCode::ACCEPTED, resp))
}
