// SPDX-License-Identifier: Apache-2.0

//! Studio endpoints: job lifecycle, artifacts, runs, terminal, bundle,
//! preview, runtime assets, console, and the SSE event stream.

use super::{decode_json, require_claims, require_claims_for_stream, require_idempotency_key};
use crate::{api_error, with_idempotency, AppState};
use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use vda_core::normalize_list;
use vda_model::{Confirmation, Job};

#[derive(Deserialize)]
struct CreateJobRequest {
    #[serde(flatten)]
    confirmation: Confirmation,
}

pub(crate) async fn create_job_handler(
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
    let req: CreateJobRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let mut conf = req.confirmation;
    if conf.prompt.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt_required", None);
    }
    if conf.app_name.trim().is_empty() {
        conf.app_name = "Generated App".to_string();
    }
    conf.primary_users = normalize_list(&conf.primary_users);
    conf.core_workflows = normalize_list(&conf.core_workflows);
    conf.data_entities = normalize_list(&conf.data_entities);
    conf.integrations = normalize_list(&conf.integrations);
    conf.constraints = normalize_list(&conf.constraints);

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let exec = async {
        let job = state.studio.create_job(&tenant_id, conf).await;
        Ok((StatusCode::CREATED, serde_json::to_vec(&job)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

pub(crate) async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.get_job(&claims.tenant_id, job_id).await {
        Some(job) => Json(job).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

pub(crate) async fn artifacts_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.get_artifacts(&claims.tenant_id, job_id).await {
        Some(manifest) => Json(manifest).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    target: String,
}

pub(crate) async fn run_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(job_id): Path<String>,
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
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    let req: RunRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let target = if req.target.trim().is_empty() {
        "all".to_string()
    } else {
        req.target.trim().to_string()
    };

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let job_id = job_id.to_string();
    let exec = async {
        match state.studio.run_target(&tenant_id, &job_id, &target).await {
            Some(result) => Ok((StatusCode::OK, serde_json::to_vec(&result)?)),
            None => Ok((
                StatusCode::NOT_FOUND,
                serde_json::to_vec(&json!({"error": "job_not_found"}))?,
            )),
        }
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

pub(crate) async fn verification_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.get_verification(&claims.tenant_id, job_id).await {
        Some(report) => Json(report).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

pub(crate) async fn jtbd_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.get_jtbd(&claims.tenant_id, job_id).await {
        Some(coverage) => Json(json!({"jtbd_coverage": coverage})).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

pub(crate) async fn bundle_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let claims = match require_claims_for_stream(&state, &headers, &params) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.build_bundle(&claims.tenant_id, job_id).await {
        Ok(Some((filename, payload))) => {
            let mut response = Response::new(Body::from(payload));
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/gzip"),
            );
            if let Ok(value) = header::HeaderValue::from_str(&format!(
                "attachment; filename=\"{filename}\""
            )) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            headers.insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            );
            response
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
        Err(err) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "bundle_build_failed",
            Some(json!({"details": err.to_string()})),
        ),
    }
}

#[derive(Deserialize)]
struct TerminalRequest {
    #[serde(default)]
    command: String,
}

pub(crate) async fn terminal_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(job_id): Path<String>,
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
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    let req: TerminalRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.command.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "command_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let job_id = job_id.to_string();
    let exec = async {
        match state
            .studio
            .run_terminal(&tenant_id, &job_id, req.command.trim())
            .await
        {
            Some(result) => Ok((StatusCode::OK, serde_json::to_vec(&result)?)),
            None => Ok((
                StatusCode::NOT_FOUND,
                serde_json::to_vec(&json!({"error": "job_not_found"}))?,
            )),
        }
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

pub(crate) async fn console_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state.studio.get_console(&claims.tenant_id, job_id).await {
        Some(logs) => Json(json!({"logs": logs})).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

pub(crate) async fn preview_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let claims = match require_claims_for_stream(&state, &headers, &params) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    let client = params.get("client").map(String::as_str).unwrap_or("");
    let token = params.get("token").map(String::as_str).unwrap_or("");
    match state
        .studio
        .render_preview(&claims.tenant_id, job_id, client, token)
        .await
    {
        Some(html) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            html,
        )
            .into_response(),
        None => api_error(StatusCode::NOT_FOUND, "job_not_found", None),
    }
}

pub(crate) async fn runtime_asset_handler(
    State(state): State<AppState>,
    Path((job_id, client, asset)): Path<(String, String, String)>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let claims = match require_claims_for_stream(&state, &headers, &params) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    match state
        .studio
        .render_asset(&claims.tenant_id, job_id, &client, &asset)
        .await
    {
        Some((content_type, payload)) => {
            let mut response = Response::new(Body::from(payload));
            if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            );
            response
        }
        None => api_error(StatusCode::NOT_FOUND, "runtime_asset_not_found", None),
    }
}

enum SsePhase {
    SendRetry,
    SendSnapshot,
    Poll,
    Done,
}

struct SseState {
    app: AppState,
    tenant_id: String,
    job_id: String,
    last_revision: String,
    phase: SsePhase,
}

pub(crate) async fn events_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let claims = match require_claims_for_stream(&state, &headers, &params) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let Some(job_id) = required_job_id(&job_id) else {
        return api_error(StatusCode::BAD_REQUEST, "job_id_required", None);
    };
    if state.studio.get_job(&claims.tenant_id, job_id).await.is_none() {
        return api_error(StatusCode::NOT_FOUND, "job_not_found", None);
    }

    let stream = job_event_stream(SseState {
        app: state,
        tenant_id: claims.tenant_id,
        job_id: job_id.to_string(),
        last_revision: String::new(),
        phase: SsePhase::SendRetry,
    });
    Sse::new(stream).into_response()
}

/// retry hint, one snapshot, then a 1s revision poll that re-emits the
/// job on change and keepalive comments otherwise. Ends when the client
/// disconnects (the stream is dropped) or the job disappears.
fn job_event_stream(initial: SseState) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(initial, |mut ctx| async move {
        loop {
            match ctx.phase {
                SsePhase::SendRetry => {
                    ctx.phase = SsePhase::SendSnapshot;
                    let event = Event::default().retry(Duration::from_millis(1000));
                    return Some((Ok(event), ctx));
                }
                SsePhase::SendSnapshot => {
                    let Some(job) = ctx.app.studio.get_job(&ctx.tenant_id, &ctx.job_id).await
                    else {
                        ctx.phase = SsePhase::Done;
                        return Some((Ok(error_event()), ctx));
                    };
                    ctx.last_revision = job_revision(&job);
                    ctx.phase = SsePhase::Poll;
                    match job_event(&job) {
                        Some(event) => return Some((Ok(event), ctx)),
                        None => continue,
                    }
                }
                SsePhase::Poll => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    let Some(job) = ctx.app.studio.get_job(&ctx.tenant_id, &ctx.job_id).await
                    else {
                        ctx.phase = SsePhase::Done;
                        return Some((Ok(error_event()), ctx));
                    };
                    let revision = job_revision(&job);
                    if revision != ctx.last_revision {
                        ctx.last_revision = revision;
                        match job_event(&job) {
                            Some(event) => return Some((Ok(event), ctx)),
                            None => continue,
                        }
                    }
                    return Some((Ok(Event::default().comment("keepalive")), ctx));
                }
                SsePhase::Done => return None,
            }
        }
    })
}

fn job_event(job: &Job) -> Option<Event> {
    let data = serde_json::to_string(job).ok()?;
    Some(Event::default().event("job").data(data))
}

fn error_event() -> Event {
    Event::default()
        .event("error")
        .data(r#"{"error":"job_not_found"}"#)
}

/// Revision tuple: status, nanosecond update stamp, log lengths.
fn job_revision(job: &Job) -> String {
    format!(
        "{}|{}|{}|{}",
        job.status,
        job.updated_at
            .and_then(|t| t.timestamp_nanos_opt())
            .unwrap_or(0),
        job.terminal_logs.len(),
        job.console_logs.len(),
    )
}

fn required_job_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
