// SPDX-License-Identifier: Apache-2.0

//! Violet migration codec endpoints. Normalization and checksum rules
//! live in `vda_model::migration`; these handlers wire them to apps and
//! persistence.

use super::{decode_json, require_claims, require_idempotency_key};
use crate::{api_error, stored_response, with_idempotency, AppState, HandlerError};
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use vda_core::stable_id;
use vda_model::migration::{self, VioletBundle, DEFAULT_BUNDLE_VERSION};
use vda_model::App;

#[derive(Deserialize, Default)]
struct ExportRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    source: Option<Map<String, Value>>,
    #[serde(default)]
    bundle_version: String,
}

pub(crate) async fn export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let claims = match require_claims(&state, &headers) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    // An empty body means "export nothing but the namespace field".
    let req: ExportRequest = if body.is_empty() {
        ExportRequest::default()
    } else {
        match decode_json(&body) {
            Ok(req) => req,
            Err(resp) => return resp,
        }
    };

    let mut source = if !req.app_id.trim().is_empty() {
        match export_source_from_app(&state, &claims.tenant_id, req.app_id.trim()).await {
            Ok(Some(source)) => source,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "app_not_found", None),
            Err(err) => {
                return api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "app_read_failed",
                    Some(json!({"details": err.to_string()})),
                )
            }
        }
    } else {
        req.source.unwrap_or_default()
    };

    if !req.namespace.trim().is_empty() {
        source.insert(
            "namespace".to_string(),
            Value::String(req.namespace.trim().to_string()),
        );
    }

    let bundle_version = first_non_empty(&[
        req.bundle_version.trim(),
        read_string(&source, "bundle_version").as_str(),
        DEFAULT_BUNDLE_VERSION,
    ]);
    let policy_version = first_non_empty(&[
        read_string(&source, "policy_version").as_str(),
        state.cfg.policy_version.as_str(),
    ]);
    let data_version = first_non_empty(&[
        read_string(&source, "data_version").as_str(),
        state.cfg.data_version.as_str(),
    ]);

    let bundle = match migration::build_bundle(
        &source,
        &claims.tenant_id,
        &bundle_version,
        &policy_version,
        &data_version,
    ) {
        Ok(bundle) => bundle,
        Err(err) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalid_export_request",
                Some(json!({"details": err.to_string()})),
            )
        }
    };

    let resp = json!({
        "bundle": bundle,
        "counts": {
            "resources": bundle.resources.len(),
            "actions": bundle.actions.len(),
            "roles": bundle.roles.len(),
        },
    });
    let payload = match serde_json::to_vec(&resp) {
        Ok(payload) => payload,
        Err(_) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, "marshal_failed", None),
    };
    if let Err(err) = state
        .store
        .save_migration_bundle(&bundle.bundle_id, &claims.tenant_id, "export", &payload)
        .await
    {
        return api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "migration_bundle_write_failed",
            Some(json!({"details": err.to_string()})),
        );
    }
    stored_response(200, payload)
}

#[derive(Deserialize)]
struct ImportRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    allow_partial: bool,
    #[serde(default)]
    bundle: VioletBundle,
}

pub(crate) async fn import_handler(
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
    let req: ImportRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.allow_partial {
        return api_error(StatusCode::BAD_REQUEST, "partial_apply_disabled", None);
    }

    let bundle = match migration::normalize_imported(
        &req.bundle,
        &claims.tenant_id,
        &state.cfg.policy_version,
        &state.cfg.data_version,
    ) {
        Ok(bundle) => bundle,
        Err(err) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalid_bundle",
                Some(json!({"details": err.to_string()})),
            )
        }
    };

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let idem_key = key.clone();
    let exec = async {
        let now = Utc::now();
        let app_id = req.app_id.trim();
        let (status, app) = if !app_id.is_empty() {
            let Some(mut existing) = state.store.get_app(&tenant_id, app_id).await? else {
                return Ok((
                    StatusCode::NOT_FOUND,
                    serde_json::to_vec(&json!({"error": "app_not_found"}))?,
                ));
            };
            existing.version += 1;
            existing.updated_at = now;
            migration::apply_to_app(&mut existing, &bundle)?;
            state.store.update_app(&existing).await?;
            (StatusCode::OK, existing)
        } else {
            let mut created = App {
                id: stable_id("app", &[&tenant_id, &bundle.checksum, &idem_key]),
                tenant_id: tenant_id.clone(),
                name: bundle.namespace.clone(),
                blueprint: Map::new(),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            migration::apply_to_app(&mut created, &bundle)?;
            state.store.create_app(&created).await?;
            (StatusCode::CREATED, created)
        };

        let resp = json!({
            "status": "imported",
            "app": app,
            "bundle_id": bundle.bundle_id,
            "checksum": bundle.checksum,
            "unsupported_fields": bundle.unsupported_fields,
            "imported_counts": {
                "resources": bundle.resources.len(),
                "actions": bundle.actions.len(),
                "roles": bundle.roles.len(),
            },
        });
        let payload = serde_json::to_vec(&resp)?;
        state
            .store
            .save_migration_bundle(&bundle.bundle_id, &tenant_id, "import", &payload)
            .await?;
        Ok((status, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

/// Prefer a previously imported bundle; otherwise reconstruct a source
/// object from the blueprint's top-level migration keys.
async fn export_source_from_app(
    state: &AppState,
    tenant_id: &str,
    app_id: &str,
) -> Result<Option<Map<String, Value>>, HandlerError> {
    let Some(app) = state.store.get_app(tenant_id, app_id).await? else {
        return Ok(None);
    };
    if let Some(Value::Object(bundle)) = app.blueprint.get("migration_violet_bundle") {
        return Ok(Some(bundle.clone()));
    }

    let mut source = Map::new();
    if let Some(namespace) = app
        .blueprint
        .get("namespace")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        source.insert("namespace".to_string(), Value::String(namespace.to_string()));
    }
    for key in ["resources", "actions", "roles"] {
        if let Some(value @ Value::Array(_)) = app.blueprint.get(key) {
            source.insert(key.to_string(), value.clone());
        }
    }
    if source.is_empty() {
        source.insert("namespace".to_string(), Value::String(app.name));
    }
    Ok(Some(source))
}

fn read_string(values: &Map<String, Value>, key: &str) -> String {
    values
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string()
}
