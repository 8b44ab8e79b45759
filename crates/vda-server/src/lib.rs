// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! HTTP gateway: routing, authentication, the idempotency envelope, and
//! error mapping. Handlers stay thin; domain behavior lives in the
//! engine, store, and studio crates.

pub mod auth;
pub mod config;
pub mod llm;

mod http;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::llm::{LlmConfig, LlmService};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use vda_engine::{Engine, HttpRetrievalClient, LocalPolicyClient, PolicyClient, RetrievalClient};
use vda_store::Store;
use vda_studio::{JobStore, StudioService};

pub const SERVICE_NAME: &str = "violet-deterministic-api";

pub(crate) type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<Store>,
    pub engine: Arc<Engine>,
    pub policy: Arc<dyn PolicyClient>,
    pub studio: Arc<StudioService>,
    pub llm: Arc<LlmService>,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    /// Wire the full dependency graph from one configuration snapshot.
    pub fn build(cfg: Config, store: Arc<Store>) -> Self {
        let policy: Arc<dyn PolicyClient> = Arc::new(LocalPolicyClient::new(&cfg.policy_version));
        let retrieval: Option<Arc<dyn RetrievalClient>> = if cfg.retrieval_base_url.is_empty() {
            None
        } else {
            Some(Arc::new(HttpRetrievalClient::new(
                &cfg.retrieval_base_url,
                &cfg.retrieval_api_key,
            )))
        };
        let engine = Arc::new(Engine::new(
            &cfg.policy_version,
            &cfg.data_version,
            retrieval,
            Some(policy.clone()),
        ));
        let studio = Arc::new(StudioService::new(
            std::path::PathBuf::from(&cfg.studio_workspace_root),
            Some(Arc::new(StoreJobPersistence(store.clone())) as Arc<dyn JobStore>),
        ));
        let llm = Arc::new(LlmService::new(LlmConfig {
            default_provider: cfg.llm_default_provider.clone(),
            default_model: cfg.llm_default_model.clone(),
            timeout: Duration::from_secs(cfg.llm_request_timeout_seconds),
            ollama_base_url: cfg.ollama_base_url.clone(),
            ollama_default_model: cfg.ollama_default_model.clone(),
            frontier_base_url: cfg.frontier_base_url.clone(),
            frontier_api_key: cfg.frontier_api_key.clone(),
            frontier_default_model: cfg.frontier_default_model.clone(),
        }));
        let auth = Arc::new(Authenticator::new(&cfg.auth_tokens));
        Self {
            cfg: Arc::new(cfg),
            store,
            engine,
            policy,
            studio,
            llm,
            auth,
        }
    }
}

/// Adapter giving the studio engine access to the shared store.
pub struct StoreJobPersistence(pub Arc<Store>);

#[async_trait]
impl JobStore for StoreJobPersistence {
    async fn save_job(
        &self,
        tenant_id: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        self.0.save_studio_job(tenant_id, job_id, payload).await?;
        Ok(())
    }

    async fn load_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<Vec<u8>>, HandlerError> {
        Ok(self.0.get_studio_job(tenant_id, job_id).await?)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::ui::root_handler))
        .route("/ui/", get(http::ui::index_handler))
        .route("/v1/health", get(http::core::health_handler))
        .route("/v1/decisions", post(http::core::decisions_handler))
        .route("/v1/replay", post(http::core::replay_handler))
        .route("/v1/feedback", post(http::core::feedback_handler))
        .route("/v1/apps", post(http::apps::create_app_handler))
        .route(
            "/v1/apps/:id",
            get(http::apps::get_app_handler).patch(http::apps::patch_app_handler),
        )
        .route("/v1/apps/:id/mutations", post(http::apps::mutation_handler))
        .route("/v1/apps/:id/verify", post(http::apps::verify_handler))
        .route(
            "/v1/apps/:id/deploy-intents/self-host",
            post(http::apps::deploy_self_host_handler),
        )
        .route(
            "/v1/apps/:id/deploy-intents/managed",
            post(http::apps::deploy_managed_handler),
        )
        .route("/v1/agents/plan", post(http::agents::plan_handler))
        .route("/v1/agents/clarify", post(http::agents::clarify_handler))
        .route("/v1/agents/act", post(http::agents::act_handler))
        .route("/v1/agents/verify", post(http::agents::verify_handler))
        .route("/v1/agents/deploy", post(http::agents::deploy_handler))
        .route("/v1/llm/providers", get(http::llm::providers_handler))
        .route("/v1/llm/infer", post(http::llm::infer_handler))
        .route("/v1/tools", get(http::tools::catalog_handler))
        .route(
            "/v1/migration/violet/export",
            post(http::migration::export_handler),
        )
        .route(
            "/v1/migration/violet/import",
            post(http::migration::import_handler),
        )
        .route("/v1/studio/jobs", post(http::studio::create_job_handler))
        .route("/v1/studio/jobs/:id", get(http::studio::get_job_handler))
        .route(
            "/v1/studio/jobs/:id/artifacts",
            get(http::studio::artifacts_handler),
        )
        .route("/v1/studio/jobs/:id/run", post(http::studio::run_handler))
        .route(
            "/v1/studio/jobs/:id/verification",
            get(http::studio::verification_handler),
        )
        .route("/v1/studio/jobs/:id/jtbd", get(http::studio::jtbd_handler))
        .route("/v1/studio/jobs/:id/bundle", get(http::studio::bundle_handler))
        .route(
            "/v1/studio/jobs/:id/preview",
            get(http::studio::preview_handler),
        )
        .route(
            "/v1/studio/jobs/:id/runtime/:client/*asset",
            get(http::studio::runtime_asset_handler),
        )
        .route("/v1/studio/jobs/:id/events", get(http::studio::events_handler))
        .route(
            "/v1/studio/jobs/:id/terminal",
            post(http::studio::terminal_handler),
        )
        .route("/v1/studio/jobs/:id/console", get(http::studio::console_handler))
        .layer(from_fn(recover_panics))
        .with_state(state)
}

/// Handler panics become a 500 instead of a dropped connection.
async fn recover_panics(req: axum::http::Request<Body>, next: Next) -> Response {
    match tokio::spawn(next.run(req)).await {
        Ok(response) => response,
        Err(join_err) => {
            error!(%join_err, "handler panicked");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "request_failed",
                Some(json!({"details": "handler panicked"})),
            )
        }
    }
}

/// One error envelope everywhere: `{"error": code, ...details}`.
pub(crate) fn api_error(status: StatusCode, code: &str, details: Option<Value>) -> Response {
    let mut payload = json!({"error": code});
    if let (Some(obj), Some(Value::Object(extra))) = (payload.as_object_mut(), details) {
        for (key, value) in extra {
            obj.insert(key, value);
        }
    }
    (status, Json(payload)).into_response()
}

/// Replay a stored body byte-for-byte with its original status.
pub(crate) fn stored_response(status: u16, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
    {
        Ok(response) => response,
        Err(err) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "request_failed",
            Some(json!({"details": err.to_string()})),
        ),
    }
}

/// The idempotency envelope. `exec` is a lazy future: it is only polled
/// when no live record satisfies the replay, so the handler runs at most
/// once per (tenant, endpoint, key) within the TTL.
pub(crate) async fn with_idempotency<Fut>(
    state: &AppState,
    tenant_id: &str,
    endpoint: &str,
    key: &str,
    exec: Fut,
) -> Response
where
    Fut: std::future::Future<Output = Result<(StatusCode, Vec<u8>), HandlerError>>,
{
    match state.store.get_idempotency(tenant_id, endpoint, key).await {
        Ok(Some(record)) => return stored_response(record.status, record.body),
        Ok(None) => {}
        Err(err) => {
            return api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "idempotency_read_failed",
                Some(json!({"details": err.to_string()})),
            )
        }
    }

    let (status, body) = match exec.await {
        Ok(out) => out,
        Err(err) => {
            // No record is written when the handler errors.
            return api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "request_failed",
                Some(json!({"details": err.to_string()})),
            );
        }
    };

    if let Err(err) = state
        .store
        .put_idempotency(tenant_id, endpoint, key, status.as_u16(), &body)
        .await
    {
        return api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "idempotency_write_failed",
            Some(json!({"details": err.to_string()})),
        );
    }
    stored_response(status.as_u16(), body)
}
