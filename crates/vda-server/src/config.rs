// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::env;

/// Read-only configuration snapshot taken at startup.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub port: String,
    pub policy_version: String,
    pub data_version: String,
    pub database_url: String,

    pub idempotency_ttl_seconds: i64,
    pub idempotency_cleanup_seconds: u64,

    pub auth_tokens: String,

    pub retrieval_base_url: String,
    pub retrieval_api_key: String,

    pub llm_default_provider: String,
    pub llm_default_model: String,
    pub llm_request_timeout_seconds: u64,

    pub ollama_base_url: String,
    pub ollama_default_model: String,

    pub frontier_base_url: String,
    pub frontier_api_key: String,
    pub frontier_default_model: String,

    pub studio_workspace_root: String,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self {
            port: getenv("PORT", "4020"),
            policy_version: getenv("POLICY_VERSION", "policy-v1"),
            data_version: getenv("DATA_VERSION", "data-v1"),
            database_url: getenv("DATABASE_URL", "vda.sqlite"),
            idempotency_ttl_seconds: getenv_i64("IDEMPOTENCY_TTL_SECONDS", 86_400),
            idempotency_cleanup_seconds: getenv_u64("IDEMPOTENCY_CLEANUP_SECONDS", 60),
            auth_tokens: getenv("AUTH_TOKENS", "dev-token:t_acme:dev-user"),
            retrieval_base_url: getenv("RETRIEVAL_BASE_URL", ""),
            retrieval_api_key: getenv("RETRIEVAL_API_KEY", ""),
            llm_default_provider: getenv("LLM_DEFAULT_PROVIDER", "ollama"),
            llm_default_model: getenv("LLM_DEFAULT_MODEL", "glm-4.7-flash:latest"),
            llm_request_timeout_seconds: getenv_u64("LLM_REQUEST_TIMEOUT_SECONDS", 45),
            ollama_base_url: getenv("OLLAMA_BASE_URL", "http://127.0.0.1:11434"),
            ollama_default_model: getenv("OLLAMA_DEFAULT_MODEL", "glm-4.7-flash:latest"),
            frontier_base_url: getenv("FRONTIER_BASE_URL", "http://127.0.0.1:11434/v1"),
            frontier_api_key: getenv("FRONTIER_API_KEY", ""),
            frontier_default_model: getenv("FRONTIER_DEFAULT_MODEL", "glm-4.7-flash:latest"),
            studio_workspace_root: getenv("VDA_STUDIO_ROOT", "./output/studio"),
        }
    }

    /// Copy with credentials masked, for `--print-effective-config`.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth_tokens.is_empty() {
            copy.auth_tokens = "<redacted>".to_string();
        }
        if !copy.retrieval_api_key.is_empty() {
            copy.retrieval_api_key = "<redacted>".to_string();
        }
        if !copy.frontier_api_key.is_empty() {
            copy.frontier_api_key = "<redacted>".to_string();
        }
        copy
    }
}

fn getenv(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn getenv_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn getenv_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
