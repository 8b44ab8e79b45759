// SPDX-License-Identifier: Apache-2.0

//! LLM proxy over two provider shapes: a local ollama endpoint and an
//! OpenAI-compatible "frontier" endpoint. Every failure is a typed wire
//! code; the gateway maps codes to statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub default_provider: String,
    pub default_model: String,
    pub timeout: Duration,
    pub ollama_base_url: String,
    pub ollama_default_model: String,
    pub frontier_base_url: String,
    pub frontier_api_key: String,
    pub frontier_default_model: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct LlmError {
    pub code: String,
    pub message: String,
}

impl LlmError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferRequest {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferResponse {
    pub provider: String,
    pub model: String,
    pub text: String,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Map<String, Value>>,
    pub generated_at: DateTime<Utc>,
    pub source_mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub kind: String,
    pub base_url: String,
    pub default_model: String,
    pub reachable: bool,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct LlmService {
    cfg: LlmConfig,
    http: reqwest::Client,
}

impl LlmService {
    #[must_use]
    pub fn new(mut cfg: LlmConfig) -> Self {
        if cfg.default_provider.trim().is_empty() {
            cfg.default_provider = "ollama".to_string();
        }
        if cfg.timeout.is_zero() {
            cfg.timeout = Duration::from_secs(45);
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_default();
        Self { cfg, http }
    }

    pub async fn list_providers(&self) -> Vec<ProviderInfo> {
        let mut providers = vec![
            ProviderInfo {
                name: "ollama".to_string(),
                kind: "local".to_string(),
                base_url: self.cfg.ollama_base_url.trim().to_string(),
                default_model: self.cfg.ollama_default_model.trim().to_string(),
                reachable: false,
                models: Vec::new(),
                error: None,
            },
            ProviderInfo {
                name: "frontier".to_string(),
                kind: "remote".to_string(),
                base_url: self.cfg.frontier_base_url.trim().to_string(),
                default_model: self.cfg.frontier_default_model.trim().to_string(),
                reachable: false,
                models: Vec::new(),
                error: None,
            },
        ];
        for info in &mut providers {
            match self.list_models(&info.name).await {
                Ok(models) => {
                    info.reachable = true;
                    info.models = models;
                }
                Err(err) => info.error = Some(err.to_string()),
            }
        }
        providers
    }

    pub async fn infer(&self, req: &InferRequest) -> Result<InferResponse, LlmError> {
        let mut provider = req.provider.trim().to_lowercase();
        if provider.is_empty() {
            provider = self.cfg.default_provider.trim().to_lowercase();
        }
        if provider.is_empty() {
            provider = "ollama".to_string();
        }
        if req.prompt.trim().is_empty() {
            return Err(LlmError::new("prompt_required", "prompt is required"));
        }
        let mut model = req.model.trim().to_string();
        if model.is_empty() {
            model = self.default_model_for(&provider);
        }
        if model.is_empty() {
            model = self.cfg.default_model.trim().to_string();
        }
        if model.is_empty() {
            return Err(LlmError::new("model_required", "model is required"));
        }

        let started = Utc::now();
        let (text, usage, raw, source_mode) = match provider.as_str() {
            "ollama" => {
                let (text, usage, raw) = self.infer_ollama(&model, req).await?;
                (text, usage, raw, "local")
            }
            "frontier" => {
                let (text, usage, raw) = self.infer_frontier(&model, req).await?;
                (text, usage, raw, "frontier")
            }
            other => {
                return Err(LlmError::new(
                    "unknown_provider",
                    format!("unsupported provider: {other}"),
                ))
            }
        };

        Ok(InferResponse {
            provider,
            model,
            text,
            latency_ms: (Utc::now() - started).num_milliseconds(),
            usage,
            raw,
            generated_at: Utc::now(),
            source_mode: source_mode.to_string(),
        })
    }

    fn default_model_for(&self, provider: &str) -> String {
        match provider {
            "ollama" => self.cfg.ollama_default_model.trim().to_string(),
            "frontier" => self.cfg.frontier_default_model.trim().to_string(),
            _ => self.cfg.default_model.trim().to_string(),
        }
    }

    async fn list_models(&self, provider: &str) -> Result<Vec<String>, LlmError> {
        match provider {
            "ollama" => self.list_ollama_models().await,
            "frontier" => self.list_frontier_models().await,
            other => Err(LlmError::new(
                "unknown_provider",
                format!("unsupported provider: {other}"),
            )),
        }
    }

    async fn list_ollama_models(&self) -> Result<Vec<String>, LlmError> {
        let url = join_url(&self.cfg.ollama_base_url, "/api/tags");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| LlmError::new("ollama_unreachable", err.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::new(
                "ollama_unreachable",
                format!("ollama returned {}", resp.status().as_u16()),
            ));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|err| LlmError::new("ollama_decode_failed", err.to_string()))?;
        Ok(payload["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn infer_ollama(
        &self,
        model: &str,
        req: &InferRequest,
    ) -> Result<(String, Option<Map<String, Value>>, Option<Map<String, Value>>), LlmError> {
        let url = join_url(&self.cfg.ollama_base_url, "/api/generate");
        let mut body = serde_json::json!({
            "model": model,
            "prompt": req.prompt,
            "stream": false,
        });
        if !req.system.trim().is_empty() {
            body["system"] = Value::String(req.system.trim().to_string());
        }
        let mut options = Map::new();
        if req.temperature > 0.0 {
            options.insert("temperature".to_string(), serde_json::json!(req.temperature));
        }
        if req.max_tokens > 0 {
            options.insert("num_predict".to_string(), serde_json::json!(req.max_tokens));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::new("ollama_unreachable", err.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::new(
                "ollama_infer_failed",
                format!("ollama returned {}", resp.status().as_u16()),
            ));
        }
        let payload: Map<String, Value> = resp
            .json()
            .await
            .map_err(|err| LlmError::new("ollama_decode_failed", err.to_string()))?;

        let text = payload
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut usage = Map::new();
        if let Some(v) = payload.get("prompt_eval_count") {
            usage.insert("prompt_tokens".to_string(), v.clone());
        }
        if let Some(v) = payload.get("eval_count") {
            usage.insert("completion_tokens".to_string(), v.clone());
        }
        let usage = (!usage.is_empty()).then_some(usage);
        Ok((text, usage, Some(payload)))
    }

    async fn list_frontier_models(&self) -> Result<Vec<String>, LlmError> {
        let url = join_url(&self.cfg.frontier_base_url, "/models");
        let resp = self
            .frontier_request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|err| LlmError::new("frontier_unreachable", err.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.frontier_status_error(resp.status().as_u16(), "frontier_unreachable"));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|err| LlmError::new("frontier_decode_failed", err.to_string()))?;
        Ok(payload["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row["id"].as_str())
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn infer_frontier(
        &self,
        model: &str,
        req: &InferRequest,
    ) -> Result<(String, Option<Map<String, Value>>, Option<Map<String, Value>>), LlmError> {
        let url = join_url(&self.cfg.frontier_base_url, "/chat/completions");
        let mut messages = Vec::with_capacity(2);
        if !req.system.trim().is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": req.system.trim()}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if req.temperature > 0.0 {
            body["temperature"] = serde_json::json!(req.temperature);
        }
        if req.max_tokens > 0 {
            body["max_tokens"] = serde_json::json!(req.max_tokens);
        }

        let resp = self
            .frontier_request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::new("frontier_unreachable", err.to_string()))?;
        if !resp.status().is_success() {
            return Err(self.frontier_status_error(resp.status().as_u16(), "frontier_infer_failed"));
        }
        let payload: Map<String, Value> = resp
            .json()
            .await
            .map_err(|err| LlmError::new("frontier_decode_failed", err.to_string()))?;

        let text = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let usage = payload
            .get("usage")
            .and_then(Value::as_object)
            .cloned();
        Ok((text, usage, Some(payload)))
    }

    fn frontier_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        let api_key = self.cfg.frontier_api_key.trim();
        if !api_key.is_empty() {
            builder = builder.bearer_auth(api_key);
        }
        builder
    }

    fn frontier_status_error(&self, status: u16, fallback_code: &str) -> LlmError {
        if status == 401 && self.cfg.frontier_api_key.trim().is_empty() {
            return LlmError::new(
                "frontier_auth_required",
                "frontier endpoint requires API key; set FRONTIER_API_KEY",
            );
        }
        LlmError::new(fallback_code, format!("frontier returned {status}"))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::{InferRequest, LlmConfig, LlmService};
    use std::time::Duration;

    fn service() -> LlmService {
        LlmService::new(LlmConfig {
            default_provider: String::new(),
            default_model: "test-model".to_string(),
            timeout: Duration::from_secs(1),
            ollama_base_url: "http://127.0.0.1:1".to_string(),
            ollama_default_model: "test-model".to_string(),
            frontier_base_url: "http://127.0.0.1:1".to_string(),
            frontier_api_key: String::new(),
            frontier_default_model: "test-model".to_string(),
        })
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_call() {
        let err = service()
            .infer(&InferRequest::default())
            .await
            .expect_err("must reject");
        assert_eq!(err.code, "prompt_required");
    }

    #[tokio::test]
    async fn unknown_provider_is_typed() {
        let err = service()
            .infer(&InferRequest {
                provider: "mystery".to_string(),
                prompt: "hello".to_string(),
                ..InferRequest::default()
            })
            .await
            .expect_err("must reject");
        assert_eq!(err.code, "unknown_provider");
    }

    #[tokio::test]
    async fn unreachable_ollama_yields_transport_code() {
        let err = service()
            .infer(&InferRequest {
                prompt: "hello".to_string(),
                ..InferRequest::default()
            })
            .await
            .expect_err("must fail");
        assert_eq!(err.code, "ollama_unreachable");
    }
}
