// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{0}")]
    Status(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Best-effort candidate ordering from an external recommender.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<String>, AdapterError>;
}

/// HTTP recommender client. Dedupes and sorts before returning so
/// upstream duplicate or unstable ordering cannot leak into scores.
pub struct HttpRetrievalClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpRetrievalClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<String>, AdapterError> {
        if self.base_url.is_empty() || user_id.is_empty() || n == 0 {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/api/recommend/{}?n={n}",
            self.base_url.trim_end_matches('/'),
            urlencode_path(user_id)
        );
        let mut req = self.http.get(&url);
        if !self.api_key.is_empty() {
            req = req.header("X-API-Key", &self.api_key);
        }
        let resp = req.send().await?;
        if resp.status().as_u16() >= 400 {
            return Err(AdapterError::Status(format!(
                "retrieval_status_{}",
                resp.status().as_u16()
            )));
        }
        let raw: Value = resp.json().await?;
        Ok(extract_item_ids(&raw))
    }
}

fn extract_item_ids(raw: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    match raw {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => ids.push(s.clone()),
                    Value::Object(obj) => {
                        if let Some(id) = obj
                            .get("Id")
                            .or_else(|| obj.get("item_id"))
                            .and_then(Value::as_str)
                        {
                            ids.push(id.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            if let Some(items) = obj.get("items").and_then(Value::as_array) {
                for item in items {
                    if let Some(id) = item.get("item_id").and_then(Value::as_str) {
                        ids.push(id.to_string());
                    }
                }
            }
        }
        _ => {}
    }

    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    out.sort();
    out
}

fn urlencode_path(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::extract_item_ids;
    use serde_json::json;

    #[test]
    fn accepts_string_and_object_shapes() {
        let ids = extract_item_ids(&json!(["b", {"Id": "a"}, {"item_id": "c"}, 7]));
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn accepts_items_envelope_and_dedupes() {
        let ids = extract_item_ids(&json!({"items": [{"item_id": "x"}, {"item_id": "x"}]}));
        assert_eq!(ids, vec!["x"]);
    }
}
