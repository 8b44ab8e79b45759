// SPDX-License-Identifier: Apache-2.0

use crate::retrieval::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vda_model::MUTATION_CLASSES;

/// Input to one synchronous policy evaluation. Only the fields relevant
/// to the caller's surface are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_class: Option<String>,
}

impl PolicyInput {
    #[must_use]
    pub fn for_surface(surface: &str) -> Self {
        Self {
            surface: Some(surface.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_mutation(class: &str) -> Self {
        Self {
            mutation_class: Some(class.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyOutput {
    pub allowed: bool,
    pub policy_version: String,
    #[serde(default)]
    pub blocked_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_mutations: Vec<String>,
}

#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn evaluate(
        &self,
        tenant_id: &str,
        input: &PolicyInput,
    ) -> Result<PolicyOutput, AdapterError>;
}

/// In-process rule set: the four mutation classes are allowed, everything
/// else is denied; a `deny_tag` context key becomes a blocked tag.
pub struct LocalPolicyClient {
    policy_version: String,
}

impl LocalPolicyClient {
    #[must_use]
    pub fn new(policy_version: impl Into<String>) -> Self {
        Self {
            policy_version: policy_version.into(),
        }
    }
}

#[async_trait]
impl PolicyClient for LocalPolicyClient {
    async fn evaluate(
        &self,
        _tenant_id: &str,
        input: &PolicyInput,
    ) -> Result<PolicyOutput, AdapterError> {
        let mut blocked_tags = Vec::new();
        if let Some(context) = &input.context {
            if let Some(deny) = context.get("deny_tag").filter(|v| !v.is_empty()) {
                blocked_tags.push(deny.clone());
            }
        }

        if let Some(class) = &input.mutation_class {
            let allowed = MUTATION_CLASSES.contains(&class.as_str());
            return Ok(PolicyOutput {
                allowed,
                policy_version: self.policy_version.clone(),
                blocked_tags,
                allowed_mutations: MUTATION_CLASSES.iter().map(ToString::to_string).collect(),
            });
        }

        Ok(PolicyOutput {
            allowed: true,
            policy_version: self.policy_version.clone(),
            blocked_tags,
            allowed_mutations: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_policy_denies_unknown_mutation_class() {
        let policy = LocalPolicyClient::new("policy-v1");
        let out = policy
            .evaluate("t", &PolicyInput::for_mutation("drop_tenant"))
            .await
            .expect("evaluate");
        assert!(!out.allowed);

        let out = policy
            .evaluate("t", &PolicyInput::for_mutation("set_plan"))
            .await
            .expect("evaluate");
        assert!(out.allowed);
    }

    #[tokio::test]
    async fn deny_tag_context_becomes_blocked_tag() {
        let policy = LocalPolicyClient::new("policy-v1");
        let mut context = BTreeMap::new();
        context.insert("deny_tag".to_string(), "beta".to_string());
        let input = PolicyInput {
            surface: Some("decide".to_string()),
            context: Some(context),
            candidate_len: Some(2),
            mutation_class: None,
        };
        let out = policy.evaluate("t", &input).await.expect("evaluate");
        assert_eq!(out.blocked_tags, vec!["beta"]);
    }
}
