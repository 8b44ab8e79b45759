// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub item_id: String,
    pub base_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
}

/// Context is a sorted map so its canonical form is independent of the
/// order the caller sent the keys in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub surface: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub candidate_items: Vec<CandidateItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Ok,
    Degraded,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: String,
    pub outcome: StageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_message: Option<String>,
}

impl StageTrace {
    #[must_use]
    pub fn ok(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            outcome: StageOutcome::Ok,
            err_message: None,
        }
    }

    #[must_use]
    pub fn degraded(stage: &str, err: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            outcome: StageOutcome::Degraded,
            err_message: Some(err.into()),
        }
    }

    #[must_use]
    pub fn skipped(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            outcome: StageOutcome::Skipped,
            err_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub decision_id: String,
    pub decision_hash: String,
    pub policy_version: String,
    pub data_version: String,
    pub generated_at: DateTime<Utc>,
    pub trace_id: String,
    pub dependency_status: DependencyStatus,
    pub items: Vec<RankedItem>,
    pub stages: Vec<StageTrace>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default)]
    pub decision_id: String,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub actor_id: String,
}
