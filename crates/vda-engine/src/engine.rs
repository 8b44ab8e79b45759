// SPDX-License-Identifier: Apache-2.0

use crate::policy::{PolicyClient, PolicyInput};
use crate::retrieval::RetrievalClient;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use vda_core::canonical_json_hash;
use vda_model::{
    CandidateItem, DecisionRequest, DecisionResponse, DependencyStatus, RankedItem, StageTrace,
};

const STAGE_RETRIEVAL: &str = "retrieval";
const STAGE_POLICY: &str = "policy_eval";
const STAGE_RANK: &str = "rank";

const ENTERPRISE_BONUS: f64 = 10.0;
const RETRIEVAL_BOOST_STEP: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("canonical serialization failed: {0}")]
    Canonical(#[from] serde_json::Error),
}

/// Deterministic ranking over three fixed stages: retrieval, policy
/// evaluation, rank. The response hash covers the normalized request,
/// declared versions, the retrieval id list, and the stage traces.
pub struct Engine {
    policy_version: String,
    data_version: String,
    retrieval: Option<Arc<dyn RetrievalClient>>,
    policy: Option<Arc<dyn PolicyClient>>,
}

impl Engine {
    #[must_use]
    pub fn new(
        policy_version: impl Into<String>,
        data_version: impl Into<String>,
        retrieval: Option<Arc<dyn RetrievalClient>>,
        policy: Option<Arc<dyn PolicyClient>>,
    ) -> Self {
        Self {
            policy_version: policy_version.into(),
            data_version: data_version.into(),
            retrieval,
            policy,
        }
    }

    pub async fn decide(&self, req: &DecisionRequest) -> Result<DecisionResponse, EngineError> {
        let mut stages = Vec::with_capacity(3);
        let mut dependency_status = DependencyStatus::Ok;

        let retrieval_ids = match &self.retrieval {
            Some(client) => match client
                .recommend(&req.user_id, req.candidate_items.len())
                .await
            {
                Ok(ids) => {
                    stages.push(StageTrace::ok(STAGE_RETRIEVAL));
                    dedupe_preserving_order(ids)
                }
                Err(err) => {
                    dependency_status = DependencyStatus::Degraded;
                    stages.push(StageTrace::degraded(STAGE_RETRIEVAL, err.to_string()));
                    Vec::new()
                }
            },
            None => {
                stages.push(StageTrace::skipped(STAGE_RETRIEVAL));
                Vec::new()
            }
        };

        let mut blocked_tags: HashSet<String> = HashSet::new();
        match &self.policy {
            Some(client) => {
                let input = PolicyInput {
                    surface: Some(req.surface.clone()),
                    context: Some(req.context.clone()),
                    candidate_len: Some(req.candidate_items.len()),
                    mutation_class: None,
                };
                match client.evaluate(&req.tenant_id, &input).await {
                    Ok(out) => {
                        blocked_tags.extend(out.blocked_tags);
                        stages.push(StageTrace::ok(STAGE_POLICY));
                    }
                    Err(err) => {
                        dependency_status = DependencyStatus::Degraded;
                        stages.push(StageTrace::degraded(STAGE_POLICY, err.to_string()));
                    }
                }
            }
            None => stages.push(StageTrace::skipped(STAGE_POLICY)),
        }

        let retrieval_rank: HashMap<&str, usize> = retrieval_ids
            .iter()
            .enumerate()
            .map(|(rank, id)| (id.as_str(), rank))
            .collect();

        let plan = req.context.get("plan").map(String::as_str).unwrap_or("");
        let mut scored = Vec::with_capacity(req.candidate_items.len());
        for candidate in &req.candidate_items {
            if candidate.blocked || candidate.tags.iter().any(|t| blocked_tags.contains(t)) {
                continue;
            }
            let mut score = candidate.base_score;
            if plan == "enterprise" && candidate.tags.iter().any(|t| t == "enterprise") {
                score += ENTERPRISE_BONUS;
            }
            if let Some(rank) = retrieval_rank.get(candidate.item_id.as_str()) {
                score += (retrieval_ids.len() - rank) as f64 * RETRIEVAL_BOOST_STEP;
            }
            scored.push(RankedItem {
                item_id: candidate.item_id.clone(),
                score,
            });
        }
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        stages.push(StageTrace::ok(STAGE_RANK));

        let hash = hash_decision(
            req,
            &self.policy_version,
            &self.data_version,
            &retrieval_ids,
            &stages,
        )?;
        debug!(decision_hash = %hash, items = scored.len(), "decision ranked");

        Ok(DecisionResponse {
            decision_id: format!("dec_{}", &hash[..16]),
            decision_hash: hash.clone(),
            policy_version: self.policy_version.clone(),
            data_version: self.data_version.clone(),
            generated_at: Utc::now(),
            trace_id: format!("trc_{}", &hash[16..28]),
            dependency_status,
            items: scored,
            stages,
        })
    }
}

#[derive(Serialize)]
struct CanonicalDecision<'a> {
    request: DecisionRequest,
    policy_version: &'a str,
    data_version: &'a str,
    retrieval_candidate_ids: &'a [String],
    stages: &'a [StageTrace],
}

fn hash_decision(
    req: &DecisionRequest,
    policy_version: &str,
    data_version: &str,
    retrieval_ids: &[String],
    stages: &[StageTrace],
) -> Result<String, EngineError> {
    let payload = CanonicalDecision {
        request: normalize_request(req),
        policy_version,
        data_version,
        retrieval_candidate_ids: retrieval_ids,
        stages,
    };
    Ok(canonical_json_hash(&payload)?)
}

fn normalize_request(req: &DecisionRequest) -> DecisionRequest {
    DecisionRequest {
        tenant_id: req.tenant_id.clone(),
        user_id: req.user_id.clone(),
        surface: req.surface.clone(),
        context: req.context.clone(),
        candidate_items: normalize_candidates(&req.candidate_items),
    }
}

fn normalize_candidates(candidates: &[CandidateItem]) -> Vec<CandidateItem> {
    let mut out: Vec<CandidateItem> = candidates
        .iter()
        .map(|c| {
            let mut tags = c.tags.clone();
            tags.sort();
            CandidateItem {
                item_id: c.item_id.clone(),
                base_score: c.base_score,
                tags,
                blocked: c.blocked,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        a.item_id
            .cmp(&b.item_id)
            .then_with(|| a.base_score.total_cmp(&b.base_score))
            .then_with(|| a.tags.join(",").cmp(&b.tags.join(",")))
    });
    out
}

fn dedupe_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyOutput;
    use crate::retrieval::AdapterError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct StubRetrieval {
        ids: Vec<String>,
        fail: bool,
    }

    #[async_trait]
    impl RetrievalClient for StubRetrieval {
        async fn recommend(&self, _user: &str, _n: usize) -> Result<Vec<String>, AdapterError> {
            if self.fail {
                return Err(AdapterError::Status("retrieval_status_503".to_string()));
            }
            Ok(self.ids.clone())
        }
    }

    struct StubPolicy {
        blocked: Vec<String>,
    }

    #[async_trait]
    impl PolicyClient for StubPolicy {
        async fn evaluate(
            &self,
            _tenant: &str,
            _input: &PolicyInput,
        ) -> Result<PolicyOutput, AdapterError> {
            Ok(PolicyOutput {
                allowed: true,
                policy_version: "policy-v1".to_string(),
                blocked_tags: self.blocked.clone(),
                allowed_mutations: Vec::new(),
            })
        }
    }

    fn engine_with(
        retrieval: Option<Arc<dyn RetrievalClient>>,
        policy: Option<Arc<dyn PolicyClient>>,
    ) -> Engine {
        Engine::new("policy-v1", "data-v1", retrieval, policy)
    }

    fn candidate(id: &str, score: f64, tags: &[&str]) -> CandidateItem {
        CandidateItem {
            item_id: id.to_string(),
            base_score: score,
            tags: tags.iter().map(ToString::to_string).collect(),
            blocked: false,
        }
    }

    #[tokio::test]
    async fn equal_scores_tie_break_on_item_id() {
        let engine = engine_with(
            Some(Arc::new(StubRetrieval {
                ids: vec![],
                fail: false,
            })),
            Some(Arc::new(StubPolicy { blocked: vec![] })),
        );
        let mut context = BTreeMap::new();
        context.insert("plan".to_string(), "enterprise".to_string());
        let req = DecisionRequest {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            surface: "test".to_string(),
            context,
            candidate_items: vec![candidate("b", 100.0, &[]), candidate("a", 100.0, &[])],
        };
        let resp = engine.decide(&req).await.expect("decide");
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.items[0].item_id, "a");
        assert_eq!(resp.dependency_status, DependencyStatus::Ok);
    }

    #[tokio::test]
    async fn hash_is_stable_across_input_permutations() {
        let engine = engine_with(
            Some(Arc::new(StubRetrieval {
                ids: vec![],
                fail: false,
            })),
            Some(Arc::new(StubPolicy { blocked: vec![] })),
        );
        let mut ctx_one = BTreeMap::new();
        ctx_one.insert("b".to_string(), "2".to_string());
        ctx_one.insert("a".to_string(), "1".to_string());
        let base = DecisionRequest {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            surface: "s".to_string(),
            context: ctx_one.clone(),
            candidate_items: vec![candidate("x", 1.0, &["b", "a"]), candidate("y", 2.0, &[])],
        };
        let alt = DecisionRequest {
            candidate_items: vec![candidate("y", 2.0, &[]), candidate("x", 1.0, &["a", "b"])],
            ..base.clone()
        };

        let r1 = engine.decide(&base).await.expect("decide base");
        let r2 = engine.decide(&alt).await.expect("decide alt");
        assert_eq!(r1.decision_hash, r2.decision_hash);
        assert_eq!(r1.items, r2.items);
        assert_eq!(r1.decision_id, r2.decision_id);
        assert_eq!(r1.trace_id, r2.trace_id);
    }

    #[tokio::test]
    async fn blocked_tags_filter_candidates() {
        let engine = engine_with(
            Some(Arc::new(StubRetrieval {
                ids: vec![],
                fail: false,
            })),
            Some(Arc::new(StubPolicy {
                blocked: vec!["blocked".to_string()],
            })),
        );
        let req = DecisionRequest {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            surface: "s".to_string(),
            context: BTreeMap::new(),
            candidate_items: vec![candidate("good", 2.0, &[]), candidate("bad", 99.0, &["blocked"])],
        };
        let resp = engine.decide(&req).await.expect("decide");
        assert_eq!(resp.items.len(), 1);
        assert_eq!(resp.items[0].item_id, "good");
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_but_still_ranks() {
        let engine = engine_with(
            Some(Arc::new(StubRetrieval {
                ids: vec![],
                fail: true,
            })),
            Some(Arc::new(StubPolicy { blocked: vec![] })),
        );
        let req = DecisionRequest {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            surface: "s".to_string(),
            context: BTreeMap::new(),
            candidate_items: vec![candidate("a", 1.0, &[])],
        };
        let resp = engine.decide(&req).await.expect("decide");
        assert_eq!(resp.dependency_status, DependencyStatus::Degraded);
        assert_eq!(resp.items.len(), 1);
        assert_eq!(
            resp.stages[0].outcome,
            vda_model::StageOutcome::Degraded,
            "retrieval trace must record the degradation"
        );
    }

    #[tokio::test]
    async fn missing_adapters_record_skipped_traces() {
        let engine = engine_with(None, None);
        let req = DecisionRequest {
            candidate_items: vec![candidate("a", 1.0, &[])],
            ..DecisionRequest::default()
        };
        let resp = engine.decide(&req).await.expect("decide");
        assert_eq!(resp.stages[0].outcome, vda_model::StageOutcome::Skipped);
        assert_eq!(resp.stages[1].outcome, vda_model::StageOutcome::Skipped);
        assert_eq!(resp.stages[2].outcome, vda_model::StageOutcome::Ok);
    }

    #[tokio::test]
    async fn retrieval_boost_orders_by_rank() {
        let engine = engine_with(
            Some(Arc::new(StubRetrieval {
                ids: vec!["b".to_string(), "a".to_string()],
                fail: false,
            })),
            Some(Arc::new(StubPolicy { blocked: vec![] })),
        );
        let req = DecisionRequest {
            tenant_id: "t".to_string(),
            user_id: "u".to_string(),
            surface: "s".to_string(),
            context: BTreeMap::new(),
            candidate_items: vec![candidate("a", 1.0, &[]), candidate("b", 1.0, &[])],
        };
        let resp = engine.decide(&req).await.expect("decide");
        // b is rank 0 of 2: +0.02; a is rank 1: +0.01.
        assert_eq!(resp.items[0].item_id, "b");
        assert!((resp.items[0].score - 1.02).abs() < 1e-9);
        assert!((resp.items[1].score - 1.01).abs() < 1e-9);
    }
}
