// SPDX-License-Identifier: Apache-2.0

//! LLM proxy endpoints, including the `studio_generate` post-hook that
//! turns a completion into a studio job.

use super::{decode_json, require_claims, require_idempotency_key};
use crate::llm::{InferRequest, InferResponse};
use crate::{api_error, with_idempotency, AppState};
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use vda_core::dedupe_fold;
use vda_model::Confirmation;

pub(crate) async fn providers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_claims(&state, &headers) {
        return resp;
    }
    // Reachability probes share a 5s budget across both providers.
    let providers = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.llm.list_providers(),
    )
    .await
    .unwrap_or_default();
    Json(json!({
        "default_provider": state.cfg.llm_default_provider,
        "default_model": state.cfg.llm_default_model,
        "providers": providers,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct LlmInferRequest {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    system: String,
    #[serde(default)]
    temperature: f64,
    #[serde(default)]
    max_tokens: u32,
    #[serde(default)]
    post_hooks: Vec<String>,
    #[serde(default)]
    hook_confirmation: Option<Confirmation>,
}

pub(crate) async fn infer_handler(
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
    let req: LlmInferRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.prompt.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let exec = async {
        let infer = InferRequest {
            provider: req.provider.clone(),
            model: req.model.clone(),
            prompt: req.prompt.clone(),
            system: req.system.clone(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };
        let result = match state.llm.infer(&infer).await {
            Ok(result) => result,
            Err(err) => {
                let status = match err.code.as_str() {
                    "prompt_required" | "model_required" | "unknown_provider" => {
                        StatusCode::BAD_REQUEST
                    }
                    "frontier_auth_required" => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                };
                let body =
                    serde_json::to_vec(&json!({"error": err.code, "details": err.message}))?;
                return Ok((status, body));
            }
        };

        let mut payload = json!({
            "tenant_id": tenant_id,
            "result": result,
        });
        if has_post_hook(&req.post_hooks, "studio_generate") {
            let conf = build_hook_confirmation(&req, &result);
            let job = state.studio.create_job(&tenant_id, conf.clone()).await;
            payload["hooks"] = json!([{
                "name": "studio_generate",
                "status": "ok",
                "job_id": job.job_id,
                "summary": {
                    "workload_items": job.workload.len(),
                    "files": job.files.len(),
                    "template": conf.template,
                    "source_system": conf.source_system,
                    "verification": job.verification_report.verdict,
                },
                "paths": {
                    "job": format!("/v1/studio/jobs/{}", job.job_id),
                    "artifacts": format!("/v1/studio/jobs/{}/artifacts", job.job_id),
                    "verification": format!("/v1/studio/jobs/{}/verification", job.job_id),
                    "jtbd": format!("/v1/studio/jobs/{}/jtbd", job.job_id),
                    "bundle": format!("/v1/studio/jobs/{}/bundle", job.job_id),
                    "preview_web": format!("/v1/studio/jobs/{}/preview?client=web", job.job_id),
                    "preview_mobile": format!("/v1/studio/jobs/{}/preview?client=mobile", job.job_id),
                },
            }]);
        }
        Ok((StatusCode::OK, serde_json::to_vec(&payload)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

fn has_post_hook(hooks: &[String], name: &str) -> bool {
    hooks
        .iter()
        .any(|hook| hook.trim().eq_ignore_ascii_case(name))
}

fn build_hook_confirmation(req: &LlmInferRequest, resp: &InferResponse) -> Confirmation {
    let mut conf = Confirmation {
        prompt: req.prompt.clone(),
        app_name: suggested_app_name(&req.prompt),
        domain: "saas".to_string(),
        template: "violet-rails-extension".to_string(),
        source_system: "violet-rails".to_string(),
        primary_users: vec!["admin".to_string(), "operator".to_string()],
        core_workflows: vec![
            "design_app_contract".to_string(),
            "generate_boilerplate".to_string(),
            "run_verify_checks".to_string(),
        ],
        data_entities: vec![
            "tenant".to_string(),
            "workspace".to_string(),
            "subscription".to_string(),
        ],
        deployment_target: "managed".to_string(),
        region: "us-east-1".to_string(),
        plan: "starter".to_string(),
        generation_depth: String::new(),
        integrations: vec!["stripe".to_string(), "slack".to_string()],
        constraints: vec![
            "all_mutations_idempotent".to_string(),
            "no_runtime_eval".to_string(),
        ],
    };

    let merged_text = format!("{}\n{}", req.prompt, resp.text).to_lowercase();
    apply_prompt_signals(&mut conf, &merged_text);
    if merged_text.contains("enterprise") {
        conf.plan = "enterprise".to_string();
    }
    if merged_text.contains("self-host") || merged_text.contains("self host") {
        conf.deployment_target = "self-host".to_string();
    }
    if merged_text.contains("crm") {
        conf.domain = "crm".to_string();
    }

    let Some(hc) = &req.hook_confirmation else {
        return conf;
    };
    override_non_empty(&mut conf.app_name, &hc.app_name);
    override_non_empty(&mut conf.domain, &hc.domain);
    override_non_empty(&mut conf.template, &hc.template);
    override_non_empty(&mut conf.source_system, &hc.source_system);
    override_non_empty(&mut conf.plan, &hc.plan);
    override_non_empty(&mut conf.region, &hc.region);
    override_non_empty(&mut conf.deployment_target, &hc.deployment_target);
    override_non_empty_list(&mut conf.primary_users, &hc.primary_users);
    override_non_empty_list(&mut conf.core_workflows, &hc.core_workflows);
    override_non_empty_list(&mut conf.data_entities, &hc.data_entities);
    override_non_empty_list(&mut conf.integrations, &hc.integrations);
    override_non_empty_list(&mut conf.constraints, &hc.constraints);
    conf
}

fn apply_prompt_signals(conf: &mut Confirmation, text: &str) {
    if text.contains("crm") || text.contains("sales") {
        conf.domain = "crm".to_string();
        conf.primary_users = to_list(&["sales_manager", "account_executive", "operator"]);
        conf.core_workflows = to_list(&[
            "capture_lead",
            "qualify_opportunity",
            "approve_quote",
            "issue_invoice",
        ]);
        conf.data_entities = to_list(&["account", "contact", "opportunity", "invoice"]);
        push_integrations(conf, &["salesforce", "hubspot"]);
    } else if text.contains("support") || text.contains("helpdesk") {
        conf.domain = "support".to_string();
        conf.primary_users = to_list(&["support_manager", "agent", "operator"]);
        conf.core_workflows = to_list(&[
            "open_ticket",
            "triage_ticket",
            "approve_refund",
            "close_ticket",
        ]);
        conf.data_entities = to_list(&["customer", "ticket", "conversation", "refund"]);
        push_integrations(conf, &["zendesk", "intercom"]);
    } else if text.contains("marketplace") || text.contains("commerce") || text.contains("ecommerce")
    {
        conf.domain = "commerce".to_string();
        conf.primary_users = to_list(&["merchant_admin", "operations", "finance"]);
        conf.core_workflows = to_list(&[
            "publish_catalog",
            "approve_order",
            "capture_payment",
            "fulfill_order",
        ]);
        conf.data_entities = to_list(&["merchant", "product", "order", "payment"]);
        push_integrations(conf, &["shopify", "stripe"]);
    }

    if text.contains("mobile") {
        push_constraints(conf, &["ship_web_and_mobile_clients"]);
    }
    if text.contains("agent") || text.contains("langgraph") {
        let mut workflows = conf.core_workflows.clone();
        workflows.push("agent_plan_act_verify_deploy".to_string());
        conf.core_workflows = dedupe_fold(&workflows);
        push_constraints(conf, &["expose_api_as_tools"]);
    }
    if text.contains("rbac") || text.contains("role") {
        let mut entities = conf.data_entities.clone();
        entities.extend(to_list(&["role", "permission"]));
        conf.data_entities = dedupe_fold(&entities);
        let mut workflows = conf.core_workflows.clone();
        workflows.extend(to_list(&["manage_roles", "grant_permissions"]));
        conf.core_workflows = dedupe_fold(&workflows);
    }
}

fn push_integrations(conf: &mut Confirmation, extra: &[&str]) {
    let mut merged = conf.integrations.clone();
    merged.extend(to_list(extra));
    conf.integrations = dedupe_fold(&merged);
}

fn push_constraints(conf: &mut Confirmation, extra: &[&str]) {
    let mut merged = conf.constraints.clone();
    merged.extend(to_list(extra));
    conf.constraints = dedupe_fold(&merged);
}

fn to_list(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn override_non_empty(target: &mut String, candidate: &str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() {
        *target = candidate.to_string();
    }
}

fn override_non_empty_list(target: &mut Vec<String>, candidate: &[String]) {
    let normalized = vda_core::normalize_list(candidate);
    if !normalized.is_empty() {
        *target = normalized;
    }
}

fn suggested_app_name(prompt: &str) -> String {
    let words: Vec<String> = prompt
        .split_whitespace()
        .take(4)
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect();
    let name = words.join(" ");
    if name.is_empty() {
        return "Generated App".to_string();
    }
    name.chars().take(48).collect()
}

#[cfg(test)]
mod tests {
    use super::suggested_app_name;

    #[test]
    fn app_name_is_title_cased_and_bounded() {
        assert_eq!(suggested_app_name("build a CRM tool now"), "Build A Crm Tool");
        assert_eq!(suggested_app_name(""), "Generated App");
        assert_eq!(suggested_app_name("  !!  "), "Generated App");
    }
}
