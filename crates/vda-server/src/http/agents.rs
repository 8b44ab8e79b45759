// SPDX-License-Identifier: Apache-2.0

//! Agent wrappers: plan, clarify, act, verify, deploy. Act/verify/deploy
//! reuse the app executors and stamp the acting subject; plan and
//! clarify are deterministic functions of the prompt and prior answers.

use super::{decode_json, require_claims, require_idempotency_key};
use crate::{api_error, with_idempotency, AppState};
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use vda_core::{dedupe_fold, normalize_list, stable_id};
use vda_model::Confirmation;

#[derive(Deserialize)]
struct PlanRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    name: String,
}

pub(crate) async fn plan_handler(
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
    let req: PlanRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.prompt.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let idem_key = key.clone();
    let exec = async {
        let name = if req.name.trim().is_empty() {
            "Generated App".to_string()
        } else {
            req.name.trim().to_string()
        };
        let plan = if req.prompt.to_lowercase().contains("enterprise") {
            "enterprise"
        } else {
            "starter"
        };
        let payload = serde_json::to_vec(&json!({
            "plan_id": stable_id("plan", &[&tenant_id, &idem_key, &req.prompt]),
            "tenant_id": tenant_id,
            "name": name,
            "suggested_blueprint": {"plan": plan, "region": "us-east-1"},
            "checks": ["schema", "policy", "deploy_preflight"],
            "policy_version": state.cfg.policy_version,
            "data_version": state.cfg.data_version,
        }))?;
        Ok((StatusCode::OK, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

#[derive(Deserialize)]
struct ClarifyRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    confirmation: Confirmation,
    #[serde(default)]
    answers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct ClarifyQuestion {
    id: String,
    field: String,
    prompt: String,
    why: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

pub(crate) async fn clarify_handler(
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
    let req: ClarifyRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let mut prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        prompt = req.confirmation.prompt.trim().to_string();
    }
    if prompt.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let idem_key = key.clone();
    let exec = async {
        let mut conf = req.confirmation.clone();
        conf.prompt = prompt.clone();
        apply_prompt_defaults_for_clarify(&mut conf, &prompt);
        apply_clarify_answers(&mut conf, &req.answers);
        conf.primary_users = normalize_list(&conf.primary_users);
        conf.core_workflows = normalize_list(&conf.core_workflows);
        conf.data_entities = normalize_list(&conf.data_entities);
        conf.integrations = normalize_list(&conf.integrations);
        conf.constraints = dedupe_fold(&conf.constraints);

        let questions = build_clarification_questions(&prompt, &conf, &req.answers);
        let missing: Vec<String> = questions.iter().map(|q| q.field.clone()).collect();
        let payload = serde_json::to_vec(&json!({
            "clarification_id": stable_id("clarify", &[&tenant_id, &idem_key, &prompt]),
            "tenant_id": tenant_id,
            "answer_count": req.answers.len(),
            "ready_to_generate": questions.is_empty(),
            "remaining_questions": questions.len(),
            "missing_fields": missing,
            "summary": format!(
                "Captured {} answer(s). {} clarification question(s) remain.",
                req.answers.len(),
                questions.len()
            ),
            "updated_confirmation": conf,
            "questions": questions,
            "policy_version": state.cfg.policy_version,
            "data_version": state.cfg.data_version,
        }))?;
        Ok((StatusCode::OK, payload))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

fn apply_prompt_defaults_for_clarify(conf: &mut Confirmation, prompt: &str) {
    let text = prompt.to_lowercase();

    if conf.prompt.trim().is_empty() {
        conf.prompt = prompt.trim().to_string();
    }
    if conf.template.trim().is_empty() {
        conf.template = "violet-rails-extension".to_string();
    }
    if conf.source_system.trim().is_empty() {
        conf.source_system = "violet-rails".to_string();
    }
    if conf.plan.trim().is_empty() {
        conf.plan = "starter".to_string();
    }
    if conf.region.trim().is_empty() {
        conf.region = "us-east-1".to_string();
    }
    if conf.deployment_target.trim().is_empty() {
        conf.deployment_target = "managed".to_string();
    }

    if has_any_token(&text, &["enterprise", "soc2", "sso"]) {
        conf.plan = "enterprise".to_string();
    }
    if has_any_token(&text, &["self-host", "self host", "on-prem", "on prem", "kubernetes"]) {
        conf.deployment_target = "self-host".to_string();
    }

    if conf.domain.trim().is_empty() || conf.domain.eq_ignore_ascii_case("saas") {
        if has_any_token(&text, &["crm", "sales"]) {
            conf.domain = "crm".to_string();
        } else if has_any_token(&text, &["support", "helpdesk"]) {
            conf.domain = "support".to_string();
        } else if has_any_token(&text, &["marketplace", "commerce", "ecommerce"]) {
            conf.domain = "commerce".to_string();
        } else if conf.domain.trim().is_empty() {
            conf.domain = "saas".to_string();
        }
    }
}

fn apply_clarify_answers(conf: &mut Confirmation, answers: &HashMap<String, String>) {
    let mut keys: Vec<&String> = answers.keys().collect();
    keys.sort();

    for key in keys {
        let field = canonical_clarify_field(key);
        let value = answers[key].trim();
        if value.is_empty() {
            continue;
        }
        match field.as_str() {
            "app_name" => conf.app_name = value.to_string(),
            "domain" => conf.domain = value.to_string(),
            "template" => conf.template = value.to_string(),
            "source_system" => conf.source_system = value.to_string(),
            "plan" => {
                conf.plan = match value.to_lowercase().as_str() {
                    "starter" => "starter".to_string(),
                    "enterprise" => "enterprise".to_string(),
                    _ => value.to_string(),
                }
            }
            "region" => conf.region = value.to_string(),
            "deployment_target" => {
                conf.deployment_target = match value.to_lowercase().as_str() {
                    "self-host" | "self host" => "self-host".to_string(),
                    "managed" => "managed".to_string(),
                    _ => value.to_string(),
                }
            }
            "primary_users" => {
                let parsed = parse_delimited_list(value);
                if !parsed.is_empty() {
                    conf.primary_users = parsed;
                }
            }
            "core_workflows" => {
                let parsed = parse_delimited_list(value);
                if !parsed.is_empty() {
                    conf.core_workflows = parsed;
                }
            }
            "data_entities" => {
                let parsed = parse_delimited_list(value);
                if !parsed.is_empty() {
                    conf.data_entities = parsed;
                }
            }
            "integrations" => {
                let parsed = parse_delimited_list(value);
                if parsed.len() == 1 && parsed[0].eq_ignore_ascii_case("none") {
                    conf.integrations = Vec::new();
                } else if !parsed.is_empty() {
                    conf.integrations = parsed;
                }
            }
            "constraints" => {
                let filtered: Vec<String> = parse_delimited_list(value)
                    .into_iter()
                    .filter(|item| !item.to_lowercase().starts_with("no_extra_"))
                    .collect();
                if !filtered.is_empty() {
                    let mut merged = conf.constraints.clone();
                    merged.extend(filtered);
                    conf.constraints = dedupe_fold(&merged);
                }
            }
            _ => {}
        }
    }
}

fn build_clarification_questions(
    prompt: &str,
    conf: &Confirmation,
    answers: &HashMap<String, String>,
) -> Vec<ClarifyQuestion> {
    let answered: std::collections::HashSet<String> = answers
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, _)| canonical_clarify_field(key))
        .collect();
    let mut asked = std::collections::HashSet::new();
    let mut questions = Vec::new();
    let mut add = |field: &str, question: &str, why: &str, options: Vec<String>| {
        if answered.contains(field) || !asked.insert(field.to_string()) {
            return;
        }
        questions.push(ClarifyQuestion {
            id: field.to_string(),
            field: field.to_string(),
            prompt: question.to_string(),
            why: why.to_string(),
            options,
        });
    };

    let text = prompt.to_lowercase();
    if is_default_app_name(&conf.app_name) {
        add(
            "app_name",
            "What should we call this app?",
            "App name is still generic and will appear across previews, package names, and artifacts.",
            Vec::new(),
        );
    }
    let domain_tokens = [
        "crm", "support", "helpdesk", "marketplace", "commerce", "ecommerce", "billing", "hr",
        "analytics",
    ];
    if conf.domain.trim().is_empty()
        || (conf.domain.eq_ignore_ascii_case("saas") && !has_any_token(&text, &domain_tokens))
    {
        add(
            "domain",
            "Which domain best matches your product?",
            "Domain sharpens default workflows, entities, and quality checks.",
            to_options(&["crm", "support", "commerce", "billing", "project-management"]),
        );
    }
    if conf.plan.trim().is_empty()
        || (has_any_token(&text, &["enterprise", "soc2", "sso"])
            && !conf.plan.eq_ignore_ascii_case("enterprise"))
    {
        add(
            "plan",
            "What release tier should we target first?",
            "Tier changes security and operational guardrails in generated scaffolds.",
            to_options(&["starter", "enterprise"]),
        );
    }
    if conf.deployment_target.trim().is_empty()
        || (has_any_token(&text, &["self-host", "self host", "on-prem", "on prem", "kubernetes"])
            && !conf.deployment_target.eq_ignore_ascii_case("self-host"))
    {
        add(
            "deployment_target",
            "Where should this app run first?",
            "Hosting target controls deploy scripts and infra assumptions.",
            to_options(&["managed", "self-host"]),
        );
    }
    if conf.primary_users.len() < 2 {
        add(
            "primary_users",
            "Who are the primary users (comma or newline separated)?",
            "User roles drive API contracts, permissions, and UI navigation.",
            Vec::new(),
        );
    }
    if conf.core_workflows.len() < 3 {
        add(
            "core_workflows",
            "List 3-5 must-have workflows.",
            "Workflow depth determines generated routes, screens, and verify targets.",
            Vec::new(),
        );
    }
    if conf.data_entities.len() < 3 {
        add(
            "data_entities",
            "List key data entities (comma or newline separated).",
            "Entities define schema, CRUD flows, and API contract coverage.",
            Vec::new(),
        );
    }
    if conf.integrations.is_empty() {
        add(
            "integrations",
            "Any integrations needed for v1?",
            "Integrations affect secret wiring, jobs, and deployment requirements.",
            to_options(&["stripe", "slack", "sendgrid", "none"]),
        );
    }

    let mut required_constraints = Vec::new();
    if has_any_token(&text, &["mobile", "ios", "android"])
        && !contains_fold(&conf.constraints, "ship_web_and_mobile_clients")
    {
        required_constraints.push("ship_web_and_mobile_clients".to_string());
    }
    if has_any_token(&text, &["agent", "ai", "langgraph", "tool", "cli"])
        && !contains_fold(&conf.constraints, "expose_api_as_tools")
    {
        required_constraints.push("expose_api_as_tools".to_string());
    }
    if !required_constraints.is_empty() {
        let mut options = required_constraints.clone();
        options.push("no_extra_constraints".to_string());
        let question = format!(
            "Should we enforce these constraints: {} ?",
            required_constraints.join(", ")
        );
        add(
            "constraints",
            &question,
            "Constraints guarantee generated output stays aligned with your stated operating model.",
            options,
        );
    }

    questions.truncate(3);
    questions
}

fn canonical_clarify_field(field: &str) -> String {
    match field.trim().to_lowercase().as_str() {
        "name" | "app" | "app_name" => "app_name".to_string(),
        "source" | "source_system" => "source_system".to_string(),
        "plan" | "tier" => "plan".to_string(),
        "deployment" | "deployment_target" | "target" | "hosting" => {
            "deployment_target".to_string()
        }
        "users" | "primary_users" | "personas" => "primary_users".to_string(),
        "workflows" | "core_workflows" => "core_workflows".to_string(),
        "entities" | "data_entities" | "models" => "data_entities".to_string(),
        other => other.to_string(),
    }
}

fn parse_delimited_list(raw: &str) -> Vec<String> {
    let parts: Vec<String> = raw
        .split(|c: char| c == '\n' || c == ',' || c == ';')
        .map(ToString::to_string)
        .collect();
    normalize_list(&parts)
}

fn contains_fold(items: &[String], target: &str) -> bool {
    let target = target.trim().to_lowercase();
    items.iter().any(|item| item.trim().to_lowercase() == target)
}

fn has_any_token(text: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|token| text.contains(&token.to_lowercase()))
}

fn is_default_app_name(name: &str) -> bool {
    let trimmed = name.trim().to_lowercase();
    trimmed.is_empty() || trimmed == "generated app"
}

fn to_options(options: &[&str]) -> Vec<String> {
    options.iter().map(ToString::to_string).collect()
}

#[derive(Deserialize)]
struct ActRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    value: Value,
}

pub(crate) async fn act_handler(
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
    let req: ActRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.app_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "app_id_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let subject = claims.subject.clone();
    let idem_key = key.clone();
    let exec = async {
        let mutation = super::apps::MutationRequest {
            class: req.class,
            path: req.path,
            value: req.value,
        };
        let (status, mut value) =
            super::apps::execute_mutation(&state, &tenant_id, req.app_id.trim(), &idem_key, &mutation)
                .await?;
        stamp_agent(&mut value, &subject);
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

#[derive(Deserialize)]
struct AgentVerifyRequest {
    #[serde(default)]
    app_id: String,
}

pub(crate) async fn verify_handler(
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
    let req: AgentVerifyRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.app_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "app_id_required", None);
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let subject = claims.subject.clone();
    let idem_key = key.clone();
    let exec = async {
        let (status, mut value) =
            super::apps::execute_verify(&state, &tenant_id, req.app_id.trim(), &idem_key).await?;
        stamp_agent(&mut value, &subject);
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

#[derive(Deserialize)]
struct AgentDeployRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    profile: Option<Map<String, Value>>,
}

pub(crate) async fn deploy_handler(
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
    let req: AgentDeployRequest = match decode_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.app_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "app_id_required", None);
    }
    let target = req.target.trim().to_string();
    if target != "self-host" && target != "managed" {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalid_target",
            Some(json!({"supported": ["self-host", "managed"]})),
        );
    }

    let endpoint = uri.path().to_string();
    let tenant_id = claims.tenant_id.clone();
    let subject = claims.subject.clone();
    let idem_key = key.clone();
    let exec = async {
        let deploy = super::apps::DeployIntentRequest {
            profile: req.profile,
        };
        let (status, mut value) = super::apps::execute_deploy(
            &state,
            &tenant_id,
            req.app_id.trim(),
            &idem_key,
            &target,
            &deploy,
        )
        .await?;
        stamp_agent(&mut value, &subject);
        Ok((status, serde_json::to_vec(&value)?))
    };
    with_idempotency(&state, &claims.tenant_id, &endpoint, &key, exec).await
}

fn stamp_agent(value: &mut Value, subject: &str) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("actor".to_string(), json!("agent"));
        obj.insert("subject".to_string(), json!(subject));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarify_fields_canonicalize_aliases() {
        assert_eq!(canonical_clarify_field("Tier"), "plan");
        assert_eq!(canonical_clarify_field("hosting"), "deployment_target");
        assert_eq!(canonical_clarify_field("personas"), "primary_users");
        assert_eq!(canonical_clarify_field("models"), "data_entities");
        assert_eq!(canonical_clarify_field("custom_field"), "custom_field");
    }

    #[test]
    fn prompt_signals_override_generic_defaults() {
        let mut conf = Confirmation::default();
        apply_prompt_defaults_for_clarify(&mut conf, "enterprise CRM on kubernetes");
        assert_eq!(conf.plan, "enterprise");
        assert_eq!(conf.deployment_target, "self-host");
        assert_eq!(conf.domain, "crm");
    }

    #[test]
    fn question_list_is_capped_at_three() {
        let conf = Confirmation::default();
        let questions = build_clarification_questions("build something", &conf, &HashMap::new());
        assert!(questions.len() <= 3);
        assert!(!questions.is_empty());
    }

    #[test]
    fn answered_fields_are_not_asked_again() {
        let conf = Confirmation::default();
        let mut answers = HashMap::new();
        answers.insert("app_name".to_string(), "Support Desk".to_string());
        let questions = build_clarification_questions("build something", &conf, &answers);
        assert!(questions.iter().all(|q| q.field != "app_name"));
    }

    #[test]
    fn none_answer_clears_integrations() {
        let mut conf = Confirmation {
            integrations: vec!["stripe".to_string()],
            ..Confirmation::default()
        };
        let mut answers = HashMap::new();
        answers.insert("integrations".to_string(), "none".to_string());
        apply_clarify_answers(&mut conf, &answers);
        assert!(conf.integrations.is_empty());
    }
}
