// SPDX-License-Identifier: Apache-2.0

use vda_model::{Confirmation, FileArtifact, WorkloadItem};

/// Lowercased, dash-collapsed form of the app name. Empty input maps to
/// "app"; the caller substitutes "generated-app" for a fully empty slug.
#[must_use]
pub fn slugify(input: &str) -> String {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "app".to_string()
    } else {
        out
    }
}

pub(crate) fn yaml_list(items: &[String]) -> String {
    let rows: Vec<String> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("  - {item}"))
        .collect();
    if rows.is_empty() {
        "  - none".to_string()
    } else {
        rows.join("\n")
    }
}

pub(crate) fn fallback<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        default
    } else {
        value
    }
}

pub(crate) fn with_default(items: &[String], default: &str) -> Vec<String> {
    let out: Vec<String> = items
        .iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if out.is_empty() {
        vec![default.to_string()]
    } else {
        out
    }
}

pub(crate) fn build_workload(conf: &Confirmation) -> Vec<WorkloadItem> {
    let mut items = vec![
        workload("Shape", "Finalize app contract and data entities", "product", 4),
        workload(
            "Shape",
            &format!(
                "Align template: {} from {}",
                conf.template, conf.source_system
            ),
            "platform",
            3,
        ),
        workload("Build", "Scaffold app blueprint and APIs", "platform", 6),
        workload(
            "Build",
            "Wire customization rules and mutation policies",
            "policy",
            5,
        ),
        workload("Verify", "Run machine-readable verification checks", "qa", 3),
        workload(
            "Deploy",
            &format!("Prepare {} deployment intent", conf.deployment_target),
            "release",
            2,
        ),
    ];
    for wf in &conf.core_workflows {
        items.push(workload("Build", &format!("Implement workflow: {wf}"), "platform", 2));
    }
    items
}

fn workload(phase: &str, task: &str, owner: &str, estimate_hours: u32) -> WorkloadItem {
    WorkloadItem {
        phase: phase.to_string(),
        task: task.to_string(),
        owner: owner.to_string(),
        estimate_hours,
        status: "ready".to_string(),
    }
}

/// The complete, path-sorted artifact set for one confirmation.
pub(crate) fn build_files(slug: &str, conf: &Confirmation) -> Vec<FileArtifact> {
    let users = yaml_list(&conf.primary_users);
    let entities = yaml_list(&conf.data_entities);
    let workflows = yaml_list(&conf.core_workflows);
    let integrations = yaml_list(&conf.integrations);
    let constraints = yaml_list(&conf.constraints);

    let blueprint = format!(
        "app:\n  name: {}\n  domain: {}\n  template: {}\n  source_system: {}\n  plan: {}\n  region: {}\n  deployment_target: {}\nprimary_users:\n{}\nentities:\n{}\nworkflows:\n{}\nintegrations:\n{}\nconstraints:\n{}\n",
        conf.app_name,
        conf.domain,
        conf.template,
        conf.source_system,
        conf.plan,
        conf.region,
        conf.deployment_target,
        users,
        entities,
        workflows,
        integrations,
        constraints,
    );

    let openapi = format!(
        "openapi: 3.1.0\ninfo:\n  title: {} API\n  version: 0.1.0\npaths:\n  /v1/{}/health:\n    get:\n      responses:\n        '200':\n          description: OK\n  /v1/{}/workflows/execute:\n    post:\n      responses:\n        '200':\n          description: Workflow execution result\n",
        conf.app_name, slug, slug,
    );

    let agent_contract = format!(
        "export interface AgentPlanRequest {{\n  prompt: string;\n  target: \"{}\";\n}}\n\nexport interface AgentActRequest {{\n  mutationClass: string;\n  payload: Record<string, unknown>;\n}}\n\nexport interface AgentVerifyResponse {{\n  verdict: \"pass\" | \"fail\";\n  checks: Array<{{ id: string; status: \"pass\" | \"fail\"; evidence: string }}>;\n}}\n",
        conf.deployment_target,
    );

    let workflows_json = format!(
        "{{\n  \"workflows\": {}\n}}\n",
        serde_json::to_string(&conf.core_workflows).unwrap_or_else(|_| "[]".to_string()),
    );

    let self_host_deploy = format!(
        "version: \"3.9\"\nservices:\n  web:\n    image: ghcr.io/violet/{slug}-web:latest\n    ports:\n      - \"8080:8080\"\n    environment:\n      - APP_NAME={}\n  api:\n    image: ghcr.io/violet/{slug}-api:latest\n    ports:\n      - \"8090:8090\"\n    environment:\n      - POLICY_VERSION=v1\n",
        conf.app_name,
    );

    let managed_deploy_intent = format!(
        "{{\n  \"target\": \"managed\",\n  \"app_name\": {},\n  \"region\": {},\n  \"plan\": {},\n  \"requires_approval\": true\n}}\n",
        json_string(&conf.app_name),
        json_string(&conf.region),
        json_string(&conf.plan),
    );

    let smoke_test = format!(
        "name: generated-smoke\ndescription: Validate generated runtime and API contract for {}\nchecks:\n  - id: web_runtime\n    assert: clients/web/index.html exists\n  - id: mobile_runtime\n    assert: clients/mobile/index.html exists\n  - id: api_contract\n    assert: api/openapi.yaml exists\n",
        conf.app_name,
    );

    let package_json = format!(
        "{{\n  \"name\": \"{slug}\",\n  \"private\": true,\n  \"version\": \"0.1.0\",\n  \"description\": \"Generated Violet Rails extension scaffold\",\n  \"scripts\": {{\n    \"serve:web\": \"python3 -m http.server 4173 -d ./clients/web\",\n    \"serve:mobile\": \"python3 -m http.server 4174 -d ./clients/mobile\"\n  }}\n}}\n",
    );

    let readme = format!(
        "# {}\n\nGenerated from prompt-driven confirmation.\n\n## Template\n\n- `{}` (source: `{}`)\n\n## Run\n\n- Validate blueprint\n- Execute verify checks\n- Create deploy intent ({})\n",
        conf.app_name, conf.template, conf.source_system, conf.deployment_target,
    );

    let base = format!("apps/{slug}");
    let mut files = vec![
        artifact(&format!("{base}/README.md"), "markdown", readme),
        artifact(&format!("{base}/package.json"), "json", package_json),
        artifact(&format!("{base}/blueprint.yaml"), "yaml", blueprint),
        artifact(&format!("{base}/api/openapi.yaml"), "yaml", openapi),
        artifact(&format!("{base}/src/agent_contract.ts"), "typescript", agent_contract),
        artifact(&format!("{base}/workflows/definitions.json"), "json", workflows_json),
        artifact(&format!("{base}/tests/smoke.yaml"), "yaml", smoke_test),
        artifact(
            &format!("{base}/deploy/self-host/docker-compose.yaml"),
            "yaml",
            self_host_deploy,
        ),
        artifact(
            &format!("{base}/deploy/managed/deploy-intent.json"),
            "json",
            managed_deploy_intent,
        ),
        artifact(
            &format!("{base}/boilerplate/violet_rails_extension.md"),
            "markdown",
            extension_notes(conf),
        ),
    ];
    files.extend(crate::preview::runtime_source_artifacts(slug, conf));
    files.extend(crate::parity::parity_support_artifacts(slug, conf));
    files.extend(crate::backend::backend_runtime_artifacts(slug, conf));
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

pub(crate) fn artifact(path: &str, language: &str, content: String) -> FileArtifact {
    FileArtifact {
        path: path.to_string(),
        language: language.to_string(),
        content,
    }
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn extension_notes(conf: &Confirmation) -> String {
    format!(
        "# Violet Rails Extension Boilerplate\n\n## Source\n\n- template: {}\n- source_system: {}\n\n## Generated intent\n\n- Preserve deterministic API boundaries while extending Violet Rails behavior.\n- Keep mutating actions idempotent and replay-safe.\n- Expose all operator surfaces as API tools for human + AI loops.\n\n## Suggested next implementation files\n\n1. clients/web/src/modules/app-shell.tsx\n2. clients/mobile/src/screens/home.tsx\n3. services/api/src/routes/tenant_tools.rs\n4. services/api/src/orchestration/agent_hooks.rs\n",
        conf.template, conf.source_system,
    )
}

#[cfg(test)]
mod tests {
    use super::{build_files, slugify, yaml_list};
    use vda_model::Confirmation;

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("Support Desk  Pro!"), "support-desk-pro");
        assert_eq!(slugify("--x--"), "x");
        assert_eq!(slugify("!!!"), "app");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn yaml_list_falls_back_to_none() {
        assert_eq!(yaml_list(&[]), "  - none");
        assert_eq!(
            yaml_list(&["a".to_string(), " ".to_string()]),
            "  - a"
        );
    }

    #[test]
    fn files_are_path_sorted_and_namespaced() {
        let conf = Confirmation {
            app_name: "Demo App".to_string(),
            ..Confirmation::default()
        };
        let files = build_files("demo-app", &conf);
        assert!(files.windows(2).all(|w| w[0].path < w[1].path));
        assert!(files.iter().all(|f| f.path.starts_with("apps/demo-app/")));
    }
}
