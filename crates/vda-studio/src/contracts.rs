// SPDX-License-Identifier: Apache-2.0

//! Derived job contracts: artifact manifest, verification report, JTBD
//! coverage, and per-target check selection. Everything here is a pure
//! function of the job record.

use chrono::Utc;
use vda_core::stable_id;
use vda_model::{
    is_depth_label, normalize_depth_label, ArtifactFile, ArtifactManifest, FileArtifact, Job,
    JtbdCoverage, RunTargetInfo, VerificationCheck, VerificationReport,
};

pub(crate) fn build_artifact_manifest(job: &Job) -> ArtifactManifest {
    let files = job
        .files
        .iter()
        .map(|f| ArtifactFile {
            path: f.path.clone(),
            language: f.language.clone(),
            category: categorize_artifact(&f.path),
            size_bytes: f.content.len(),
        })
        .collect();
    ArtifactManifest {
        generated_at: Some(Utc::now()),
        workspace_path: job.workspace_path.clone(),
        files,
        run_targets: vec![
            run_target("web", "Validate web runtime artifacts", "studio run web"),
            run_target("mobile", "Validate mobile runtime artifacts", "studio run mobile"),
            run_target("api", "Validate backend contract artifacts", "studio run api"),
            run_target("verify", "Run deterministic verification checks", "studio run verify"),
            run_target("all", "Run all checks", "studio run all"),
        ],
    }
}

fn run_target(name: &str, description: &str, command: &str) -> RunTargetInfo {
    RunTargetInfo {
        name: name.to_string(),
        description: description.to_string(),
        command: command.to_string(),
    }
}

pub(crate) fn categorize_artifact(path: &str) -> String {
    let normalized = path.trim().to_lowercase();
    let category = if normalized.contains("/clients/web/modules/") {
        "web_module"
    } else if normalized.contains("/clients/web/") {
        "web_client"
    } else if normalized.contains("/clients/mobile/") {
        "mobile_client"
    } else if normalized.contains("/identity/") {
        "identity_module"
    } else if normalized.contains("/primitives/") {
        "product_primitive"
    } else if normalized.contains("/config/rbac") {
        "auth_model"
    } else if normalized.contains("/docs/parity/") {
        "parity_doc"
    } else if normalized.contains("/integrations/") {
        "integration_adapter"
    } else if normalized.contains("/services/api/") {
        "backend_service"
    } else if normalized.contains("/api/") {
        "api_contract"
    } else if normalized.contains("/workflows/") {
        "workflow"
    } else if normalized.contains("/tests/") {
        "test"
    } else if normalized.contains("/deploy/") {
        "deploy"
    } else if normalized.contains("/boilerplate/") {
        "migration_note"
    } else if normalized.ends_with("/readme.md") {
        "docs"
    } else {
        "misc"
    };
    category.to_string()
}

pub(crate) fn build_verification_report(job: &Job) -> VerificationReport {
    let checks = vec![
        VerificationCheck::new(
            "artifacts_required_present",
            has_paths(
                &job.files,
                &[
                    "/clients/web/index.html",
                    "/clients/web/app.js",
                    "/clients/mobile/index.html",
                    "/clients/mobile/app.js",
                    "/api/openapi.yaml",
                ],
            ),
            "required runtime and api contract files",
        ),
        VerificationCheck::new(
            "tests_present",
            has_category(&job.artifact_manifest.files, "test"),
            "at least one test artifact generated",
        ),
        VerificationCheck::new(
            "deploy_artifacts_present",
            has_category(&job.artifact_manifest.files, "deploy"),
            "self-host and managed deploy artifacts present",
        ),
        VerificationCheck::new(
            "backend_runtime_present",
            has_paths(
                &job.files,
                &[
                    "/services/api/Cargo.toml",
                    "/services/api/src/main.rs",
                    "/services/api/src/runtime/server.rs",
                    "/services/api/Dockerfile",
                ],
            ),
            "generated backend runtime scaffold present",
        ),
        VerificationCheck::new(
            "agent_tools_contract_present",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/tools/catalog.rs",
                    "/services/api/src/tools/contracts.ts",
                ],
            ),
            "generated backend tool contracts present",
        ),
        VerificationCheck::new(
            "policy_constraints_present",
            has_constraint(&job.confirmation.constraints, "all_mutations_idempotent"),
            "idempotency constraint captured",
        ),
        VerificationCheck::new(
            "depth_label_declared",
            is_depth_label(&normalize_depth_label(&job.depth_label)),
            "studio job depth label is one of prototype/pilot/production-candidate",
        ),
        VerificationCheck::new(
            "behavioral_fixtures_present",
            has_paths(
                &job.files,
                &["/tests/behavior/scenarios.yaml", "/services/api/tests/behavior.sh"],
            ),
            "behavioral fixture definitions generated for app + api runtime",
        ),
        VerificationCheck::new(
            "behavioral_runtime_modules_present",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/runtime/entity_actions.rs",
                    "/services/api/src/runtime/behavior_tests.rs",
                ],
            ),
            "generated api runtime includes entity/action handlers and behavioral tests",
        ),
        VerificationCheck::new(
            "behavioral_primitives_modules_present",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/primitives/mod.rs",
                    "/clients/web/modules/cms.ts",
                    "/clients/web/modules/blog.ts",
                    "/clients/web/modules/forum.ts",
                    "/clients/web/modules/email.ts",
                ],
            ),
            "generated CMS/blog/forum/email modules present in runtime and web artifacts",
        ),
        VerificationCheck::new(
            "behavioral_identity_modules_present",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/identity/mod.rs",
                    "/services/api/src/identity/providers/auth0.rs",
                    "/services/api/src/identity/providers/clerk.rs",
                    "/services/api/src/identity/providers/supabase.rs",
                    "/clients/web/modules/auth.ts",
                    "/config/rbac.generated.json",
                ],
            ),
            "generated identity lifecycle module, provider stubs, and RBAC model present",
        ),
        VerificationCheck::new(
            "boundary_docs_present",
            has_paths(
                &job.files,
                &[
                    "/docs/parity/api-endpoint-matrix.md",
                    "/docs/parity/control-plane-vs-runtime.md",
                    "/docs/parity/migration-guide-content-community-email.md",
                ],
            ),
            "generated docs inventory runtime parity and migration boundaries",
        ),
    ];

    let verdict = if checks.iter().all(|c| c.status.is_pass()) {
        "pass"
    } else {
        "fail"
    };
    let updated_nanos = job
        .updated_at
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or(0);
    VerificationReport {
        report_id: stable_id(
            "studio_vrf",
            &[&job.tenant_id, &job.job_id, &updated_nanos.to_string()],
        ),
        verdict: verdict.to_string(),
        depth_label: normalize_depth_label(&job.depth_label),
        behavioral_pass_rate: behavioral_pass_rate(&checks),
        checks,
        generated_at: Some(Utc::now()),
    }
}

pub(crate) fn build_jtbd_coverage(job: &Job) -> Vec<JtbdCoverage> {
    vec![
        jtbd(
            "jtbd_create_app",
            "Create app from prompt",
            !job.files.is_empty() && !job.workload.is_empty(),
            format!("files={} workload={}", job.files.len(), job.workload.len()),
        ),
        jtbd(
            "jtbd_customize_safely",
            "Customize safely",
            has_constraint(&job.confirmation.constraints, "all_mutations_idempotent"),
            "constraint all_mutations_idempotent present".to_string(),
        ),
        jtbd(
            "jtbd_validate_behavior",
            "Validate behavior before deploy",
            job.verification_report.verdict == "pass"
                && job.verification_report.behavioral_pass_rate >= 1.0,
            format!(
                "verification verdict={} behavioral_pass_rate={:.2}",
                job.verification_report.verdict, job.verification_report.behavioral_pass_rate
            ),
        ),
        jtbd(
            "jtbd_operate_human_ai",
            "Operate with human and AI agents",
            has_paths(
                &job.files,
                &["/src/agent_contract.ts", "/services/api/src/tools/catalog.rs"],
            ),
            "agent contract and backend tools catalog generated".to_string(),
        ),
        jtbd(
            "jtbd_backend_runtime",
            "Run generated backend service",
            has_paths(
                &job.files,
                &[
                    "/services/api/Cargo.toml",
                    "/services/api/src/main.rs",
                    "/services/api/src/runtime/server.rs",
                    "/services/api/src/runtime/entity_actions.rs",
                ],
            ),
            "backend runtime scaffold + behavioral entity/action handlers generated".to_string(),
        ),
        jtbd(
            "jtbd_product_primitives",
            "Deliver product primitives in generated runtime",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/primitives/mod.rs",
                    "/clients/web/modules/cms.ts",
                    "/clients/web/modules/blog.ts",
                    "/clients/web/modules/forum.ts",
                    "/clients/web/modules/email.ts",
                ],
            ),
            "generated primitives modules for cms/blog/forum/email".to_string(),
        ),
        jtbd(
            "jtbd_user_lifecycle_governance",
            "Deliver generated user lifecycle and governance seams",
            has_paths(
                &job.files,
                &[
                    "/services/api/src/identity/mod.rs",
                    "/config/rbac.generated.json",
                    "/clients/web/modules/auth.ts",
                ],
            ),
            "generated identity routes, RBAC model, and web auth module".to_string(),
        ),
        jtbd(
            "jtbd_ship",
            "Ship self-host or managed",
            has_category(&job.artifact_manifest.files, "deploy"),
            "deploy artifacts generated".to_string(),
        ),
    ]
}

fn jtbd(id: &str, task: &str, ok: bool, evidence: String) -> JtbdCoverage {
    JtbdCoverage {
        id: id.to_string(),
        task: task.to_string(),
        status: vda_model::CheckStatus::from_bool(ok),
        evidence,
    }
}

/// Static checks for one run target. The live runtime smoke is appended
/// by the service for `api` and `all`.
pub(crate) fn run_target_checks(job: &Job, target: &str) -> Vec<VerificationCheck> {
    match target.trim().to_lowercase().as_str() {
        "web" => vec![VerificationCheck::new(
            "web_runtime",
            has_paths(
                &job.files,
                &[
                    "/clients/web/index.html",
                    "/clients/web/app.js",
                    "/clients/web/app.css",
                ],
            ),
            "web runtime assets present",
        )],
        "mobile" => vec![VerificationCheck::new(
            "mobile_runtime",
            has_paths(
                &job.files,
                &[
                    "/clients/mobile/index.html",
                    "/clients/mobile/app.js",
                    "/clients/mobile/app.css",
                ],
            ),
            "mobile runtime assets present",
        )],
        "api" => vec![
            VerificationCheck::new(
                "api_openapi",
                has_paths(&job.files, &["/api/openapi.yaml"]),
                "openapi generated",
            ),
            VerificationCheck::new(
                "api_agent_contract",
                has_paths(&job.files, &["/src/agent_contract.ts"]),
                "agent contract generated",
            ),
            VerificationCheck::new(
                "api_service_runtime",
                has_paths(
                    &job.files,
                    &[
                        "/services/api/Cargo.toml",
                        "/services/api/src/main.rs",
                        "/services/api/src/runtime/server.rs",
                    ],
                ),
                "backend runtime scaffold generated",
            ),
            VerificationCheck::new(
                "api_service_tests",
                has_paths(
                    &job.files,
                    &[
                        "/services/api/src/runtime/behavior_tests.rs",
                        "/services/api/tests/smoke.sh",
                    ],
                ),
                "backend runtime tests generated",
            ),
            VerificationCheck::new(
                "api_dynamic_entity_runtime",
                has_paths(&job.files, &["/services/api/src/runtime/entity_actions.rs"]),
                "generated runtime entity CRUD and action handlers present",
            ),
            VerificationCheck::new(
                "api_primitives_modules",
                has_paths(&job.files, &["/services/api/src/primitives/mod.rs"]),
                "generated primitives runtime module present",
            ),
            VerificationCheck::new(
                "api_identity_modules",
                has_paths(
                    &job.files,
                    &[
                        "/services/api/src/identity/mod.rs",
                        "/services/api/src/identity/providers/auth0.rs",
                        "/services/api/src/identity/providers/clerk.rs",
                        "/services/api/src/identity/providers/supabase.rs",
                    ],
                ),
                "generated identity lifecycle runtime module and provider stubs present",
            ),
            VerificationCheck::new(
                "api_behavioral_fixtures",
                has_paths(
                    &job.files,
                    &[
                        "/tests/behavior/scenarios.yaml",
                        "/services/api/tests/behavior.sh",
                        "/services/api/src/runtime/behavior_tests.rs",
                    ],
                ),
                "generated behavioral scenarios and executable fixtures present",
            ),
        ],
        "verify" => job.verification_report.checks.clone(),
        _ => {
            let mut all = Vec::new();
            all.extend(run_target_checks(job, "web"));
            all.extend(run_target_checks(job, "mobile"));
            all.extend(run_target_checks(job, "api"));
            all.extend(job.verification_report.checks.clone());
            all
        }
    }
}

pub(crate) fn has_paths(files: &[FileArtifact], suffixes: &[&str]) -> bool {
    suffixes
        .iter()
        .all(|suffix| files.iter().any(|file| file.path.ends_with(suffix)))
}

fn has_category(files: &[ArtifactFile], category: &str) -> bool {
    files.iter().any(|file| file.category == category)
}

fn has_constraint(constraints: &[String], needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    constraints
        .iter()
        .any(|constraint| constraint.trim().to_lowercase() == needle)
}

fn behavioral_pass_rate(checks: &[VerificationCheck]) -> f64 {
    let behavioral: Vec<&VerificationCheck> = checks
        .iter()
        .filter(|check| check.id.starts_with("behavioral_"))
        .collect();
    if behavioral.is_empty() {
        return 0.0;
    }
    let passed = behavioral.iter().filter(|check| check.status.is_pass()).count();
    let ratio = passed as f64 / behavioral.len() as f64;
    (ratio * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::categorize_artifact;

    #[test]
    fn categorization_prefers_most_specific_prefix() {
        assert_eq!(categorize_artifact("apps/x/clients/web/modules/cms.ts"), "web_module");
        assert_eq!(categorize_artifact("apps/x/clients/web/app.js"), "web_client");
        assert_eq!(
            categorize_artifact("apps/x/services/api/src/identity/mod.rs"),
            "identity_module"
        );
        assert_eq!(categorize_artifact("apps/x/deploy/managed/deploy-intent.json"), "deploy");
        assert_eq!(categorize_artifact("apps/x/README.md"), "docs");
        assert_eq!(categorize_artifact("apps/x/blueprint.yaml"), "misc");
    }
}
