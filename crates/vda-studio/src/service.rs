// SPDX-License-Identifier: Apache-2.0

use crate::artifacts::{build_files, build_workload, fallback, slugify};
use crate::bundle::{build_bundle_bytes, BundleError};
use crate::contracts::{
    build_artifact_manifest, build_jtbd_coverage, build_verification_report, run_target_checks,
};
use crate::preview::{render_preview_document, render_runtime_asset};
use crate::smoke::run_api_runtime_checks;
use crate::terminal::{run_exec_command, run_pseudo_command};
use crate::workspace::materialize;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use vda_core::{dedupe_fold, normalize_list, stable_id};
use vda_model::{
    normalize_depth_label, ArtifactManifest, CheckStatus, Confirmation, Job, JtbdCoverage,
    RunResult, TerminalResult, VerificationReport, REQUIRED_CONSTRAINTS,
};

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Persistence seam for job records. The store keeps the same bytes the
/// in-memory map holds, so a cache miss rehydrates losslessly.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(
        &self,
        tenant_id: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn load_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>>;
}

/// The studio engine. Reads take the map's read lock briefly; writes
/// hold the write lock across the full mutate-plus-persist sequence so
/// the persisted revision can never run ahead of the in-memory one.
pub struct StudioService {
    jobs: RwLock<HashMap<String, Job>>,
    workspace_root: PathBuf,
    persistence: Option<Arc<dyn JobStore>>,
}

impl StudioService {
    #[must_use]
    pub fn new(workspace_root: PathBuf, persistence: Option<Arc<dyn JobStore>>) -> Self {
        if let Err(err) = std::fs::create_dir_all(&workspace_root) {
            warn!(%err, root = %workspace_root.display(), "workspace root creation failed");
        }
        Self {
            jobs: RwLock::new(HashMap::new()),
            workspace_root,
            persistence,
        }
    }

    pub async fn create_job(&self, tenant_id: &str, mut conf: Confirmation) -> Job {
        let now = Utc::now();
        apply_confirmation_defaults(&mut conf);
        let mut slug = slugify(&conf.app_name);
        if slug.is_empty() {
            slug = "generated-app".to_string();
        }
        let job_id = stable_id(
            "job",
            &[
                tenant_id,
                &conf.prompt,
                &conf.app_name,
                &now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        );

        let workload = build_workload(&conf);
        let files = build_files(&slug, &conf);
        let mut terminal = vec![
            "$ scaffold init --template deterministic-saas".to_string(),
            format!(
                "$ scaffold app --name \"{}\" --region {} --plan {}",
                conf.app_name, conf.region, conf.plan
            ),
            "$ scaffold contracts --human-api --agent-api".to_string(),
            "$ scaffold verify --checks schema,policy,deploy_preflight".to_string(),
            format!("$ scaffold deploy --target {}", conf.deployment_target),
            "$ build complete".to_string(),
        ];
        let mut console = vec![
            "[planner] prompt parsed and normalized".to_string(),
            "[designer] structured confirmation converted to blueprint".to_string(),
            "[builder] workload graph created".to_string(),
            "[builder] code artifacts generated".to_string(),
            "[runner] verify/deploy hooks prepared".to_string(),
        ];

        let workspace_path = match materialize(&self.workspace_root, &job_id, &files) {
            Ok(path) => {
                let path = path.display().to_string();
                terminal.push(format!("$ cd {path}"));
                console.push(format!("[builder] workspace materialized: {path}"));
                path
            }
            Err(err) => {
                console.push(format!("[builder] workspace materialization_failed: {err}"));
                String::new()
            }
        };

        let mut job = Job {
            job_id: job_id.clone(),
            tenant_id: tenant_id.to_string(),
            status: "generated".to_string(),
            depth_label: conf.generation_depth.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            workspace_path,
            confirmation: conf,
            workload,
            preview_workload: "workload".to_string(),
            preview_code_path: files.first().map(|f| f.path.clone()).unwrap_or_default(),
            preview_terminal: terminal.last().cloned().unwrap_or_default(),
            preview_console: console.last().cloned().unwrap_or_default(),
            files,
            artifact_manifest: ArtifactManifest::default(),
            verification_report: VerificationReport::default(),
            jtbd_coverage: Vec::new(),
            terminal_logs: terminal,
            console_logs: console,
        };
        self.enrich_job(&mut job);

        let mut jobs = self.jobs.write().await;
        jobs.insert(job_id, job.clone());
        self.persist_job(&job).await;
        job
    }

    pub async fn get_job(&self, tenant_id: &str, job_id: &str) -> Option<Job> {
        let cached = {
            let jobs = self.jobs.read().await;
            jobs.get(job_id).cloned()
        };
        if let Some(mut job) = cached {
            if job.tenant_id != tenant_id {
                return None;
            }
            if self.ensure_workspace(&mut job) {
                let mut jobs = self.jobs.write().await;
                jobs.insert(job_id.to_string(), job.clone());
                self.persist_job(&job).await;
            }
            return Some(job);
        }
        self.rehydrate_job(tenant_id, job_id).await
    }

    /// Cache miss path: reload from persistence, re-enrich, and insert
    /// under the write lock.
    async fn rehydrate_job(&self, tenant_id: &str, job_id: &str) -> Option<Job> {
        let store = self.persistence.as_ref()?;
        let payload = match store.load_job(tenant_id, job_id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(%err, job_id, "studio job rehydration failed");
                return None;
            }
        };
        let mut job: Job = match serde_json::from_slice(&payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(%err, job_id, "studio job payload decode failed");
                return None;
            }
        };
        if job.tenant_id != tenant_id {
            return None;
        }
        if self.ensure_workspace(&mut job) {
            job.updated_at = Some(Utc::now());
        }
        self.enrich_job(&mut job);

        let mut jobs = self.jobs.write().await;
        jobs.insert(job_id.to_string(), job.clone());
        Some(job)
    }

    pub async fn get_console(&self, tenant_id: &str, job_id: &str) -> Option<Vec<String>> {
        self.get_job(tenant_id, job_id)
            .await
            .map(|job| job.console_logs)
    }

    pub async fn get_artifacts(&self, tenant_id: &str, job_id: &str) -> Option<ArtifactManifest> {
        self.get_job(tenant_id, job_id)
            .await
            .map(|job| job.artifact_manifest)
    }

    pub async fn get_verification(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Option<VerificationReport> {
        self.get_job(tenant_id, job_id)
            .await
            .map(|job| job.verification_report)
    }

    pub async fn get_jtbd(&self, tenant_id: &str, job_id: &str) -> Option<Vec<JtbdCoverage>> {
        self.get_job(tenant_id, job_id)
            .await
            .map(|job| job.jtbd_coverage)
    }

    pub async fn run_terminal(
        &self,
        tenant_id: &str,
        job_id: &str,
        command: &str,
    ) -> Option<TerminalResult> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).filter(|job| job.tenant_id == tenant_id)?;

        let cwd = if job.workspace_path.trim().is_empty() {
            "/workspace".to_string()
        } else {
            job.workspace_path.clone()
        };
        let trimmed = command.trim();
        let output = if let Some(rest) = trimmed.strip_prefix("exec ") {
            if job.workspace_path.trim().is_empty() {
                run_pseudo_command(trimmed, &job.files)
            } else {
                run_exec_command(std::path::Path::new(&cwd), rest.trim()).await
            }
        } else {
            run_pseudo_command(trimmed, &job.files)
        };
        let result = TerminalResult {
            command: command.to_string(),
            output: output.clone(),
            cwd,
        };

        let now = Utc::now();
        job.terminal_logs.push(format!("$ {command}"));
        job.terminal_logs.extend(output);
        job.console_logs.push(format!(
            "[terminal {}] command executed: {command}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        job.updated_at = Some(now);
        let mut updated = job.clone();
        self.enrich_job(&mut updated);
        jobs.insert(job_id.to_string(), updated.clone());
        self.persist_job(&updated).await;
        Some(result)
    }

    pub async fn run_target(
        &self,
        tenant_id: &str,
        job_id: &str,
        target: &str,
    ) -> Option<RunResult> {
        let mut jobs = self.jobs.write().await;
        let mut job = match jobs.get(job_id).filter(|job| job.tenant_id == tenant_id) {
            Some(job) => job.clone(),
            None => {
                drop(jobs);
                let job = self.rehydrate_job(tenant_id, job_id).await?;
                jobs = self.jobs.write().await;
                job
            }
        };

        if self.ensure_workspace(&mut job) {
            job.updated_at = Some(Utc::now());
        }
        let target_name = {
            let t = target.trim().to_lowercase();
            if t.is_empty() {
                "all".to_string()
            } else {
                t
            }
        };
        let mut checks = run_target_checks(&job, &target_name);
        if target_name == "api" || target_name == "all" {
            checks.extend(run_api_runtime_checks(&job).await);
        }
        let status = CheckStatus::from_bool(checks.iter().all(|c| c.status.is_pass()));

        let now = Utc::now();
        let result = RunResult {
            target: target_name.clone(),
            status,
            checks,
            generated_at: now,
        };
        job.console_logs.push(format!(
            "[runner {}] run target={} status={}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
            result.target,
            if status.is_pass() { "pass" } else { "fail" }
        ));
        job.status = "generated".to_string();
        job.updated_at = Some(now);
        self.enrich_job(&mut job);
        jobs.insert(job_id.to_string(), job.clone());
        self.persist_job(&job).await;
        Some(result)
    }

    pub async fn build_bundle(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<(String, Vec<u8>)>, StudioError> {
        let Some(job) = self.get_job(tenant_id, job_id).await else {
            return Ok(None);
        };
        let mut stem = format!(
            "{}-{}",
            slugify(fallback(&job.confirmation.app_name, "generated-app")),
            job.job_id
        );
        if stem.is_empty() {
            stem = job.job_id.clone();
        }
        Ok(Some(build_bundle_bytes(&job, &stem)?))
    }

    pub async fn render_preview(
        &self,
        tenant_id: &str,
        job_id: &str,
        client: &str,
        token: &str,
    ) -> Option<String> {
        self.get_job(tenant_id, job_id)
            .await
            .map(|job| render_preview_document(&job, client, token))
    }

    pub async fn render_asset(
        &self,
        tenant_id: &str,
        job_id: &str,
        client: &str,
        asset: &str,
    ) -> Option<(String, Vec<u8>)> {
        let job = self.get_job(tenant_id, job_id).await?;
        render_runtime_asset(&job, client, asset)
    }

    fn enrich_job(&self, job: &mut Job) {
        if job.depth_label.trim().is_empty() {
            job.depth_label = normalize_depth_label(&job.confirmation.generation_depth);
        }
        self.ensure_workspace(job);
        job.artifact_manifest = build_artifact_manifest(job);
        job.verification_report = build_verification_report(job);
        job.jtbd_coverage = build_jtbd_coverage(job);
    }

    /// Rebuild the workspace when the directory went missing. Returns
    /// true when a rematerialization happened.
    fn ensure_workspace(&self, job: &mut Job) -> bool {
        let workspace = job.workspace_path.trim();
        if !workspace.is_empty() && std::path::Path::new(workspace).is_dir() {
            return false;
        }
        match materialize(&self.workspace_root, &job.job_id, &job.files) {
            Ok(path) => {
                let path = path.display().to_string();
                job.workspace_path = path.clone();
                job.console_logs
                    .push(format!("[builder] workspace_rematerialized: {path}"));
                true
            }
            Err(err) => {
                job.console_logs
                    .push(format!("[builder] workspace_rematerialization_failed: {err}"));
                false
            }
        }
    }

    async fn persist_job(&self, job: &Job) {
        let Some(store) = &self.persistence else {
            return;
        };
        let payload = match serde_json::to_vec(job) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, job_id = %job.job_id, "studio job serialization failed");
                return;
            }
        };
        if let Err(err) = store.save_job(&job.tenant_id, &job.job_id, &payload).await {
            warn!(%err, job_id = %job.job_id, "studio job persistence failed");
        }
    }
}

fn apply_confirmation_defaults(conf: &mut Confirmation) {
    if conf.deployment_target.trim().is_empty() {
        conf.deployment_target = "managed".to_string();
    }
    if conf.region.trim().is_empty() {
        conf.region = "us-east-1".to_string();
    }
    if conf.plan.trim().is_empty() {
        conf.plan = "starter".to_string();
    }
    conf.generation_depth = normalize_depth_label(&conf.generation_depth);
    if conf.template.trim().is_empty() {
        conf.template = "violet-rails-extension".to_string();
    }
    if conf.source_system.trim().is_empty() {
        conf.source_system = "violet-rails".to_string();
    }
    if conf.primary_users.is_empty() {
        conf.primary_users = vec!["admin".to_string(), "operator".to_string()];
    }
    if conf.core_workflows.is_empty() {
        conf.core_workflows = vec![
            "create_record".to_string(),
            "approve_record".to_string(),
            "notify_user".to_string(),
        ];
    }
    if conf.data_entities.is_empty() {
        conf.data_entities = vec![
            "account".to_string(),
            "workspace".to_string(),
            "activity".to_string(),
        ];
    }
    conf.primary_users = normalize_list(&conf.primary_users);
    conf.core_workflows = normalize_list(&conf.core_workflows);
    conf.data_entities = normalize_list(&conf.data_entities);
    conf.integrations = normalize_list(&conf.integrations);
    conf.constraints = merge_constraints(&conf.constraints);
}

/// Caller constraints first (order preserved), then the required set,
/// deduplicated case-insensitively.
fn merge_constraints(existing: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    merged.extend(REQUIRED_CONSTRAINTS.iter().map(ToString::to_string));
    dedupe_fold(&merged)
}

#[cfg(test)]
mod tests {
    use super::{apply_confirmation_defaults, merge_constraints};
    use vda_model::Confirmation;

    #[test]
    fn required_constraints_are_always_present() {
        let merged = merge_constraints(&["No_Runtime_Eval".to_string(), "custom".to_string()]);
        assert_eq!(
            merged,
            vec!["No_Runtime_Eval", "custom", "all_mutations_idempotent"]
        );
    }

    #[test]
    fn blank_fields_receive_documented_defaults() {
        let mut conf = Confirmation::default();
        apply_confirmation_defaults(&mut conf);
        assert_eq!(conf.deployment_target, "managed");
        assert_eq!(conf.region, "us-east-1");
        assert_eq!(conf.plan, "starter");
        assert_eq!(conf.generation_depth, "pilot");
        assert_eq!(conf.template, "violet-rails-extension");
        assert_eq!(conf.source_system, "violet-rails");
        assert_eq!(conf.primary_users, vec!["admin", "operator"]);
        assert_eq!(
            conf.core_workflows,
            vec!["create_record", "approve_record", "notify_user"]
        );
        assert_eq!(conf.data_entities, vec!["account", "workspace", "activity"]);
        assert_eq!(
            conf.constraints,
            vec!["all_mutations_idempotent", "no_runtime_eval"]
        );
    }
}
