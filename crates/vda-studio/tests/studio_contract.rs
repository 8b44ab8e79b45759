// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::Mutex;
use vda_model::Confirmation;
use vda_studio::{JobStore, StudioService};

#[derive(Default)]
struct MemoryJobStore {
    rows: Mutex<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save_job(
        &self,
        tenant_id: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.rows
            .lock()
            .await
            .insert((tenant_id.to_string(), job_id.to_string()), payload.to_vec());
        Ok(())
    }

    async fn load_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&(tenant_id.to_string(), job_id.to_string()))
            .cloned())
    }
}

fn confirmation() -> Confirmation {
    Confirmation {
        prompt: "build a support desk".to_string(),
        app_name: "Support Desk".to_string(),
        ..Confirmation::default()
    }
}

#[tokio::test]
async fn created_job_passes_verification_and_materializes_workspace() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    assert!(job.job_id.starts_with("job_"));
    assert_eq!(job.depth_label, "pilot");
    assert_eq!(job.verification_report.verdict, "pass");
    assert!((job.verification_report.behavioral_pass_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(job.jtbd_coverage.len(), 8);
    assert!(job
        .jtbd_coverage
        .iter()
        .all(|row| row.status == vda_model::CheckStatus::Pass));

    // Every artifact lands inside the per-job workspace.
    let workspace = std::path::Path::new(&job.workspace_path);
    assert!(workspace.starts_with(root.path()));
    for file in &job.files {
        assert!(
            workspace.join(&file.path).is_file(),
            "missing workspace file {}",
            file.path
        );
    }
}

#[tokio::test]
async fn missing_workspace_is_rematerialized_on_access() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    std::fs::remove_dir_all(&job.workspace_path).expect("remove workspace");
    let reloaded = service
        .get_job("t_acme", &job.job_id)
        .await
        .expect("job present");
    assert!(std::path::Path::new(&reloaded.workspace_path).is_dir());
    assert!(reloaded
        .console_logs
        .iter()
        .any(|line| line.contains("workspace_rematerialized")));
}

#[tokio::test]
async fn tenant_isolation_applies_to_job_reads() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;
    assert!(service.get_job("t_other", &job.job_id).await.is_none());
}

#[tokio::test]
async fn bundle_contains_manifest_and_every_recorded_file() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    let (filename, bytes) = service
        .build_bundle("t_acme", &job.job_id)
        .await
        .expect("bundle build")
        .expect("job found");
    let stem = filename.trim_end_matches(".tar.gz").to_string();
    assert_eq!(filename, format!("support-desk-{}.tar.gz", job.job_id));

    let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
    let mut entries = BTreeSet::new();
    for entry in archive.entries().expect("entries") {
        let entry = entry.expect("entry");
        entries.insert(entry.path().expect("path").to_string_lossy().to_string());
    }
    assert!(entries.contains(&format!("{stem}/studio_artifact_manifest.json")));
    for file in &job.artifact_manifest.files {
        assert!(
            entries.contains(&format!("{stem}/{}", file.path)),
            "bundle missing {}",
            file.path
        );
    }
}

#[tokio::test]
async fn terminal_sandbox_rejects_hostile_exec_without_side_effects() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    let result = service
        .run_terminal("t_acme", &job.job_id, "exec rm -rf /")
        .await
        .expect("job found");
    assert_eq!(
        result.output,
        vec!["exec_rejected: command \"rm\" not allowlisted"]
    );
    assert!(std::path::Path::new(&job.workspace_path).is_dir());

    let result = service
        .run_terminal("t_acme", &job.job_id, "exec cat blueprint.yaml | tee out")
        .await
        .expect("job found");
    assert_eq!(
        result.output,
        vec!["exec_rejected: forbidden shell token \"|\""]
    );
}

#[tokio::test]
async fn terminal_pseudo_commands_read_the_artifact_list() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    let ls = service
        .run_terminal("t_acme", &job.job_id, "ls apps/support-desk/docs")
        .await
        .expect("job found");
    assert!(ls.output.iter().all(|p| p.starts_with("apps/support-desk/docs/")));

    let after = service
        .get_job("t_acme", &job.job_id)
        .await
        .expect("job present");
    assert!(after.terminal_logs.len() > job.terminal_logs.len());
    assert!(after
        .console_logs
        .iter()
        .any(|line| line.contains("command executed")));
}

#[tokio::test]
async fn jobs_rehydrate_from_persistence_on_cache_miss() {
    let root = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryJobStore::default());
    let first = StudioService::new(root.path().to_path_buf(), Some(store.clone()));
    let job = first.create_job("t_acme", confirmation()).await;

    // A fresh service instance has an empty map and must reload the job.
    let second = StudioService::new(root.path().to_path_buf(), Some(store));
    let reloaded = second
        .get_job("t_acme", &job.job_id)
        .await
        .expect("rehydrated job");
    assert_eq!(reloaded.job_id, job.job_id);
    assert_eq!(reloaded.files.len(), job.files.len());
    assert_eq!(reloaded.verification_report.verdict, "pass");
}

#[tokio::test]
async fn run_target_web_reports_static_checks() {
    let root = tempfile::tempdir().expect("tempdir");
    let service = StudioService::new(root.path().to_path_buf(), None);
    let job = service.create_job("t_acme", confirmation()).await;

    let result = service
        .run_target("t_acme", &job.job_id, "web")
        .await
        .expect("job found");
    assert_eq!(result.target, "web");
    assert_eq!(result.status, vda_model::CheckStatus::Pass);
    assert_eq!(result.checks.len(), 1);
    assert_eq!(result.checks[0].id, "web_runtime");
}
