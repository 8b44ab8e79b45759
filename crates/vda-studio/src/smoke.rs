// SPDX-License-Identifier: Apache-2.0

//! Live runtime smoke: compile and boot the generated backend scaffold,
//! then probe its HTTP surface. Opportunistic — a missing toolchain
//! yields a single fail check rather than an error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;
use vda_model::{Job, VerificationCheck};

const BUILD_TIMEOUT: Duration = Duration::from_secs(45);
const SERVER_TIMEOUT: Duration = Duration::from_secs(25);
const HEALTH_WAIT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const KILL_GRACE: Duration = Duration::from_secs(2);

pub(crate) async fn run_api_runtime_checks(job: &Job) -> Vec<VerificationCheck> {
    let Some(service_dir) = service_workspace_path(job) else {
        return vec![VerificationCheck::new(
            "api_runtime_workspace",
            false,
            "generated services/api workspace missing",
        )];
    };
    if !cargo_available().await {
        return vec![VerificationCheck::new(
            "api_runtime_toolchain",
            false,
            "cargo toolchain unavailable in runner",
        )];
    }

    if let Err(evidence) = run_cargo_test(&service_dir).await {
        return vec![VerificationCheck::new("api_runtime_cargo_test", false, evidence)];
    }
    let mut checks = vec![VerificationCheck::new(
        "api_runtime_cargo_test",
        true,
        "cargo test passed in generated workspace",
    )];

    match run_server_probes(&service_dir, job).await {
        Ok(probes) => {
            checks.push(VerificationCheck::new(
                "api_runtime_server_boot",
                true,
                "cargo run booted the generated server",
            ));
            checks.extend(probes);
        }
        Err(evidence) => {
            checks.push(VerificationCheck::new("api_runtime_server_boot", false, evidence));
        }
    }
    checks
}

fn service_workspace_path(job: &Job) -> Option<PathBuf> {
    let workspace = job.workspace_path.trim();
    if workspace.is_empty() {
        return None;
    }
    for file in &job.files {
        let path = file.path.trim();
        if let Some(dir) = path
            .strip_suffix("/Cargo.toml")
            .filter(|dir| dir.ends_with("services/api"))
        {
            let abs = Path::new(workspace).join(dir.trim_start_matches('/'));
            if abs.is_dir() {
                return Some(abs);
            }
        }
    }
    None
}

async fn cargo_available() -> bool {
    tokio::process::Command::new("cargo")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn run_cargo_test(dir: &Path) -> Result<(), String> {
    let run = tokio::process::Command::new("cargo")
        .args(["test", "--quiet"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    match tokio::time::timeout(BUILD_TIMEOUT, run).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(format!("cargo test failed with {status}")),
        Ok(Err(err)) => Err(format!("cargo test could not run: {err}")),
        Err(_) => Err("cargo test exceeded 45s budget".to_string()),
    }
}

async fn run_server_probes(dir: &Path, job: &Job) -> Result<Vec<VerificationCheck>, String> {
    let port = reserve_loopback_port()?;
    let base_url = format!("http://127.0.0.1:{port}");

    let mut child = tokio::process::Command::new("cargo")
        .args(["run", "--quiet"])
        .current_dir(dir)
        .env("PORT", port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| format!("cargo run could not start: {err}"))?;

    let result = tokio::time::timeout(SERVER_TIMEOUT, probe_all(&base_url, job, &mut child)).await;

    // The child is killed on every exit path, with a short grace for exit.
    let _ = child.start_kill();
    let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;

    match result {
        Ok(Ok(checks)) => Ok(checks),
        Ok(Err(evidence)) => Err(evidence),
        Err(_) => Err("generated server probes exceeded 25s budget".to_string()),
    }
}

async fn probe_all(
    base_url: &str,
    job: &Job,
    child: &mut tokio::process::Child,
) -> Result<Vec<VerificationCheck>, String> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|err| format!("probe client build failed: {err}"))?;

    let started = tokio::time::Instant::now();
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(format!("server exited before smoke checks: {status}"));
        }
        if probe_health(&client, base_url).await {
            break;
        }
        if started.elapsed() > HEALTH_WAIT {
            return Err("health check timeout".to_string());
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    debug!(%base_url, "generated server healthy");

    let entity = job
        .confirmation
        .data_entities
        .first()
        .map(String::as_str)
        .unwrap_or("account")
        .to_string();

    Ok(vec![
        VerificationCheck::new(
            "api_runtime_health",
            true,
            "GET /health responded with status=ok",
        ),
        probe_check(
            &client,
            base_url,
            "api_runtime_tools_catalog",
            "GET",
            "/v1/tools",
            "\"tools\"",
            "GET /v1/tools returned tool list",
        )
        .await,
        probe_check(
            &client,
            base_url,
            "api_runtime_workflow_execute",
            "POST",
            "/v1/workflows/execute",
            "\"accepted\"",
            "POST /v1/workflows/execute returned accepted",
        )
        .await,
        probe_check(
            &client,
            base_url,
            "api_runtime_entity_records",
            "GET",
            &format!("/v1/entities/{entity}/records"),
            "\"records\"",
            "GET /v1/entities/{entity}/records returned seeded rows",
        )
        .await,
        probe_check(
            &client,
            base_url,
            "api_runtime_action_execute",
            "POST",
            "/v1/actions/execute",
            "\"accepted\"",
            "POST /v1/actions/execute returned accepted",
        )
        .await,
        probe_check(
            &client,
            base_url,
            "api_runtime_primitives_cms",
            "GET",
            "/v1/primitives/cms/pages",
            "\"pages\"",
            "GET /v1/primitives/cms/pages returned seeded pages",
        )
        .await,
        probe_check(
            &client,
            base_url,
            "api_runtime_identity_providers",
            "GET",
            "/v1/identity/providers",
            "\"providers\"",
            "GET /v1/identity/providers returned provider stubs",
        )
        .await,
    ])
}

async fn probe_health(client: &reqwest::Client, base_url: &str) -> bool {
    let Ok(resp) = client.get(format!("{base_url}/health")).send().await else {
        return false;
    };
    if !resp.status().is_success() {
        return false;
    }
    resp.text()
        .await
        .map(|body| body.contains("\"ok\""))
        .unwrap_or(false)
}

#[allow(clippy::too_many_arguments)]
async fn probe_check(
    client: &reqwest::Client,
    base_url: &str,
    id: &str,
    method: &str,
    path: &str,
    needle: &str,
    evidence: &str,
) -> VerificationCheck {
    let url = format!("{base_url}{path}");
    let request = if method == "POST" {
        client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(r#"{"workflow":"smoke","input":{"mode":"test"}}"#)
    } else {
        client.get(&url)
    };
    let ok = match request.send().await {
        Ok(resp) if resp.status().is_success() => resp
            .text()
            .await
            .map(|body| body.contains(needle))
            .unwrap_or(false),
        _ => false,
    };
    VerificationCheck::new(id, ok, evidence)
}

/// Bind port 0, take the number, and release the socket before handing
/// the port to the child.
fn reserve_loopback_port() -> Result<u16, String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("port reservation failed: {err}"))?;
    let port = listener
        .local_addr()
        .map_err(|err| format!("port reservation failed: {err}"))?
        .port();
    drop(listener);
    Ok(port)
}
