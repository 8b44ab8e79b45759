// SPDX-License-Identifier: Apache-2.0

//! End-to-end contract scenarios against a real listener.

use flate2::read::GzDecoder;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use vda_server::config::Config;
use vda_server::{build_router, AppState};
use vda_store::Store;

struct TestServer {
    addr: std::net::SocketAddr,
    store: Arc<Store>,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

async fn start_server() -> TestServer {
    let db_dir = tempfile::tempdir().expect("db tempdir");
    let studio_dir = tempfile::tempdir().expect("studio tempdir");
    let cfg = Config {
        port: "0".to_string(),
        policy_version: "policy-v1".to_string(),
        data_version: "data-v1".to_string(),
        database_url: db_dir
            .path()
            .join("vda.sqlite")
            .to_str()
            .expect("utf8 path")
            .to_string(),
        idempotency_ttl_seconds: 3600,
        idempotency_cleanup_seconds: 60,
        auth_tokens: "dev-token:t_acme:dev-user,beta-token:t_beta:beta-user".to_string(),
        retrieval_base_url: String::new(),
        retrieval_api_key: String::new(),
        llm_default_provider: "ollama".to_string(),
        llm_default_model: "test-model".to_string(),
        llm_request_timeout_seconds: 2,
        ollama_base_url: "http://127.0.0.1:1".to_string(),
        ollama_default_model: "test-model".to_string(),
        frontier_base_url: "http://127.0.0.1:1".to_string(),
        frontier_api_key: String::new(),
        frontier_default_model: "test-model".to_string(),
        studio_workspace_root: studio_dir
            .path()
            .to_str()
            .expect("utf8 path")
            .to_string(),
    };

    let store = Arc::new(
        Store::open(
            &cfg.database_url,
            cfg.idempotency_ttl_seconds,
            cfg.idempotency_cleanup_seconds,
        )
        .expect("open store"),
    );
    let state = AppState::build(cfg, store.clone());
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

    TestServer {
        addr,
        store,
        _dirs: (db_dir, studio_dir),
    }
}

async fn send_request(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> (u16, String, Vec<u8>) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = body {
        request.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        ));
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request head");
    if let Some(body) = body {
        stream.write_all(body).await.expect("write request body");
    }

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .expect("read response");
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("http response separator");
    let head = String::from_utf8_lossy(&response[..split]).to_string();
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .expect("http status");
    let raw_body = response[split + 4..].to_vec();
    let body = decode_body(&head, raw_body);
    (status, head, body)
}

/// Strip chunked framing when present so body comparisons see payload
/// bytes only.
fn decode_body(head: &str, raw: Vec<u8>) -> Vec<u8> {
    let chunked = head
        .lines()
        .any(|line| line.to_lowercase().starts_with("transfer-encoding:") && line.contains("chunked"));
    if !chunked {
        return raw;
    }
    let mut out = Vec::new();
    let mut rest = raw.as_slice();
    loop {
        let Some(line_end) = rest.windows(2).position(|w| w == b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&rest[..line_end]);
        let Ok(size) = usize::from_str_radix(size_line.trim(), 16) else {
            break;
        };
        rest = &rest[line_end + 2..];
        if size == 0 || rest.len() < size {
            break;
        }
        out.extend_from_slice(&rest[..size]);
        rest = rest.get(size + 2..).unwrap_or_default();
    }
    out
}

fn auth() -> (&'static str, &'static str) {
    ("Authorization", "Bearer dev-token")
}

#[tokio::test]
async fn decision_hash_is_stable_and_tie_breaks_on_item_id() {
    let server = start_server().await;
    let base = json!({
        "tenant_id": "t_acme",
        "user_id": "u1",
        "surface": "home",
        "context": {"plan": "enterprise"},
        "candidate_items": [
            {"item_id": "b", "base_score": 100.0},
            {"item_id": "a", "base_score": 100.0},
        ],
    });
    let swapped = json!({
        "tenant_id": "t_acme",
        "user_id": "u1",
        "surface": "home",
        "context": {"plan": "enterprise"},
        "candidate_items": [
            {"item_id": "a", "base_score": 100.0},
            {"item_id": "b", "base_score": 100.0},
        ],
    });

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/decisions",
        &[auth(), ("Idempotency-Key", "dec-k1")],
        Some(base.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 200);
    let first: Value = serde_json::from_slice(&body).expect("decision json");
    assert_eq!(first["items"][0]["item_id"], "a", "tie break on item id");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/decisions",
        &[auth(), ("Idempotency-Key", "dec-k2")],
        Some(swapped.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 200);
    let second: Value = serde_json::from_slice(&body).expect("decision json");
    assert_eq!(first["decision_hash"], second["decision_hash"]);
    assert_eq!(first["items"], second["items"]);

    // The stored decision replays for the owning tenant only.
    let replay = json!({"decision_id": first["decision_id"]});
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/replay",
        &[auth()],
        Some(replay.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 200);
    let replayed: Value = serde_json::from_slice(&body).expect("replay json");
    assert_eq!(replayed["decision_hash"], first["decision_hash"]);

    let (status, _, _) = send_request(
        server.addr,
        "POST",
        "/v1/replay",
        &[("Authorization", "Bearer beta-token")],
        Some(replay.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 404, "tenant isolation on replay");
}

#[tokio::test]
async fn app_create_replays_byte_identical_and_writes_one_row() {
    let server = start_server().await;
    let body = json!({"name": "A"}).to_string();

    let (status_one, _, body_one) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[auth(), ("Idempotency-Key", "k1")],
        Some(body.as_bytes()),
    )
    .await;
    let (status_two, _, body_two) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[auth(), ("Idempotency-Key", "k1")],
        Some(body.as_bytes()),
    )
    .await;

    assert_eq!(status_one, 201);
    assert_eq!(status_two, 201);
    assert_eq!(body_one, body_two, "replay must be byte-identical");
    assert_eq!(server.store.count_apps("t_acme").await.expect("count"), 1);
}

#[tokio::test]
async fn denied_mutation_class_is_rejected_without_version_bump() {
    let server = start_server().await;
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[auth(), ("Idempotency-Key", "mk-create")],
        Some(json!({"name": "A"}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 201);
    let created: Value = serde_json::from_slice(&body).expect("app json");
    let app_id = created["app"]["id"].as_str().expect("app id").to_string();

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        &format!("/v1/apps/{app_id}/mutations"),
        &[auth(), ("Idempotency-Key", "mk-mutate")],
        Some(
            json!({"class": "drop_tenant", "value": "x"})
                .to_string()
                .as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, 403);
    let denied: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(denied["error"], "mutation_not_allowed");

    let version = server
        .store
        .get_app_version("t_acme", &app_id)
        .await
        .expect("version")
        .expect("app exists");
    assert_eq!(version, 1, "denied mutation must not bump the version");
}

#[tokio::test]
async fn allowed_mutation_applies_and_verify_reports_pass() {
    let server = start_server().await;
    let (_, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[auth(), ("Idempotency-Key", "vp-create")],
        Some(json!({"name": "A"}).to_string().as_bytes()),
    )
    .await;
    let created: Value = serde_json::from_slice(&body).expect("app json");
    let app_id = created["app"]["id"].as_str().expect("app id").to_string();

    for (key, class, value) in [
        ("vp-plan", "set_plan", json!("starter")),
        ("vp-region", "set_region", json!("us-east-1")),
    ] {
        let (status, _, _) = send_request(
            server.addr,
            "POST",
            &format!("/v1/apps/{app_id}/mutations"),
            &[auth(), ("Idempotency-Key", key)],
            Some(json!({"class": class, "value": value}).to_string().as_bytes()),
        )
        .await;
        assert_eq!(status, 200);
    }

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        &format!("/v1/apps/{app_id}/verify"),
        &[auth(), ("Idempotency-Key", "vp-verify")],
        None,
    )
    .await;
    assert_eq!(status, 200);
    let report: Value = serde_json::from_slice(&body).expect("report json");
    assert_eq!(report["verdict"], "pass");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        &format!("/v1/apps/{app_id}/deploy-intents/managed"),
        &[auth(), ("Idempotency-Key", "vp-deploy")],
        Some(json!({"profile": {"size": "small"}}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 202);
    let intent: Value = serde_json::from_slice(&body).expect("intent json");
    assert_eq!(intent["status"], "pending_approval");
    assert_eq!(intent["approval_required"], true);
}

#[tokio::test]
async fn migration_import_rejects_checksum_mismatch() {
    let server = start_server().await;
    let export = json!({
        "source": {
            "namespace": "marketing",
            "resources": [{"name": "page", "fields": {"title": "string"}}],
            "roles": ["admin", "editor"],
        },
    });
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/migration/violet/export",
        &[auth()],
        Some(export.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 200);
    let exported: Value = serde_json::from_slice(&body).expect("export json");
    let mut bundle = exported["bundle"].clone();

    // Import of the untouched bundle succeeds.
    let import = json!({"bundle": bundle});
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/migration/violet/import",
        &[auth(), ("Idempotency-Key", "mig-ok")],
        Some(import.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 201);
    let imported: Value = serde_json::from_slice(&body).expect("import json");
    assert_eq!(imported["checksum"], bundle["checksum"]);

    // One flipped checksum byte must be rejected.
    let checksum = bundle["checksum"].as_str().expect("checksum").to_string();
    let flipped_last = if checksum.ends_with('0') { "1" } else { "0" };
    bundle["checksum"] = json!(format!("{}{}", &checksum[..checksum.len() - 1], flipped_last));
    let import = json!({"bundle": bundle});
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/migration/violet/import",
        &[auth(), ("Idempotency-Key", "mig-bad")],
        Some(import.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 400);
    let rejected: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(rejected["error"], "invalid_bundle");

    // allow_partial is disabled outright.
    let import = json!({"bundle": exported["bundle"], "allow_partial": true});
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/migration/violet/import",
        &[auth(), ("Idempotency-Key", "mig-partial")],
        Some(import.to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 400);
    let rejected: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(rejected["error"], "partial_apply_disabled");
}

#[tokio::test]
async fn studio_bundle_round_trips_with_manifest() {
    let server = start_server().await;
    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/studio/jobs",
        &[auth(), ("Idempotency-Key", "job-k1")],
        Some(
            json!({"prompt": "build a support desk", "app_name": "Support Desk"})
                .to_string()
                .as_bytes(),
        ),
    )
    .await;
    assert_eq!(status, 201);
    let job: Value = serde_json::from_slice(&body).expect("job json");
    let job_id = job["job_id"].as_str().expect("job id").to_string();

    let (status, head, payload) = send_request(
        server.addr,
        "GET",
        &format!("/v1/studio/jobs/{job_id}/bundle"),
        &[auth()],
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(head.to_lowercase().contains("content-type: application/gzip"));

    let mut archive = tar::Archive::new(GzDecoder::new(payload.as_slice()));
    let mut entries = BTreeSet::new();
    let mut manifest_bytes = Vec::new();
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        let path = entry.path().expect("path").to_string_lossy().to_string();
        if path.ends_with("/studio_artifact_manifest.json") {
            entry.read_to_end(&mut manifest_bytes).expect("manifest");
        }
        entries.insert(path);
    }
    let stem = format!("support-desk-{job_id}");
    assert!(entries.contains(&format!("{stem}/studio_artifact_manifest.json")));

    let manifest: Value = serde_json::from_slice(&manifest_bytes).expect("manifest json");
    for file in manifest["files"].as_array().expect("manifest files") {
        let path = file["path"].as_str().expect("file path");
        assert!(
            entries.contains(&format!("{stem}/{path}")),
            "bundle missing {path}"
        );
    }
}

#[tokio::test]
async fn terminal_sandbox_rejects_hostile_exec() {
    let server = start_server().await;
    let (_, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/studio/jobs",
        &[auth(), ("Idempotency-Key", "job-term")],
        Some(json!({"prompt": "sandbox test"}).to_string().as_bytes()),
    )
    .await;
    let job: Value = serde_json::from_slice(&body).expect("job json");
    let job_id = job["job_id"].as_str().expect("job id");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        &format!("/v1/studio/jobs/{job_id}/terminal"),
        &[auth(), ("Idempotency-Key", "term-k1")],
        Some(json!({"command": "exec rm -rf /"}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 200);
    let result: Value = serde_json::from_slice(&body).expect("terminal json");
    assert_eq!(
        result["output"][0],
        "exec_rejected: command \"rm\" not allowlisted"
    );
}

#[tokio::test]
async fn auth_and_idempotency_preconditions_are_enforced() {
    let server = start_server().await;

    let (status, _, body) = send_request(server.addr, "GET", "/v1/health", &[], None).await;
    assert_eq!(status, 200);
    let health: Value = serde_json::from_slice(&body).expect("health json");
    assert_eq!(health["status"], "ok");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[],
        Some(json!({"name": "A"}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 401);
    let err: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(err["error"], "missing_authorization_header");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[("Authorization", "Basic dev-token")],
        Some(json!({"name": "A"}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 400);
    let err: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(err["error"], "invalid_authorization_scheme");

    let (status, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/apps",
        &[auth()],
        Some(json!({"name": "A"}).to_string().as_bytes()),
    )
    .await;
    assert_eq!(status, 400);
    let err: Value = serde_json::from_slice(&body).expect("error json");
    assert_eq!(err["error"], "missing_idempotency_key");

    let (status, _, _) = send_request(server.addr, "GET", "/", &[], None).await;
    assert_eq!(status, 307, "root redirects to the embedded ui");
}

#[tokio::test]
async fn events_stream_emits_retry_and_job_snapshot() {
    let server = start_server().await;
    let (_, _, body) = send_request(
        server.addr,
        "POST",
        "/v1/studio/jobs",
        &[auth(), ("Idempotency-Key", "job-sse")],
        Some(json!({"prompt": "sse test"}).to_string().as_bytes()),
    )
    .await;
    let job: Value = serde_json::from_slice(&body).expect("job json");
    let job_id = job["job_id"].as_str().expect("job id");

    // Query-token auth path for streaming routes.
    let mut stream = tokio::net::TcpStream::connect(server.addr)
        .await
        .expect("connect server");
    let request = format!(
        "GET /v1/studio/jobs/{job_id}/events?token=dev-token HTTP/1.1\r\nHost: {}\r\nAccept: text/event-stream\r\n\r\n",
        server.addr
    );
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");

    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let mut buf = [0u8; 4096];
    while tokio::time::Instant::now() < deadline {
        let read = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            stream.read(&mut buf),
        )
        .await;
        match read {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
            _ => {}
        }
        let text = String::from_utf8_lossy(&collected);
        if text.contains("retry: 1000") && text.contains("event: job") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&collected);
    assert!(text.contains("retry: 1000"), "missing retry hint: {text}");
    assert!(text.contains("event: job"), "missing job event: {text}");
}
