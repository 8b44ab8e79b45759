// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use serde_json::Map;
use tempfile::tempdir;
use vda_model::App;
use vda_store::Store;

fn open_store(ttl_seconds: i64) -> (tempfile::TempDir, Store) {
    let dir = tempdir().expect("tempdir");
    let db = dir.path().join("vda.sqlite");
    let store = Store::open(db.to_str().expect("utf8 path"), ttl_seconds, 60).expect("open store");
    (dir, store)
}

#[tokio::test]
async fn idempotency_replay_is_byte_identical() {
    let (_dir, store) = open_store(3600);
    let body = br#"{"app":{"id":"app_1"},"n":1.50}"#;
    store
        .put_idempotency("t_acme", "/v1/apps", "k1", 201, body)
        .await
        .expect("put");

    let first = store
        .get_idempotency("t_acme", "/v1/apps", "k1")
        .await
        .expect("get")
        .expect("record");
    let second = store
        .get_idempotency("t_acme", "/v1/apps", "k1")
        .await
        .expect("get")
        .expect("record");
    assert_eq!(first.status, 201);
    assert_eq!(first.body, body.to_vec());
    assert_eq!(first, second);
}

#[tokio::test]
async fn idempotency_key_scope_is_per_endpoint() {
    let (_dir, store) = open_store(3600);
    store
        .put_idempotency("t_acme", "/v1/apps", "k1", 201, b"a")
        .await
        .expect("put apps");
    store
        .put_idempotency("t_acme", "/v1/decisions", "k1", 200, b"b")
        .await
        .expect("put decisions");

    let apps = store
        .get_idempotency("t_acme", "/v1/apps", "k1")
        .await
        .expect("get")
        .expect("record");
    let decisions = store
        .get_idempotency("t_acme", "/v1/decisions", "k1")
        .await
        .expect("get")
        .expect("record");
    assert_eq!(apps.body, b"a");
    assert_eq!(decisions.body, b"b");
}

#[tokio::test]
async fn expired_records_never_replay_and_cleanup_counts() {
    // TTL clamps to the default when non-positive, so write an already
    // expired row directly through a tiny negative-offset trick: ttl of one
    // second plus a sleep keeps the test honest without clock mocking.
    let (_dir, store) = open_store(1);
    store
        .put_idempotency("t_acme", "/v1/apps", "k1", 200, b"x")
        .await
        .expect("put");
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let replay = store
        .get_idempotency("t_acme", "/v1/apps", "k1")
        .await
        .expect("get");
    assert!(replay.is_none(), "expired record must not satisfy replay");

    let deleted = store
        .cleanup_expired_idempotency()
        .await
        .expect("cleanup");
    assert_eq!(deleted, 1);
    assert_eq!(store.idempotency_cleanup_deleted_total(), 1);
}

#[tokio::test]
async fn tenant_isolation_holds_for_apps_and_jobs() {
    let (_dir, store) = open_store(3600);
    let now = Utc::now();
    let app = App {
        id: "app_1".to_string(),
        tenant_id: "t_a".to_string(),
        name: "A".to_string(),
        blueprint: Map::new(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    store.create_app(&app).await.expect("create app");
    store
        .save_studio_job("t_a", "job_1", b"{}")
        .await
        .expect("save job");

    assert!(store
        .get_app("t_b", "app_1")
        .await
        .expect("get app")
        .is_none());
    assert!(store
        .get_studio_job("t_b", "job_1")
        .await
        .expect("get job")
        .is_none());
    assert!(store
        .get_app("t_a", "app_1")
        .await
        .expect("get app")
        .is_some());
}

#[tokio::test]
async fn app_update_round_trips_blueprint_and_version() {
    let (_dir, store) = open_store(3600);
    let now = Utc::now();
    let mut app = App {
        id: "app_1".to_string(),
        tenant_id: "t_a".to_string(),
        name: "A".to_string(),
        blueprint: Map::new(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    store.create_app(&app).await.expect("create");

    app.blueprint
        .insert("plan".to_string(), serde_json::json!("starter"));
    app.version += 1;
    app.updated_at = Utc::now();
    store.update_app(&app).await.expect("update");

    let loaded = store
        .get_app("t_a", "app_1")
        .await
        .expect("get")
        .expect("app");
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.blueprint["plan"], serde_json::json!("starter"));
    assert_eq!(store.count_apps("t_a").await.expect("count"), 1);
}

#[tokio::test]
async fn decision_payload_reads_back_for_owning_tenant_only() {
    let (_dir, store) = open_store(3600);
    store
        .save_decision(
            "dec_1",
            "t_a",
            "hash",
            "policy-v1",
            "data-v1",
            Utc::now(),
            b"payload-bytes",
        )
        .await
        .expect("save");

    let own = store
        .get_decision_payload("dec_1", "t_a")
        .await
        .expect("get");
    assert_eq!(own.as_deref(), Some(b"payload-bytes".as_slice()));
    let other = store
        .get_decision_payload("dec_1", "t_b")
        .await
        .expect("get");
    assert!(other.is_none());
}
