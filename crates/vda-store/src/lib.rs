// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Durable store for every control-plane entity.
//!
//! One SQLite connection behind an async mutex; every statement is a
//! single transaction, matching the single-writer assumption. Idempotency
//! bodies are BLOBs and come back byte-identical to what was written.

mod schema;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Map;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vda_model::App;

pub const CRATE_NAME: &str = "vda-store";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp decode failed: {0}")]
    Time(#[from] chrono::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub status: u16,
    pub body: Vec<u8>,
}

pub struct Store {
    conn: Mutex<Connection>,
    idem_ttl: ChronoDuration,
    cleanup_every: Duration,
    cleanup_deleted: AtomicU64,
}

impl Store {
    /// Open (or create) the database. `database_url` is a filesystem path
    /// or `:memory:`.
    pub fn open(
        database_url: &str,
        idem_ttl_seconds: i64,
        cleanup_seconds: u64,
    ) -> Result<Self, StoreError> {
        let conn = if database_url == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(database_url))?
        };
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init(&conn)?;

        let ttl = if idem_ttl_seconds > 0 {
            idem_ttl_seconds
        } else {
            86_400
        };
        let cleanup = if cleanup_seconds > 0 { cleanup_seconds } else { 60 };
        Ok(Self {
            conn: Mutex::new(conn),
            idem_ttl: ChronoDuration::seconds(ttl),
            cleanup_every: Duration::from_secs(cleanup),
            cleanup_deleted: AtomicU64::new(0),
        })
    }

    // --- idempotency ------------------------------------------------------

    /// Live record lookup; expired records never satisfy a replay.
    pub async fn get_idempotency(
        &self,
        tenant_id: &str,
        endpoint: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT response_status, response_body
                 FROM idempotency_records
                 WHERE tenant_id = ?1 AND endpoint = ?2 AND idem_key = ?3 AND expires_at > ?4",
                params![tenant_id, endpoint, key, Utc::now().timestamp()],
                |row| {
                    Ok(IdempotencyRecord {
                        status: row.get::<_, i64>(0)? as u16,
                        body: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Last-writer-wins upsert. The body is stored as an opaque BLOB.
    pub async fn put_idempotency(
        &self,
        tenant_id: &str,
        endpoint: &str,
        key: &str,
        status: u16,
        body: &[u8],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO idempotency_records
                 (tenant_id, endpoint, idem_key, response_status, response_body, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (tenant_id, endpoint, idem_key)
             DO UPDATE SET response_status = excluded.response_status,
                           response_body = excluded.response_body,
                           expires_at = excluded.expires_at",
            params![
                tenant_id,
                endpoint,
                key,
                i64::from(status),
                body,
                now.timestamp(),
                (now + self.idem_ttl).timestamp(),
            ],
        )?;
        Ok(())
    }

    pub async fn cleanup_expired_idempotency(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM idempotency_records WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )? as u64;
        drop(conn);
        self.cleanup_deleted.fetch_add(deleted, Ordering::Relaxed);
        Ok(deleted)
    }

    #[must_use]
    pub fn idempotency_cleanup_deleted_total(&self) -> u64 {
        self.cleanup_deleted.load(Ordering::Relaxed)
    }

    /// Background eviction loop. Abort the returned handle at shutdown.
    #[must_use]
    pub fn spawn_idempotency_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let every = store.cleanup_every;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.cleanup_expired_idempotency().await {
                    Ok(deleted) if deleted > 0 => {
                        debug!(deleted, "idempotency cleanup pass");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "idempotency cleanup failed"),
                }
            }
        })
    }

    // --- decisions --------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn save_decision(
        &self,
        decision_id: &str,
        tenant_id: &str,
        decision_hash: &str,
        policy_version: &str,
        data_version: &str,
        generated_at: DateTime<Utc>,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO decisions
                 (decision_id, tenant_id, decision_hash, policy_version, data_version, generated_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (decision_id)
             DO UPDATE SET payload = excluded.payload,
                           decision_hash = excluded.decision_hash,
                           policy_version = excluded.policy_version,
                           data_version = excluded.data_version,
                           generated_at = excluded.generated_at",
            params![
                decision_id,
                tenant_id,
                decision_hash,
                policy_version,
                data_version,
                generated_at.to_rfc3339(),
                payload,
            ],
        )?;
        Ok(())
    }

    pub async fn get_decision_payload(
        &self,
        decision_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().await;
        let payload = conn
            .query_row(
                "SELECT payload FROM decisions WHERE decision_id = ?1 AND tenant_id = ?2",
                params![decision_id, tenant_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    // --- apps -------------------------------------------------------------

    pub async fn create_app(&self, app: &App) -> Result<(), StoreError> {
        let blueprint = serde_json::to_string(&app.blueprint)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO apps (id, tenant_id, name, blueprint, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                app.id,
                app.tenant_id,
                app.name,
                blueprint,
                app.version,
                app.created_at.to_rfc3339(),
                app.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_app(&self, tenant_id: &str, app_id: &str) -> Result<Option<App>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT name, blueprint, version, created_at, updated_at
                 FROM apps WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, app_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((name, blueprint_raw, version, created_raw, updated_raw)) = row else {
            return Ok(None);
        };
        let blueprint: Map<String, serde_json::Value> = serde_json::from_str(&blueprint_raw)?;
        Ok(Some(App {
            id: app_id.to_string(),
            tenant_id: tenant_id.to_string(),
            name,
            blueprint,
            version,
            created_at: parse_rfc3339(&created_raw)?,
            updated_at: parse_rfc3339(&updated_raw)?,
        }))
    }

    pub async fn update_app(&self, app: &App) -> Result<(), StoreError> {
        let blueprint = serde_json::to_string(&app.blueprint)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE apps
             SET name = ?3, blueprint = ?4, version = ?5, updated_at = ?6
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                app.tenant_id,
                app.id,
                app.name,
                blueprint,
                app.version,
                app.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn count_apps(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM apps WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // --- mutation / verification / deploy trails --------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn save_mutation(
        &self,
        mutation_id: &str,
        tenant_id: &str,
        app_id: &str,
        class: &str,
        before: &[u8],
        after: &[u8],
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO app_mutations
                 (mutation_id, tenant_id, app_id, mutation_class, before_snapshot, after_snapshot, mutation_payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mutation_id,
                tenant_id,
                app_id,
                class,
                before,
                after,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_app_version(
        &self,
        tenant_id: &str,
        app_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().await;
        let version = conn
            .query_row(
                "SELECT version FROM apps WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, app_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    pub async fn save_verify_report(
        &self,
        report_id: &str,
        tenant_id: &str,
        app_id: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO verify_reports (report_id, tenant_id, app_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (report_id) DO UPDATE SET payload = excluded.payload",
            params![report_id, tenant_id, app_id, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn save_deploy_intent(
        &self,
        intent_id: &str,
        tenant_id: &str,
        app_id: &str,
        target: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO deploy_intents (intent_id, tenant_id, app_id, target, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (intent_id) DO UPDATE SET payload = excluded.payload",
            params![
                intent_id,
                tenant_id,
                app_id,
                target,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // --- migration bundles ------------------------------------------------

    pub async fn save_migration_bundle(
        &self,
        bundle_id: &str,
        tenant_id: &str,
        kind: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO migration_bundles (bundle_id, tenant_id, kind, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (bundle_id, tenant_id, kind) DO UPDATE SET payload = excluded.payload",
            params![bundle_id, tenant_id, kind, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // --- studio jobs ------------------------------------------------------

    pub async fn save_studio_job(
        &self,
        tenant_id: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO studio_jobs (job_id, tenant_id, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (job_id)
             DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![job_id, tenant_id, payload, now],
        )?;
        Ok(())
    }

    pub async fn get_studio_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().await;
        let payload = conn
            .query_row(
                "SELECT payload FROM studio_jobs WHERE tenant_id = ?1 AND job_id = ?2",
                params![tenant_id, job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
