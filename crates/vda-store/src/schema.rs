// SPDX-License-Identifier: Apache-2.0

use rusqlite::Connection;

/// Idempotent schema bootstrap. Statements are per-table so a partial
/// upgrade failure names the table that broke.
pub(crate) fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS idempotency_records (
             tenant_id       TEXT NOT NULL,
             endpoint        TEXT NOT NULL,
             idem_key        TEXT NOT NULL,
             response_status INTEGER NOT NULL,
             response_body   BLOB NOT NULL,
             created_at      INTEGER NOT NULL,
             expires_at      INTEGER NOT NULL,
             PRIMARY KEY (tenant_id, endpoint, idem_key)
         );

         CREATE TABLE IF NOT EXISTS decisions (
             decision_id    TEXT PRIMARY KEY,
             tenant_id      TEXT NOT NULL,
             decision_hash  TEXT NOT NULL,
             policy_version TEXT NOT NULL,
             data_version   TEXT NOT NULL,
             generated_at   TEXT NOT NULL,
             payload        BLOB NOT NULL
         );

         CREATE TABLE IF NOT EXISTS apps (
             id         TEXT PRIMARY KEY,
             tenant_id  TEXT NOT NULL,
             name       TEXT NOT NULL,
             blueprint  TEXT NOT NULL,
             version    INTEGER NOT NULL,
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS app_mutations (
             mutation_id      TEXT PRIMARY KEY,
             tenant_id        TEXT NOT NULL,
             app_id           TEXT NOT NULL,
             mutation_class   TEXT NOT NULL,
             before_snapshot  BLOB NOT NULL,
             after_snapshot   BLOB NOT NULL,
             mutation_payload BLOB NOT NULL,
             created_at       TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS verify_reports (
             report_id  TEXT PRIMARY KEY,
             tenant_id  TEXT NOT NULL,
             app_id     TEXT NOT NULL,
             payload    BLOB NOT NULL,
             created_at TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS deploy_intents (
             intent_id  TEXT PRIMARY KEY,
             tenant_id  TEXT NOT NULL,
             app_id     TEXT NOT NULL,
             target     TEXT NOT NULL,
             payload    BLOB NOT NULL,
             created_at TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS migration_bundles (
             bundle_id  TEXT NOT NULL,
             tenant_id  TEXT NOT NULL,
             kind       TEXT NOT NULL,
             payload    BLOB NOT NULL,
             created_at TEXT NOT NULL,
             PRIMARY KEY (bundle_id, tenant_id, kind)
         );

         CREATE TABLE IF NOT EXISTS studio_jobs (
             job_id     TEXT PRIMARY KEY,
             tenant_id  TEXT NOT NULL,
             payload    BLOB NOT NULL,
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_idempotency_expiry
             ON idempotency_records (expires_at);
         CREATE INDEX IF NOT EXISTS idx_apps_tenant ON apps (tenant_id);
         CREATE INDEX IF NOT EXISTS idx_studio_jobs_tenant ON studio_jobs (tenant_id);",
    )
}
