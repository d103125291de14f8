//! Schema migrations, run at startup.
//!
//! Every statement is idempotent (`CREATE ... IF NOT EXISTS`) so repeated
//! startups and concurrent replicas are safe.

use sqlx::PgPool;

use metahub_store::StoreError;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS mh_destinations (
        id          TEXT PRIMARY KEY,
        tenant      TEXT NOT NULL,
        name        TEXT NOT NULL,
        url         TEXT NOT NULL,
        method      TEXT NOT NULL,
        headers     JSONB NOT NULL DEFAULT '{}'::jsonb,
        auth        JSONB NOT NULL,
        timeout_ms  BIGINT NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE,
        deleted_at  TIMESTAMPTZ,
        created_at  TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mh_destinations_tenant_idx ON mh_destinations (tenant)",
    "CREATE TABLE IF NOT EXISTS mh_mappings (
        id            TEXT PRIMARY KEY,
        tenant        TEXT NOT NULL,
        name          TEXT NOT NULL,
        mode          TEXT NOT NULL,
        rules         JSONB NOT NULL DEFAULT '[]'::jsonb,
        template      TEXT,
        static_fields JSONB NOT NULL DEFAULT '{}'::jsonb,
        pass_through  BOOLEAN NOT NULL DEFAULT FALSE,
        source_type   TEXT NOT NULL,
        deleted_at    TIMESTAMPTZ,
        created_at    TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mh_routes (
        id             TEXT PRIMARY KEY,
        tenant         TEXT NOT NULL,
        source_type    TEXT NOT NULL,
        source_id      TEXT,
        destination_id TEXT NOT NULL,
        mapping_id     TEXT,
        filter_rules   JSONB,
        priority       INTEGER NOT NULL DEFAULT 0,
        is_active      BOOLEAN NOT NULL DEFAULT TRUE,
        deleted_at     TIMESTAMPTZ,
        created_at     TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mh_routes_source_idx ON mh_routes (tenant, source_type)",
    "CREATE TABLE IF NOT EXISTS mh_events (
        id                  TEXT PRIMARY KEY,
        tenant              TEXT NOT NULL,
        route_id            TEXT NOT NULL,
        destination_id      TEXT NOT NULL,
        source_type         TEXT NOT NULL,
        source_event_id     TEXT,
        payload             JSONB NOT NULL,
        transformed_payload JSONB,
        status              TEXT NOT NULL,
        attempts_count      INTEGER NOT NULL DEFAULT 0,
        max_attempts        INTEGER NOT NULL,
        next_retry_at       TIMESTAMPTZ,
        delivered_at        TIMESTAMPTZ,
        failed_at           TIMESTAMPTZ,
        error_message       TEXT,
        metadata            JSONB NOT NULL DEFAULT 'null'::jsonb,
        created_at          TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mh_events_ready_idx ON mh_events (status, next_retry_at)",
    "CREATE INDEX IF NOT EXISTS mh_events_tenant_idx ON mh_events (tenant, created_at)",
    "CREATE TABLE IF NOT EXISTS mh_attempts (
        event_id       TEXT NOT NULL REFERENCES mh_events (id),
        attempt_number INTEGER NOT NULL,
        request_url    TEXT NOT NULL,
        request_method TEXT NOT NULL,
        status_code    INTEGER,
        response_body  TEXT,
        error_message  TEXT,
        duration_ms    BIGINT NOT NULL,
        attempted_at   TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (event_id, attempt_number)
    )",
    "CREATE TABLE IF NOT EXISTS mh_event_logs (
        id          TEXT PRIMARY KEY,
        tenant      TEXT NOT NULL,
        level       TEXT NOT NULL,
        category    TEXT NOT NULL,
        action      TEXT NOT NULL,
        message     TEXT NOT NULL,
        resource    TEXT,
        metadata    JSONB NOT NULL DEFAULT 'null'::jsonb,
        duration_ms BIGINT,
        created_at  TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mh_event_logs_tenant_idx ON mh_event_logs (tenant, created_at)",
    "CREATE TABLE IF NOT EXISTS mh_alert_rules (
        id                TEXT PRIMARY KEY,
        tenant            TEXT NOT NULL,
        name              TEXT NOT NULL,
        condition         JSONB NOT NULL,
        notify_channels   JSONB NOT NULL DEFAULT '[]'::jsonb,
        notify_config     JSONB NOT NULL DEFAULT '{}'::jsonb,
        cooldown_minutes  INTEGER NOT NULL,
        last_triggered_at TIMESTAMPTZ,
        trigger_count     BIGINT NOT NULL DEFAULT 0,
        is_active         BOOLEAN NOT NULL DEFAULT TRUE,
        created_at        TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mh_alert_history (
        id                 TEXT PRIMARY KEY,
        tenant             TEXT NOT NULL,
        rule_id            TEXT NOT NULL,
        status             TEXT NOT NULL,
        condition_snapshot JSONB NOT NULL,
        notified_via       JSONB NOT NULL DEFAULT '[]'::jsonb,
        acknowledged_by    TEXT,
        acknowledged_at    TIMESTAMPTZ,
        resolved_at        TIMESTAMPTZ,
        triggered_at       TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS mh_alert_history_tenant_idx ON mh_alert_history (tenant, triggered_at)",
    "CREATE TABLE IF NOT EXISTS mh_integrations (
        tenant         TEXT PRIMARY KEY,
        id             TEXT NOT NULL,
        access_token   TEXT NOT NULL,
        scopes         JSONB NOT NULL DEFAULT '[]'::jsonb,
        resources      JSONB NOT NULL DEFAULT '[]'::jsonb,
        last_synced_at TIMESTAMPTZ,
        created_at     TIMESTAMPTZ NOT NULL
    )",
];

/// Run all migrations against the pool.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
    }
    tracing::debug!(statements = STATEMENTS.len(), "migrations applied");
    Ok(())
}
