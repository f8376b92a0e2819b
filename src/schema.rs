//! Database schema management for `terradetect-backend`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` and by the `provision` tool.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `devices` (provisioned hardware and its API key), `accounts`
/// (one per device) and `readings` (append-only telemetry). Safe to call on
/// every startup; no-op if objects already exist.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_id   TEXT        PRIMARY KEY CHECK (char_length(device_id) = 6),
            registered  BOOLEAN     NOT NULL DEFAULT FALSE,
            api_key     TEXT,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id            SERIAL PRIMARY KEY,
            username      TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            device_id     TEXT    NOT NULL UNIQUE REFERENCES devices (device_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id           BIGSERIAL        PRIMARY KEY,
            device_id    TEXT             NOT NULL REFERENCES devices (device_id),
            temperature  DOUBLE PRECISION NOT NULL,
            ph           DOUBLE PRECISION NOT NULL,
            humidity     DOUBLE PRECISION NOT NULL,
            ec           DOUBLE PRECISION NOT NULL,
            n            DOUBLE PRECISION NOT NULL,
            p            DOUBLE PRECISION NOT NULL,
            k            DOUBLE PRECISION NOT NULL,
            moisture     DOUBLE PRECISION NOT NULL,
            recorded_at  TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // History queries are per device, newest first
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_device_recorded
            ON readings (device_id, recorded_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
