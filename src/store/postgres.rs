//! PostgreSQL store.
//!
//! Registration runs in a transaction holding a row lock on the device, so
//! concurrent registrations for one device are serialized.

use sqlx::PgPool;
use tracing::debug;

use crate::error::{AdvisorError, Result};
use crate::models::{Account, Device, Reading};

// ---

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Offsets and limits arrive as u64; Postgres wants BIGINT.
fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(super) async fn insert_device(&self, device: &Device) -> Result<()> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO devices (device_id, registered, api_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO NOTHING
            "#,
        )
        .bind(&device.device_id)
        .bind(device.registered)
        .bind(&device.api_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AdvisorError::AlreadyExists(device.device_id.clone()));
        }
        Ok(())
    }

    pub(super) async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        // ---
        let device = sqlx::query_as::<_, Device>(
            "SELECT device_id, registered, api_key FROM devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }

    pub(super) async fn register_account(&self, account: &Account, api_key: &str) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT device_id, registered, api_key FROM devices
            WHERE device_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&account.device_id)
        .fetch_optional(&mut *tx)
        .await?;

        if !matches!(device, Some(ref d) if !d.registered) {
            return Err(AdvisorError::InvalidDevice(account.device_id.clone()));
        }

        let inserted = sqlx::query(
            "INSERT INTO accounts (username, password_hash, device_id) VALUES ($1, $2, $3)",
        )
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.device_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // Dropping `tx` rolls back
            return Err(if is_unique_violation(&e) {
                AdvisorError::DuplicateAccount(format!(
                    "username '{}' or device {} already bound",
                    account.username, account.device_id
                ))
            } else {
                e.into()
            });
        }

        sqlx::query("UPDATE devices SET registered = TRUE, api_key = $2 WHERE device_id = $1")
            .bind(&account.device_id)
            .bind(api_key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Committed registration for device {}", account.device_id);
        Ok(())
    }

    pub(super) async fn account(&self, username: &str, device_id: &str) -> Result<Option<Account>> {
        // ---
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT username, password_hash, device_id FROM accounts
            WHERE username = $1 AND device_id = $2
            "#,
        )
        .bind(username)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub(super) async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO readings (
                device_id, temperature, ph, humidity, ec,
                n, p, k, moisture, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&reading.device_id)
        .bind(reading.temperature)
        .bind(reading.ph)
        .bind(reading.humidity)
        .bind(reading.ec)
        .bind(reading.n)
        .bind(reading.p)
        .bind(reading.k)
        .bind(reading.moisture)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(super) async fn readings_page(&self, device_id: &str, skip: u64, limit: u64) -> Result<Vec<Reading>> {
        // ---
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT device_id, temperature, ph, humidity, ec,
                   n, p, k, moisture, recorded_at
            FROM readings
            WHERE device_id = $1
            ORDER BY recorded_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(device_id)
        .bind(to_bigint(skip))
        .bind(to_bigint(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(readings)
    }

    pub(super) async fn reading_count(&self, device_id: &str) -> Result<u64> {
        // ---
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE device_id = $1")
            .bind(device_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
