//! Storage gateway for devices, accounts and readings.
//!
//! Two backends satisfy the same contract: an in-process store used for
//! development and tests, and PostgreSQL via `sqlx`. Callers only see
//! [`Store`]; backend selection happens once in `main.rs`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::Result;
use crate::models::{Account, Device, Reading};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[derive(Clone)]
pub enum Store {
    Memory(Arc<MemoryStore>),
    Postgres(PgStore),
}

impl Store {
    // ---
    pub fn in_memory() -> Self {
        Store::Memory(Arc::new(MemoryStore::default()))
    }

    pub fn postgres(pool: PgPool) -> Self {
        Store::Postgres(PgStore::new(pool))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Postgres(_) => "postgres",
        }
    }

    /// Insert a new device; `AlreadyExists` if the id is taken.
    pub async fn insert_device(&self, device: &Device) -> Result<()> {
        match self {
            Store::Memory(s) => s.insert_device(device),
            Store::Postgres(s) => s.insert_device(device).await,
        }
    }

    pub async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        match self {
            Store::Memory(s) => s.device(device_id),
            Store::Postgres(s) => s.device(device_id).await,
        }
    }

    /// Bind `account` to its device and mark the device registered, as one
    /// atomic unit.
    ///
    /// Fails with `InvalidDevice` when the device is unknown or already
    /// registered, and `DuplicateAccount` when the username is taken. On
    /// failure nothing is written.
    pub async fn register_account(&self, account: &Account, api_key: &str) -> Result<()> {
        match self {
            Store::Memory(s) => s.register_account(account, api_key),
            Store::Postgres(s) => s.register_account(account, api_key).await,
        }
    }

    /// Account matching both `username` and `device_id`.
    pub async fn account(&self, username: &str, device_id: &str) -> Result<Option<Account>> {
        match self {
            Store::Memory(s) => s.account(username, device_id),
            Store::Postgres(s) => s.account(username, device_id).await,
        }
    }

    pub async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        match self {
            Store::Memory(s) => s.insert_reading(reading),
            Store::Postgres(s) => s.insert_reading(reading).await,
        }
    }

    /// Newest reading by timestamp.
    pub async fn latest_reading(&self, device_id: &str) -> Result<Option<Reading>> {
        Ok(self.readings_page(device_id, 0, 1).await?.into_iter().next())
    }

    /// Readings newest-first, skipping `skip` and returning at most `limit`.
    pub async fn readings_page(&self, device_id: &str, skip: u64, limit: u64) -> Result<Vec<Reading>> {
        match self {
            Store::Memory(s) => s.readings_page(device_id, skip, limit),
            Store::Postgres(s) => s.readings_page(device_id, skip, limit).await,
        }
    }

    pub async fn reading_count(&self, device_id: &str) -> Result<u64> {
        match self {
            Store::Memory(s) => s.reading_count(device_id),
            Store::Postgres(s) => s.reading_count(device_id).await,
        }
    }
}
