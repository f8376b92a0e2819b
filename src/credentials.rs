//! Device lifecycle and account credentials.
//!
//! A device moves `Unknown → Unregistered → Registered` and never back.
//! Provisioning creates it unregistered; registration binds exactly one
//! account to it and issues the API key the device uses for telemetry.
//! Logging in requires the username, the password and the device id.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AdvisorError, Result};
use crate::models::{Account, Device, DeviceState, RegisteredDevice};
use crate::store::Store;

// ---

/// Device identifiers are fixed-length hardware labels.
pub const DEVICE_ID_LEN: usize = 6;

pub struct Credentials {
    store: Store,
}

impl Credentials {
    // ---
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create `device_id` in the unregistered state.
    pub async fn provision(&self, device_id: &str) -> Result<()> {
        // ---
        if device_id.chars().count() != DEVICE_ID_LEN {
            return Err(AdvisorError::InvalidInput(format!(
                "Device ID must be exactly {DEVICE_ID_LEN} characters"
            )));
        }

        self.store
            .insert_device(&Device::unregistered(device_id))
            .await?;
        info!("Provisioned device {}", device_id);
        Ok(())
    }

    /// True iff the device exists and is not yet registered.
    pub async fn validate_for_registration(&self, device_id: &str) -> Result<bool> {
        let device = self.store.device(device_id).await?;
        Ok(matches!(device.map(|d| d.state()), Some(DeviceState::Unregistered)))
    }

    pub async fn is_registered(&self, device_id: &str) -> Result<bool> {
        let device = self.store.device(device_id).await?;
        Ok(matches!(device.map(|d| d.state()), Some(DeviceState::Registered)))
    }

    /// Bind a new account to `device_id` and issue the device's API key.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        device_id: &str,
    ) -> Result<RegisteredDevice> {
        // ---
        if !self.validate_for_registration(device_id).await? {
            return Err(AdvisorError::InvalidDevice(device_id.to_string()));
        }
        if username.is_empty() || password.is_empty() {
            return Err(AdvisorError::InvalidInput(
                "username and password are required".to_string(),
            ));
        }

        let account = Account {
            username: username.to_string(),
            password_hash: hash_password(password).await?,
            device_id: device_id.to_string(),
        };
        let api_key = Uuid::new_v4().simple().to_string();

        // The store re-checks the device state inside its critical section
        self.store.register_account(&account, &api_key).await?;

        info!("Registered user '{}' on device {}", username, device_id);
        Ok(RegisteredDevice {
            device_id: device_id.to_string(),
            api_key,
        })
    }

    /// Check all three factors: username, password and device id.
    pub async fn authenticate(&self, username: &str, password: &str, device_id: &str) -> Result<bool> {
        // ---
        let Some(account) = self.store.account(username, device_id).await? else {
            warn!("Login failed for '{}' on device {}", username, device_id);
            return Ok(false);
        };

        let ok = verify_password(password, &account.password_hash).await?;
        if !ok {
            warn!("Login failed for '{}' on device {}", username, device_id);
        }
        Ok(ok)
    }

    /// Whether `presented` is the API key issued to `device_id`.
    pub async fn verify_device_key(&self, device_id: &str, presented: Option<&str>) -> Result<bool> {
        // ---
        let device = self.store.device(device_id).await?;
        let expected = device.and_then(|d| d.api_key);

        Ok(match (expected, presented) {
            (Some(expected), Some(presented)) => {
                constant_time_eq(expected.as_bytes(), presented.as_bytes())
            }
            _ => false,
        })
    }

    pub async fn device_api_key(&self, device_id: &str) -> Result<Option<String>> {
        Ok(self.store.device(device_id).await?.and_then(|d| d.api_key))
    }
}

/// Argon2 hash with a fresh salt, computed on the blocking pool.
async fn hash_password(password: &str) -> Result<String> {
    // ---
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AdvisorError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AdvisorError::Internal(format!("password hashing task failed: {e}")))?
}

/// Argon2 verification on the blocking pool; a malformed stored hash never
/// matches.
async fn verify_password(password: &str, stored: &str) -> Result<bool> {
    // ---
    let password = password.to_owned();
    let stored = stored.to_owned();
    tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored)
            .map(|hash| Argon2::default().verify_password(password.as_bytes(), &hash).is_ok())
            .unwrap_or(false)
    })
    .await
    .map_err(|e| AdvisorError::Internal(format!("password verification task failed: {e}")))
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
