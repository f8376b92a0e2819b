//! In-process store.
//!
//! Devices and accounts live behind one mutex so registration is a single
//! critical section. Readings are kept per device, sorted by timestamp.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::error::{AdvisorError, Result};
use crate::models::{Account, Device, Reading};

// ---

#[derive(Default)]
struct Registry {
    devices: HashMap<String, Device>,
    /// Accounts keyed by username.
    accounts: HashMap<String, Account>,
}

#[derive(Default)]
pub struct MemoryStore {
    registry: Mutex<Registry>,
    readings: RwLock<HashMap<String, Vec<Reading>>>,
}

impl MemoryStore {
    // ---
    pub(super) fn insert_device(&self, device: &Device) -> Result<()> {
        // ---
        let mut registry = self.registry.lock()?;
        if registry.devices.contains_key(&device.device_id) {
            return Err(AdvisorError::AlreadyExists(device.device_id.clone()));
        }
        registry
            .devices
            .insert(device.device_id.clone(), device.clone());
        Ok(())
    }

    pub(super) fn device(&self, device_id: &str) -> Result<Option<Device>> {
        Ok(self.registry.lock()?.devices.get(device_id).cloned())
    }

    pub(super) fn register_account(&self, account: &Account, api_key: &str) -> Result<()> {
        // ---
        let mut registry = self.registry.lock()?;
        let Registry { devices, accounts } = &mut *registry;

        let device = match devices.get_mut(&account.device_id) {
            Some(device) if !device.registered => device,
            _ => return Err(AdvisorError::InvalidDevice(account.device_id.clone())),
        };

        if accounts.contains_key(&account.username) {
            return Err(AdvisorError::DuplicateAccount(format!(
                "username '{}' is taken",
                account.username
            )));
        }
        if accounts.values().any(|a| a.device_id == account.device_id) {
            return Err(AdvisorError::DuplicateAccount(format!(
                "device {} is already bound",
                account.device_id
            )));
        }

        accounts.insert(account.username.clone(), account.clone());
        device.registered = true;
        device.api_key = Some(api_key.to_string());
        Ok(())
    }

    pub(super) fn account(&self, username: &str, device_id: &str) -> Result<Option<Account>> {
        // ---
        Ok(self
            .registry
            .lock()?
            .accounts
            .get(username)
            .filter(|a| a.device_id == device_id)
            .cloned())
    }

    pub(super) fn insert_reading(&self, reading: &Reading) -> Result<()> {
        // ---
        let mut readings = self.readings.write()?;
        let history = readings.entry(reading.device_id.clone()).or_default();

        // Equal timestamps keep arrival order
        let at = history.partition_point(|r| r.timestamp <= reading.timestamp);
        history.insert(at, reading.clone());
        Ok(())
    }

    pub(super) fn readings_page(&self, device_id: &str, skip: u64, limit: u64) -> Result<Vec<Reading>> {
        // ---
        let readings = self.readings.read()?;
        let page = readings
            .get(device_id)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    pub(super) fn reading_count(&self, device_id: &str) -> Result<u64> {
        let readings = self.readings.read()?;
        Ok(readings.get(device_id).map_or(0, |h| h.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reading(device_id: &str, minute: i64) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            temperature: minute as f64,
            ph: 7.0,
            humidity: 50.0,
            ec: 0.0,
            n: 0.0,
            p: 0.0,
            k: 0.0,
            moisture: 40.0,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    fn account(username: &str, device_id: &str) -> Account {
        Account {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            device_id: device_id.to_string(),
        }
    }

    #[test]
    fn test_out_of_order_inserts_are_sorted_by_timestamp() {
        // ---
        let store = MemoryStore::default();
        for minute in [3, 1, 4, 2] {
            store.insert_reading(&reading("ABC123", minute)).unwrap();
        }

        let page = store.readings_page("ABC123", 0, 10).unwrap();
        let minutes: Vec<f64> = page.iter().map(|r| r.temperature).collect();
        assert_eq!(minutes, vec![4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_page_skip_and_limit() {
        // ---
        let store = MemoryStore::default();
        for minute in 0..5 {
            store.insert_reading(&reading("ABC123", minute)).unwrap();
        }
        store.insert_reading(&reading("DEF456", 99)).unwrap();

        let page = store.readings_page("ABC123", 2, 2).unwrap();
        let minutes: Vec<f64> = page.iter().map(|r| r.temperature).collect();
        assert_eq!(minutes, vec![2.0, 1.0]);
        assert_eq!(store.reading_count("ABC123").unwrap(), 5);
        assert_eq!(store.reading_count("GHI789").unwrap(), 0);
    }

    #[test]
    fn test_register_failure_writes_nothing() {
        // ---
        let store = MemoryStore::default();
        store.insert_device(&Device::unregistered("ABC123")).unwrap();
        store.insert_device(&Device::unregistered("DEF456")).unwrap();
        store.register_account(&account("alice", "ABC123"), "key-1").unwrap();

        // Username taken: the second device must stay unregistered
        let err = store
            .register_account(&account("alice", "DEF456"), "key-2")
            .unwrap_err();
        assert!(matches!(err, AdvisorError::DuplicateAccount(_)));

        let device = store.device("DEF456").unwrap().unwrap();
        assert!(!device.registered);
        assert!(device.api_key.is_none());
    }

    #[test]
    fn test_register_rejects_unknown_or_registered_device() {
        // ---
        let store = MemoryStore::default();
        assert!(matches!(
            store.register_account(&account("bob", "ZZZ999"), "k"),
            Err(AdvisorError::InvalidDevice(_))
        ));

        store.insert_device(&Device::unregistered("ABC123")).unwrap();
        store.register_account(&account("bob", "ABC123"), "k").unwrap();
        assert!(matches!(
            store.register_account(&account("carol", "ABC123"), "k2"),
            Err(AdvisorError::InvalidDevice(_))
        ));
    }

    #[test]
    fn test_racing_registrations_bind_one_account() {
        // ---
        let store = MemoryStore::default();
        store.insert_device(&Device::unregistered("ABC123")).unwrap();

        let outcomes: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || {
                        store.register_account(&account(&format!("user{i}"), "ABC123"), &format!("key-{i}"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(outcomes
            .iter()
            .filter(|outcome| outcome.is_err())
            .all(|outcome| matches!(outcome, Err(AdvisorError::InvalidDevice(_)))));

        let device = store.device("ABC123").unwrap().unwrap();
        assert_eq!(device.api_key, Some(format!("key-{}", winners[0])));
        let bound = store
            .registry
            .lock()
            .unwrap()
            .accounts
            .values()
            .filter(|a| a.device_id == "ABC123")
            .count();
        assert_eq!(bound, 1);
    }
}
