use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::CredentialStore;

/// In-process store for tests and credential-store-less dev runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<DashMap<String, String>>,
    // When set, every call fails. Lets tests exercise the Broker's
    // store-outage path.
    poisoned: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.map.insert(key.to_string(), value.to_string());
        store
    }

    pub fn set_poisoned(&self, poisoned: bool) {
        self.poisoned.store(poisoned, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if self.poisoned.load(Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
