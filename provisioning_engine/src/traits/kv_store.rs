use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Key-value store error: {0}")]
    StoreError(String),
}

/// A minimal set-if-absent store with TTL. Used as the fast-path dispatch guard in front of the durable
/// queue, so a burst of duplicate webhook deliveries is absorbed without touching the database.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Sets `key` to `value` only if it is absent (or expired). Returns true if this call set the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

//--------------------------------------   InMemoryKvStore     -------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, KvError> {
        self.entries.lock().map_err(|e| KvError::StoreError(format!("kv mutex poisoned: {e}")))
    }
}

impl KeyValueStore for InMemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match entries.get(key) {
            Some((_, deadline)) if *deadline > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (value.to_string(), now + ttl));
                Ok(true)
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.lock()?;
        Ok(entries.get(key).filter(|(_, deadline)| *deadline > Instant::now()).map(|(v, _)| v.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }
}
