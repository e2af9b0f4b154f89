//! SubscriberRegistry trait - pluggable subscriber storage
//!
//! The alerter never touches a global cache; it is handed a registry:
//! - `InMemoryRegistry`: tests and minimal deployments
//! - `SledRegistry`: durable store under the data directory
//!
//! The registry is owned by an external system. This crate only lists
//! subscribers and writes back last-alert timestamps (last write wins).

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::types::Subscriber;

/// Tree holding subscriber records inside the sled database.
const SUBSCRIBER_TREE: &str = "subscribers";

/// Trait for pluggable subscriber backends
///
/// Implementations must be thread-safe (Send + Sync).
pub trait SubscriberRegistry: Send + Sync {
    /// All subscribers, in id order.
    fn list(&self) -> Result<Vec<Subscriber>, RegistryError>;

    /// One subscriber by id.
    fn get(&self, id: &str) -> Result<Option<Subscriber>, RegistryError>;

    /// Insert or replace a subscriber record.
    fn upsert(&self, subscriber: &Subscriber) -> Result<(), RegistryError>;

    /// Record that `id` was alerted at `at`.
    fn set_last_alert(&self, id: &str, at: DateTime<Utc>) -> Result<(), RegistryError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("subscriber not found: {0}")]
    NotFound(String),
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory registry. Not durable: data is lost on restart.
#[derive(Default)]
pub struct InMemoryRegistry {
    subscribers: RwLock<BTreeMap<String, Subscriber>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let map = subscribers.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            subscribers: RwLock::new(map),
        }
    }
}

impl SubscriberRegistry for InMemoryRegistry {
    fn list(&self) -> Result<Vec<Subscriber>, RegistryError> {
        let map = self
            .subscribers
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(map.values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<Subscriber>, RegistryError> {
        let map = self
            .subscribers
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(map.get(id).cloned())
    }

    fn upsert(&self, subscriber: &Subscriber) -> Result<(), RegistryError> {
        let mut map = self
            .subscribers
            .write()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        map.insert(subscriber.id.clone(), subscriber.clone());
        Ok(())
    }

    fn set_last_alert(&self, id: &str, at: DateTime<Utc>) -> Result<(), RegistryError> {
        let mut map = self
            .subscribers
            .write()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        let sub = map
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        sub.last_alert = Some(at.to_rfc3339());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

// ============================================================================
// sled
// ============================================================================

/// Durable registry. Key: subscriber id, value: JSON record.
#[derive(Clone)]
pub struct SledRegistry {
    tree: sled::Tree,
    _db: Arc<sled::Db>,
}

impl SledRegistry {
    /// Open or create the registry database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(SUBSCRIBER_TREE)?;
        info!(subscribers = tree.len(), "Subscriber registry opened");
        Ok(Self {
            tree,
            _db: Arc::new(db),
        })
    }

    /// Bulk-load subscribers from a JSON array file.
    pub fn import_json(&self, path: &Path) -> Result<usize, RegistryError> {
        let bytes = std::fs::read(path).map_err(|e| RegistryError::Storage(format!("{}: {e}", path.display())))?;
        let subscribers: Vec<Subscriber> = serde_json::from_slice(&bytes)?;
        for sub in &subscribers {
            self.upsert(sub)?;
        }
        self.tree.flush()?;
        Ok(subscribers.len())
    }
}

impl SubscriberRegistry for SledRegistry {
    fn list(&self) -> Result<Vec<Subscriber>, RegistryError> {
        self.tree
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice::<Subscriber>(&v?)?))
            .collect()
    }

    fn get(&self, id: &str) -> Result<Option<Subscriber>, RegistryError> {
        self.tree
            .get(id.as_bytes())?
            .map(|v| serde_json::from_slice(&v).map_err(RegistryError::from))
            .transpose()
    }

    fn upsert(&self, subscriber: &Subscriber) -> Result<(), RegistryError> {
        let value = serde_json::to_vec(subscriber)?;
        self.tree.insert(subscriber.id.as_bytes(), value)?;
        Ok(())
    }

    fn set_last_alert(&self, id: &str, at: DateTime<Utc>) -> Result<(), RegistryError> {
        let mut sub = self
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        sub.last_alert = Some(at.to_rfc3339());
        self.upsert(&sub)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
