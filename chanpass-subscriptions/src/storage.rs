use crate::errors::StorageError;
use crate::record::{SubscriptionRecord, UserId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Read-modify-write step passed to [`SubscriptionStore::update`].
///
/// Receives the current row (if any) and returns the row to store; `None`
/// deletes it.
pub type RecordUpdate =
    Box<dyn FnOnce(Option<SubscriptionRecord>) -> Option<SubscriptionRecord> + Send>;

/// Storage trait for subscription records
///
/// One row per user. Every method is atomic with respect to every other
/// method; implementations must not expose partial writes.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>>;

    /// Insert the record or overwrite the existing row for its user
    async fn upsert(&self, record: &SubscriptionRecord) -> Result<()>;

    /// Remove a user's row. Returns whether a row existed.
    async fn delete(&self, user_id: UserId) -> Result<bool>;

    /// Snapshot of every row, ordered by user id
    async fn list_all(&self) -> Result<Vec<SubscriptionRecord>>;

    /// Atomically read, transform and write back one row.
    ///
    /// No other store operation on any row can interleave with `f`.
    /// Returns the row as stored afterwards.
    async fn update(&self, user_id: UserId, f: RecordUpdate) -> Result<Option<SubscriptionRecord>>;
}

/// In-memory store
///
/// Keeps everything in a `BTreeMap` behind one mutex. Nothing survives a
/// restart; used by tests and dry runs.
#[derive(Default, Clone)]
pub struct MemorySubscriptionStore {
    records: Arc<Mutex<BTreeMap<UserId, SubscriptionRecord>>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `records`
    pub fn with_records(records: impl IntoIterator<Item = SubscriptionRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.user_id, r)).collect();
        Self {
            records: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<UserId, SubscriptionRecord>>> {
        self.records
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn get(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
        Ok(self.lock()?.get(&user_id).cloned())
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<()> {
        self.lock()?.insert(record.user_id, record.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool> {
        Ok(self.lock()?.remove(&user_id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<SubscriptionRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn update(&self, user_id: UserId, f: RecordUpdate) -> Result<Option<SubscriptionRecord>> {
        let mut records = self.lock()?;
        let current = records.remove(&user_id);
        let next = f(current);
        if let Some(record) = &next {
            records.insert(user_id, record.clone());
        }
        Ok(next)
    }
}
