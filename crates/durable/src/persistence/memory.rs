//! In-memory implementation of TokenStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::store::*;

/// In-memory implementation of TokenStore
///
/// This is primarily for testing and single-process hosts. It stores all
/// records in memory and provides the same semantics as the PostgreSQL
/// implementation: `mark_consumed` runs entirely under the write lock.
///
/// # Example
///
/// ```
/// use taskbridge_durable::InMemoryTokenStore;
///
/// let store = InMemoryTokenStore::new();
/// ```
pub struct InMemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
    strictness: PutStrictness,
}

impl InMemoryTokenStore {
    /// Create a new in-memory store that rejects duplicate puts
    pub fn new() -> Self {
        Self::with_strictness(PutStrictness::Reject)
    }

    /// Create a new in-memory store with the given duplicate-put behavior
    pub fn with_strictness(strictness: PutStrictness) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            strictness,
        }
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Get the number of consumed records
    pub fn consumed_count(&self) -> usize {
        self.records.read().values().filter(|r| r.consumed).count()
    }

    /// Drop consumed records created before `cutoff`
    ///
    /// The bridge never deletes records on its own; hosts that want a
    /// retention policy call this. Unconsumed records are always kept.
    pub fn purge_consumed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !(r.consumed && r.created_at < cutoff));
        before - records.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, execution_id: &str, token: ResumeToken) -> Result<(), PersistFailure> {
        let mut records = self.records.write();

        if records.contains_key(execution_id) {
            match self.strictness {
                PutStrictness::Reject => {
                    return Err(PersistFailure::AlreadyExists(execution_id.to_string()));
                }
                PutStrictness::Overwrite => {
                    warn!(%execution_id, "overwriting existing token record");
                }
            }
        }

        records.insert(
            execution_id.to_string(),
            TokenRecord::new(execution_id, token),
        );
        debug!(%execution_id, "stored token record");
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<TokenRecord, LookupFailure> {
        self.records
            .read()
            .get(execution_id)
            .cloned()
            .ok_or_else(|| LookupFailure::NotFound(execution_id.to_string()))
    }

    async fn mark_consumed(&self, execution_id: &str) -> Result<(), ConsumeError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(execution_id)
            .ok_or_else(|| ConsumeError::NotFound(execution_id.to_string()))?;

        if record.consumed {
            return Err(DuplicateResume {
                execution_id: execution_id.to_string(),
            }
            .into());
        }

        record.consumed = true;
        Ok(())
    }
}
