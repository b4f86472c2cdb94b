//! In-memory [`RemoteBackend`] with fault injection.
//!
//! Used by the tests and by the agent's `--dry-run` mode. Tables are plain
//! vectors of JSON objects keyed by their `id` attribute.
//!
//! ```rust,ignore
//! let remote = MemoryRemote::new();
//! remote.seed("clients", vec![json!({"id": "c1", ...})]).await;
//! remote.reject_record("orders", "o-2").await;   // insert answers Rejected
//! remote.fail_selects("products").await;          // select answers Network
//! remote.set_offline(true).await;                 // every call answers Network
//! ```

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Filter, RemoteBackend};
use crate::error::{RemoteError, RemoteResult};

/// A call the backend received, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Select(String),
    Insert(String, String),
    Update(String, String),
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    offline: bool,
    rejected_collections: HashSet<String>,
    rejected_records: HashSet<(String, String)>,
    failing_selects: HashSet<String>,
    calls: Vec<RemoteCall>,
}

impl State {
    fn check_online(&self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Network("backend unreachable".into()));
        }
        Ok(())
    }

    fn check_accepts(&self, collection: &str, id: &str) -> RemoteResult<()> {
        if self.rejected_collections.contains(collection)
            || self
                .rejected_records
                .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(RemoteError::Rejected(format!("{collection}/{id}")));
        }
        Ok(())
    }
}

/// In-memory backend tables.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Table setup and inspection
    // -------------------------------------------------------------------------

    /// Replaces the content of `collection`.
    pub async fn seed(&self, collection: &str, records: Vec<Value>) {
        self.state
            .lock()
            .await
            .tables
            .insert(collection.to_string(), records);
    }

    /// Current content of `collection`.
    pub async fn records(&self, collection: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// The record with `id` in `collection`.
    pub async fn find(&self, collection: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(collection)?
            .iter()
            .find(|r| record_id(r) == Some(id))
            .cloned()
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of write calls (insert or update) received so far.
    pub async fn write_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| !matches!(c, RemoteCall::Select(_)))
            .count()
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Makes every call fail with a network error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Rejects every write to `collection`.
    pub async fn reject_collection(&self, collection: &str) {
        self.state
            .lock()
            .await
            .rejected_collections
            .insert(collection.to_string());
    }

    /// Rejects writes of the record `id` in `collection`.
    pub async fn reject_record(&self, collection: &str, id: &str) {
        self.state
            .lock()
            .await
            .rejected_records
            .insert((collection.to_string(), id.to_string()));
    }

    /// Makes selects on `collection` fail with a network error.
    pub async fn fail_selects(&self, collection: &str) {
        self.state
            .lock()
            .await
            .failing_selects
            .insert(collection.to_string());
    }

    /// Clears every injected fault.
    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.offline = false;
        state.rejected_collections.clear();
        state.rejected_records.clear();
        state.failing_selects.clear();
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

impl RemoteBackend for MemoryRemote {
    async fn select(&self, collection: &str, filter: &Filter) -> RemoteResult<Vec<Value>> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::Select(collection.to_string()));
        state.check_online()?;

        if state.failing_selects.contains(collection) {
            return Err(RemoteError::Network(format!("select on {collection} failed")));
        }

        let rows = state
            .tables
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| filter.matches(r))
                    .take(filter.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows)
    }

    async fn insert(&self, collection: &str, record: Value) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let id = record_id(&record)
            .ok_or_else(|| RemoteError::Rejected(format!("{collection}: record without id")))?
            .to_string();

        state
            .calls
            .push(RemoteCall::Insert(collection.to_string(), id.clone()));
        state.check_online()?;
        state.check_accepts(collection, &id)?;

        let table = state.tables.entry(collection.to_string()).or_default();
        if table.iter().any(|r| record_id(r) == Some(id.as_str())) {
            return Err(RemoteError::Conflict(format!("{collection}/{id}")));
        }

        debug!(collection, id = %id, "Memory remote insert");
        table.push(record);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RemoteCall::Update(collection.to_string(), id.to_string()));
        state.check_online()?;
        state.check_accepts(collection, id)?;

        let Value::Object(fields) = patch else {
            return Err(RemoteError::Rejected(format!("{collection}/{id}: patch must be an object")));
        };

        let record = state
            .tables
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| RemoteError::Rejected(format!("{collection}/{id}: no such record")))?;

        if let Value::Object(existing) = record {
            existing.extend(fields);
        }
        Ok(())
    }
}
