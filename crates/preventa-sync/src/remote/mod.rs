//! # Remote Backend Boundary
//!
//! The record-oriented API the Sync Engine consumes. Records travel as JSON
//! objects addressed by collection name; collection names match the Local
//! Store's, plus `order_lines` for the lines of uploaded orders.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RemoteBackend                                   │
//! │                                                                         │
//! │  select(collection, filter) ──► Vec<record>                            │
//! │  insert(collection, record) ──► () | Conflict | Rejected               │
//! │  update(collection, id, patch) ──► () | Rejected                       │
//! │  probe() ──► ()          (select with limit 1)                         │
//! │                                                                         │
//! │  Implementations:                                                      │
//! │  • WsRemote      request/response over the WebSocket Connection        │
//! │  • MemoryRemote  in-memory tables with fault injection                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;
pub mod ws;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::error::RemoteResult;

pub use memory::MemoryRemote;
pub use ws::WsRemote;

/// Remote collection names.
pub mod collections {
    pub const CLIENTS: &str = "clients";
    pub const PRODUCTS: &str = "products";
    pub const MARKUPS: &str = "price_list_markups";
    pub const ORDERS: &str = "orders";
    pub const ORDER_LINES: &str = "order_lines";
    pub const COLLECTIONS: &str = "collections";
    pub const ROUTE_SHEETS: &str = "route_sheets";
    pub const ROUTE_STOPS: &str = "route_stops";
    pub const STOP_PAYMENTS: &str = "stop_payments";
    pub const STOP_RETURNS: &str = "stop_returns";
    pub const RECONCILIATIONS: &str = "reconciliations";
}

// =============================================================================
// Filter
// =============================================================================

/// One condition on a record attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `field == value`
    Eq { field: String, value: Value },

    /// `field` is one of `values`
    AnyOf { field: String, values: Vec<Value> },
}

impl Condition {
    fn matches(&self, record: &Value) -> bool {
        match self {
            Condition::Eq { field, value } => record.get(field) == Some(value),
            Condition::AnyOf { field, values } => record
                .get(field)
                .is_some_and(|actual| values.contains(actual)),
        }
    }
}

/// Conjunction of conditions plus an optional row limit.
///
/// ```rust,ignore
/// let open = Filter::all()
///     .eq("user_id", "chofer-01")
///     .any_of("status", ["pendiente", "en_progreso"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn any_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::AnyOf {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `record` satisfies every condition.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// A remote backend the Sync Engine can talk to.
///
/// Every call either succeeds or returns a [`crate::RemoteError`]. Nothing
/// is retried here; the engine decides what a failure means.
pub trait RemoteBackend: Send + Sync {
    /// Records of `collection` matching `filter`.
    fn select(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = RemoteResult<Vec<Value>>> + Send;

    /// Creates a record. An existing id answers `Conflict`.
    fn insert(&self, collection: &str, record: Value) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Merges `patch` into the record with `id`.
    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Cheap reachability check.
    fn probe(&self) -> impl Future<Output = RemoteResult<()>> + Send {
        async move {
            self.select(collections::CLIENTS, &Filter::all().limit(1))
                .await
                .map(|_| ())
        }
    }
}
