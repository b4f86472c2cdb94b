//! # Sync State Repository
//!
//! What the device still owes the backend, and when it last caught up.
//!
//! ## The Sync Flag Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per-record sync flags                                │
//! │                                                                         │
//! │  LOCAL OPERATION (place order, register payment, change stop status)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  put(record { synced = false })  ← indexed, so pending lookups are     │
//! │       │                            a single index scan                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ENGINE (full_sync)                              │   │
//! │  │                                                                 │   │
//! │  │  1. get_by_index(synced = false) per collection                 │   │
//! │  │  2. For each record:                                            │   │
//! │  │     a. Send to the backend                                      │   │
//! │  │     b. Accepted: mark_synced                                    │   │
//! │  │     c. Rejected: stays pending, retried next sync               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A record is never lost: it lives in the Local Store until accepted.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use preventa_core::{
    Client, Collection, Order, Product, Reconciliation, RouteSheet, RouteStop, StopPayment,
    StopReturn,
};
use serde::{Deserialize, Serialize};

use crate::error::DbResult;
use crate::repository::settings::SettingsRepository;
use crate::store::LocalStore;

/// Counts behind the sync status screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOverview {
    pub clients: u64,
    pub products: u64,
    pub orders: u64,
    pub pending_orders: u64,
    pub collections: u64,
    pub pending_collections: u64,
    /// Sheets, stops, payments and returns with local changes.
    pub pending_route_items: u64,
    pub pending_reconciliations: u64,
    /// Pending orders plus pending collections.
    pub pending_count: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncOverview {
    /// True when nothing at all waits for upload.
    pub fn is_clean(&self) -> bool {
        self.pending_count == 0 && self.pending_route_items == 0 && self.pending_reconciliations == 0
    }
}

#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    store: LocalStore,
    settings: SettingsRepository,
}

impl SyncStateRepository {
    pub fn new(store: LocalStore, settings: SettingsRepository) -> Self {
        SyncStateRepository { store, settings }
    }

    pub async fn overview(&self) -> DbResult<SyncOverview> {
        let pending_orders = self.store.count_pending::<Order>().await?;
        let pending_collections = self.store.count_pending::<Collection>().await?;
        let pending_route_items = self.store.count_pending::<RouteSheet>().await?
            + self.store.count_pending::<RouteStop>().await?
            + self.store.count_pending::<StopPayment>().await?
            + self.store.count_pending::<StopReturn>().await?;

        Ok(SyncOverview {
            clients: self.store.count::<Client>().await?,
            products: self.store.count::<Product>().await?,
            orders: self.store.count::<Order>().await?,
            pending_orders,
            collections: self.store.count::<Collection>().await?,
            pending_collections,
            pending_route_items,
            pending_reconciliations: self.store.count_pending::<Reconciliation>().await?,
            pending_count: pending_orders + pending_collections,
            last_sync: self.settings.last_sync().await?,
        })
    }

    pub async fn last_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        self.settings.last_sync().await
    }

    pub async fn record_sync(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.settings.set_last_sync(at).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::client;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use preventa_core::{CollectionMethod, Money, NewCollection};

    #[tokio::test]
    async fn test_overview_counts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.clients().mirror(vec![client("c1", "CLI-1", "Kiosco")]).await.unwrap();
        db.collections()
            .create(
                NewCollection {
                    client_id: "c1".into(),
                    client_name: None,
                    amount: Money::from_units(10),
                    method: CollectionMethod::Cash,
                    reference: None,
                    notes: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let overview = db.sync_state().overview().await.unwrap();
        assert_eq!(overview.clients, 1);
        assert_eq!(overview.pending_collections, 1);
        assert_eq!(overview.pending_count, 1);
        assert!(overview.last_sync.is_none());
        assert!(!overview.is_clean());

        let now = Utc::now();
        db.sync_state().record_sync(now).await.unwrap();
        assert!(db.sync_state().last_sync().await.unwrap().is_some());
    }
}
