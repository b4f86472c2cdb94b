//! # Order Repository
//!
//! Orders captured on the device and their upload bookkeeping.
//!
//! ## Order Lifecycle on the Device
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OrderDraft ──place()──► Order { pendiente, synced = false }            │
//! │                                  │                                      │
//! │                                  │ Sync Engine upload accepted          │
//! │                                  ▼                                      │
//! │                     mark_synced() ──► Order { sincronizado, synced }    │
//! │                                                                         │
//! │  Later statuses (procesado, entregado) only arrive through downloads.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use preventa_core::order::{ensure_consistent, OrderDraft};
use preventa_core::{Client, Order, OrderStatus};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::store::LocalStore;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    store: LocalStore,
}

impl OrderRepository {
    pub fn new(store: LocalStore) -> Self {
        OrderRepository { store }
    }

    /// Stores a new order as pending upload.
    ///
    /// The order's totals are checked against its lines before writing.
    pub async fn create(&self, mut order: Order) -> DbResult<Order> {
        ensure_consistent(&order)?;

        order.status = OrderStatus::Pending;
        order.synced = false;
        self.store.put(&order).await?;

        info!(order_id = %order.id, client_id = %order.client_id, total = %order.total, "Order created");
        Ok(order)
    }

    /// Turns a draft into a stored order for a client.
    pub async fn place(
        &self,
        draft: OrderDraft,
        client_id: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<Order> {
        let client: Client = self.store.require("Client", client_id).await?;
        let order = draft.into_order(&client, notes, now)?;
        self.create(order).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        self.store.get(id).await
    }

    /// Orders of a client, newest first.
    pub async fn for_client(&self, client_id: &str) -> DbResult<Vec<Order>> {
        let mut orders: Vec<Order> = self.store.get_by_index("client_id", client_id).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn by_status(&self, status: OrderStatus) -> DbResult<Vec<Order>> {
        self.store.get_by_index("status", status.as_str()).await
    }

    /// Orders waiting for upload, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<Order>> {
        let mut orders: Vec<Order> = self.store.pending().await?;
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.store.count::<Order>().await
    }

    pub async fn count_pending(&self) -> DbResult<u64> {
        self.store.count_pending::<Order>().await
    }

    /// Marks an order as accepted by the backend.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        let mut order: Order = tx
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Synced;
        }
        order.synced = true;

        tx.put(&order).await?;
        tx.commit().await?;

        debug!(order_id = %id, "Order marked synced");
        Ok(())
    }

    /// Marks the order synced only if it still equals the uploaded copy.
    /// Returns false when it changed in between; it then stays pending.
    pub async fn mark_synced_if_unchanged(&self, uploaded: &Order) -> DbResult<bool> {
        let mut tx = self.store.begin().await?;
        let mut order: Order = tx.require("Order", &uploaded.id).await?;

        if serde_json::to_value(&order)? != serde_json::to_value(uploaded)? {
            debug!(order_id = %uploaded.id, "Order changed during upload, left pending");
            return Ok(false);
        }

        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Synced;
        }
        order.synced = true;

        tx.put(&order).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client, product};
    use crate::{Database, DbConfig};
    use preventa_core::{CoreError, Money};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.clients().mirror(vec![client("c1", "CLI-1", "Kiosco")]).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_place_and_mark_synced() {
        let db = setup().await;
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "P-1", 0), Money::from_units(10), 2).unwrap();
        draft.add(&product("p2", "P-2", 0), Money::from_units(5), 3).unwrap();

        let order = db.orders().place(draft, "c1", None, Utc::now()).await.unwrap();
        assert_eq!(order.total, Money::from_units(35));

        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, Money::from_units(35));
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(db.orders().count_pending().await.unwrap(), 1);

        db.orders().mark_synced(&order.id).await.unwrap();
        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.status, OrderStatus::Synced);
        assert!(db.orders().pending().await.unwrap().is_empty());
        assert_eq!(db.orders().by_status(OrderStatus::Synced).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_order_not_written() {
        let db = setup().await;
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "P-1", 0), Money::from_units(10), 2).unwrap();
        let mut order = draft
            .into_order(&db.clients().get_by_id("c1").await.unwrap().unwrap(), None, Utc::now())
            .unwrap();
        order.total = Money::from_units(1);

        let err = db.orders().create(order).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InconsistentTotals { .. })));
        assert_eq!(db.orders().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_place_for_unknown_client() {
        let db = setup().await;
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "P-1", 0), Money::from_units(10), 1).unwrap();
        let err = db.orders().place(draft, "ghost", None, Utc::now()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mark_synced_if_unchanged_skips_edited_order() {
        let db = setup().await;
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "P-1", 0), Money::from_units(10), 1).unwrap();
        let uploaded = db.orders().place(draft, "c1", None, Utc::now()).await.unwrap();

        // Edited on the device while the upload was in flight.
        let mut edited = uploaded.clone();
        edited.notes = Some("dejar en portería".into());
        db.store().put(&edited).await.unwrap();

        assert!(!db.orders().mark_synced_if_unchanged(&uploaded).await.unwrap());
        let stored = db.orders().get_by_id(&uploaded.id).await.unwrap().unwrap();
        assert!(!stored.synced);
        assert_eq!(stored.status, OrderStatus::Pending);

        assert!(db.orders().mark_synced_if_unchanged(&stored).await.unwrap());
        let stored = db.orders().get_by_id(&uploaded.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.status, OrderStatus::Synced);
    }

    #[tokio::test]
    async fn test_mark_synced_missing_order() {
        let db = setup().await;
        assert!(db.orders().mark_synced("missing").await.unwrap_err().is_not_found());
    }
}
