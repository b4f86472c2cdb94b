//! # Reconciliation Service (rendición)
//!
//! Closes a route: reads the stored stops, computes the reconciliation,
//! persists it and completes the sheet, all in one transaction.
//!
//! ```text
//! close_route(sheet, declared_cash)
//!      │  one transaction
//!      ├── load sheet, stop views, existing reconciliation
//!      ├── preventa_core::reconciliation::close  ← all rule checks, no writes
//!      ├── put Reconciliation (synced = false)
//!      └── put RouteSheet { completada, synced = false }
//! ```

use chrono::{DateTime, Utc};
use preventa_core::reconciliation::{close, CashPreview};
use preventa_core::route::complete_sheet;
use preventa_core::{Money, Reconciliation, RouteSheet};
use tracing::info;

use crate::error::DbResult;
use crate::repository::route::{stop_views_in, RouteService};
use crate::store::LocalStore;

#[derive(Debug, Clone)]
pub struct ReconciliationService {
    store: LocalStore,
}

impl ReconciliationService {
    pub fn new(store: LocalStore) -> Self {
        ReconciliationService { store }
    }

    fn routes(&self) -> RouteService {
        RouteService::new(self.store.clone())
    }

    /// The reconciliation of a sheet, if it was closed.
    pub async fn for_sheet(&self, sheet_id: &str) -> DbResult<Option<Reconciliation>> {
        self.store.get_unique("route_sheet_id", sheet_id).await
    }

    /// Figures shown before closing, optionally against a typed cash amount.
    pub async fn preview(&self, sheet_id: &str, declared_cash: Option<Money>) -> DbResult<CashPreview> {
        let sheet = self.routes().sheet(sheet_id).await?;
        let views = self.routes().stop_views(sheet_id).await?;
        let existing = self.for_sheet(sheet_id).await?;

        Ok(CashPreview::build(&sheet, &views, existing.is_some(), declared_cash))
    }

    /// Closes the route with the cash the driver counted.
    pub async fn close_route(
        &self,
        sheet_id: &str,
        declared_cash: Money,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<Reconciliation> {
        let mut tx = self.store.begin().await?;
        let mut sheet: RouteSheet = tx.require("RouteSheet", sheet_id).await?;
        let views = stop_views_in(&mut tx, sheet_id).await?;
        let existing: Vec<Reconciliation> = tx.get_by_text_index("route_sheet_id", sheet_id).await?;

        let reconciliation = close(&sheet, &views, !existing.is_empty(), declared_cash, notes, now)?;
        complete_sheet(&mut sheet, now)?;

        tx.put(&reconciliation).await?;
        tx.put(&sheet).await?;
        tx.commit().await?;

        info!(
            sheet_id = %sheet_id,
            expected = %reconciliation.expected,
            collected = %reconciliation.total_collected,
            difference = %reconciliation.difference,
            kind = %reconciliation.difference_kind,
            "Route reconciled"
        );
        Ok(reconciliation)
    }

    pub async fn pending(&self) -> DbResult<Vec<Reconciliation>> {
        self.store.pending().await
    }

    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        self.store.mark_synced::<Reconciliation>(id).await
    }
}
