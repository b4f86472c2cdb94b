//! # Route Service
//!
//! Driver-side access to route sheets, stops, payments and returns.
//!
//! ## Stop Views
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stop_views(sheet_id)                                                   │
//! │                                                                         │
//! │  route_stops[route_sheet_id]  ──sorted by rank──┐                       │
//! │                                                 ▼                       │
//! │  for each stop:  orders[order_id]          ──► StopView.order           │
//! │                  stop_payments[stop_id]    ──► StopView.payments        │
//! │                  stop_returns[stop_id]     ──► StopView.returns         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation checks the owning sheet inside the same transaction that
//! writes; a completed or cancelled sheet rejects it with `RouteClosed`.

use chrono::{DateTime, NaiveDate, Utc};
use preventa_core::route::{
    ensure_open, start_sheet, update_stop, NewStopPayment, NewStopReturn, RouteProgress,
    StopUpdate,
};
use preventa_core::{
    DeliveryStatus, Order, RouteSheet, RouteStop, StopPayment, StopReturn, StopView,
};
use tracing::{debug, info};

use crate::error::DbResult;
use crate::store::{LocalStore, StoreTx};

/// Route records waiting for upload.
#[derive(Debug, Clone, Default)]
pub struct PendingRouteWork {
    pub sheets: Vec<RouteSheet>,
    pub stops: Vec<RouteStop>,
    pub payments: Vec<StopPayment>,
    pub returns: Vec<StopReturn>,
}

impl PendingRouteWork {
    pub fn len(&self) -> usize {
        self.sheets.len() + self.stops.len() + self.payments.len() + self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct RouteService {
    store: LocalStore,
}

impl RouteService {
    pub fn new(store: LocalStore) -> Self {
        RouteService { store }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn sheet(&self, sheet_id: &str) -> DbResult<RouteSheet> {
        self.store.require("RouteSheet", sheet_id).await
    }

    /// Sheets assigned to a user, newest date first.
    pub async fn sheets_for_user(&self, user_id: &str) -> DbResult<Vec<RouteSheet>> {
        let mut sheets: Vec<RouteSheet> = self.store.get_by_index("user_id", user_id).await?;
        sheets.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(sheets)
    }

    /// The user's sheet for a day that is still pending or in progress.
    pub async fn active_sheet(&self, user_id: &str, date: NaiveDate) -> DbResult<Option<RouteSheet>> {
        let sheets = self.sheets_for_user(user_id).await?;
        Ok(sheets
            .into_iter()
            .find(|s| s.date == date && !s.status.is_closed()))
    }

    /// Stops of a sheet in visit order.
    pub async fn stops(&self, sheet_id: &str) -> DbResult<Vec<RouteStop>> {
        let mut stops: Vec<RouteStop> = self.store.get_by_index("route_sheet_id", sheet_id).await?;
        stops.sort_by_key(|s| s.rank);
        Ok(stops)
    }

    /// Views of every stop of a sheet, in visit order, read as one snapshot.
    pub async fn stop_views(&self, sheet_id: &str) -> DbResult<Vec<StopView>> {
        let mut tx = self.store.begin().await?;
        let views = stop_views_in(&mut tx, sheet_id).await?;
        tx.commit().await?;
        Ok(views)
    }

    pub async fn stop_view(&self, stop_id: &str) -> DbResult<StopView> {
        let mut tx = self.store.begin().await?;
        let stop: RouteStop = tx.require("RouteStop", stop_id).await?;
        let view = view_in(&mut tx, stop).await?;
        tx.commit().await?;
        Ok(view)
    }

    pub async fn progress(&self, sheet_id: &str) -> DbResult<RouteProgress> {
        let views = self.stop_views(sheet_id).await?;
        Ok(RouteProgress::from_views(&views))
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Starts a pending sheet. Starting an in-progress sheet changes nothing.
    pub async fn start_route(&self, sheet_id: &str, now: DateTime<Utc>) -> DbResult<RouteSheet> {
        let mut tx = self.store.begin().await?;
        let mut sheet: RouteSheet = tx.require("RouteSheet", sheet_id).await?;
        if start_sheet(&mut sheet, now)? {
            tx.put(&sheet).await?;
            tx.commit().await?;
            info!(sheet_id = %sheet_id, "Route started");
        }
        Ok(sheet)
    }

    /// Changes the delivery status of a stop.
    pub async fn update_stop_status(
        &self,
        stop_id: &str,
        status: DeliveryStatus,
        update: StopUpdate,
        now: DateTime<Utc>,
    ) -> DbResult<RouteStop> {
        let mut tx = self.store.begin().await?;
        let mut stop = open_stop(&mut tx, stop_id).await?;

        let from = stop.status;
        update_stop(&mut stop, status, update, now)?;
        tx.put(&stop).await?;
        tx.commit().await?;

        info!(stop_id = %stop_id, from = %from, to = %status, "Stop status changed");
        Ok(stop)
    }

    /// Registers a payment collected at a stop. The stop status is unchanged.
    pub async fn register_payment(
        &self,
        input: NewStopPayment,
        now: DateTime<Utc>,
    ) -> DbResult<StopPayment> {
        let mut tx = self.store.begin().await?;
        open_stop(&mut tx, &input.stop_id).await?;

        let payment = input.into_payment(now)?;
        tx.put(&payment).await?;
        tx.commit().await?;

        info!(
            stop_id = %payment.stop_id,
            amount = %payment.amount,
            method = %payment.method,
            "Stop payment registered"
        );
        Ok(payment)
    }

    /// Registers goods returned at a stop. The stop status is unchanged.
    pub async fn register_return(
        &self,
        input: NewStopReturn,
        now: DateTime<Utc>,
    ) -> DbResult<StopReturn> {
        let mut tx = self.store.begin().await?;
        open_stop(&mut tx, &input.stop_id).await?;

        let ret = input.into_return(now)?;
        tx.put(&ret).await?;
        tx.commit().await?;

        info!(
            stop_id = %ret.stop_id,
            product_id = %ret.product_id,
            quantity = ret.quantity,
            reason = %ret.reason,
            "Stop return registered"
        );
        Ok(ret)
    }

    // -------------------------------------------------------------------------
    // Sync support
    // -------------------------------------------------------------------------

    /// Route records with local changes not yet uploaded.
    pub async fn pending_work(&self) -> DbResult<PendingRouteWork> {
        Ok(PendingRouteWork {
            sheets: self.store.pending().await?,
            stops: self.store.pending().await?,
            payments: self.store.pending().await?,
            returns: self.store.pending().await?,
        })
    }

    /// Stores a downloaded sheet with its stops and orders, unless the sheet
    /// is already on the device. Returns true when it was inserted.
    ///
    /// Orders already present locally are kept as they are.
    pub async fn insert_if_absent(
        &self,
        mut sheet: RouteSheet,
        stops: Vec<RouteStop>,
        orders: Vec<Order>,
    ) -> DbResult<bool> {
        let mut tx = self.store.begin().await?;

        if tx.exists::<RouteSheet>(&sheet.id).await? {
            debug!(sheet_id = %sheet.id, "Route sheet already on device, skipped");
            return Ok(false);
        }

        sheet.synced = true;
        tx.put(&sheet).await?;

        for mut stop in stops {
            stop.synced = true;
            tx.put(&stop).await?;
        }

        for mut order in orders {
            if tx.exists::<Order>(&order.id).await? {
                continue;
            }
            order.synced = true;
            tx.put(&order).await?;
        }

        tx.commit().await?;
        info!(sheet_id = %sheet.id, date = %sheet.date, "Route sheet downloaded");
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

/// Loads a stop inside `tx`, failing with `RouteClosed` when its sheet is
/// completed or cancelled.
async fn open_stop(tx: &mut StoreTx, stop_id: &str) -> DbResult<RouteStop> {
    let stop: RouteStop = tx.require("RouteStop", stop_id).await?;
    let sheet: RouteSheet = tx.require("RouteSheet", &stop.route_sheet_id).await?;
    ensure_open(&sheet)?;
    Ok(stop)
}

/// Views of every stop of a sheet, read inside `tx`.
pub(crate) async fn stop_views_in(tx: &mut StoreTx, sheet_id: &str) -> DbResult<Vec<StopView>> {
    let mut stops: Vec<RouteStop> = tx.get_by_text_index("route_sheet_id", sheet_id).await?;
    stops.sort_by_key(|s| s.rank);

    let mut views = Vec::with_capacity(stops.len());
    for stop in stops {
        views.push(view_in(tx, stop).await?);
    }
    Ok(views)
}

async fn view_in(tx: &mut StoreTx, stop: RouteStop) -> DbResult<StopView> {
    let order: Option<Order> = tx.get(&stop.order_id).await?;
    let mut payments: Vec<StopPayment> = tx.get_by_text_index("stop_id", &stop.id).await?;
    payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let mut returns: Vec<StopReturn> = tx.get_by_text_index("stop_id", &stop.id).await?;
    returns.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(StopView {
        stop,
        order,
        payments,
        returns,
    })
}
