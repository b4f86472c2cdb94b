//! # Sync Engine
//!
//! One full sync pass between the Local Store and a [`RemoteBackend`].
//!
//! ## Full Sync Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         full_sync()                                     │
//! │                                                                         │
//! │  0. probe (optional) ── fails ──► report { offline }, nothing touched  │
//! │                                                                         │
//! │  UPLOAD (local → remote)                                               │
//! │  1. orders          insert header, then each line into order_lines     │
//! │  2. collections     insert                                             │
//! │  3. route work      sheets (update), stops (update), payments,         │
//! │                     returns, reconciliations (insert)                  │
//! │     accepted ──► mark synced      rejected ──► stays pending           │
//! │     Conflict on insert counts as accepted (retry after partial upload) │
//! │                                                                         │
//! │  DOWNLOAD (remote → local)                                             │
//! │  4. clients, products, markup rules                                    │
//! │     fetch all ── ok ──► clear + refill (synced = true)                 │
//! │               └─ err ─► local collection untouched                     │
//! │  5. open route sheets of the user, with stops and orders               │
//! │     (a sheet already on the device is kept as is)                      │
//! │                                                                         │
//! │  6. no errors ──► record last_sync                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step runs even when an earlier one failed. `errors` carries one
//! message per failing step; `failures` lists the individual records.

use chrono::{DateTime, Utc};
use preventa_core::{
    Client, Collection, Order, PriceListMarkupRule, Product, Reconciliation, RouteSheet,
    RouteSheetStatus, RouteStop, StopPayment, StopReturn,
};
use preventa_db::{Database, SyncOverview, SyncTracked};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{RemoteResult, SyncError, SyncResult};
use crate::remote::{collections, Filter, RemoteBackend};

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Route sheets are downloaded for this user. `None` skips them.
    pub user_id: Option<String>,

    /// Check reachability before touching anything.
    pub probe_before_sync: bool,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        SyncOptions {
            user_id: config.user_id().map(str::to_string),
            probe_before_sync: config.sync.probe_before_sync,
        }
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCounts {
    pub clients: usize,
    pub products: usize,
    pub markups: usize,
    pub route_sheets: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    pub orders: usize,
    pub collections: usize,
    /// Sheets, stops, payments, returns and reconciliations.
    pub route_items: usize,
}

impl UploadCounts {
    pub fn total(&self) -> usize {
        self.orders + self.collections + self.route_items
    }
}

/// A record that could not be uploaded or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub kind: String,
    pub id: String,
    pub message: String,
}

/// Outcome of one [`SyncEngine::full_sync`] pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// No step failed and the backend was reachable.
    pub success: bool,

    /// The probe failed; nothing was uploaded or downloaded.
    pub offline: bool,

    pub downloaded: DownloadCounts,
    pub uploaded: UploadCounts,

    /// One message per failing step.
    pub errors: Vec<String>,

    pub failures: Vec<RecordFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn begin(started_at: DateTime<Utc>) -> Self {
        SyncReport {
            success: false,
            offline: false,
            downloaded: DownloadCounts::default(),
            uploaded: UploadCounts::default(),
            errors: Vec::new(),
            failures: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    fn error(&mut self, message: String) {
        warn!(error = %message, "Sync step failed");
        self.errors.push(message);
    }

    fn fail(&mut self, kind: &str, id: &str, err: &dyn Display) {
        warn!(kind, id, error = %err, "Record not synced");
        self.failures.push(RecordFailure {
            kind: kind.to_string(),
            id: id.to_string(),
            message: err.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.success = !self.offline && self.errors.is_empty();
        self
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        if self.offline {
            return "offline: backend unreachable".to_string();
        }
        format!(
            "{}: uploaded {} orders, {} collections, {} route items; downloaded {} clients, {} products, {} markups, {} route sheets; {} errors",
            if self.success { "ok" } else { "failed" },
            self.uploaded.orders,
            self.uploaded.collections,
            self.uploaded.route_items,
            self.downloaded.clients,
            self.downloaded.products,
            self.downloaded.markups,
            self.downloaded.route_sheets,
            self.errors.len(),
        )
    }
}

// =============================================================================
// Record helpers
// =============================================================================

/// How a pending record reaches the backend.
#[derive(Clone, Copy)]
enum Push {
    /// Created on the device.
    Insert(&'static str),

    /// Created remotely; only the listed fields change on the device.
    Update(&'static str, &'static [&'static str]),
}

const SHEET_FIELDS: &[&str] = &["status", "started_at", "completed_at", "notes"];

const STOP_FIELDS: &[&str] = &[
    "status",
    "arrived_at",
    "departed_at",
    "signature_ref",
    "photo_ref",
    "notes",
];

/// JSON body of a record as the backend stores it (no local sync flag).
fn remote_record<T: Serialize>(record: &T) -> SyncResult<Value> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove("synced");
    }
    Ok(value)
}

fn patch_of(value: Value, fields: &[&str]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    map.retain(|key, _| fields.contains(&key.as_str()));
    Value::Object(map)
}

/// A duplicate id means an earlier attempt already got through.
fn accept_existing(result: RemoteResult<()>) -> RemoteResult<()> {
    match result {
        Err(err) if err.is_conflict() => {
            debug!(%err, "Already on backend");
            Ok(())
        }
        other => other,
    }
}

/// Count of stored records, or 0 with the step's error reported.
fn settle(report: &mut SyncReport, collection: &str, outcome: SyncResult<usize>) -> usize {
    match outcome {
        Ok(count) => {
            debug!(collection, count, "Reference data replaced");
            count
        }
        Err(err) => {
            report.error(format!("Downloading {collection} failed: {err}"));
            0
        }
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> SyncResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(SyncError::from))
        .collect()
}

// =============================================================================
// Engine
// =============================================================================

/// Runs full sync passes for one device.
pub struct SyncEngine<R> {
    db: Database,
    remote: Arc<R>,
    options: SyncOptions,
}

impl<R: RemoteBackend> SyncEngine<R> {
    pub fn new(db: Database, remote: Arc<R>, options: SyncOptions) -> Self {
        SyncEngine { db, remote, options }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Pending counts and last sync, for status displays.
    pub async fn overview(&self) -> SyncResult<SyncOverview> {
        Ok(self.db.sync_state().overview().await?)
    }

    /// Uploads pending local work, then refreshes reference data and routes.
    pub async fn full_sync(&self) -> SyncReport {
        let mut report = SyncReport::begin(Utc::now());

        if self.options.probe_before_sync {
            if let Err(err) = self.remote.probe().await {
                warn!(%err, "Backend unreachable, sync skipped");
                report.offline = true;
                report.errors.push(format!("Backend unreachable: {err}"));
                return report.finish();
            }
        }

        info!("Full sync started");

        self.upload_orders(&mut report).await;
        self.upload_collections(&mut report).await;
        self.upload_route_work(&mut report).await;

        self.download_clients(&mut report).await;
        self.download_products(&mut report).await;
        self.download_markups(&mut report).await;
        self.download_route_sheets(&mut report).await;

        if report.errors.is_empty() {
            if let Err(err) = self.db.sync_state().record_sync(Utc::now()).await {
                report.error(format!("Recording last sync failed: {err}"));
            }
        }

        let report = report.finish();
        info!(
            success = report.success,
            uploaded = report.uploaded.total(),
            failures = report.failures.len(),
            "{}",
            report.summary()
        );
        report
    }

    // -------------------------------------------------------------------------
    // Upload
    // -------------------------------------------------------------------------

    async fn upload_orders(&self, report: &mut SyncReport) {
        let pending = match self.db.orders().pending().await {
            Ok(orders) => orders,
            Err(err) => return report.error(format!("Reading pending orders failed: {err}")),
        };

        let total = pending.len();
        let mut failed = 0;

        for order in pending {
            let outcome = match self.push_order(&order).await {
                Ok(()) => self
                    .db
                    .orders()
                    .mark_synced_if_unchanged(&order)
                    .await
                    .map_err(SyncError::from),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(_) => report.uploaded.orders += 1,
                Err(err) => {
                    failed += 1;
                    report.fail("order", &order.id, &err);
                }
            }
        }

        if failed > 0 {
            report.error(format!("{failed} of {total} orders not uploaded"));
        }
    }

    /// Header first, then the lines, so the backend never holds orphan lines.
    async fn push_order(&self, order: &Order) -> SyncResult<()> {
        let mut header = remote_record(order)?;
        if let Value::Object(map) = &mut header {
            map.remove("lines");
        }
        accept_existing(self.remote.insert(collections::ORDERS, header).await)?;

        for line in &order.lines {
            let mut value = serde_json::to_value(line)?;
            if let Value::Object(map) = &mut value {
                map.insert("order_id".into(), Value::from(order.id.as_str()));
            }
            accept_existing(self.remote.insert(collections::ORDER_LINES, value).await)?;
        }

        Ok(())
    }

    async fn upload_collections(&self, report: &mut SyncReport) {
        match self.db.collections().pending().await {
            Ok(pending) => {
                report.uploaded.collections += self
                    .upload_all::<Collection>("collection", pending, Push::Insert(collections::COLLECTIONS), report)
                    .await;
            }
            Err(err) => report.error(format!("Reading pending collections failed: {err}")),
        }
    }

    async fn upload_route_work(&self, report: &mut SyncReport) {
        let work = match self.db.routes().pending_work().await {
            Ok(work) => work,
            Err(err) => return report.error(format!("Reading pending route work failed: {err}")),
        };

        let mut uploaded = 0;
        uploaded += self
            .upload_all::<RouteSheet>(
                "route sheet",
                work.sheets,
                Push::Update(collections::ROUTE_SHEETS, SHEET_FIELDS),
                report,
            )
            .await;
        uploaded += self
            .upload_all::<RouteStop>(
                "route stop",
                work.stops,
                Push::Update(collections::ROUTE_STOPS, STOP_FIELDS),
                report,
            )
            .await;
        uploaded += self
            .upload_all::<StopPayment>("payment", work.payments, Push::Insert(collections::STOP_PAYMENTS), report)
            .await;
        uploaded += self
            .upload_all::<StopReturn>("return", work.returns, Push::Insert(collections::STOP_RETURNS), report)
            .await;

        match self.db.reconciliations().pending().await {
            Ok(pending) => {
                uploaded += self
                    .upload_all::<Reconciliation>(
                        "reconciliation",
                        pending,
                        Push::Insert(collections::RECONCILIATIONS),
                        report,
                    )
                    .await;
            }
            Err(err) => report.error(format!("Reading pending reconciliations failed: {err}")),
        }

        report.uploaded.route_items += uploaded;
    }

    /// Pushes each record and marks it synced once accepted. Returns how
    /// many were accepted; one error is reported for the batch if any failed.
    async fn upload_all<T: SyncTracked>(
        &self,
        kind: &'static str,
        records: Vec<T>,
        push: Push,
        report: &mut SyncReport,
    ) -> usize {
        let total = records.len();
        let mut accepted = 0;

        for record in records {
            match self.push_record(&record, push).await {
                Ok(()) => accepted += 1,
                Err(err) => report.fail(kind, record.id(), &err),
            }
        }

        if accepted < total {
            report.error(format!("{} of {total} {kind} records not uploaded", total - accepted));
        }
        accepted
    }

    async fn push_record<T: SyncTracked>(&self, record: &T, push: Push) -> SyncResult<()> {
        let value = remote_record(record)?;

        match push {
            Push::Insert(collection) => {
                accept_existing(self.remote.insert(collection, value).await)?;
            }
            Push::Update(collection, fields) => {
                self.remote
                    .update(collection, record.id(), patch_of(value, fields))
                    .await?;
            }
        }

        // An edit made while the upload was in flight keeps the record
        // pending; the newer version goes up with the next sync.
        if !self.db.store().mark_synced_if_unchanged(record).await? {
            debug!(collection = T::COLLECTION, id = %record.id(), "Left pending after local edit");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Download
    // -------------------------------------------------------------------------

    /// Replaces the local clients with the backend's full set. A failed
    /// fetch leaves the local collection as it was; so do the other
    /// reference downloads.
    async fn download_clients(&self, report: &mut SyncReport) {
        let outcome = match self.fetch::<Client>(collections::CLIENTS, &Filter::all()).await {
            Ok(clients) => self.db.clients().mirror(clients).await.map_err(SyncError::from),
            Err(err) => Err(err),
        };
        let count = settle(report, collections::CLIENTS, outcome);
        report.downloaded.clients = count;
    }

    async fn download_products(&self, report: &mut SyncReport) {
        let outcome = match self.fetch::<Product>(collections::PRODUCTS, &Filter::all()).await {
            Ok(products) => self.db.products().mirror(products).await.map_err(SyncError::from),
            Err(err) => Err(err),
        };
        let count = settle(report, collections::PRODUCTS, outcome);
        report.downloaded.products = count;
    }

    async fn download_markups(&self, report: &mut SyncReport) {
        let outcome = match self
            .fetch::<PriceListMarkupRule>(collections::MARKUPS, &Filter::all())
            .await
        {
            Ok(rules) => self.db.markups().mirror(rules).await.map_err(SyncError::from),
            Err(err) => Err(err),
        };
        let count = settle(report, collections::MARKUPS, outcome);
        report.downloaded.markups = count;
    }

    async fn fetch<T: DeserializeOwned>(&self, collection: &str, filter: &Filter) -> SyncResult<Vec<T>> {
        let rows = self.remote.select(collection, filter).await?;
        decode_all(rows)
    }

    async fn download_route_sheets(&self, report: &mut SyncReport) {
        let Some(user_id) = self.options.user_id.as_deref() else {
            debug!("No user configured, route sheets skipped");
            return;
        };

        let filter = Filter::all()
            .eq("user_id", user_id)
            .any_of("status", RouteSheetStatus::OPEN.iter().map(|s| s.as_str()));

        let sheets: Vec<RouteSheet> = match self.fetch(collections::ROUTE_SHEETS, &filter).await {
            Ok(sheets) => sheets,
            Err(err) => return report.error(format!("Downloading route sheets failed: {err}")),
        };

        let total = sheets.len();
        let mut failed = 0;

        for sheet in sheets {
            let id = sheet.id.clone();
            match self.download_sheet(sheet).await {
                Ok(true) => report.downloaded.route_sheets += 1,
                Ok(false) => {}
                Err(err) => {
                    failed += 1;
                    report.fail("route sheet", &id, &err);
                }
            }
        }

        if failed > 0 {
            report.error(format!("{failed} of {total} route sheets not downloaded"));
        }
    }

    /// Stores one sheet with its stops and their orders. Local route work is
    /// authoritative until uploaded, so a sheet already present is skipped.
    async fn download_sheet(&self, sheet: RouteSheet) -> SyncResult<bool> {
        if self.db.store().get::<RouteSheet>(&sheet.id).await?.is_some() {
            debug!(sheet_id = %sheet.id, "Route sheet already on device");
            return Ok(false);
        }

        let stops: Vec<RouteStop> = self
            .fetch(
                collections::ROUTE_STOPS,
                &Filter::all().eq("route_sheet_id", sheet.id.as_str()),
            )
            .await?;

        let order_ids: Vec<&str> = stops.iter().map(|s| s.order_id.as_str()).collect();
        let orders = self.fetch_orders(&order_ids).await?;

        Ok(self.db.routes().insert_if_absent(sheet, stops, orders).await?)
    }

    /// Orders with their lines reattached from `order_lines`.
    async fn fetch_orders(&self, ids: &[&str]) -> SyncResult<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let headers = self
            .remote
            .select(collections::ORDERS, &Filter::all().any_of("id", ids.iter().copied()))
            .await?;
        let lines = self
            .remote
            .select(
                collections::ORDER_LINES,
                &Filter::all().any_of("order_id", ids.iter().copied()),
            )
            .await?;

        let mut lines_by_order: HashMap<String, Vec<Value>> = HashMap::new();
        for line in lines {
            if let Some(order_id) = line.get("order_id").and_then(Value::as_str) {
                lines_by_order
                    .entry(order_id.to_string())
                    .or_default()
                    .push(line);
            }
        }

        let mut orders = Vec::with_capacity(headers.len());
        for mut header in headers {
            if let Value::Object(map) = &mut header {
                if !map.contains_key("lines") {
                    let id = map.get("id").and_then(Value::as_str).unwrap_or_default();
                    let lines = lines_by_order.remove(id).unwrap_or_default();
                    map.insert("lines".into(), Value::Array(lines));
                }
            }
            orders.push(serde_json::from_value(header)?);
        }
        Ok(orders)
    }
}
