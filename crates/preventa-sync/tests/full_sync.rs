//! Full sync against the in-memory backend.

use chrono::{NaiveDate, Utc};
use preventa_core::route::{NewStopPayment, StopUpdate};
use preventa_core::{
    Client, DeliveryStatus, DifferenceKind, Money, Order, OrderLine, OrderStatus, PaymentMethod,
    Product, RouteSheet, RouteSheetStatus,
};
use preventa_db::{Database, DbConfig};
use preventa_sync::remote::collections;
use preventa_sync::{Filter, MemoryRemote, RemoteBackend, RemoteResult, SyncEngine, SyncOptions};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

async fn setup(user_id: Option<&str>) -> (Database, Arc<MemoryRemote>, SyncEngine<MemoryRemote>) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(MemoryRemote::new());
    let engine = SyncEngine::new(
        db.clone(),
        remote.clone(),
        SyncOptions {
            user_id: user_id.map(str::to_string),
            probe_before_sync: true,
        },
    );
    (db, remote, engine)
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn order(id: &str, prices: &[(&str, i64)]) -> Order {
    let lines: Vec<OrderLine> = prices
        .iter()
        .enumerate()
        .map(|(i, (price, qty))| OrderLine::new(format!("{id}-l{i}"), format!("p{i}"), "Producto", *qty, money(price)).unwrap())
        .collect();
    let total = lines.iter().map(|l| l.subtotal).sum();
    Order {
        id: id.into(),
        client_id: "c1".into(),
        client_name: "Almacén Don Pepe".into(),
        lines,
        total,
        status: OrderStatus::Pending,
        notes: None,
        created_at: Utc::now(),
        synced: false,
    }
}

fn client(id: &str, code: &str) -> Client {
    Client {
        id: id.into(),
        code: code.into(),
        name: format!("Cliente {code}"),
        address: None,
        phone: None,
        email: None,
        credit_limit: Money::zero(),
        balance: Money::zero(),
        fiscal_condition: None,
        price_list_id: None,
        latitude: None,
        longitude: None,
        route_rank: None,
        synced: false,
        updated_at: Utc::now(),
    }
}

fn client_json(id: &str, code: &str) -> Value {
    serde_json::to_value(client(id, code)).unwrap()
}

fn product_json(id: &str, code: &str, cost: i64) -> Value {
    serde_json::to_value(Product {
        id: id.into(),
        code: code.into(),
        name: format!("Producto {code}"),
        description: None,
        cost_price: Money::from_units(cost),
        sale_price: Money::from_units(cost),
        stock: 5,
        category: None,
        brand_id: None,
        product_type_id: None,
        image_url: None,
        synced: false,
        updated_at: Utc::now(),
    })
    .unwrap()
}

fn sheet_json(id: &str, user_id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "date": "2024-05-10",
        "status": status,
        "notes": null,
        "started_at": null,
        "completed_at": null,
    })
}

fn stop_json(id: &str, sheet_id: &str, order_id: &str, rank: i64) -> Value {
    json!({
        "id": id,
        "route_sheet_id": sheet_id,
        "order_id": order_id,
        "rank": rank,
        "status": "pendiente",
        "arrived_at": null,
        "departed_at": null,
        "signature_ref": null,
        "photo_ref": null,
        "notes": null,
    })
}

/// Seeds the backend with sheet `hr-1` for `chofer-01`: two stops, two
/// orders stored the way the engine uploads them (header + order_lines).
async fn seed_route(remote: &MemoryRemote) {
    remote
        .seed(
            collections::ROUTE_SHEETS,
            vec![
                sheet_json("hr-1", "chofer-01", "pendiente"),
                sheet_json("hr-old", "chofer-01", "completada"),
                sheet_json("hr-other", "chofer-02", "pendiente"),
            ],
        )
        .await;
    remote
        .seed(
            collections::ROUTE_STOPS,
            vec![
                stop_json("s-1", "hr-1", "o-10", 1),
                stop_json("s-2", "hr-1", "o-11", 2),
                stop_json("s-9", "hr-other", "o-99", 1),
            ],
        )
        .await;
    remote
        .seed(
            collections::ORDERS,
            vec![
                json!({"id": "o-10", "client_id": "c1", "client_name": "Kiosco", "total": "100.00",
                       "status": "procesado", "notes": null, "created_at": "2024-05-09T12:00:00Z"}),
                json!({"id": "o-11", "client_id": "c2", "client_name": "Almacén", "total": "50.00",
                       "status": "procesado", "notes": null, "created_at": "2024-05-09T12:30:00Z"}),
            ],
        )
        .await;
    remote
        .seed(
            collections::ORDER_LINES,
            vec![
                json!({"id": "l-1", "order_id": "o-10", "product_id": "p1", "product_name": "Yerba",
                       "quantity": 2, "unit_price": "50.00", "subtotal": "100.00"}),
                json!({"id": "l-2", "order_id": "o-11", "product_id": "p2", "product_name": "Azúcar",
                       "quantity": 1, "unit_price": "50.00", "subtotal": "50.00"}),
            ],
        )
        .await;
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_marks_orders_synced() {
    let (db, remote, engine) = setup(None).await;
    db.orders().create(order("o-1", &[("10.00", 2), ("5.50", 1)])).await.unwrap();
    db.orders().create(order("o-2", &[("35", 1)])).await.unwrap();

    let report = engine.full_sync().await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.uploaded.orders, 2);
    assert_eq!(remote.records(collections::ORDERS).await.len(), 2);
    assert_eq!(remote.records(collections::ORDER_LINES).await.len(), 3);

    let header = remote.find(collections::ORDERS, "o-1").await.unwrap();
    assert!(header.get("lines").is_none());
    assert!(header.get("synced").is_none());

    let stored = db.orders().get_by_id("o-1").await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Synced);
    assert!(stored.synced);
    assert_eq!(db.orders().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_second_sync_uploads_nothing() {
    let (db, remote, engine) = setup(None).await;
    db.orders().create(order("o-1", &[("35", 1)])).await.unwrap();

    assert!(engine.full_sync().await.success);
    let writes = remote.write_count().await;

    let report = engine.full_sync().await;
    assert!(report.success);
    assert_eq!(report.uploaded.total(), 0);
    assert_eq!(remote.write_count().await, writes);
}

#[tokio::test]
async fn test_retry_after_partial_upload_is_accepted() {
    let (db, remote, engine) = setup(None).await;
    db.orders().create(order("o-1", &[("20", 1)])).await.unwrap();

    // An earlier attempt got the header through but died before marking.
    remote
        .seed(collections::ORDERS, vec![json!({"id": "o-1", "total": "20.00"})])
        .await;

    let report = engine.full_sync().await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.uploaded.orders, 1);
    assert_eq!(remote.records(collections::ORDERS).await.len(), 1);
    assert_eq!(remote.records(collections::ORDER_LINES).await.len(), 1);
    assert!(db.orders().get_by_id("o-1").await.unwrap().unwrap().synced);
}

#[tokio::test]
async fn test_one_failing_upload() {
    let (db, remote, engine) = setup(None).await;

    // A clean sync first, so there is a previous timestamp to keep.
    assert!(engine.full_sync().await.success);
    let previous = db.sync_state().last_sync().await.unwrap();
    assert!(previous.is_some());

    db.orders().create(order("o-1", &[("10", 1)])).await.unwrap();
    db.orders().create(order("o-2", &[("20", 1)])).await.unwrap();
    remote.reject_record(collections::ORDERS, "o-2").await;

    let report = engine.full_sync().await;

    assert!(!report.success);
    assert!(!report.offline);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, "o-2");
    assert_eq!(report.uploaded.orders, 1);

    let rejected = db.orders().get_by_id("o-2").await.unwrap().unwrap();
    assert!(!rejected.synced);
    assert_eq!(rejected.status, OrderStatus::Pending);
    assert!(db.orders().get_by_id("o-1").await.unwrap().unwrap().synced);

    assert_eq!(db.sync_state().last_sync().await.unwrap(), previous);
}

#[tokio::test]
async fn test_collections_uploaded_after_orders() {
    let (db, remote, engine) = setup(None).await;
    db.orders().create(order("o-1", &[("10", 1)])).await.unwrap();
    db.collections()
        .create(
            preventa_core::NewCollection {
                client_id: "c1".into(),
                client_name: Some("Kiosco".into()),
                amount: money("1500.00"),
                method: preventa_core::CollectionMethod::Cash,
                reference: None,
                notes: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let report = engine.full_sync().await;
    assert!(report.success);
    assert_eq!(report.uploaded.collections, 1);
    assert_eq!(db.collections().count_pending().await.unwrap(), 0);

    let inserts: Vec<String> = remote
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            preventa_sync::remote::memory::RemoteCall::Insert(collection, _) => Some(collection),
            _ => None,
        })
        .collect();
    assert_eq!(inserts, vec!["orders", "order_lines", "collections"]);
}

// =============================================================================
// Probe
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_touches_nothing() {
    let (db, remote, engine) = setup(Some("chofer-01")).await;
    db.orders().create(order("o-1", &[("10", 1)])).await.unwrap();
    db.clients().mirror(vec![client("a", "A")]).await.unwrap();
    remote.set_offline(true).await;

    let report = engine.full_sync().await;

    assert!(report.offline);
    assert!(!report.success);
    assert_eq!(report.uploaded.total(), 0);
    assert_eq!(remote.write_count().await, 0);
    assert_eq!(db.orders().count_pending().await.unwrap(), 1);
    assert_eq!(db.clients().count().await.unwrap(), 1);
    assert!(db.sync_state().last_sync().await.unwrap().is_none());
}

// =============================================================================
// Download
// =============================================================================

#[tokio::test]
async fn test_download_replaces_reference_data() {
    let (db, remote, engine) = setup(None).await;
    db.clients().mirror(vec![client("a", "A")]).await.unwrap();
    remote
        .seed(collections::CLIENTS, vec![client_json("b", "B"), client_json("c", "C")])
        .await;

    let report = engine.full_sync().await;

    assert!(report.success);
    assert_eq!(report.downloaded.clients, 2);

    let mut ids: Vec<String> = db.clients().list().await.unwrap().into_iter().map(|c| c.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["b", "c"]);
    assert!(db.clients().get_by_id("b").await.unwrap().unwrap().synced);
}

#[tokio::test]
async fn test_failed_fetch_leaves_local_collection() {
    let (db, remote, engine) = setup(None).await;
    db.products()
        .mirror(vec![serde_json::from_value(product_json("p-local", "LOC", 10)).unwrap()])
        .await
        .unwrap();
    remote.seed(collections::CLIENTS, vec![client_json("b", "B")]).await;
    remote
        .seed(collections::PRODUCTS, vec![product_json("p-remote", "REM", 20)])
        .await;
    remote.fail_selects(collections::PRODUCTS).await;

    let report = engine.full_sync().await;

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("products"));

    // Clients still came down; products stayed as they were.
    assert_eq!(report.downloaded.clients, 1);
    assert!(db.products().get_by_id("p-local").await.unwrap().is_some());
    assert!(db.products().get_by_id("p-remote").await.unwrap().is_none());
    assert!(db.sync_state().last_sync().await.unwrap().is_none());
}

#[tokio::test]
async fn test_downloads_open_route_sheets_for_user() {
    let (db, remote, engine) = setup(Some("chofer-01")).await;
    seed_route(&remote).await;

    let report = engine.full_sync().await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.downloaded.route_sheets, 1);

    let sheets = db.routes().sheets_for_user("chofer-01").await.unwrap();
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].id, "hr-1");
    assert!(db.routes().sheets_for_user("chofer-02").await.unwrap().is_empty());

    let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
    let active = db.routes().active_sheet("chofer-01", date).await.unwrap().unwrap();
    assert_eq!(active.status, RouteSheetStatus::Pending);

    let views = db.routes().stop_views("hr-1").await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].stop.id, "s-1");
    let first_order = views[0].order.as_ref().unwrap();
    assert_eq!(first_order.lines.len(), 1);
    assert_eq!(first_order.total, money("100"));
    assert!(first_order.has_consistent_totals());
}

#[tokio::test]
async fn test_local_route_sheet_is_not_overwritten() {
    let (db, remote, engine) = setup(Some("chofer-01")).await;
    seed_route(&remote).await;

    assert!(engine.full_sync().await.success);
    db.routes().start_route("hr-1", Utc::now()).await.unwrap();

    // The upload of the start is refused, so the local change stays pending.
    remote.reject_record(collections::ROUTE_SHEETS, "hr-1").await;
    let report = engine.full_sync().await;

    assert!(!report.success);
    assert_eq!(report.downloaded.route_sheets, 0);
    let sheet: RouteSheet = db.routes().sheet("hr-1").await.unwrap();
    assert_eq!(sheet.status, RouteSheetStatus::InProgress);
    assert!(!sheet.synced);
}

// =============================================================================
// Route work upload
// =============================================================================

#[tokio::test]
async fn test_route_work_and_reconciliation_upload() {
    let (db, remote, engine) = setup(Some("chofer-01")).await;
    seed_route(&remote).await;
    assert!(engine.full_sync().await.success);

    let now = Utc::now();
    let routes = db.routes();
    routes.start_route("hr-1", now).await.unwrap();
    routes
        .update_stop_status(
            "s-1",
            DeliveryStatus::Delivered,
            StopUpdate {
                signature_ref: Some("firma-s1.png".into()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
    routes
        .update_stop_status("s-2", DeliveryStatus::Refused, StopUpdate::default(), now)
        .await
        .unwrap();
    routes
        .register_payment(NewStopPayment::simple("s-1", money("100"), PaymentMethod::Cash), now)
        .await
        .unwrap();

    let closing = db
        .reconciliations()
        .close_route("hr-1", money("100"), None, now)
        .await
        .unwrap();
    assert_eq!(closing.difference_kind, DifferenceKind::None);

    let report = engine.full_sync().await;

    assert!(report.success, "errors: {:?}", report.errors);
    // sheet + 2 stops + 1 payment + 1 reconciliation
    assert_eq!(report.uploaded.route_items, 5);

    let sheet = remote.find(collections::ROUTE_SHEETS, "hr-1").await.unwrap();
    assert_eq!(sheet["status"], "completada");
    assert_eq!(sheet["user_id"], "chofer-01");

    let stop = remote.find(collections::ROUTE_STOPS, "s-1").await.unwrap();
    assert_eq!(stop["status"], "entregado");
    assert_eq!(stop["signature_ref"], "firma-s1.png");
    assert!(!stop["departed_at"].is_null());

    assert_eq!(remote.records(collections::STOP_PAYMENTS).await.len(), 1);
    let uploaded = remote.records(collections::RECONCILIATIONS).await;
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0]["route_sheet_id"], "hr-1");

    let overview = engine.overview().await.unwrap();
    assert!(overview.is_clean());
}

/// Backend that delivers stop `s-1` on the device while the upload of that
/// stop is in flight.
struct DeliverDuringUpload {
    inner: Arc<MemoryRemote>,
    db: Database,
    fired: AtomicBool,
}

impl RemoteBackend for DeliverDuringUpload {
    async fn select(&self, collection: &str, filter: &Filter) -> RemoteResult<Vec<Value>> {
        self.inner.select(collection, filter).await
    }

    async fn insert(&self, collection: &str, record: Value) -> RemoteResult<()> {
        self.inner.insert(collection, record).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> RemoteResult<()> {
        if collection == collections::ROUTE_STOPS && id == "s-1" && !self.fired.swap(true, Ordering::SeqCst) {
            self.db
                .routes()
                .update_stop_status("s-1", DeliveryStatus::Delivered, StopUpdate::default(), Utc::now())
                .await
                .unwrap();
        }
        self.inner.update(collection, id, patch).await
    }
}

#[tokio::test]
async fn test_edit_during_upload_stays_pending() {
    let (db, remote, engine) = setup(Some("chofer-01")).await;
    seed_route(&remote).await;
    assert!(engine.full_sync().await.success);

    let now = Utc::now();
    db.routes().start_route("hr-1", now).await.unwrap();
    db.routes()
        .update_stop_status("s-1", DeliveryStatus::InTransit, StopUpdate::default(), now)
        .await
        .unwrap();

    let interleaving = SyncEngine::new(
        db.clone(),
        Arc::new(DeliverDuringUpload {
            inner: remote.clone(),
            db: db.clone(),
            fired: AtomicBool::new(false),
        }),
        SyncOptions {
            user_id: Some("chofer-01".into()),
            probe_before_sync: true,
        },
    );

    let report = interleaving.full_sync().await;
    assert!(report.success, "errors: {:?}", report.errors);

    let stop = remote.find(collections::ROUTE_STOPS, "s-1").await.unwrap();
    assert_eq!(stop["status"], "en_camino");
    let local = db.routes().stop_view("s-1").await.unwrap().stop;
    assert_eq!(local.status, DeliveryStatus::Delivered);
    assert!(!local.synced);

    let report = interleaving.full_sync().await;
    assert!(report.success, "errors: {:?}", report.errors);

    let stop = remote.find(collections::ROUTE_STOPS, "s-1").await.unwrap();
    assert_eq!(stop["status"], "entregado");
    assert!(db.routes().stop_view("s-1").await.unwrap().stop.synced);
}
