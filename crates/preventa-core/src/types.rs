//! # Domain Types
//!
//! Core domain types shared by the Local Store, the Sync Engine and the
//! route/reconciliation logic.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  REFERENCE DATA (server-authoritative, mirrored on download)           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐            │
//! │  │   Client    │  │   Product   │  │ PriceListMarkupRule  │            │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘            │
//! │                                                                         │
//! │  CAPTURED OFFLINE (uploaded, sync flag false until accepted)           │
//! │  ┌─────────────┐  ┌─────────────┐                                      │
//! │  │    Order    │  │ Collection  │                                      │
//! │  │  └ lines    │  │ (cobranza)  │                                      │
//! │  └─────────────┘  └─────────────┘                                      │
//! │                                                                         │
//! │  DRIVER ROUTE (sheet + stops downloaded, changes uploaded)             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐  │
//! │  │ RouteSheet  │─►│  RouteStop  │─►│ StopPayment │  │Reconciliation│  │
//! │  │ (hoja ruta) │  │  (parada)   │─►│ StopReturn  │  │ (rendición)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Names
//! Enumerations serialize with the backend's own values (`pendiente`,
//! `en_camino`, `efectivo`, ...). Variant names stay in English.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::money::Money;
use crate::validation::{validate_notes, validate_positive_amount, validate_required};

/// Implements `as_str` and `Display` from the serde wire names.
macro_rules! wire_names {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Returns the wire name used by the backend and the store indexes.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// =============================================================================
// Client
// =============================================================================

/// A customer visited by sales reps and drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,

    /// Business identity code, unique across clients.
    pub code: String,

    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,

    #[serde(default)]
    pub credit_limit: Money,

    /// Running account balance.
    #[serde(default)]
    pub balance: Money,

    /// Tax condition (responsable inscripto, monotributo, ...).
    pub fiscal_condition: Option<String>,

    /// Price list that selects the markup rules for this client.
    pub price_list_id: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Visit order within the rep's route.
    pub route_rank: Option<i64>,

    #[serde(default)]
    pub synced: bool,

    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,

    /// Business identity code, unique across products.
    pub code: String,

    pub name: String,
    pub description: Option<String>,

    #[serde(default)]
    pub cost_price: Money,

    #[serde(default)]
    pub sale_price: Money,

    #[serde(default)]
    pub stock: i64,

    pub category: Option<String>,
    pub brand_id: Option<String>,
    pub product_type_id: Option<String>,
    pub image_url: Option<String>,

    #[serde(default)]
    pub synced: bool,

    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Price List Markup Rule
// =============================================================================

/// Percentage markup of a price list, scoped to a brand or a product type.
///
/// Rules carry one scope in practice. When both are set the brand wins
/// because the resolver checks brand rules first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListMarkupRule {
    pub id: String,
    pub price_list_id: String,
    pub brand_id: Option<String>,
    pub product_type_id: Option<String>,

    /// Markup percentage: `20` means cost × 1.20.
    pub percentage: Decimal,
}

impl PriceListMarkupRule {
    /// Returns true if this rule is scoped to the given brand.
    pub fn matches_brand(&self, brand_id: &str) -> bool {
        self.brand_id.as_deref() == Some(brand_id)
    }

    /// Returns true if this rule is scoped to the given product type.
    pub fn matches_product_type(&self, product_type_id: &str) -> bool {
        self.product_type_id.as_deref() == Some(product_type_id)
    }
}

// =============================================================================
// Order
// =============================================================================

/// Lifecycle of an order captured on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Captured offline, not yet accepted by the backend.
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    /// Accepted by the backend.
    #[serde(rename = "sincronizado")]
    Synced,
    /// Picked and invoiced at the warehouse.
    #[serde(rename = "procesado")]
    Processed,
    /// Handed to the client.
    #[serde(rename = "entregado")]
    Delivered,
}

wire_names!(OrderStatus {
    Pending => "pendiente",
    Synced => "sincronizado",
    Processed => "procesado",
    Delivered => "entregado",
});

/// One product line of an order. Uses the snapshot pattern: name and unit
/// price are frozen when the line is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Always `quantity × unit_price`.
    pub subtotal: Money,
}

impl OrderLine {
    /// Builds a line with its subtotal computed from quantity and price.
    pub fn new(
        id: impl Into<String>,
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i64,
        unit_price: Money,
    ) -> CoreResult<Self> {
        Ok(OrderLine {
            id: id.into(),
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal: unit_price.multiply_quantity(quantity)?,
        })
    }

    /// Recomputes `quantity × unit_price`; `None` if it overflows.
    pub fn computed_subtotal(&self) -> Option<Money> {
        self.unit_price.multiply_quantity(self.quantity).ok()
    }
}

/// A sales order (pedido).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_id: String,

    /// Denormalized for offline display.
    pub client_name: String,

    pub lines: Vec<OrderLine>,

    /// Always the sum of line subtotals.
    pub total: Money,

    #[serde(default)]
    pub status: OrderStatus,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,
}

impl Order {
    /// Sum of the recomputed line subtotals; `None` if a line overflows.
    pub fn computed_total(&self) -> Option<Money> {
        self.lines.iter().map(OrderLine::computed_subtotal).sum()
    }

    /// Returns true when every subtotal and the total match their inputs.
    pub fn has_consistent_totals(&self) -> bool {
        self.lines.iter().all(|l| l.computed_subtotal() == Some(l.subtotal))
            && self.computed_total() == Some(self.total)
    }
}

// =============================================================================
// Collection (cobranza)
// =============================================================================

/// Payment method for standalone collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionMethod {
    #[serde(rename = "efectivo")]
    Cash,
    #[serde(rename = "transferencia")]
    Transfer,
    #[serde(rename = "cheque")]
    Check,
}

wire_names!(CollectionMethod {
    Cash => "efectivo",
    Transfer => "transferencia",
    Check => "cheque",
});

/// A client payment not tied to a delivery route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub client_id: String,
    pub client_name: Option<String>,
    pub amount: Money,
    pub method: CollectionMethod,

    /// Transfer reference or check number.
    pub reference: Option<String>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,
}

/// Input for a standalone collection registered by a sales rep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    pub client_id: String,
    pub client_name: Option<String>,
    pub amount: Money,
    pub method: CollectionMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl NewCollection {
    /// Validates the input and builds an unsynced collection.
    pub fn into_collection(self, now: DateTime<Utc>) -> CoreResult<Collection> {
        validate_required("client_id", &self.client_id)?;
        validate_positive_amount("amount", self.amount)?;
        validate_notes(self.notes.as_deref())?;

        Ok(Collection {
            id: Uuid::new_v4().to_string(),
            client_id: self.client_id,
            client_name: self.client_name,
            amount: self.amount,
            method: self.method,
            reference: self.reference,
            notes: self.notes,
            created_at: now,
            synced: false,
        })
    }
}

// =============================================================================
// Route Sheet (hoja de ruta)
// =============================================================================

/// Status of a driver's route sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RouteSheetStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "en_progreso")]
    InProgress,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

wire_names!(RouteSheetStatus {
    Pending => "pendiente",
    InProgress => "en_progreso",
    Completed => "completada",
    Cancelled => "cancelada",
});

impl RouteSheetStatus {
    /// Completed and cancelled sheets accept no further changes.
    pub fn is_closed(&self) -> bool {
        matches!(self, RouteSheetStatus::Completed | RouteSheetStatus::Cancelled)
    }

    /// Statuses a driver can still work on.
    pub const OPEN: [RouteSheetStatus; 2] = [RouteSheetStatus::Pending, RouteSheetStatus::InProgress];
}

/// A driver's deliveries for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSheet {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,

    #[serde(default)]
    pub status: RouteSheetStatus,

    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// False while a local status change waits for upload.
    #[serde(default)]
    pub synced: bool,
}

// =============================================================================
// Route Stop (parada)
// =============================================================================

/// Delivery status of a stop.
///
/// ```text
/// pendiente ──► en_camino ──► { entregado | entrega_parcial | rechazado | no_entregado }
/// ```
/// Any status may move to any other; the four right-hand ones are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "en_camino")]
    InTransit,
    #[serde(rename = "entregado")]
    Delivered,
    #[serde(rename = "entrega_parcial")]
    PartiallyDelivered,
    #[serde(rename = "rechazado")]
    Refused,
    #[serde(rename = "no_entregado")]
    NotDelivered,
}

wire_names!(DeliveryStatus {
    Pending => "pendiente",
    InTransit => "en_camino",
    Delivered => "entregado",
    PartiallyDelivered => "entrega_parcial",
    Refused => "rechazado",
    NotDelivered => "no_entregado",
});

impl DeliveryStatus {
    /// Terminal for delivery purposes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::PartiallyDelivered
                | DeliveryStatus::Refused
                | DeliveryStatus::NotDelivered
        )
    }

    /// Delivered in full or in part: the order total is owed.
    pub fn counts_toward_expected(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::PartiallyDelivered
        )
    }
}

/// One delivery stop of a route sheet, tied to one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: String,
    pub route_sheet_id: String,
    pub order_id: String,

    /// Visit order within the sheet.
    pub rank: i64,

    #[serde(default)]
    pub status: DeliveryStatus,

    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub signature_ref: Option<String>,
    pub photo_ref: Option<String>,
    pub notes: Option<String>,

    #[serde(default)]
    pub synced: bool,
}

// =============================================================================
// Stop Payment (cobro) and Stop Return (devolución)
// =============================================================================

/// Payment method recorded at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "efectivo")]
    Cash,
    #[serde(rename = "transferencia")]
    Transfer,
    #[serde(rename = "cheque")]
    Check,
    #[serde(rename = "tarjeta")]
    Card,
    #[serde(rename = "credito")]
    Credit,
    #[serde(rename = "otro")]
    Other,
}

wire_names!(PaymentMethod {
    Cash => "efectivo",
    Transfer => "transferencia",
    Check => "cheque",
    Card => "tarjeta",
    Credit => "credito",
    Other => "otro",
});

impl PaymentMethod {
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

/// A payment collected at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPayment {
    pub id: String,
    pub stop_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub check_number: Option<String>,
    pub bank: Option<String>,
    pub check_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,
}

/// Reason codes for returned goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnReason {
    #[serde(rename = "producto_danado")]
    DamagedProduct,
    #[serde(rename = "producto_vencido")]
    ExpiredProduct,
    #[serde(rename = "cliente_no_solicito")]
    NotOrdered,
    #[serde(rename = "error_cantidad")]
    WrongQuantity,
    #[serde(rename = "cliente_rechaza")]
    ClientRefuses,
    #[serde(rename = "otro")]
    Other,
}

wire_names!(ReturnReason {
    DamagedProduct => "producto_danado",
    ExpiredProduct => "producto_vencido",
    NotOrdered => "cliente_no_solicito",
    WrongQuantity => "error_cantidad",
    ClientRefuses => "cliente_rechaza",
    Other => "otro",
});

/// Goods returned at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopReturn {
    pub id: String,
    pub stop_id: String,
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub reason: ReturnReason,
    pub reason_detail: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,
}

// =============================================================================
// Reconciliation (rendición)
// =============================================================================

/// Classification of the cash difference when closing a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DifferenceKind {
    #[serde(rename = "sin_diferencia")]
    None,
    #[serde(rename = "sobrante")]
    Surplus,
    #[serde(rename = "faltante")]
    Shortage,
}

wire_names!(DifferenceKind {
    None => "sin_diferencia",
    Surplus => "sobrante",
    Shortage => "faltante",
});

/// End-of-route cash accounting. Created once per route sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: String,
    pub route_sheet_id: String,
    pub expected: Money,

    /// Cash counted by the driver.
    pub declared_cash: Money,

    /// Non-cash payments recorded at the stops.
    pub other_recorded: Money,

    /// `declared_cash + other_recorded`.
    pub total_collected: Money,

    /// `|total_collected − expected|`.
    pub difference: Money,

    pub difference_kind: DifferenceKind,
    pub notes: Option<String>,
    pub closed_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,
}

// =============================================================================
// Stop View (aggregate)
// =============================================================================

/// A stop joined with its order snapshot, payments and returns.
///
/// Assembled by an explicit read in the Local Store layer; this is what the
/// route screens and the reconciliation engine consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopView {
    pub stop: RouteStop,

    /// Absent when the order was never downloaded to this device.
    pub order: Option<Order>,

    pub payments: Vec<StopPayment>,
    pub returns: Vec<StopReturn>,
}

impl StopView {
    /// Sum of the payments registered at this stop.
    pub fn collected_amount(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Total of the stop's order, zero when unknown.
    pub fn order_total(&self) -> Money {
        self.order.as_ref().map(|o| o.total).unwrap_or_default()
    }

    /// What is still owed at this stop, never below zero.
    pub fn pending_amount(&self) -> Money {
        (self.order_total() - self.collected_amount()).clamp_non_negative()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn test_wire_names_match_serde() {
        let json = serde_json::to_string(&DeliveryStatus::PartiallyDelivered).unwrap();
        assert_eq!(json, "\"entrega_parcial\"");
        assert_eq!(DeliveryStatus::PartiallyDelivered.as_str(), "entrega_parcial");

        let json = serde_json::to_string(&RouteSheetStatus::InProgress).unwrap();
        assert_eq!(json, format!("\"{}\"", RouteSheetStatus::InProgress));

        let parsed: PaymentMethod = serde_json::from_str("\"tarjeta\"").unwrap();
        assert_eq!(parsed, PaymentMethod::Card);

        let parsed: ReturnReason = serde_json::from_str("\"cliente_no_solicito\"").unwrap();
        assert_eq!(parsed, ReturnReason::NotOrdered);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InTransit.is_terminal());
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::PartiallyDelivered.is_terminal());
        assert!(DeliveryStatus::Refused.is_terminal());
        assert!(DeliveryStatus::NotDelivered.is_terminal());

        assert!(DeliveryStatus::PartiallyDelivered.counts_toward_expected());
        assert!(!DeliveryStatus::Refused.counts_toward_expected());
    }

    #[test]
    fn test_order_total_survives_round_trip() {
        let lines = vec![
            OrderLine::new("l1", "p1", "Yerba", 2, m("10")).unwrap(),
            OrderLine::new("l2", "p2", "Azúcar", 3, m("5")).unwrap(),
        ];
        let mut order = Order {
            id: "o1".into(),
            client_id: "c1".into(),
            client_name: "Almacén Don José".into(),
            lines,
            total: Money::zero(),
            status: OrderStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            synced: false,
        };
        order.total = order.computed_total().unwrap();
        assert_eq!(order.total, m("35"));

        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total, m("35"));
        assert!(back.has_consistent_totals());
    }

    #[test]
    fn test_markup_rule_scope() {
        let rule = PriceListMarkupRule {
            id: "r1".into(),
            price_list_id: "lp1".into(),
            brand_id: Some("b1".into()),
            product_type_id: None,
            percentage: Decimal::from(20),
        };
        assert!(rule.matches_brand("b1"));
        assert!(!rule.matches_brand("b2"));
        assert!(!rule.matches_product_type("t1"));
    }

    #[test]
    fn test_new_collection_requires_positive_amount() {
        let input = NewCollection {
            client_id: "c1".into(),
            client_name: None,
            amount: Money::zero(),
            method: CollectionMethod::Cash,
            reference: None,
            notes: None,
        };
        assert!(input.clone().into_collection(Utc::now()).is_err());

        let ok = NewCollection {
            amount: m("150.50"),
            ..input
        };
        let collection = ok.into_collection(Utc::now()).unwrap();
        assert!(!collection.synced);
        assert_eq!(collection.amount, m("150.50"));
    }

    #[test]
    fn test_route_sheet_closed() {
        assert!(!RouteSheetStatus::Pending.is_closed());
        assert!(!RouteSheetStatus::InProgress.is_closed());
        assert!(RouteSheetStatus::Completed.is_closed());
        assert!(RouteSheetStatus::Cancelled.is_closed());
    }
}
