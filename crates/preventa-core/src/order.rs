//! # Order Drafting
//!
//! The cart a sales rep fills while visiting a client, and its conversion
//! into an [`Order`] ready for the Local Store.
//!
//! ## Draft Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OrderDraft Operations                            │
//! │                                                                         │
//! │  Rep Action               Method                  Draft Change          │
//! │  ──────────               ──────                  ────────────          │
//! │                                                                         │
//! │  Tap product ────────────► add() ───────────────► push or qty += n     │
//! │                                                                         │
//! │  Edit quantity ──────────► set_quantity() ──────► qty = n (0 removes)  │
//! │                                                                         │
//! │  Swipe line ─────────────► remove() ────────────► line removed         │
//! │                                                                         │
//! │  Discard ────────────────► clear() ─────────────► empty                │
//! │                                                                         │
//! │  Confirm ────────────────► into_order() ────────► Order (pendiente)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unit prices are resolved once, when the product is first added, and then
//! frozen on the line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Client, Order, OrderLine, OrderStatus, Product};
use crate::validation::{validate_notes, validate_quantity};
use crate::{MAX_LINE_QUANTITY, MAX_ORDER_LINES};

/// A line of a draft order.
///
/// ## Design Notes
/// Name and unit price are copied from the product when the line is
/// created so later catalog downloads do not change a draft in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl DraftLine {
    pub fn subtotal(&self) -> CoreResult<Money> {
        Ok(self.unit_price.multiply_quantity(self.quantity)?)
    }
}

/// An order being built on the device.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding again increases quantity)
/// - Quantities stay in `1..=MAX_LINE_QUANTITY`
/// - At most `MAX_ORDER_LINES` lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub lines: Vec<DraftLine>,
}

impl OrderDraft {
    pub fn new() -> Self {
        OrderDraft { lines: Vec::new() }
    }

    /// Adds a product at the given resolved price, or increases the quantity
    /// of its existing line. The price of an existing line is kept.
    pub fn add(&mut self, product: &Product, unit_price: Money, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.unit_price.multiply_quantity(new_qty)?;
            line.quantity = new_qty;
            return Ok(());
        }

        if self.lines.len() >= MAX_ORDER_LINES {
            return Err(CoreError::OrderTooLarge {
                max: MAX_ORDER_LINES,
            });
        }

        unit_price.multiply_quantity(quantity)?;
        self.lines.push(DraftLine {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            unit_price,
            quantity,
        });
        Ok(())
    }

    /// Sets the quantity of a line. Zero removes it.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove(product_id);
        }
        validate_quantity(quantity)?;

        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.unit_price.multiply_quantity(quantity)?;
                line.quantity = quantity;
                Ok(())
            }
            None => Err(CoreError::ProductNotInOrder(product_id.to_string())),
        }
    }

    /// Removes a line by product id.
    pub fn remove(&mut self, product_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CoreError::ProductNotInOrder(product_id.to_string()));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all line subtotals.
    pub fn total(&self) -> CoreResult<Money> {
        self.lines.iter().map(DraftLine::subtotal).sum()
    }

    /// Builds the order for a client. The draft is consumed.
    ///
    /// ## Returns
    /// An [`Order`] with `status = pendiente` and `synced = false`, fresh
    /// UUIDs for the order and every line, and a total recomputed from the
    /// lines.
    pub fn into_order(
        self,
        client: &Client,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Order> {
        if self.lines.is_empty() {
            return Err(CoreError::EmptyOrder);
        }
        validate_notes(notes.as_deref())?;

        let lines: Vec<OrderLine> = self
            .lines
            .into_iter()
            .map(|l| {
                OrderLine::new(
                    Uuid::new_v4().to_string(),
                    l.product_id,
                    l.product_name,
                    l.quantity,
                    l.unit_price,
                )
            })
            .collect::<CoreResult<_>>()?;
        let total = lines
            .iter()
            .try_fold(Money::zero(), |acc, l| acc.checked_add(l.subtotal))
            .ok_or_else(|| ValidationError::TooLarge {
                field: "total".to_string(),
            })?;

        Ok(Order {
            id: Uuid::new_v4().to_string(),
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            lines,
            total,
            status: OrderStatus::Pending,
            notes,
            created_at: now,
            synced: false,
        })
    }
}

/// Rejects an order whose stored totals drift from its lines.
pub fn ensure_consistent(order: &Order) -> CoreResult<()> {
    if order.lines.is_empty() {
        return Err(CoreError::EmptyOrder);
    }
    if !order.has_consistent_totals() {
        return Err(CoreError::InconsistentTotals {
            order_id: order.id.clone(),
            stored: order.total.to_string(),
            computed: order
                .computed_total()
                .map_or_else(|| "overflow".to_string(), |total| total.to_string()),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.into(),
            code: format!("C-{id}"),
            name: name.into(),
            description: None,
            cost_price: Money::zero(),
            sale_price: Money::zero(),
            stock: 0,
            category: None,
            brand_id: None,
            product_type_id: None,
            image_url: None,
            synced: true,
            updated_at: Utc::now(),
        }
    }

    fn client() -> Client {
        Client {
            id: "c1".into(),
            code: "CLI-1".into(),
            name: "Kiosco Central".into(),
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
            synced: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_same_product_increments_quantity() {
        let mut draft = OrderDraft::new();
        let p = product("p1", "Yerba");
        draft.add(&p, Money::from_units(10), 2).unwrap();
        draft.add(&p, Money::from_units(99), 3).unwrap();

        assert_eq!(draft.line_count(), 1);
        assert_eq!(draft.lines[0].quantity, 5);
        assert_eq!(draft.lines[0].unit_price, Money::from_units(10));
    }

    #[test]
    fn test_quantity_limits() {
        let mut draft = OrderDraft::new();
        let p = product("p1", "Yerba");
        assert!(draft.add(&p, Money::from_units(1), 0).is_err());
        draft.add(&p, Money::from_units(1), MAX_LINE_QUANTITY).unwrap();
        assert!(matches!(
            draft.add(&p, Money::from_units(1), 1),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "Yerba"), Money::from_units(10), 2).unwrap();
        draft.set_quantity("p1", 0).unwrap();
        assert!(draft.is_empty());
        assert!(matches!(
            draft.set_quantity("p1", 4),
            Err(CoreError::ProductNotInOrder(_))
        ));
    }

    #[test]
    fn test_into_order_computes_totals() {
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "Yerba"), Money::from_units(10), 2).unwrap();
        draft.add(&product("p2", "Azúcar"), Money::from_units(5), 3).unwrap();
        assert_eq!(draft.total().unwrap(), Money::from_units(35));

        let order = draft.into_order(&client(), None, Utc::now()).unwrap();
        assert_eq!(order.total, Money::from_units(35));
        assert_eq!(order.lines[0].subtotal, Money::from_units(20));
        assert_eq!(order.lines[1].subtotal, Money::from_units(15));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.synced);
        assert_eq!(order.client_name, "Kiosco Central");
        assert!(ensure_consistent(&order).is_ok());
    }

    #[test]
    fn test_overflowing_line_is_rejected() {
        let mut draft = OrderDraft::new();
        let huge = Money::from_decimal(rust_decimal::Decimal::MAX);
        let err = draft.add(&product("p1", "Yerba"), huge, 2).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::TooLarge { .. })));
        assert!(draft.is_empty());
    }

    #[test]
    fn test_empty_draft_is_rejected() {
        let draft = OrderDraft::new();
        assert!(matches!(
            draft.into_order(&client(), None, Utc::now()),
            Err(CoreError::EmptyOrder)
        ));
    }

    #[test]
    fn test_inconsistent_order_detected() {
        let mut draft = OrderDraft::new();
        draft.add(&product("p1", "Yerba"), Money::from_units(10), 2).unwrap();
        let mut order = draft.into_order(&client(), None, Utc::now()).unwrap();
        order.total = Money::from_units(21);
        assert!(matches!(
            ensure_consistent(&order),
            Err(CoreError::InconsistentTotals { .. })
        ));
    }
}
