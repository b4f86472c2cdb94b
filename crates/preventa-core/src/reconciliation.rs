//! # Reconciliation Engine (rendición)
//!
//! Closes a driver's route by comparing what was owed against what was
//! collected.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  expected        = Σ order.total   (stops entregado | entrega_parcial)  │
//! │  recorded cash   = Σ payments where method = efectivo   (all stops)     │
//! │  other_recorded  = Σ payments where method ≠ efectivo   (all stops)     │
//! │  total_collected = declared_cash + other_recorded                       │
//! │  difference      = total_collected − expected                           │
//! │                                                                         │
//! │       difference >  0.01  ──► sobrante                                  │
//! │       difference < −0.01  ──► faltante                                  │
//! │       otherwise           ──► sin_diferencia                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `expected` counts only delivered stops while the payment sums cover every
//! stop. A payment taken at a refused stop therefore shows up as surplus.
//!
//! The declared cash replaces the recorded cash in `total_collected`; the
//! recorded cash is only used by the pre-close [`CashPreview`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DifferenceKind, PaymentMethod, Reconciliation, RouteSheet, StopView};
use crate::validation::{validate_non_negative_amount, validate_notes};

/// Band inside which a difference counts as none: 0.01.
pub const TOLERANCE: Money = Money::from_decimal(Decimal::from_parts(1, 0, 0, false, 2));

/// Classifies a signed difference against the tolerance band.
pub fn classify(difference: Money) -> DifferenceKind {
    if difference > TOLERANCE {
        DifferenceKind::Surplus
    } else if difference < -TOLERANCE {
        DifferenceKind::Shortage
    } else {
        DifferenceKind::None
    }
}

// =============================================================================
// Summary
// =============================================================================

/// The computed figures of a reconciliation, before anything is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub expected: Money,
    pub recorded_cash: Money,
    pub other_recorded: Money,
    pub declared_cash: Money,
    pub total_collected: Money,
    /// Signed `total_collected − expected`.
    pub difference: Money,
    pub difference_kind: DifferenceKind,
}

/// Sum of order totals for stops delivered in full or in part.
pub fn expected_amount(stops: &[StopView]) -> Money {
    stops
        .iter()
        .filter(|v| v.stop.status.counts_toward_expected())
        .map(StopView::order_total)
        .sum()
}

/// Splits every recorded payment into (cash, other).
pub fn recorded_totals(stops: &[StopView]) -> (Money, Money) {
    stops
        .iter()
        .flat_map(|v| v.payments.iter())
        .fold((Money::zero(), Money::zero()), |(cash, other), p| {
            if p.method.is_cash() {
                (cash + p.amount, other)
            } else {
                (cash, other + p.amount)
            }
        })
}

/// Computes the reconciliation figures for a set of stops.
pub fn summarize(stops: &[StopView], declared_cash: Money) -> ReconciliationSummary {
    let expected = expected_amount(stops);
    let (recorded_cash, other_recorded) = recorded_totals(stops);
    let total_collected = declared_cash + other_recorded;
    let difference = total_collected - expected;

    ReconciliationSummary {
        expected,
        recorded_cash,
        other_recorded,
        declared_cash,
        total_collected,
        difference,
        difference_kind: classify(difference),
    }
}

// =============================================================================
// Close
// =============================================================================

/// Checks every precondition of closing a route.
///
/// ## Errors
/// - [`CoreError::AlreadyReconciled`] when a reconciliation exists
/// - [`CoreError::RouteClosed`] when the sheet is completed or cancelled
/// - [`CoreError::OpenStops`] when any stop is not terminal
/// - [`CoreError::Validation`] when declared cash is negative
pub fn check_closable(
    sheet: &RouteSheet,
    stops: &[StopView],
    already_reconciled: bool,
    declared_cash: Money,
) -> CoreResult<()> {
    if already_reconciled {
        return Err(CoreError::AlreadyReconciled {
            sheet_id: sheet.id.clone(),
        });
    }
    crate::route::ensure_open(sheet)?;

    let pending = stops.iter().filter(|v| !v.stop.status.is_terminal()).count();
    if pending > 0 {
        return Err(CoreError::OpenStops {
            sheet_id: sheet.id.clone(),
            pending,
        });
    }

    validate_non_negative_amount("declared_cash", declared_cash)?;
    Ok(())
}

/// Validates and builds the reconciliation record for a sheet.
///
/// The caller persists the record and completes the sheet in one
/// transaction.
pub fn close(
    sheet: &RouteSheet,
    stops: &[StopView],
    already_reconciled: bool,
    declared_cash: Money,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<Reconciliation> {
    check_closable(sheet, stops, already_reconciled, declared_cash)?;
    validate_notes(notes.as_deref())?;

    let summary = summarize(stops, declared_cash);

    Ok(Reconciliation {
        id: Uuid::new_v4().to_string(),
        route_sheet_id: sheet.id.clone(),
        expected: summary.expected,
        declared_cash,
        other_recorded: summary.other_recorded,
        total_collected: summary.total_collected,
        difference: summary.difference.abs(),
        difference_kind: summary.difference_kind,
        notes,
        closed_at: now,
        synced: false,
    })
}

// =============================================================================
// Cash Preview
// =============================================================================

/// What the driver sees before closing the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashPreview {
    pub expected: Money,
    pub recorded_cash: Money,
    pub other_recorded: Money,
    pub by_method: BTreeMap<PaymentMethod, Money>,
    /// Cash plus other methods as recorded at the stops.
    pub total_recorded: Money,
    /// `expected − total_recorded`, never below zero.
    pub still_to_collect: Money,
    /// `declared − recorded cash`, when a declared amount was typed.
    pub cash_difference: Option<Money>,
    pub cash_difference_kind: Option<DifferenceKind>,
    pub pending_stops: usize,
    pub returns_count: usize,
    pub can_close: bool,
}

impl CashPreview {
    pub fn build(
        sheet: &RouteSheet,
        stops: &[StopView],
        already_reconciled: bool,
        declared_cash: Option<Money>,
    ) -> Self {
        let expected = expected_amount(stops);
        let (recorded_cash, other_recorded) = recorded_totals(stops);

        let mut by_method: BTreeMap<PaymentMethod, Money> = BTreeMap::new();
        for payment in stops.iter().flat_map(|v| v.payments.iter()) {
            *by_method.entry(payment.method).or_default() += payment.amount;
        }

        let total_recorded = recorded_cash + other_recorded;
        let cash_difference = declared_cash.map(|declared| declared - recorded_cash);

        CashPreview {
            expected,
            recorded_cash,
            other_recorded,
            by_method,
            total_recorded,
            still_to_collect: (expected - total_recorded).clamp_non_negative(),
            cash_difference,
            cash_difference_kind: cash_difference.map(classify),
            pending_stops: stops.iter().filter(|v| !v.stop.status.is_terminal()).count(),
            returns_count: stops.iter().map(|v| v.returns.len()).sum(),
            can_close: check_closable(
                sheet,
                stops,
                already_reconciled,
                declared_cash.unwrap_or_default(),
            )
            .is_ok(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DeliveryStatus, Order, OrderStatus, RouteSheetStatus, RouteStop, StopPayment,
    };
    use chrono::NaiveDate;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn sheet(status: RouteSheetStatus) -> RouteSheet {
        RouteSheet {
            id: "hr1".into(),
            user_id: "u1".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            status,
            notes: None,
            started_at: None,
            completed_at: None,
            synced: true,
        }
    }

    fn payment(stop_id: &str, amount: &str, method: PaymentMethod) -> StopPayment {
        StopPayment {
            id: Uuid::new_v4().to_string(),
            stop_id: stop_id.into(),
            amount: m(amount),
            method,
            reference: None,
            check_number: None,
            bank: None,
            check_date: None,
            notes: None,
            created_at: Utc::now(),
            synced: false,
        }
    }

    fn view(id: &str, status: DeliveryStatus, total: &str, payments: Vec<StopPayment>) -> StopView {
        StopView {
            stop: RouteStop {
                id: id.into(),
                route_sheet_id: "hr1".into(),
                order_id: format!("o-{id}"),
                rank: 1,
                status,
                arrived_at: None,
                departed_at: None,
                signature_ref: None,
                photo_ref: None,
                notes: None,
                synced: true,
            },
            order: Some(Order {
                id: format!("o-{id}"),
                client_id: "c1".into(),
                client_name: "Cliente".into(),
                lines: vec![],
                total: m(total),
                status: OrderStatus::Processed,
                notes: None,
                created_at: Utc::now(),
                synced: true,
            }),
            payments,
            returns: vec![],
        }
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(TOLERANCE, m("0.01"));
        assert_eq!(TOLERANCE.to_string(), "0.01");
        assert_eq!(classify(m("0.005")), DifferenceKind::None);
        assert_eq!(classify(m("0.01")), DifferenceKind::None);
        assert_eq!(classify(m("-0.01")), DifferenceKind::None);
        assert_eq!(classify(m("0.02")), DifferenceKind::Surplus);
        assert_eq!(classify(m("-0.02")), DifferenceKind::Shortage);
    }

    #[test]
    fn test_close_within_tolerance() {
        let stops = vec![view("s1", DeliveryStatus::Delivered, "100", vec![])];
        let rec = close(&sheet(RouteSheetStatus::InProgress), &stops, false, m("100.005"), None, Utc::now())
            .unwrap();
        assert_eq!(rec.difference_kind, DifferenceKind::None);
    }

    #[test]
    fn test_close_surplus_and_shortage() {
        let stops = vec![view("s1", DeliveryStatus::Delivered, "100", vec![])];
        let sh = sheet(RouteSheetStatus::InProgress);

        let surplus = close(&sh, &stops, false, m("100.02"), None, Utc::now()).unwrap();
        assert_eq!(surplus.difference_kind, DifferenceKind::Surplus);
        assert_eq!(surplus.difference, m("0.02"));

        let shortage = close(&sh, &stops, false, m("99.98"), None, Utc::now()).unwrap();
        assert_eq!(shortage.difference_kind, DifferenceKind::Shortage);
        assert_eq!(shortage.difference, m("0.02"));
    }

    #[test]
    fn test_expected_counts_delivered_and_partial_only() {
        let stops = vec![
            view("s1", DeliveryStatus::Delivered, "100", vec![]),
            view("s2", DeliveryStatus::PartiallyDelivered, "50", vec![]),
            view("s3", DeliveryStatus::Refused, "70", vec![]),
            view("s4", DeliveryStatus::NotDelivered, "30", vec![]),
        ];
        assert_eq!(expected_amount(&stops), m("150"));
    }

    #[test]
    fn test_non_cash_adds_to_declared_cash() {
        let stops = vec![
            view(
                "s1",
                DeliveryStatus::Delivered,
                "100",
                vec![
                    payment("s1", "60", PaymentMethod::Cash),
                    payment("s1", "40", PaymentMethod::Transfer),
                ],
            ),
        ];
        let summary = summarize(&stops, m("60"));
        assert_eq!(summary.recorded_cash, m("60"));
        assert_eq!(summary.other_recorded, m("40"));
        assert_eq!(summary.total_collected, m("100"));
        assert_eq!(summary.difference_kind, DifferenceKind::None);
    }

    #[test]
    fn test_payment_at_refused_stop_is_surplus() {
        let stops = vec![
            view("s1", DeliveryStatus::Delivered, "100", vec![]),
            view("s2", DeliveryStatus::Refused, "80", vec![payment("s2", "20", PaymentMethod::Check)]),
        ];
        let summary = summarize(&stops, m("100"));
        assert_eq!(summary.expected, m("100"));
        assert_eq!(summary.difference, m("20"));
        assert_eq!(summary.difference_kind, DifferenceKind::Surplus);
    }

    #[test]
    fn test_preconditions() {
        let open = vec![view("s1", DeliveryStatus::InTransit, "100", vec![])];
        let sh = sheet(RouteSheetStatus::InProgress);
        assert!(matches!(
            close(&sh, &open, false, m("100"), None, Utc::now()),
            Err(CoreError::OpenStops { pending: 1, .. })
        ));

        let done = vec![view("s1", DeliveryStatus::Delivered, "100", vec![])];
        assert!(matches!(
            close(&sh, &done, true, m("100"), None, Utc::now()),
            Err(CoreError::AlreadyReconciled { .. })
        ));
        assert!(matches!(
            close(&sheet(RouteSheetStatus::Completed), &done, false, m("100"), None, Utc::now()),
            Err(CoreError::RouteClosed { .. })
        ));
        assert!(matches!(
            close(&sh, &done, false, m("-1"), None, Utc::now()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_cash_preview() {
        let stops = vec![
            view(
                "s1",
                DeliveryStatus::Delivered,
                "100",
                vec![
                    payment("s1", "30", PaymentMethod::Cash),
                    payment("s1", "20", PaymentMethod::Card),
                ],
            ),
            view("s2", DeliveryStatus::Pending, "40", vec![]),
        ];
        let preview = CashPreview::build(&sheet(RouteSheetStatus::InProgress), &stops, false, Some(m("25")));

        assert_eq!(preview.expected, m("100"));
        assert_eq!(preview.total_recorded, m("50"));
        assert_eq!(preview.still_to_collect, m("50"));
        assert_eq!(preview.by_method.get(&PaymentMethod::Card), Some(&m("20")));
        assert_eq!(preview.cash_difference, Some(m("-5")));
        assert_eq!(preview.cash_difference_kind, Some(DifferenceKind::Shortage));
        assert_eq!(preview.pending_stops, 1);
        assert!(!preview.can_close);
    }
}
