//! # Route / Delivery State Machine
//!
//! Rules for a driver's route sheet and its stops.
//!
//! ## Stop Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Delivery Status                                   │
//! │                                                                         │
//! │   pendiente ──► en_camino ──┬──► entregado         ┐                    │
//! │       │                     ├──► entrega_parcial   │ terminal           │
//! │       │                     ├──► rechazado         │ (stamps departure) │
//! │       └─────────────────────┴──► no_entregado      ┘                    │
//! │                                                                         │
//! │   First move away from pendiente stamps arrival (once).                 │
//! │   Every move into a terminal status re-stamps departure.                │
//! │   Any status may be corrected to any other while the sheet is open.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sheet Lifecycle
//! ```text
//! pendiente ──start_sheet──► en_progreso ──rendición──► completada
//!                                   cancelada (set by the backend only)
//! ```
//!
//! Every mutation here clears the record's `synced` flag so the Sync Engine
//! picks it up on the next upload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    DeliveryStatus, PaymentMethod, ReturnReason, RouteSheet, RouteSheetStatus, RouteStop,
    StopPayment, StopReturn, StopView,
};
use crate::validation::{validate_notes, validate_positive_amount, validate_quantity, validate_required};

// =============================================================================
// Sheet Rules
// =============================================================================

/// Fails with [`CoreError::RouteClosed`] once the sheet is completed or cancelled.
pub fn ensure_open(sheet: &RouteSheet) -> CoreResult<()> {
    if sheet.status.is_closed() {
        return Err(CoreError::RouteClosed {
            sheet_id: sheet.id.clone(),
            status: sheet.status.to_string(),
        });
    }
    Ok(())
}

/// Moves a sheet from `pendiente` to `en_progreso`.
///
/// Starting a sheet that is already in progress is a no-op and returns
/// `false`; the start time is kept.
pub fn start_sheet(sheet: &mut RouteSheet, now: DateTime<Utc>) -> CoreResult<bool> {
    match sheet.status {
        RouteSheetStatus::Pending => {
            sheet.status = RouteSheetStatus::InProgress;
            sheet.started_at = Some(now);
            sheet.synced = false;
            Ok(true)
        }
        RouteSheetStatus::InProgress => Ok(false),
        other => Err(CoreError::InvalidRouteTransition {
            sheet_id: sheet.id.clone(),
            from: other.to_string(),
            to: RouteSheetStatus::InProgress.to_string(),
        }),
    }
}

/// Marks a sheet as completed. Only the reconciliation close calls this.
pub fn complete_sheet(sheet: &mut RouteSheet, now: DateTime<Utc>) -> CoreResult<()> {
    ensure_open(sheet)?;
    sheet.status = RouteSheetStatus::Completed;
    sheet.completed_at = Some(now);
    sheet.synced = false;
    Ok(())
}

// =============================================================================
// Stop Transitions
// =============================================================================

/// Optional details captured together with a status change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopUpdate {
    pub signature_ref: Option<String>,
    pub photo_ref: Option<String>,
    pub notes: Option<String>,
}

/// Applies a delivery status change to a stop, stamping arrival and
/// departure times.
pub fn apply_transition(stop: &mut RouteStop, next: DeliveryStatus, now: DateTime<Utc>) {
    if next != DeliveryStatus::Pending && stop.arrived_at.is_none() {
        stop.arrived_at = Some(now);
    }
    if next.is_terminal() {
        stop.departed_at = Some(now);
    }
    stop.status = next;
    stop.synced = false;
}

/// Applies a status change plus any captured details. Details left as
/// `None` keep their current value.
pub fn update_stop(
    stop: &mut RouteStop,
    next: DeliveryStatus,
    update: StopUpdate,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    validate_notes(update.notes.as_deref())?;

    apply_transition(stop, next, now);
    if update.signature_ref.is_some() {
        stop.signature_ref = update.signature_ref;
    }
    if update.photo_ref.is_some() {
        stop.photo_ref = update.photo_ref;
    }
    if update.notes.is_some() {
        stop.notes = update.notes;
    }
    Ok(())
}

// =============================================================================
// Payments and Returns
// =============================================================================

/// Input for a payment collected at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStopPayment {
    pub stop_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub check_number: Option<String>,
    pub bank: Option<String>,
    pub check_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewStopPayment {
    /// Shorthand for a payment with no method details.
    pub fn simple(stop_id: impl Into<String>, amount: Money, method: PaymentMethod) -> Self {
        NewStopPayment {
            stop_id: stop_id.into(),
            amount,
            method,
            reference: None,
            check_number: None,
            bank: None,
            check_date: None,
            notes: None,
        }
    }

    /// Validates and builds the payment record.
    pub fn into_payment(self, now: DateTime<Utc>) -> CoreResult<StopPayment> {
        validate_required("stop_id", &self.stop_id)?;
        validate_positive_amount("amount", self.amount)?;
        validate_notes(self.notes.as_deref())?;

        Ok(StopPayment {
            id: Uuid::new_v4().to_string(),
            stop_id: self.stop_id,
            amount: self.amount,
            method: self.method,
            reference: self.reference,
            check_number: self.check_number,
            bank: self.bank,
            check_date: self.check_date,
            notes: self.notes,
            created_at: now,
            synced: false,
        })
    }
}

/// Input for goods returned at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStopReturn {
    pub stop_id: String,
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub reason: ReturnReason,
    pub reason_detail: Option<String>,
}

impl NewStopReturn {
    /// Validates and builds the return record.
    pub fn into_return(self, now: DateTime<Utc>) -> CoreResult<StopReturn> {
        validate_required("stop_id", &self.stop_id)?;
        validate_required("product_id", &self.product_id)?;
        validate_quantity(self.quantity)?;
        validate_notes(self.reason_detail.as_deref())?;

        Ok(StopReturn {
            id: Uuid::new_v4().to_string(),
            stop_id: self.stop_id,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity: self.quantity,
            reason: self.reason,
            reason_detail: self.reason_detail,
            created_at: now,
            synced: false,
        })
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Counters for the route screen header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteProgress {
    pub total_stops: usize,
    pub completed_stops: usize,
    pub pending_stops: usize,
    pub returns_count: usize,
    pub collected: Money,
}

impl RouteProgress {
    pub fn from_views(views: &[StopView]) -> Self {
        let completed_stops = views.iter().filter(|v| v.stop.status.is_terminal()).count();
        RouteProgress {
            total_stops: views.len(),
            completed_stops,
            pending_stops: views.len() - completed_stops,
            returns_count: views.iter().map(|v| v.returns.len()).sum(),
            collected: views.iter().map(StopView::collected_amount).sum(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending_stops == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stop() -> RouteStop {
        RouteStop {
            id: "s1".into(),
            route_sheet_id: "hr1".into(),
            order_id: "o1".into(),
            rank: 1,
            status: DeliveryStatus::Pending,
            arrived_at: None,
            departed_at: None,
            signature_ref: None,
            photo_ref: None,
            notes: None,
            synced: true,
        }
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

    #[test]
    fn test_arrival_stamped_once() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::minutes(5);
        let mut s = stop();

        apply_transition(&mut s, DeliveryStatus::InTransit, t1);
        assert_eq!(s.arrived_at, Some(t1));
        assert_eq!(s.departed_at, None);
        assert!(!s.synced);

        apply_transition(&mut s, DeliveryStatus::Delivered, t2);
        assert_eq!(s.arrived_at, Some(t1));
        assert_eq!(s.departed_at, Some(t2));
    }

    #[test]
    fn test_departure_restamped_on_each_terminal_move() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::minutes(10);
        let mut s = stop();

        apply_transition(&mut s, DeliveryStatus::Refused, t1);
        assert_eq!(s.arrived_at, Some(t1));
        assert_eq!(s.departed_at, Some(t1));

        apply_transition(&mut s, DeliveryStatus::Delivered, t2);
        assert_eq!(s.departed_at, Some(t2));
        assert_eq!(s.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_pending_to_pending_stamps_nothing() {
        let mut s = stop();
        apply_transition(&mut s, DeliveryStatus::Pending, Utc::now());
        assert!(s.arrived_at.is_none());
        assert!(s.departed_at.is_none());
    }

    #[test]
    fn test_update_keeps_unset_details() {
        let mut s = stop();
        s.notes = Some("timbre 2".into());
        let update = StopUpdate {
            signature_ref: Some("sig://1".into()),
            ..Default::default()
        };
        update_stop(&mut s, DeliveryStatus::Delivered, update, Utc::now()).unwrap();
        assert_eq!(s.signature_ref.as_deref(), Some("sig://1"));
        assert_eq!(s.notes.as_deref(), Some("timbre 2"));
    }

    #[test]
    fn test_start_sheet() {
        let now = Utc::now();
        let mut sh = sheet(RouteSheetStatus::Pending);
        assert!(start_sheet(&mut sh, now).unwrap());
        assert_eq!(sh.status, RouteSheetStatus::InProgress);
        assert_eq!(sh.started_at, Some(now));
        assert!(!sh.synced);

        assert!(!start_sheet(&mut sh, now + Duration::hours(1)).unwrap());
        assert_eq!(sh.started_at, Some(now));

        let mut done = sheet(RouteSheetStatus::Completed);
        assert!(matches!(
            start_sheet(&mut done, now),
            Err(CoreError::InvalidRouteTransition { .. })
        ));
    }

    #[test]
    fn test_closed_sheet_rejects_changes() {
        assert!(ensure_open(&sheet(RouteSheetStatus::InProgress)).is_ok());
        assert!(matches!(
            ensure_open(&sheet(RouteSheetStatus::Cancelled)),
            Err(CoreError::RouteClosed { .. })
        ));
    }

    #[test]
    fn test_payment_validation() {
        let ok = NewStopPayment::simple("s1", Money::from_units(10), PaymentMethod::Cash);
        let payment = ok.into_payment(Utc::now()).unwrap();
        assert!(!payment.synced);

        let zero = NewStopPayment::simple("s1", Money::zero(), PaymentMethod::Cash);
        assert!(matches!(
            zero.into_payment(Utc::now()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_return_validation() {
        let bad = NewStopReturn {
            stop_id: "s1".into(),
            product_id: "p1".into(),
            product_name: None,
            quantity: 0,
            reason: ReturnReason::DamagedProduct,
            reason_detail: None,
        };
        assert!(bad.into_return(Utc::now()).is_err());
    }

    #[test]
    fn test_progress() {
        let mut done = stop();
        apply_transition(&mut done, DeliveryStatus::Delivered, Utc::now());
        let views = vec![
            StopView {
                stop: done,
                order: None,
                payments: vec![],
                returns: vec![],
            },
            StopView {
                stop: stop(),
                order: None,
                payments: vec![],
                returns: vec![],
            },
        ];
        let progress = RouteProgress::from_views(&views);
        assert_eq!(progress.total_stops, 2);
        assert_eq!(progress.completed_stops, 1);
        assert_eq!(progress.pending_stops, 1);
        assert!(!progress.is_complete());
    }
}
