//! # Error Types
//!
//! Domain-specific error types for preventa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  preventa-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  preventa-db errors                                                    │
//! │  └── DbError          - Storage failures (wraps CoreError)             │
//! │                                                                         │
//! │  preventa-sync errors                                                  │
//! │  ├── RemoteError      - Backend rejected / unreachable                 │
//! │  └── SyncError        - Structural sync failures                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → caller      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule violation is reported before any write happens, so a caller
//! that receives one of these errors can assume the Local Store is unchanged.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced record does not exist locally.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The route sheet no longer accepts stop mutations.
    ///
    /// ## When This Occurs
    /// - Updating a stop after the rendición closed the sheet
    /// - Registering a payment or return on a cancelled sheet
    #[error("Route sheet {sheet_id} is {status}, no further changes allowed")]
    RouteClosed { sheet_id: String, status: String },

    /// Route sheet status change that the lifecycle does not allow.
    ///
    /// ## Lifecycle
    /// ```text
    /// pendiente ──start──► en_progreso ──rendición──► completada
    ///     │                     │
    ///     └──────────┬──────────┘
    ///                ▼
    ///            cancelada
    /// ```
    #[error("Route sheet {sheet_id} cannot go from {from} to {to}")]
    InvalidRouteTransition {
        sheet_id: String,
        from: String,
        to: String,
    },

    /// Reconciliation attempted while stops are still open.
    ///
    /// ## User Workflow
    /// ```text
    /// Driver taps "Cerrar rendición"
    ///      │
    ///      ▼
    /// 2 stops still pendiente / en_camino
    ///      │
    ///      ▼
    /// OpenStops { pending: 2 }  → nothing written, sheet stays en_progreso
    /// ```
    #[error("Route sheet {sheet_id} has {pending} stop(s) without a final delivery status")]
    OpenStops { sheet_id: String, pending: usize },

    /// The route sheet already has its reconciliation.
    #[error("Route sheet {sheet_id} is already reconciled")]
    AlreadyReconciled { sheet_id: String },

    /// An order must carry at least one line.
    #[error("Order has no lines")]
    EmptyOrder,

    /// Order has more distinct lines than allowed.
    #[error("Order cannot have more than {max} lines")]
    OrderTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Stored order totals do not match its lines.
    #[error("Order {order_id} total {stored} does not match its lines ({computed})")]
    InconsistentTotals {
        order_id: String,
        stored: String,
        computed: String,
    },

    /// Product is not part of the order being drafted.
    #[error("Product {0} is not in the order")]
    ProductNotInOrder(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true for errors caused by caller input or rule preconditions,
    /// as opposed to missing data.
    pub fn is_validation(&self) -> bool {
        !matches!(self, CoreError::NotFound { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or positive.
    #[error("{field} cannot be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// An amount computed from this input does not fit in a decimal.
    #[error("{field} is too large")]
    TooLarge { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::OpenStops {
            sheet_id: "hr-1".to_string(),
            pending: 2,
        };
        assert_eq!(
            err.to_string(),
            "Route sheet hr-1 has 2 stop(s) without a final delivery status"
        );

        let err = CoreError::RouteClosed {
            sheet_id: "hr-1".to_string(),
            status: "completada".to_string(),
        };
        assert!(err.to_string().contains("completada"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "client_id".to_string(),
        };
        assert_eq!(err.to_string(), "client_id is required");

        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        assert_eq!(err.to_string(), "amount must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "client_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert!(core_err.is_validation());
        assert!(!CoreError::not_found("Order", "x").is_validation());
    }
}
