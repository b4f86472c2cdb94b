//! # preventa-core: Pure Business Logic for Preventa
//!
//! This crate holds the rules of the field-sales app as pure functions with
//! zero I/O dependencies. Callers pass in the clock and the data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Preventa Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    preventa-agent (binary)                      │   │
//! │  │          sync / status / daemon commands, tracing setup         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 preventa-sync (Sync Engine)                     │   │
//! │  │        upload pending work, download reference data             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 preventa-db (Local Store)                       │   │
//! │  │            SQLite records, indexes, repositories                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ preventa-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │ pricing │ │  order  │ │  route  │ │reconcil.│  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Client, Product, Order, RouteStop, ...)
//! - [`money`] - Exact decimal money
//! - [`pricing`] - Price list markup resolution
//! - [`order`] - Order drafting and totals
//! - [`route`] - Delivery state machine
//! - [`reconciliation`] - End-of-route cash accounting
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use preventa_core::money::Money;
//! use preventa_core::pricing::resolve_price;
//!
//! let price = resolve_price(Money::from_units(100), None, None, &[]).unwrap();
//! assert_eq!(price, Money::from_units(100));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod reconciliation;
pub mod route;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single order line.
///
/// ## Business Reason
/// Catches typing 1000 instead of 10 on the capture screen.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum length of free-text notes.
pub const MAX_NOTES_LENGTH: usize = 500;
