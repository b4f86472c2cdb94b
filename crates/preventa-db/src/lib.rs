//! # preventa-db: Local Store for Preventa
//!
//! Durable on-device storage for the field-sales app, on SQLite with sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Preventa Data Flow                               │
//! │                                                                         │
//! │  Agent command / Sync Engine                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     preventa-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  route.rs     │    │  (embedded)  │  │   │
//! │  │   │               │    │  order.rs     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  ...          │    │ 001_local_   │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    │   store.sql  │  │   │
//! │  │                                ▼            └──────────────┘  │   │
//! │  │                  LocalStore (store.rs, records.rs)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`store`] - Generic collections with secondary indexes
//! - [`records`] - Collection definitions for the domain types
//! - [`repository`] - Typed repositories and services
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use preventa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/preventa.db")).await?;
//!
//! let pending = db.orders().pending().await?;
//! let stops = db.routes().stop_views("hr-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod records;
pub mod repository;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{IndexValue, LocalStore, Record, StoreTx, SyncTracked};

// Repository re-exports for convenience
pub use repository::catalog::ProductCatalog;
pub use repository::collection::CollectionRepository;
pub use repository::order::OrderRepository;
pub use repository::reconciliation::ReconciliationService;
pub use repository::reference::{ClientRepository, MarkupRuleRepository, ProductRepository};
pub use repository::route::{PendingRouteWork, RouteService};
pub use repository::settings::SettingsRepository;
pub use repository::sync::{SyncOverview, SyncStateRepository};
