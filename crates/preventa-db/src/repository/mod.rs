//! # Repository Module
//!
//! Typed access to the Local Store collections.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories over the Local Store                    │
//! │                                                                         │
//! │  Agent / Sync Engine                                                   │
//! │       │                                                                 │
//! │       │  db.routes().update_stop_status(stop, entregado, ...)          │
//! │       ▼                                                                 │
//! │  RouteService                                                          │
//! │  ├── loads the stop and its sheet                                      │
//! │  ├── applies preventa-core rules (ensure_open, update_stop)            │
//! │  └── store.put(&stop)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LocalStore (records + record_index)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`reference`] - Clients, products and markup rules (download mirrors)
//! - [`catalog`] - Products priced for a client
//! - [`order`] - Orders captured on the device
//! - [`collection`] - Standalone collections
//! - [`route`] - Route sheets, stops, payments and returns
//! - [`reconciliation`] - End-of-route close
//! - [`settings`] - Device key/value settings
//! - [`sync`] - Pending counts and last sync

pub mod catalog;
pub mod collection;
pub mod order;
pub mod reconciliation;
pub mod reference;
pub mod route;
pub mod settings;
pub mod sync;
