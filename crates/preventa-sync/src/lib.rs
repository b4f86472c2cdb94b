//! # preventa-sync: Sync Engine for Preventa
//!
//! Keeps the Local Store and the remote backend in step. The device works
//! offline for most of the day; whenever the backend is reachable a full
//! sync uploads what was captured and refreshes reference data and routes.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Architecture                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncAgent (background task)                   │  │
//! │  │  interval (auto mode) + manual triggers, one sync at a time     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncEngine::full_sync                         │  │
//! │  │  upload orders → collections → route work                       │  │
//! │  │  download clients → products → markups → open route sheets      │  │
//! │  └──────────────┬───────────────────────────────┬───────────────────┘  │
//! │                 ▼                               ▼                       │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │ preventa-db (Local Store)  │  │ RemoteBackend                  │    │
//! │  │ pending(), mark_synced_..  │  │ ├── WsRemote ── Connection(WS) │    │
//! │  │ mirror(), insert_if_absent │  │ └── MemoryRemote (tests, dry)  │    │
//! │  └────────────────────────────┘  └────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Background `SyncAgent` and its status/events
//! - [`config`] - Sync configuration (TOML file + environment)
//! - [`connection`] - WebSocket connection task with reconnection
//! - [`engine`] - `SyncEngine::full_sync` and `SyncReport`
//! - [`error`] - `SyncError` and `RemoteError`
//! - [`protocol`] - Message types for the WebSocket backend
//! - [`remote`] - `RemoteBackend` trait, `WsRemote`, `MemoryRemote`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use preventa_sync::{MemoryRemote, SyncConfig, SyncEngine, SyncOptions};
//!
//! let config = SyncConfig::load_or_default(None);
//! let engine = SyncEngine::new(db, Arc::new(MemoryRemote::new()), SyncOptions::from_config(&config));
//!
//! let report = engine.full_sync().await;
//! println!("{}", report.summary());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod remote;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentState, NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use config::{SyncConfig, SyncMode, UserRole};
pub use engine::{DownloadCounts, RecordFailure, SyncEngine, SyncOptions, SyncReport, UploadCounts};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use protocol::SyncMessage;
pub use remote::{Filter, MemoryRemote, RemoteBackend, WsRemote};
