//! # Sync Agent
//!
//! Runs [`SyncEngine::full_sync`] in the background: on an interval in
//! `auto` mode, and whenever triggered.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  SyncAgentHandle                          agent task                   │
//! │  ───────────────                          ──────────                   │
//! │  trigger()  ──► trigger channel (cap 1) ──►┐                           │
//! │                 full = already queued      │   select! {               │
//! │                                            ├──   interval tick (auto)  │
//! │  shutdown() ──► shutdown channel ─────────►┘     trigger               │
//! │                                                  shutdown            } │
//! │                                                       │                 │
//! │                                   run guard (Mutex) ◄─┘                 │
//! │                                   one full_sync at a time              │
//! │                                                       │                 │
//! │  status()  ◄── Arc<RwLock<SyncStatus>> ◄──────────────┤                 │
//! │                                                       ▼                 │
//! │                                            SyncEventEmitter            │
//! │                                            emit_status / progress /    │
//! │                                            error                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::engine::{SyncEngine, SyncReport};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteBackend;

// =============================================================================
// Sync Status
// =============================================================================

/// What the agent is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Syncing,
    /// Last attempt found the backend unreachable.
    Offline,
    /// Last attempt finished with errors.
    Error,
    Stopped,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Syncing => write!(f, "syncing"),
            AgentState::Offline => write!(f, "offline"),
            AgentState::Error => write!(f, "error"),
            AgentState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Current sync status for external queries.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub state: AgentState,

    pub mode: SyncMode,

    /// Orders and collections still waiting for upload.
    pub pending_count: u64,

    /// Last successful sync.
    pub last_sync: Option<DateTime<Utc>>,

    pub last_report: Option<SyncReport>,

    /// Last error message (if any).
    pub last_error: Option<String>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync events (UI bridge, logs).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits a sync progress event.
    fn emit_progress(&self, pending: u64, uploaded: usize);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: u64, _uploaded: usize) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Background runner around a [`SyncEngine`].
pub struct SyncAgent<R> {
    engine: Arc<SyncEngine<R>>,
    config: Arc<SyncConfig>,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    run_guard: Arc<Mutex<()>>,
}

impl<R> Clone for SyncAgent<R> {
    fn clone(&self) -> Self {
        SyncAgent {
            engine: self.engine.clone(),
            config: self.config.clone(),
            status: self.status.clone(),
            emitter: self.emitter.clone(),
            run_guard: self.run_guard.clone(),
        }
    }
}

impl<R: RemoteBackend + 'static> SyncAgent<R> {
    /// Creates a new sync agent.
    pub fn new(engine: Arc<SyncEngine<R>>, config: SyncConfig) -> Self {
        Self::with_emitter(engine, config, Arc::new(NoOpEmitter))
    }

    /// Creates a new sync agent with a custom event emitter.
    pub fn with_emitter(
        engine: Arc<SyncEngine<R>>,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = SyncStatus {
            mode: config.sync.mode,
            ..Default::default()
        };

        SyncAgent {
            engine,
            config: Arc::new(config),
            status: Arc::new(RwLock::new(status)),
            emitter,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Runs one full sync now, waiting for a running one to finish first.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        if !self.config.is_sync_enabled() {
            return Err(SyncError::InvalidConfig("sync is disabled (mode: offline)".into()));
        }
        let _guard = self.run_guard.lock().await;
        Ok(self.run_locked().await)
    }

    /// Runs one full sync unless one is already running.
    async fn try_sync(&self) -> Option<SyncReport> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            debug!("Sync already running, request coalesced");
            return None;
        };
        Some(self.run_locked().await)
    }

    async fn run_locked(&self) -> SyncReport {
        self.set_state(AgentState::Syncing).await;

        let report = self.engine.full_sync().await;

        let overview = self.engine.overview().await;

        {
            let mut status = self.status.write().await;
            status.state = if report.success {
                AgentState::Idle
            } else if report.offline {
                AgentState::Offline
            } else {
                AgentState::Error
            };
            status.last_error = report.errors.first().cloned();
            match &overview {
                Ok(overview) => {
                    status.pending_count = overview.pending_count;
                    status.last_sync = overview.last_sync;
                }
                Err(err) => warn!(%err, "Could not read sync overview"),
            }
            status.last_report = Some(report.clone());
            self.emitter.emit_status(&status);
        }

        if let Ok(overview) = &overview {
            self.emitter
                .emit_progress(overview.pending_count, report.uploaded.total());
        }
        if let Some(message) = report.errors.first() {
            self.emitter.emit_error(message, report.offline);
        }

        report
    }

    async fn set_state(&self, state: AgentState) {
        let mut status = self.status.write().await;
        status.state = state;
        self.emitter.emit_status(&status);
    }

    /// Spawns the background loop.
    ///
    /// In `offline` mode the loop only waits for shutdown.
    pub fn start(&self) -> SyncAgentHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        info!(
            device_id = %self.config.device_id(),
            mode = %self.config.mode(),
            interval_secs = self.config.sync.interval_secs,
            "Starting sync agent"
        );

        let task = tokio::spawn(self.clone().run(trigger_rx, shutdown_rx));

        SyncAgentHandle {
            trigger_tx,
            shutdown_tx,
            status: self.status.clone(),
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mode = self.config.mode();
        let mut interval = tokio::time::interval(self.config.sync.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick(), if mode.is_periodic() => {
                    debug!("Periodic sync");
                    self.try_sync().await;
                }

                Some(()) = trigger_rx.recv() => {
                    if mode.is_sync_enabled() {
                        debug!("Triggered sync");
                        self.try_sync().await;
                    } else {
                        debug!("Sync disabled, trigger ignored");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        self.set_state(AgentState::Stopped).await;
        info!("Sync agent stopped");
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`SyncAgent`] from outside.
pub struct SyncAgentHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SyncStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncAgentHandle {
    /// Gets the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Asks for a sync. Returns false if one was already queued.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Signals the agent to stop and waits for a running sync to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(err) = task.await {
                warn!(%err, "Sync agent task ended abnormally");
            }
        }
    }
}
