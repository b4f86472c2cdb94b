//! # Application Context
//!
//! Owns everything the agent opens: the Local Store, the remote backend, the
//! sync engine and, in daemon mode, the running [`SyncAgent`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         AppContext lifecycle                            │
//! │                                                                         │
//! │  init(config, db_override)                                              │
//! │    1. resolve database path (flag > config/env > platform data dir)    │
//! │    2. Database::new(DbConfig::new(path))   ◄── opened exactly once      │
//! │    3. WsRemote::connect(url, hello)                                     │
//! │    4. SyncEngine::new(db, remote, options)                              │
//! │                                                                         │
//! │  dry_run(config, db_override)                                           │
//! │    same, but copies the store into memory and uses MemoryRemote        │
//! │                                                                         │
//! │  shutdown()                                                             │
//! │    stop agent ──► close pool                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use preventa_core::{
    Client, Collection, Order, PriceListMarkupRule, Product, Reconciliation, RouteSheet, RouteStop,
    StopPayment, StopReturn,
};
use preventa_db::{Database, DbConfig, LocalStore, Record};
use preventa_sync::{
    MemoryRemote, RemoteBackend, SyncAgent, SyncAgentHandle, SyncConfig, SyncEngine,
    SyncEventEmitter, SyncMessage, SyncOptions, WsRemote,
};
use tracing::{debug, info};

/// Handles shared by every command.
pub struct AppContext<R> {
    pub config: SyncConfig,
    pub db: Database,
    pub engine: Arc<SyncEngine<R>>,
    agent: Option<SyncAgentHandle>,
}

impl AppContext<WsRemote> {
    /// Opens the Local Store and connects to the configured backend.
    pub async fn init(config: SyncConfig, db_override: Option<PathBuf>) -> Result<Self> {
        let url = config
            .remote_url()
            .ok_or_else(|| anyhow!("no remote URL configured (set [remote] url or PREVENTA_REMOTE_URL)"))?
            .to_string();

        let db = open_database(&config, db_override).await?;

        let hello = SyncMessage::hello(config.device_id(), config.user_id());
        let remote = Arc::new(WsRemote::connect(&url, &config.remote, hello));
        info!(url = %url, "Remote backend configured");

        Ok(Self::assemble(config, db, remote))
    }

    /// Waits until the backend connection is up, at most the connect timeout.
    ///
    /// Returns false on timeout; the sync itself then reports offline.
    pub async fn wait_connected(&self) -> bool {
        let deadline = Duration::from_secs(self.config.remote.connect_timeout_secs.max(1));
        let connected = self.engine.remote().wait_connected(deadline).await;
        debug!(connected, "Waited for backend connection");
        connected
    }
}

impl AppContext<MemoryRemote> {
    /// Runs against an in-memory copy of the Local Store and an empty
    /// in-memory backend. The database on disk is only read.
    pub async fn dry_run(config: SyncConfig, db_override: Option<PathBuf>) -> Result<Self> {
        let source = open_database(&config, db_override).await?;
        let scratch = Database::new(DbConfig::in_memory())
            .await
            .context("opening scratch database")?;

        copy_store(&source, &scratch).await?;
        source.close().await;

        info!("Dry run: syncing a scratch copy against an in-memory backend");
        Ok(Self::assemble(config, scratch, Arc::new(MemoryRemote::new())))
    }
}

impl<R: RemoteBackend + 'static> AppContext<R> {
    fn assemble(config: SyncConfig, db: Database, remote: Arc<R>) -> Self {
        let engine = Arc::new(SyncEngine::new(
            db.clone(),
            remote,
            SyncOptions::from_config(&config),
        ));

        AppContext {
            config,
            db,
            engine,
            agent: None,
        }
    }

    /// Starts the background agent. Later calls return the running one.
    pub fn start_agent(&mut self, emitter: Arc<dyn SyncEventEmitter>) -> &SyncAgentHandle {
        let engine = self.engine.clone();
        let config = self.config.clone();
        self.agent
            .get_or_insert_with(|| SyncAgent::with_emitter(engine, config, emitter).start())
    }

    /// Stops the agent (if running) and closes the database.
    pub async fn shutdown(mut self) {
        if let Some(agent) = self.agent.take() {
            agent.shutdown().await;
        }
        self.db.close().await;
        info!("Context shut down");
    }
}

/// Opens the database at the flag path, the configured path, or the
/// platform default, creating its directory when needed.
pub async fn open_database(config: &SyncConfig, db_override: Option<PathBuf>) -> Result<Database> {
    let path = db_override
        .or_else(|| config.database_path())
        .ok_or_else(|| anyhow!("could not determine the database path"))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
    }

    info!(path = %path.display(), "Opening Local Store");
    let db = Database::new(DbConfig::new(&path))
        .await
        .with_context(|| format!("opening database {}", path.display()))?;

    if !db.health_check().await {
        bail!("database {} failed its health check", path.display());
    }
    Ok(db)
}

// =============================================================================
// Scratch copy
// =============================================================================

async fn copy_store(from: &Database, to: &Database) -> Result<()> {
    let (src, dst) = (from.store(), to.store());

    copy::<Client>(&src, &dst).await?;
    copy::<Product>(&src, &dst).await?;
    copy::<PriceListMarkupRule>(&src, &dst).await?;
    copy::<Order>(&src, &dst).await?;
    copy::<Collection>(&src, &dst).await?;
    copy::<RouteSheet>(&src, &dst).await?;
    copy::<RouteStop>(&src, &dst).await?;
    copy::<StopPayment>(&src, &dst).await?;
    copy::<StopReturn>(&src, &dst).await?;
    copy::<Reconciliation>(&src, &dst).await?;

    if let Some(at) = from.sync_state().last_sync().await? {
        to.sync_state().record_sync(at).await?;
    }
    Ok(())
}

async fn copy<R: Record>(src: &LocalStore, dst: &LocalStore) -> Result<()> {
    let records: Vec<R> = src.get_all().await?;
    debug!(collection = R::COLLECTION, count = records.len(), "Copied to scratch store");
    dst.put_many(&records).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use preventa_core::{Money, NewCollection};

    #[tokio::test]
    async fn test_dry_run_leaves_source_untouched() {
        let dir = std::env::temp_dir().join(format!("preventa-agent-{}", std::process::id()));
        let path = dir.join("dry.db");
        let config = SyncConfig::default();

        let db = open_database(&config, Some(path.clone())).await.unwrap();
        db.collections()
            .create(
                NewCollection {
                    client_id: "c1".into(),
                    client_name: None,
                    amount: Money::from_units(250),
                    method: preventa_core::CollectionMethod::Cash,
                    reference: None,
                    notes: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        db.close().await;

        let ctx = AppContext::dry_run(config.clone(), Some(path.clone())).await.unwrap();
        let report = ctx.engine.full_sync().await;
        assert!(report.success, "errors: {:?}", report.errors);
        assert_eq!(report.uploaded.collections, 1);
        assert_eq!(ctx.engine.remote().records("collections").await.len(), 1);
        ctx.shutdown().await;

        let db = open_database(&config, Some(path)).await.unwrap();
        assert_eq!(db.collections().count_pending().await.unwrap(), 1);
        db.close().await;

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_init_requires_remote_url() {
        let mut config = SyncConfig::default();
        config.remote.url = None;

        let err = AppContext::init(config, Some(PathBuf::from(":memory:")))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("remote URL"));
    }
}
