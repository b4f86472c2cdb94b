//! WebSocket [`RemoteBackend`].
//!
//! Each call fails fast with `Network` while the connection is down;
//! otherwise it is handed to the [`Connection`] task and waits up to
//! `request_timeout` for the matching response.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Filter, RemoteBackend};
use crate::config::RemoteSettings;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{RemoteError, RemoteResult};
use crate::protocol::{Operation, Reply, Request, SyncMessage};

/// Remote backend reached over the WebSocket connection.
pub struct WsRemote {
    connection: Connection,
    request_timeout: Duration,
}

impl WsRemote {
    /// Spawns the connection to `url`; `hello` opens every (re)connect.
    pub fn connect(url: &str, settings: &RemoteSettings, hello: SyncMessage) -> Self {
        let config = ConnectionConfig::from_settings(url, settings).with_hello(hello);
        WsRemote {
            connection: Connection::spawn(config),
            request_timeout: settings.request_timeout(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Waits up to `within` for the connection to come up.
    pub async fn wait_connected(&self, within: Duration) -> bool {
        self.connection.wait_connected(within).await
    }

    /// Closes the connection.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    async fn call(&self, op: Operation) -> RemoteResult<Reply> {
        if !self.connection.is_connected() {
            return Err(RemoteError::Network("not connected to backend".into()));
        }

        let request = Request::new(op);
        let request_id = request.request_id.clone();
        debug!(request_id = %request_id, collection = request.op.collection(), "Sending request");

        let answer = self
            .connection
            .submit(request)
            .await
            .ok_or_else(|| RemoteError::Network("connection stopped".into()))?;

        match tokio::time::timeout(self.request_timeout, answer).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RemoteError::Network("connection dropped before reply".into())),
            Err(_) => {
                debug!(request_id = %request_id, "Request timed out");
                Err(RemoteError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }
}

impl RemoteBackend for WsRemote {
    async fn select(&self, collection: &str, filter: &Filter) -> RemoteResult<Vec<Value>> {
        self.call(Operation::Select {
            collection: collection.to_string(),
            filter: filter.clone(),
        })
        .await?
        .into_rows()
    }

    async fn insert(&self, collection: &str, record: Value) -> RemoteResult<()> {
        self.call(Operation::Insert {
            collection: collection.to_string(),
            record,
        })
        .await?
        .into_ack()
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> RemoteResult<()> {
        self.call(Operation::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        })
        .await?
        .into_ack()
    }
}

impl Drop for WsRemote {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_remote_fails_fast() {
        // Nothing listens on port 9; the connection never comes up.
        let settings = RemoteSettings {
            connect_timeout_secs: 1,
            max_retries: 1,
            ..Default::default()
        };
        let remote = WsRemote::connect("ws://127.0.0.1:9/sync", &settings, SyncMessage::hello("dev-1", None));

        assert!(!remote.is_connected());
        let err = remote.probe().await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));

        remote.shutdown();
    }
}
