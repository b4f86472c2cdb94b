//! # Backend Connection
//!
//! One background task owns the WebSocket to the backend. Callers hand it a
//! [`Request`] together with a oneshot; the task writes the request, matches
//! the backend's [`Response`](crate::protocol::Response) by `request_id` and
//! completes the oneshot.
//!
//! ```text
//!  WsRemote::call ──Call{request, reply}──► task ══ WebSocket ══ backend
//!        ▲                                   │
//!        └──────── reply (oneshot) ◄─────────┘ waiting[request_id]
//! ```
//!
//! A lost connection drops every waiting oneshot, so callers see the loss
//! at once instead of waiting for their timeout. Reconnects back off
//! exponentially; `max_retries` consecutive failures stop the task for good.
//! The `hello` message opens every connection.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Reply, Request, SyncMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Waiting = HashMap<String, oneshot::Sender<Reply>>;

/// Connection settings, derived from the `[remote]` config section.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up; 0 retries forever.
    pub max_retries: u32,
    pub ping_interval: Duration,
    pub hello: Option<SyncMessage>,
}

impl ConnectionConfig {
    pub fn from_settings(url: &str, settings: &RemoteSettings) -> Self {
        ConnectionConfig {
            url: url.to_string(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
            max_retries: settings.max_retries,
            ping_interval: Duration::from_secs(settings.ping_interval_secs.max(1)),
            hello: None,
        }
    }

    pub fn with_hello(mut self, hello: SyncMessage) -> Self {
        self.hello = Some(hello);
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// A request on its way to the connection task.
struct Call {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable handle to the connection task.
#[derive(Clone)]
pub struct Connection {
    calls: mpsc::Sender<Call>,
    connected: watch::Receiver<bool>,
    stop: Arc<Notify>,
}

impl Connection {
    /// Spawns the connection task for `config`.
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (calls_tx, calls_rx) = mpsc::channel(64);
        let (connected_tx, connected_rx) = watch::channel(false);
        let stop = Arc::new(Notify::new());

        let task = ConnectionTask {
            config,
            calls: calls_rx,
            connected: connected_tx,
            stop: stop.clone(),
        };
        tokio::spawn(task.run());

        Connection {
            calls: calls_tx,
            connected: connected_rx,
            stop,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Waits up to `within` for the connection to come up.
    pub async fn wait_connected(&self, within: Duration) -> bool {
        let mut connected = self.connected.clone();
        let up = matches!(timeout(within, connected.wait_for(|up| *up)).await, Ok(Ok(_)));
        up
    }

    /// Queues a request. The returned receiver yields the reply, or an
    /// error once the connection that carried the request is gone.
    ///
    /// Returns `None` when the task has stopped.
    pub async fn submit(&self, request: Request) -> Option<oneshot::Receiver<Reply>> {
        let (reply, answer) = oneshot::channel();
        self.calls.send(Call { request, reply }).await.ok()?;
        Some(answer)
    }

    /// Closes the socket and stops the task.
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }
}

// =============================================================================
// Task
// =============================================================================

struct ConnectionTask {
    config: ConnectionConfig,
    calls: mpsc::Receiver<Call>,
    connected: watch::Sender<bool>,
    stop: Arc<Notify>,
}

/// Why a connection ended without a socket error.
enum End {
    ClosedByBackend,
    Stopped,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut backoff = self.config.backoff();
        let mut failures = 0u32;

        loop {
            match self.open().await {
                Ok(socket) => {
                    info!(url = %self.config.url, "Connected to backend");
                    backoff.reset();
                    failures = 0;
                    self.connected.send_replace(true);

                    let ended = self.serve(socket).await;
                    self.connected.send_replace(false);
                    match ended {
                        Ok(End::Stopped) => break,
                        Ok(End::ClosedByBackend) => info!("Backend closed the connection"),
                        Err(err) => warn!(%err, "Connection lost"),
                    }
                }
                Err(err) => warn!(%err, url = %self.config.url, "Connect failed"),
            }

            failures += 1;
            if self.config.max_retries > 0 && failures >= self.config.max_retries {
                error!(attempts = failures, "Giving up on the backend");
                break;
            }

            let Some(wait) = backoff.next_backoff() else {
                break;
            };
            debug!(?wait, attempt = failures, "Reconnecting after backoff");
            if !self.idle(wait).await {
                break;
            }
        }

        info!("Connection task stopped");
    }

    async fn open(&self) -> SyncResult<Socket> {
        match timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())).await {
            Ok(Ok((socket, _))) => Ok(socket),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(SyncError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Sleeps through a backoff. Calls arriving meanwhile are dropped, which
    /// fails them immediately. Returns false if the task should stop.
    async fn idle(&mut self, wait: Duration) -> bool {
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.stop.notified() => return false,
                call = self.calls.recv() => match call {
                    Some(call) => debug!(request_id = %call.request.request_id, "Dropped request while offline"),
                    None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, socket: Socket) -> SyncResult<End> {
        let (mut sink, mut stream) = socket.split();
        let mut waiting = Waiting::new();

        if let Some(hello) = &self.config.hello {
            sink.send(frame(hello)?).await?;
        }

        let period = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                call = self.calls.recv() => {
                    let Some(Call { request, reply }) = call else {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Ok(End::Stopped);
                    };
                    let request_id = request.request_id.clone();
                    sink.send(frame(&SyncMessage::Request(request))?).await?;
                    waiting.insert(request_id, reply);
                }

                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(answer) = handle_text(&text, &mut waiting) {
                            sink.send(frame(&answer)?).await?;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => sink.send(WsMessage::Pong(data)).await?,
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(End::ClosedByBackend),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                },

                _ = ping.tick() => sink.send(WsMessage::Ping(Vec::new().into())).await?,

                _ = self.stop.notified() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(End::Stopped);
                }
            }
        }
    }
}

fn frame(message: &SyncMessage) -> SyncResult<WsMessage> {
    Ok(WsMessage::Text(message.to_json()?.into()))
}

/// Handles one text frame from the backend and returns what to send back.
fn handle_text(text: &str, waiting: &mut Waiting) -> Option<SyncMessage> {
    match SyncMessage::from_json(text) {
        Ok(SyncMessage::Response(response)) => {
            match waiting.remove(&response.request_id) {
                Some(reply) => {
                    let _ = reply.send(response.reply);
                }
                None => debug!(request_id = %response.request_id, "Late or unknown response"),
            }
            None
        }
        Ok(SyncMessage::Ping { timestamp }) => Some(SyncMessage::pong(&timestamp)),
        Ok(SyncMessage::Error { code, message }) => {
            warn!(%code, %message, "Backend error");
            None
        }
        Ok(other) => {
            debug!(msg_type = other.type_name(), "Ignored message");
            None
        }
        Err(err) => {
            warn!(%err, "Unreadable frame from backend");
            None
        }
    }
}
