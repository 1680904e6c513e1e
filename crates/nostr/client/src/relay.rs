//! Single relay connection management.
//!
//! A [`RelayConnection`] owns one session at a time. The session runs in a
//! lifecycle task that connects, forwards frames, and after any close it did
//! not ask for waits `reconnect_delay` before trying exactly once more. A
//! write that fails or outlives `write_timeout` drops the session onto the
//! same reconnect path. All output goes to the owner as [`RelayEvent`]s on one
//! channel.

use crate::error::{ClientError, Result};
use crate::message::ClientMessage;
use crate::transport::{BoxSink, BoxStream, Connector};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Lifecycle notification emitted by a relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Opened { url: String },
    Closed { url: String, reconnecting: bool },
    Message { url: String, text: String },
    Error { url: String, message: String },
}

/// Relay connection configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connect_timeout: Duration,
    /// Delay between an unrequested close and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on a single frame write, lock wait included.
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_millis(5000),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Normalize a relay URL to its pool identity: `ws`/`wss` only, no trailing slash.
pub fn normalize_relay_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ClientError::InvalidUrl(format!("missing host: {}", raw)));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Write half of a live session. `fault` wakes the session's reader when a
/// write fails so the session goes down the reconnect path.
struct SessionWriter {
    sink: BoxSink,
    fault: Arc<Notify>,
}

/// Relay connection.
pub struct RelayConnection {
    url: String,
    config: RelayConfig,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<SessionWriter>>>,
    events: mpsc::UnboundedSender<RelayEvent>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl RelayConnection {
    /// Create a connection (not connected until [`RelayConnection::connect`]).
    pub fn new(
        url: &str,
        config: RelayConfig,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Result<Self> {
        Ok(Self {
            url: normalize_relay_url(url)?,
            config,
            connector,
            state: Arc::new(RwLock::new(ConnectionState::Closed)),
            writer: Arc::new(Mutex::new(None)),
            events,
            lifecycle: Mutex::new(None),
        })
    }

    /// Normalized relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Start a new session, closing the current one first.
    ///
    /// Connection failures are reported as [`RelayEvent::Error`] and retried by
    /// the lifecycle task; this call itself never fails.
    pub async fn connect(&self) {
        self.shutdown().await;
        let session = Session {
            url: self.url.clone(),
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            state: Arc::clone(&self.state),
            writer: Arc::clone(&self.writer),
            events: self.events.clone(),
        };
        *self.lifecycle.lock().await = Some(tokio::spawn(session.run()));
    }

    /// Tear down the session and cancel any pending reconnect.
    pub async fn close(&self) {
        if self.shutdown().await {
            info!(relay = %self.url, "relay closed");
            let _ = self.events.send(RelayEvent::Closed {
                url: self.url.clone(),
                reconnecting: false,
            });
        }
    }

    /// Serialize and write `message` if the connection is open.
    ///
    /// Returns `false` without writing when the connection is not open, and
    /// when the write fails or does not finish within `write_timeout`. A failed
    /// write drops the session, which then reconnects after `reconnect_delay`.
    pub async fn send(&self, message: &ClientMessage) -> bool {
        if !self.is_open().await {
            return false;
        }
        let text = match message.as_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(relay = %self.url, %error, "failed to serialize outbound message");
                return false;
            }
        };

        let Ok(mut slot) = timeout(self.config.write_timeout, self.writer.lock()).await else {
            warn!(relay = %self.url, "writer busy past write timeout, message dropped");
            return false;
        };
        let Some(writer) = slot.as_mut() else {
            return false;
        };
        let failure =
            match timeout(self.config.write_timeout, writer.sink.send(Message::text(text))).await {
                Ok(Ok(())) => return true,
                Ok(Err(error)) => error.to_string(),
                Err(_) => format!("write timed out after {:?}", self.config.write_timeout),
            };

        warn!(relay = %self.url, error = %failure, "send failed, dropping session");
        if let Some(writer) = slot.take() {
            writer.fault.notify_one();
        }
        false
    }

    /// Stop the lifecycle task and drop the session. Returns whether a task
    /// was running.
    ///
    /// Never waits on a write in flight: if one holds the writer, the session
    /// is dropped without a close frame and that write times out on its own.
    async fn shutdown(&self) -> bool {
        let task = self.lifecycle.lock().await.take();
        let was_running = task.is_some();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        let writer = match self.writer.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                debug!(relay = %self.url, "write in flight, skipping close frame");
                None
            }
        };
        if let Some(mut writer) = writer {
            match timeout(self.config.write_timeout, writer.sink.send(Message::Close(None))).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    debug!(relay = %self.url, %error, "close frame not delivered");
                }
                Err(_) => debug!(relay = %self.url, "close frame timed out"),
            }
        }
        *self.state.write().await = ConnectionState::Closed;
        was_running
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut().take() {
            task.abort();
        }
    }
}

/// Everything the lifecycle task needs, detached from the owning connection.
struct Session {
    url: String,
    config: RelayConfig,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<SessionWriter>>>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl Session {
    async fn run(self) {
        loop {
            *self.state.write().await = ConnectionState::Connecting;
            debug!(relay = %self.url, "connecting");

            match timeout(self.config.connect_timeout, self.connector.connect(&self.url)).await {
                Ok(Ok((writer, reader))) => self.serve(writer, reader).await,
                Ok(Err(error)) => self.report_error(format!("connect failed: {}", error)),
                Err(_) => self.report_error(format!(
                    "connection timeout after {:?}",
                    self.config.connect_timeout
                )),
            }

            *self.state.write().await = ConnectionState::Closed;
            info!(
                relay = %self.url,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "relay disconnected, reconnect scheduled"
            );
            self.emit(RelayEvent::Closed {
                url: self.url.clone(),
                reconnecting: true,
            });

            sleep(self.config.reconnect_delay).await;
            info!(relay = %self.url, "reconnecting");
        }
    }

    async fn serve(&self, sink: BoxSink, mut reader: BoxStream) {
        let fault = Arc::new(Notify::new());
        *self.writer.lock().await = Some(SessionWriter {
            sink,
            fault: Arc::clone(&fault),
        });
        *self.state.write().await = ConnectionState::Open;
        info!(relay = %self.url, "relay connected");
        self.emit(RelayEvent::Opened {
            url: self.url.clone(),
        });

        loop {
            let frame = tokio::select! {
                frame = reader.next() => frame,
                () = fault.notified() => {
                    self.report_error("write failed".to_string());
                    break;
                }
            };
            match frame {
                Some(Ok(Message::Text(text))) => self.emit(RelayEvent::Message {
                    url: self.url.clone(),
                    text: text.to_string(),
                }),
                Some(Ok(Message::Ping(payload))) => {
                    debug!(relay = %self.url, bytes = payload.len(), "received ping");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    self.report_error(format!("read error: {}", error));
                    break;
                }
            }
        }

        self.writer.lock().await.take();
    }

    fn report_error(&self, message: String) {
        warn!(relay = %self.url, error = %message, "relay connection error");
        self.emit(RelayEvent::Error {
            url: self.url.clone(),
            message,
        });
    }

    fn emit(&self, event: RelayEvent) {
        if self.events.send(event).is_err() {
            debug!(relay = %self.url, "relay event receiver dropped");
        }
    }
}
