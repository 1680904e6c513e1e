//! In-process transport for driving relay sessions from tests.

use super::{BoxSink, BoxStream, Connector};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures_util::{future, sink, stream};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct MemoryState {
    refused: HashSet<String>,
    stalled: HashSet<String>,
    attempts: HashMap<String, usize>,
    remotes: HashMap<String, MemoryRemote>,
}

/// In-process transport. Every successful `connect` creates a fresh
/// [`MemoryRemote`] that plays the relay side of the session.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connection attempts to `url` fail until [`MemoryConnector::accept`].
    pub fn refuse(&self, url: &str) {
        self.state.lock().refused.insert(url.to_string());
    }

    pub fn accept(&self, url: &str) {
        self.state.lock().refused.remove(url);
    }

    /// Sessions opened to `url` from now on accept the connection but never
    /// drain writes, like a socket whose peer stopped reading.
    pub fn stall(&self, url: &str) {
        self.state.lock().stalled.insert(url.to_string());
    }

    /// Number of connection attempts made to `url`, refused ones included.
    pub fn attempts(&self, url: &str) -> usize {
        self.state.lock().attempts.get(url).copied().unwrap_or(0)
    }

    /// Take the relay side of the most recent session to `url`.
    ///
    /// Dropping the returned remote ends the session.
    pub fn take_remote(&self, url: &str) -> Option<MemoryRemote> {
        self.state.lock().remotes.remove(url)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<(BoxSink, BoxStream)> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Message>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let stalled = {
            let mut state = self.state.lock();
            *state.attempts.entry(url.to_string()).or_default() += 1;
            if state.refused.contains(url) {
                return Err(ClientError::Connection(format!(
                    "connection refused: {}",
                    url
                )));
            }
            state.remotes.insert(
                url.to_string(),
                MemoryRemote {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                },
            );
            state.stalled.contains(url)
        };

        let reader = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        if stalled {
            let writer = sink::unfold(outbound_tx, |_tx, _message: Message| {
                future::pending::<Result<mpsc::UnboundedSender<Message>>>()
            });
            return Ok((Box::pin(writer), Box::pin(reader)));
        }
        let writer = sink::unfold(outbound_tx, |tx, message: Message| async move {
            tx.send(message)
                .map_err(|_| ClientError::Connection("memory remote closed".to_string()))?;
            Ok::<_, ClientError>(tx)
        });
        Ok((Box::pin(writer), Box::pin(reader)))
    }
}

/// Relay side of an in-memory session.
pub struct MemoryRemote {
    inbound: mpsc::UnboundedSender<Result<Message>>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

impl MemoryRemote {
    /// Deliver a text frame to the client. Returns `false` once the client
    /// side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Ok(Message::text(text.into()))).is_ok()
    }

    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Surface a transport error on the client's read side.
    pub fn fail(&self, message: &str) -> bool {
        self.inbound
            .send(Err(ClientError::WebSocket(message.to_string())))
            .is_ok()
    }

    /// Drain every frame the client has written so far.
    pub fn frames(&mut self) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain the client's text frames, parsed as JSON.
    pub fn received(&mut self) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
                _ => None,
            })
            .collect()
    }

    /// End the session from the relay side.
    pub fn close(self) {}
}
