//! Relay pool for multi-relay fanout.

use crate::message::ClientMessage;
use crate::relay::{RelayConfig, RelayConnection, RelayEvent, normalize_relay_url};
use crate::transport::{Connector, WebSocketConnector};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Relay pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of relays in the pool.
    pub max_relays: usize,
    /// Relay configuration template.
    pub relay_config: RelayConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_relays: 16,
            relay_config: RelayConfig::default(),
        }
    }
}

/// Open/closed view of one relay, for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub url: String,
    pub open: bool,
}

/// Owns one [`RelayConnection`] per desired endpoint.
pub struct RelayPool {
    relays: RwLock<HashMap<String, Arc<RelayConnection>>>,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayPool {
    /// Create a WebSocket-backed pool. Connection events arrive on the
    /// returned receiver.
    pub fn new(config: PoolConfig) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(
        config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let pool = Self {
            relays: RwLock::new(HashMap::new()),
            config,
            connector,
            events,
        };
        (pool, events_rx)
    }

    /// Reconcile live connections with `urls`.
    ///
    /// Connections whose URL left the list are closed, new URLs are connected,
    /// and connections that stay in the list are not touched.
    pub async fn set_endpoints<S: AsRef<str>>(&self, urls: &[S]) {
        let mut desired: Vec<String> = Vec::new();
        for raw in urls {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            match normalize_relay_url(raw) {
                Ok(url) if !desired.contains(&url) => desired.push(url),
                Ok(_) => {}
                Err(error) => self.report_invalid(raw, &error.to_string()),
            }
        }

        let mut removed = Vec::new();
        let mut added = Vec::new();
        {
            let mut relays = self.relays.write().await;
            relays.retain(|url, relay| {
                let keep = desired.contains(url);
                if !keep {
                    removed.push(Arc::clone(relay));
                }
                keep
            });

            for url in desired {
                if relays.contains_key(&url) {
                    continue;
                }
                if relays.len() >= self.config.max_relays {
                    warn!(
                        relay = %url,
                        max_relays = self.config.max_relays,
                        "maximum relay limit reached, skipping relay"
                    );
                    continue;
                }
                match RelayConnection::new(
                    &url,
                    self.config.relay_config.clone(),
                    Arc::clone(&self.connector),
                    self.events.clone(),
                ) {
                    Ok(relay) => {
                        let relay = Arc::new(relay);
                        relays.insert(url, Arc::clone(&relay));
                        added.push(relay);
                    }
                    Err(error) => self.report_invalid(&url, &error.to_string()),
                }
            }
        }

        join_all(removed.iter().map(|relay| {
            info!(relay = %relay.url(), "removing relay");
            relay.close()
        }))
        .await;
        for relay in added {
            info!(relay = %relay.url(), "adding relay");
            relay.connect().await;
        }
    }

    /// Send `message` to every open relay concurrently. Returns how many
    /// relays it was written to; a stalled relay costs at most its write
    /// timeout.
    pub async fn broadcast(&self, message: &ClientMessage) -> usize {
        let relays = self.snapshot().await;
        let sent = join_all(relays.iter().map(|relay| relay.send(message)))
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count();
        debug!(sent, relays = relays.len(), "broadcast");
        sent
    }

    /// Send `message` to one relay.
    pub async fn send_to(&self, url: &str, message: &ClientMessage) -> bool {
        match self.relay(url).await {
            Some(relay) => relay.send(message).await,
            None => false,
        }
    }

    /// Whether the relay at `url` is open. Unknown URLs report `false`.
    pub async fn status(&self, url: &str) -> bool {
        match self.relay(url).await {
            Some(relay) => relay.is_open().await,
            None => false,
        }
    }

    /// Status of every relay, sorted by URL.
    pub async fn statuses(&self) -> Vec<RelayStatus> {
        let mut statuses = Vec::new();
        for relay in self.snapshot().await {
            statuses.push(RelayStatus {
                url: relay.url().to_string(),
                open: relay.is_open().await,
            });
        }
        statuses.sort_by(|left, right| left.url.cmp(&right.url));
        statuses
    }

    /// Normalized URLs of every relay in the pool, sorted.
    pub async fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.relays.read().await.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Close and drop every relay.
    pub async fn close_all(&self) {
        let relays: Vec<Arc<RelayConnection>> =
            self.relays.write().await.drain().map(|(_, relay)| relay).collect();
        join_all(relays.iter().map(|relay| relay.close())).await;
    }

    /// Get relay by URL (normalized before lookup).
    pub async fn relay(&self, url: &str) -> Option<Arc<RelayConnection>> {
        let url = normalize_relay_url(url).ok()?;
        self.relays.read().await.get(&url).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<RelayConnection>> {
        self.relays.read().await.values().cloned().collect()
    }

    fn report_invalid(&self, url: &str, message: &str) {
        warn!(relay = %url, error = %message, "invalid relay URL");
        let _ = self.events.send(RelayEvent::Error {
            url: url.to_string(),
            message: message.to_string(),
        });
    }
}
