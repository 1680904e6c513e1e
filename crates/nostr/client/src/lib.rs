//! Multi-relay Nostr timeline client.
//!
//! - reconnecting relay connections behind a [`Connector`] transport seam
//! - a relay pool reconciled against a desired URL list
//! - one active subscription with per-generation dedup and moderation
//! - time-windowed, `created_at`-ordered delivery
//! - publishing through an injected [`Signer`] with per-relay `OK` accounting

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod pool;
pub mod publisher;
pub mod relay;
pub mod signer;
pub mod subscription;
pub mod transport;
pub mod validator;
pub mod wordlist;

pub use buffer::{DEFAULT_FLUSH_WINDOW, EventBuffer, EventCallback};
pub use client::{StatusCallback, TimelineClient, TimelineClientBuilder};
pub use config::{ClientConfig, ConfigError, DEFAULT_RELAYS, DEFAULT_WORDLIST_SOURCE};
pub use error::{ClientError, Result};
pub use message::{ClientMessage, PublishConfirmation, RelayMessage, parse_relay_message};
pub use pool::{PoolConfig, RelayPool, RelayStatus};
pub use publisher::Publisher;
pub use relay::{ConnectionState, RelayConfig, RelayConnection, RelayEvent, normalize_relay_url};
pub use signer::Signer;
pub use subscription::{FilterSpec, Incoming, SubscriptionManager};
pub use transport::{BoxSink, BoxStream, Connector, WebSocketConnector};
#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MemoryConnector, MemoryRemote};
pub use validator::{ContentValidator, DEFAULT_MAX_CONTENT_LENGTH, is_invalid};
pub use wordlist::{load_wordlist, load_wordlist_or_default};
