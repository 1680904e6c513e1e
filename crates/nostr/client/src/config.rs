use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::DEFAULT_FLUSH_WINDOW;
use crate::pool::PoolConfig;
use crate::relay::RelayConfig;
use crate::subscription::FilterSpec;
use crate::validator::DEFAULT_MAX_CONTENT_LENGTH;
use nostr::KIND_TEXT_NOTE;

pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay-jp.nostr.wirednet.jp",
    "wss://yabu.me",
    "wss://r.kojira.io",
    "wss://relay.barine.co",
];

/// Default moderation wordlist, relative to the working directory.
pub const DEFAULT_WORDLIST_SOURCE: &str = "ngwords.json";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub relays: Vec<String>,
    pub max_relays: usize,
    pub max_content_length: usize,
    pub flush_window: Duration,
    pub request_limit: usize,
    pub lookback: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on one socket write before the session is treated as broken.
    pub write_timeout: Duration,
    /// URL or path of the default moderation wordlist. `None` disables it.
    pub wordlist_source: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|url| (*url).to_string()).collect(),
            max_relays: 16,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            flush_window: DEFAULT_FLUSH_WINDOW,
            request_limit: 30,
            lookback: Duration::from_secs(3600),
            reconnect_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            wordlist_source: Some(DEFAULT_WORDLIST_SOURCE.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid NOSTR_TIMELINE_RELAYS: {0}")]
    InvalidRelays(String),
    #[error("invalid NOSTR_TIMELINE_MAX_RELAYS: {0}")]
    InvalidMaxRelays(String),
    #[error("invalid NOSTR_TIMELINE_MAX_CONTENT_LENGTH: {0}")]
    InvalidMaxContentLength(String),
    #[error("invalid NOSTR_TIMELINE_FLUSH_WINDOW_MS: {0}")]
    InvalidFlushWindow(String),
    #[error("invalid NOSTR_TIMELINE_REQUEST_LIMIT: {0}")]
    InvalidRequestLimit(String),
    #[error("invalid NOSTR_TIMELINE_LOOKBACK_SECONDS: {0}")]
    InvalidLookback(String),
    #[error("invalid NOSTR_TIMELINE_RECONNECT_DELAY_MS: {0}")]
    InvalidReconnectDelay(String),
    #[error("invalid NOSTR_TIMELINE_CONNECT_TIMEOUT_MS: {0}")]
    InvalidConnectTimeout(String),
    #[error("invalid NOSTR_TIMELINE_WRITE_TIMEOUT_MS: {0}")]
    InvalidWriteTimeout(String),
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let relays = match lookup("NOSTR_TIMELINE_RELAYS") {
            Some(raw) => {
                let relays = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                if relays.is_empty() {
                    return Err(ConfigError::InvalidRelays(
                        "at least one relay URL is required".to_string(),
                    ));
                }
                relays
            }
            None => defaults.relays,
        };

        let max_relays = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_MAX_RELAYS",
            defaults.max_relays,
            |raw| {
                raw.parse::<usize>()
                    .map(|value| value.max(1))
                    .map_err(|error| ConfigError::InvalidMaxRelays(error.to_string()))
            },
        )?;
        let max_content_length = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_MAX_CONTENT_LENGTH",
            defaults.max_content_length,
            |raw| {
                raw.parse::<usize>()
                    .map_err(|error| ConfigError::InvalidMaxContentLength(error.to_string()))
            },
        )?;
        let flush_window = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_FLUSH_WINDOW_MS",
            defaults.flush_window,
            |raw| {
                raw.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|error| ConfigError::InvalidFlushWindow(error.to_string()))
            },
        )?;
        let request_limit = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_REQUEST_LIMIT",
            defaults.request_limit,
            |raw| {
                raw.parse::<usize>()
                    .map(|value| value.max(1))
                    .map_err(|error| ConfigError::InvalidRequestLimit(error.to_string()))
            },
        )?;
        let lookback = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_LOOKBACK_SECONDS",
            defaults.lookback,
            |raw| {
                raw.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|error| ConfigError::InvalidLookback(error.to_string()))
            },
        )?;
        let reconnect_delay = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_RECONNECT_DELAY_MS",
            defaults.reconnect_delay,
            |raw| {
                raw.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|error| ConfigError::InvalidReconnectDelay(error.to_string()))
            },
        )?;
        let connect_timeout = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_CONNECT_TIMEOUT_MS",
            defaults.connect_timeout,
            |raw| {
                raw.parse::<u64>()
                    .map(|value| Duration::from_millis(value.max(1)))
                    .map_err(|error| ConfigError::InvalidConnectTimeout(error.to_string()))
            },
        )?;
        let write_timeout = parse_with_lookup(
            &lookup,
            "NOSTR_TIMELINE_WRITE_TIMEOUT_MS",
            defaults.write_timeout,
            |raw| {
                raw.parse::<u64>()
                    .map(|value| Duration::from_millis(value.max(1)))
                    .map_err(|error| ConfigError::InvalidWriteTimeout(error.to_string()))
            },
        )?;

        let wordlist_source = match lookup("NOSTR_TIMELINE_WORDLIST") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => defaults.wordlist_source,
        };

        Ok(Self {
            relays,
            max_relays,
            max_content_length,
            flush_window,
            request_limit,
            lookback,
            reconnect_delay,
            connect_timeout,
            write_timeout,
            wordlist_source,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_timeout: self.connect_timeout,
            reconnect_delay: self.reconnect_delay,
            write_timeout: self.write_timeout,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_relays: self.max_relays,
            relay_config: self.relay_config(),
        }
    }

    /// Text-note timeline filter.
    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            kinds: vec![KIND_TEXT_NOTE],
            limit: self.request_limit,
            lookback: self.lookback,
        }
    }
}

fn parse_with_lookup<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parser: impl FnOnce(String) -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parser(raw.trim().to_string()),
        None => Ok(default),
    }
}
