//! Subscription management for receiving filtered events.
//!
//! One subscription is active at a time. Starting a new one replaces the id
//! and clears the seen set, so events still arriving for the old id are
//! dropped.

use crate::buffer::EventBuffer;
use crate::message::{ClientMessage, PublishConfirmation, RelayMessage, parse_relay_message};
use crate::pool::RelayPool;
use crate::validator::ContentValidator;
use nostr::{Filter, KIND_TEXT_NOTE, is_timeline_kind, unix_now};
use parking_lot::Mutex;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SUBSCRIPTION_ID_LEN: usize = 12;

/// What to ask relays for. `since` is computed from `lookback` each time a
/// REQ is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub kinds: Vec<u16>,
    pub limit: usize,
    pub lookback: Duration,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            kinds: vec![KIND_TEXT_NOTE],
            limit: 30,
            lookback: Duration::from_secs(3600),
        }
    }
}

impl FilterSpec {
    /// Wire filter relative to `now` (unix seconds).
    pub fn to_filter(&self, now: u64) -> Filter {
        Filter::new()
            .kinds(self.kinds.iter().copied())
            .limit(self.limit)
            .since(now.saturating_sub(self.lookback.as_secs()))
    }
}

/// Outcome of handling one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Event accepted and queued for delivery.
    Delivered(String),
    /// Event id already seen in this subscription.
    Duplicate(String),
    /// Event for a subscription id that is no longer active.
    Stale(String),
    /// Event failed kind or content validation.
    Rejected(String),
    /// `OK` reply to a publish.
    Confirmation(PublishConfirmation),
    EndOfStoredEvents(String),
    Notice(String),
    /// Frame that needs no handling (AUTH, unknown kinds).
    Ignored,
    /// Frame that could not be parsed.
    Malformed,
}

#[derive(Debug, Clone)]
struct ActiveSubscription {
    id: String,
    spec: FilterSpec,
}

#[derive(Default)]
struct SubscriptionState {
    active: Option<ActiveSubscription>,
    seen: HashSet<String>,
    eose: HashSet<String>,
}

/// Owns the active subscription and its seen set.
pub struct SubscriptionManager {
    pool: Arc<RelayPool>,
    validator: Arc<ContentValidator>,
    buffer: Arc<EventBuffer>,
    state: Mutex<SubscriptionState>,
}

impl SubscriptionManager {
    pub fn new(
        pool: Arc<RelayPool>,
        validator: Arc<ContentValidator>,
        buffer: Arc<EventBuffer>,
    ) -> Self {
        Self {
            pool,
            validator,
            buffer,
            state: Mutex::new(SubscriptionState::default()),
        }
    }

    /// Start a new subscription, replacing the active one.
    ///
    /// Relays that open later receive the REQ through [`SubscriptionManager::replay_to`].
    pub async fn start(&self, spec: FilterSpec) -> String {
        let id = generate_subscription_id();
        let previous = {
            let mut state = self.state.lock();
            state.seen.clear();
            state.eose.clear();
            state.active.replace(ActiveSubscription {
                id: id.clone(),
                spec: spec.clone(),
            })
        };

        if let Some(previous) = previous {
            self.pool
                .broadcast(&ClientMessage::close(previous.id.clone()))
                .await;
            debug!(subscription = %previous.id, "closed previous subscription");
        }

        let request = ClientMessage::req(id.clone(), spec.to_filter(unix_now()));
        let sent = self.pool.broadcast(&request).await;
        info!(subscription = %id, relays = sent, kinds = ?spec.kinds, "subscription started");
        id
    }

    /// Re-issue the active REQ to a relay that just opened.
    pub async fn replay_to(&self, url: &str) -> bool {
        let Some(active) = self.state.lock().active.clone() else {
            return false;
        };
        let request = ClientMessage::req(active.id.clone(), active.spec.to_filter(unix_now()));
        let sent = self.pool.send_to(url, &request).await;
        if sent {
            debug!(relay = %url, subscription = %active.id, "replayed subscription");
        }
        sent
    }

    /// Close the active subscription on every relay. No-op when none is active.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.seen.clear();
            state.eose.clear();
            state.active.take()
        };
        if let Some(previous) = previous {
            let sent = self
                .pool
                .broadcast(&ClientMessage::close(previous.id.clone()))
                .await;
            info!(subscription = %previous.id, relays = sent, "subscription stopped");
        }
    }

    /// Parse and classify one inbound frame from `url`.
    pub fn handle_incoming(&self, url: &str, raw: &str) -> Incoming {
        let message = match parse_relay_message(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return Incoming::Ignored,
            Err(error) => {
                warn!(relay = %url, %error, "dropping malformed relay message");
                return Incoming::Malformed;
            }
        };

        match message {
            RelayMessage::Event(subscription_id, event) => {
                {
                    let mut state = self.state.lock();
                    let is_current = state
                        .active
                        .as_ref()
                        .is_some_and(|active| active.id == subscription_id);
                    if !is_current {
                        debug!(relay = %url, subscription = %subscription_id, "dropping event for stale subscription");
                        return Incoming::Stale(subscription_id);
                    }
                    if !state.seen.insert(event.id.clone()) {
                        return Incoming::Duplicate(event.id);
                    }
                }

                if !is_timeline_kind(event.kind) {
                    debug!(relay = %url, event = %event.id, kind = event.kind, "dropping unsupported kind");
                    return Incoming::Rejected(event.id);
                }
                if self.validator.is_content_invalid(&event.content) {
                    debug!(relay = %url, event = %event.id, "dropping event rejected by moderation");
                    return Incoming::Rejected(event.id);
                }

                let id = event.id.clone();
                self.buffer.push(event);
                Incoming::Delivered(id)
            }
            RelayMessage::Ok(event_id, accepted, message) => {
                Incoming::Confirmation(PublishConfirmation {
                    relay_url: url.to_string(),
                    event_id,
                    accepted,
                    message,
                })
            }
            RelayMessage::Eose(subscription_id) => {
                let mut state = self.state.lock();
                let is_current = state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.id == subscription_id);
                if is_current {
                    state.eose.insert(url.to_string());
                    debug!(relay = %url, subscription = %subscription_id, "end of stored events");
                }
                Incoming::EndOfStoredEvents(subscription_id)
            }
            RelayMessage::Notice(notice) => {
                info!(relay = %url, notice = %notice, "relay notice");
                Incoming::Notice(notice)
            }
            RelayMessage::Auth(_) => Incoming::Ignored,
        }
    }

    /// Record `event_id` as seen so a relay echo of it is not delivered again.
    pub fn mark_seen(&self, event_id: &str) {
        self.state.lock().seen.insert(event_id.to_string());
    }

    pub fn active_id(&self) -> Option<String> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.id.clone())
    }

    /// Whether the active subscription asks for `kind`. True when nothing is active.
    pub fn accepts_kind(&self, kind: u16) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_none_or(|active| active.spec.kinds.contains(&kind))
    }

    /// Whether `url` finished replaying stored events for the active subscription.
    pub fn eose_received(&self, url: &str) -> bool {
        self.state.lock().eose.contains(url)
    }
}

fn generate_subscription_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(SUBSCRIPTION_ID_LEN)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    format!("sub-{}", suffix)
}
