//! Publishing signed events to every open relay.

use crate::buffer::EventBuffer;
use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, PublishConfirmation};
use crate::pool::RelayPool;
use crate::signer::Signer;
use crate::subscription::SubscriptionManager;
use crate::validator::ContentValidator;
use nostr::{
    Event, KIND_REACTION, KIND_TEXT_NOTE, REACTION_LIKE, UnsignedEvent, reaction_tags, unix_now,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of published events whose relay confirmations are kept.
const MAX_TRACKED_EVENTS: usize = 256;

#[derive(Default)]
struct Confirmations {
    order: VecDeque<String>,
    by_event: HashMap<String, Vec<PublishConfirmation>>,
}

impl Confirmations {
    fn track(&mut self, event_id: &str) {
        if self.by_event.contains_key(event_id) {
            return;
        }
        if self.order.len() >= MAX_TRACKED_EVENTS
            && let Some(oldest) = self.order.pop_front()
        {
            self.by_event.remove(&oldest);
        }
        self.order.push_back(event_id.to_string());
        self.by_event.insert(event_id.to_string(), Vec::new());
    }

    fn forget(&mut self, event_id: &str) {
        self.by_event.remove(event_id);
        self.order.retain(|id| id != event_id);
    }
}

/// Builds, signs and broadcasts events.
pub struct Publisher {
    pool: Arc<RelayPool>,
    subscriptions: Arc<SubscriptionManager>,
    buffer: Arc<EventBuffer>,
    validator: Arc<ContentValidator>,
    signer: Option<Arc<dyn Signer>>,
    reacted: Mutex<HashSet<String>>,
    confirmations: Mutex<Confirmations>,
}

impl Publisher {
    pub fn new(
        pool: Arc<RelayPool>,
        subscriptions: Arc<SubscriptionManager>,
        buffer: Arc<EventBuffer>,
        validator: Arc<ContentValidator>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            pool,
            subscriptions,
            buffer,
            validator,
            signer,
            reacted: Mutex::new(HashSet::new()),
            confirmations: Mutex::new(Confirmations::default()),
        }
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Sign `content` as an event of `kind` and send it to every open relay.
    ///
    /// Fails before touching the network when the content is rejected or no
    /// signer is configured, and with [`ClientError::NoOpenRelay`] when the
    /// event reached no relay.
    pub async fn publish(&self, kind: u16, content: &str, tags: Vec<Vec<String>>) -> Result<Event> {
        if self.validator.is_content_invalid(content) {
            return Err(ClientError::ValidationRejected(format!(
                "content is longer than {} or contains a blocked word",
                self.validator.max_length()
            )));
        }
        let signer = self.signer.as_ref().ok_or(ClientError::SignerUnavailable)?;

        let pubkey = signer.get_public_key().await?;
        let unsigned = UnsignedEvent {
            pubkey,
            created_at: unix_now(),
            kind,
            tags,
            content: content.to_string(),
        };
        let event = signer.sign_event(unsigned).await?;

        // Seen and tracked before the broadcast: the echo and the OK can
        // arrive before broadcast returns.
        self.subscriptions.mark_seen(&event.id);
        self.confirmations.lock().track(&event.id);

        let sent = self.pool.broadcast(&ClientMessage::Event(event.clone())).await;
        if sent == 0 {
            self.confirmations.lock().forget(&event.id);
            warn!(event = %event.id, kind, "publish reached no relay");
            return Err(ClientError::NoOpenRelay);
        }
        info!(event = %event.id, kind, relays = sent, "published event");

        if self.subscriptions.accepts_kind(event.kind) {
            self.buffer.deliver_now(event.clone());
        }
        Ok(event)
    }

    /// Publish a text note. Blank content is rejected.
    pub async fn publish_note(&self, content: &str) -> Result<Event> {
        if content.trim().is_empty() {
            return Err(ClientError::ValidationRejected("content is empty".to_string()));
        }
        self.publish(KIND_TEXT_NOTE, content, Vec::new()).await
    }

    /// Like `target`. Returns `Ok(None)` when this session already reacted to it.
    pub async fn react(&self, target: &Event) -> Result<Option<Event>> {
        if !self.reacted.lock().insert(target.id.clone()) {
            debug!(event = %target.id, "already reacted");
            return Ok(None);
        }

        match self
            .publish(KIND_REACTION, REACTION_LIKE, reaction_tags(target))
            .await
        {
            Ok(reaction) => Ok(Some(reaction)),
            Err(error) => {
                self.reacted.lock().remove(&target.id);
                Err(error)
            }
        }
    }

    pub fn has_reacted(&self, event_id: &str) -> bool {
        self.reacted.lock().contains(event_id)
    }

    /// Record a relay's `OK` for an event published in this session.
    /// Confirmations for unknown events are ignored.
    pub fn record_confirmation(&self, confirmation: PublishConfirmation) {
        let mut confirmations = self.confirmations.lock();
        let Some(entries) = confirmations.by_event.get_mut(&confirmation.event_id) else {
            return;
        };
        if confirmation.accepted {
            debug!(relay = %confirmation.relay_url, event = %confirmation.event_id, "relay accepted event");
        } else {
            warn!(
                relay = %confirmation.relay_url,
                event = %confirmation.event_id,
                message = %confirmation.message,
                "relay rejected event"
            );
        }
        entries.retain(|entry| entry.relay_url != confirmation.relay_url);
        entries.push(confirmation);
    }

    /// Confirmations received so far for `event_id`, one per relay.
    pub fn confirmations(&self, event_id: &str) -> Vec<PublishConfirmation> {
        self.confirmations
            .lock()
            .by_event
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }
}
