//! Wire messages exchanged with relays.

use crate::error::{ClientError, Result};
use nostr::{Event, Filter};
use serde_json::{Value, json};

/// Message sent from the client to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["REQ", subscription_id, filter]`
    Req {
        subscription_id: String,
        filter: Filter,
    },
    /// `["EVENT", event]`
    Event(Event),
    /// `["CLOSE", subscription_id]`
    Close(String),
}

impl ClientMessage {
    pub fn req(subscription_id: impl Into<String>, filter: Filter) -> Self {
        Self::Req {
            subscription_id: subscription_id.into(),
            filter,
        }
    }

    pub fn close(subscription_id: impl Into<String>) -> Self {
        Self::Close(subscription_id.into())
    }

    /// JSON array form of the message.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]),
            Self::Event(event) => json!(["EVENT", event]),
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
        }
    }

    /// Serialized text frame.
    pub fn as_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

/// Relay message received from a relay.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Event(String, Event),
    Ok(String, bool, String),
    Eose(String),
    Notice(String),
    Auth(String),
}

/// Publish confirmation from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    pub relay_url: String,
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Parse one relay text frame.
///
/// Unknown labels and an empty array yield `Ok(None)`; frames with a known
/// label but missing or mistyped fields are [`ClientError::Protocol`] errors.
pub fn parse_relay_message(text: &str) -> Result<Option<RelayMessage>> {
    let Value::Array(frame) = serde_json::from_str::<Value>(text)? else {
        return Err(protocol("relay frame is not a JSON array"));
    };
    let Some(label) = frame.first() else {
        return Ok(None);
    };
    let label = label
        .as_str()
        .ok_or_else(|| protocol("relay frame label is not a string"))?;

    let message = match label {
        "EVENT" => {
            let subscription_id = text_at(&frame, 1, label)?;
            let payload = frame
                .get(2)
                .cloned()
                .ok_or_else(|| protocol("EVENT frame has no event"))?;
            let event = serde_json::from_value(payload)
                .map_err(|error| protocol(format!("EVENT payload rejected: {}", error)))?;
            RelayMessage::Event(subscription_id, event)
        }
        "OK" => {
            let accepted = frame
                .get(2)
                .and_then(Value::as_bool)
                .ok_or_else(|| protocol("OK frame has no accepted flag"))?;
            let reason = frame
                .get(3)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            RelayMessage::Ok(text_at(&frame, 1, label)?, accepted, reason)
        }
        "EOSE" => RelayMessage::Eose(text_at(&frame, 1, label)?),
        "NOTICE" => RelayMessage::Notice(text_at(&frame, 1, label)?),
        "AUTH" => RelayMessage::Auth(text_at(&frame, 1, label)?),
        _ => return Ok(None),
    };
    Ok(Some(message))
}

fn text_at(frame: &[Value], index: usize, label: &str) -> Result<String> {
    frame
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| protocol(format!("{} frame field {} is not a string", label, index)))
}

fn protocol(message: impl Into<String>) -> ClientError {
    ClientError::Protocol(message.into())
}
