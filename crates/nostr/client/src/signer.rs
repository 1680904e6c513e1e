//! External signing capability.
//!
//! Key material never enters this crate. Whatever holds the key (a browser
//! extension bridge, a remote bunker, a hardware device) implements [`Signer`].

use crate::error::Result;
use async_trait::async_trait;
use nostr::{Event, UnsignedEvent};

#[async_trait]
pub trait Signer: Send + Sync {
    /// Hex public key events are published under.
    async fn get_public_key(&self) -> Result<String>;

    /// Compute the id and signature for `unsigned`.
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;
}
