//! Debounced, ordered delivery of incoming events.
//!
//! Bursts (the initial backlog in particular) are collected for one flush
//! window and handed to the sink sorted by `created_at`, instead of one at a
//! time. Ordering holds within a flush only; an old event that arrives after a
//! flush is delivered in a later batch.

use crate::error::{ClientError, Result};
use nostr::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default flush window.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(200);

/// Callback type for handling delivered events.
pub type EventCallback = Arc<dyn Fn(Event) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Pending {
    events: Vec<Event>,
    flush_scheduled: bool,
}

/// Time-windowed event buffer in front of an event sink.
pub struct EventBuffer {
    window: Duration,
    sink: EventCallback,
    pending: Mutex<Pending>,
}

impl EventBuffer {
    /// Create a buffer that delivers to `sink`.
    pub fn new(window: Duration, sink: EventCallback) -> Self {
        Self {
            window,
            sink,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Create a buffer that delivers events on an unbounded channel.
    pub fn with_channel(window: Duration) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: EventCallback = Arc::new(move |event: Event| {
            tx.send(event)
                .map_err(|_| ClientError::Internal("event channel closed".to_string()))
        });
        (Self::new(window, sink), rx)
    }

    /// Queue `event` and schedule a flush if none is pending.
    pub fn push(self: &Arc<Self>, event: Event) {
        let schedule = {
            let mut pending = self.pending.lock();
            pending.events.push(event);
            !std::mem::replace(&mut pending.flush_scheduled, true)
        };

        if schedule {
            let buffer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(buffer.window).await;
                buffer.flush();
            });
        }
    }

    /// Deliver everything pending, oldest `created_at` first.
    pub fn flush(&self) {
        let mut events = {
            let mut pending = self.pending.lock();
            pending.flush_scheduled = false;
            std::mem::take(&mut pending.events)
        };
        if events.is_empty() {
            return;
        }

        events.sort_by_key(|event| event.created_at);
        debug!(count = events.len(), "flushing event buffer");
        for event in events {
            self.deliver_now(event);
        }
    }

    /// Deliver `event` immediately, bypassing the window.
    pub fn deliver_now(&self, event: Event) {
        let id = event.id.clone();
        if let Err(error) = (self.sink)(event) {
            warn!(event = %id, %error, "event sink failed");
        }
    }

    /// Number of events waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, created_at: u64) -> Event {
        Event {
            id: id.to_string(),
            pubkey: "pk".to_string(),
            created_at,
            kind: nostr::KIND_TEXT_NOTE,
            tags: vec![],
            content: String::new(),
            sig: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<u64> {
        let mut delivered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            delivered.push(event.created_at);
        }
        delivered
    }

    #[tokio::test(start_paused = true)]
    async fn flush_orders_by_created_at() {
        let (buffer, mut rx) = EventBuffer::with_channel(DEFAULT_FLUSH_WINDOW);
        let buffer = Arc::new(buffer);

        buffer.push(event("c", 30));
        buffer.push(event("a", 10));
        buffer.push(event("b", 20));
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(DEFAULT_FLUSH_WINDOW + Duration::from_millis(1)).await;
        assert_eq!(drain(&mut rx), vec![10, 20, 30]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_delivered_before_the_window() {
        let (buffer, mut rx) = EventBuffer::with_channel(DEFAULT_FLUSH_WINDOW);
        let buffer = Arc::new(buffer);

        buffer.push(event("a", 1));
        tokio::time::sleep(DEFAULT_FLUSH_WINDOW - Duration::from_millis(1)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(buffer.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(drain(&mut rx), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn later_pushes_start_a_new_batch() {
        let (buffer, mut rx) = EventBuffer::with_channel(DEFAULT_FLUSH_WINDOW);
        let buffer = Arc::new(buffer);

        buffer.push(event("new", 50));
        tokio::time::sleep(DEFAULT_FLUSH_WINDOW * 2).await;
        assert_eq!(drain(&mut rx), vec![50]);

        buffer.push(event("old", 5));
        tokio::time::sleep(DEFAULT_FLUSH_WINDOW * 2).await;
        assert_eq!(drain(&mut rx), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_timestamps_keep_arrival_order() {
        let (buffer, mut rx) = EventBuffer::with_channel(DEFAULT_FLUSH_WINDOW);
        let buffer = Arc::new(buffer);

        buffer.push(event("first", 7));
        buffer.push(event("second", 7));
        tokio::time::sleep(DEFAULT_FLUSH_WINDOW * 2).await;

        let ids: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.id)
            .collect();
        assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn sink_errors_do_not_stop_delivery() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&delivered);
        let sink: EventCallback = Arc::new(move |event: Event| {
            seen.lock().push(event.created_at);
            if event.created_at == 1 {
                return Err(ClientError::Internal("render failed".to_string()));
            }
            Ok(())
        });
        let buffer = EventBuffer::new(DEFAULT_FLUSH_WINDOW, sink);

        {
            let mut pending = buffer.pending.lock();
            pending.events.push(event("b", 2));
            pending.events.push(event("a", 1));
        }
        buffer.flush();
        assert_eq!(*delivered.lock(), vec![1, 2]);
    }
}
