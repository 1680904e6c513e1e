//! Timeline client: wires the pool, subscription, buffer and publisher
//! together and runs the single dispatcher that consumes relay events.

use crate::buffer::{EventBuffer, EventCallback};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::pool::{RelayPool, RelayStatus};
use crate::publisher::Publisher;
use crate::relay::RelayEvent;
use crate::signer::Signer;
use crate::subscription::{FilterSpec, Incoming, SubscriptionManager};
use crate::transport::{Connector, WebSocketConnector};
use crate::validator::ContentValidator;
use crate::wordlist::load_wordlist_or_default;
use nostr::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Called whenever a relay opens or closes.
pub type StatusCallback = Arc<dyn Fn(RelayStatus) + Send + Sync>;

/// Builder for [`TimelineClient`].
pub struct TimelineClientBuilder {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    signer: Option<Arc<dyn Signer>>,
    on_event: Option<EventCallback>,
    on_status: Option<StatusCallback>,
}

impl TimelineClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: Arc::new(WebSocketConnector),
            signer: None,
            on_event: None,
            on_status: None,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sink for flushed timeline events and local echoes.
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub fn on_status(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    /// Build the client and spawn its dispatcher. Must be called inside a
    /// Tokio runtime. Without an event sink, delivered events are discarded.
    pub fn build(mut self) -> TimelineClient {
        let on_event: EventCallback = match self.on_event.take() {
            Some(callback) => callback,
            None => Arc::new(|event: Event| {
                debug!(event = %event.id, "no event sink configured");
                Ok(())
            }),
        };
        let buffer = EventBuffer::new(self.config.flush_window, on_event);
        self.assemble(buffer)
    }

    /// Build the client with delivered events sent on a channel.
    pub fn build_with_channel(self) -> (TimelineClient, mpsc::UnboundedReceiver<Event>) {
        let (buffer, events) = EventBuffer::with_channel(self.config.flush_window);
        (self.assemble(buffer), events)
    }

    fn assemble(self, buffer: EventBuffer) -> TimelineClient {
        let (pool, relay_events) =
            RelayPool::with_connector(self.config.pool_config(), self.connector);
        let pool = Arc::new(pool);
        let buffer = Arc::new(buffer);
        let validator = Arc::new(ContentValidator::new(self.config.max_content_length));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&pool),
            Arc::clone(&validator),
            Arc::clone(&buffer),
        ));
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&pool),
            Arc::clone(&subscriptions),
            buffer,
            Arc::clone(&validator),
            self.signer,
        ));

        let dispatcher = Dispatcher {
            subscriptions: Arc::clone(&subscriptions),
            publisher: Arc::clone(&publisher),
            on_status: self.on_status,
            events: relay_events,
        };
        let dispatcher = tokio::spawn(dispatcher.run());

        TimelineClient {
            config: self.config,
            pool,
            validator,
            subscriptions,
            publisher,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }
}

/// Multi-relay timeline client.
pub struct TimelineClient {
    config: ClientConfig,
    pool: Arc<RelayPool>,
    validator: Arc<ContentValidator>,
    subscriptions: Arc<SubscriptionManager>,
    publisher: Arc<Publisher>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TimelineClient {
    pub fn builder(config: ClientConfig) -> TimelineClientBuilder {
        TimelineClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Load the default moderation wordlist from the configured source and
    /// return it. Failures leave the default list empty; the user list still
    /// applies.
    pub async fn load_default_wordlist(&self) -> Vec<String> {
        let words = match &self.config.wordlist_source {
            Some(source) => load_wordlist_or_default(source).await,
            None => Vec::new(),
        };
        self.validator.set_default_words(words.clone());
        words
    }

    /// Replace the relay set. See [`RelayPool::set_endpoints`].
    pub async fn set_endpoints<S: AsRef<str>>(&self, urls: &[S]) {
        self.pool.set_endpoints(urls).await;
    }

    /// Connect to the configured relays.
    pub async fn connect_default(&self) {
        self.pool.set_endpoints(self.config.relays.as_slice()).await;
    }

    /// Start a subscription, replacing the active one.
    pub async fn start(&self, spec: FilterSpec) -> String {
        self.subscriptions.start(spec).await
    }

    /// Start the configured text-note timeline subscription.
    pub async fn start_default(&self) -> String {
        self.subscriptions.start(self.config.filter_spec()).await
    }

    pub async fn stop(&self) {
        self.subscriptions.stop().await;
    }

    pub async fn publish(&self, kind: u16, content: &str, tags: Vec<Vec<String>>) -> Result<Event> {
        self.publisher.publish(kind, content, tags).await
    }

    pub async fn publish_note(&self, content: &str) -> Result<Event> {
        self.publisher.publish_note(content).await
    }

    pub async fn react(&self, target: &Event) -> Result<Option<Event>> {
        self.publisher.react(target).await
    }

    pub async fn statuses(&self) -> Vec<RelayStatus> {
        self.pool.statuses().await
    }

    pub async fn status(&self, url: &str) -> bool {
        self.pool.status(url).await
    }

    pub fn validator(&self) -> &Arc<ContentValidator> {
        &self.validator
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Close the subscription and every relay, then stop the dispatcher.
    pub async fn shutdown(&self) {
        self.subscriptions.stop().await;
        self.pool.close_all().await;
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
            let _ = dispatcher.await;
        }
        info!("timeline client shut down");
    }
}

impl Drop for TimelineClient {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.abort();
        }
    }
}

/// Single consumer of every relay's events.
struct Dispatcher {
    subscriptions: Arc<SubscriptionManager>,
    publisher: Arc<Publisher>,
    on_status: Option<StatusCallback>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
}

impl Dispatcher {
    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        debug!("relay event channel closed, dispatcher stopping");
    }

    async fn handle(&self, event: RelayEvent) {
        match event {
            RelayEvent::Opened { url } => {
                // Replays run off the dispatcher so a stalled relay cannot
                // hold up every other relay's traffic.
                let subscriptions = Arc::clone(&self.subscriptions);
                let relay = url.clone();
                tokio::spawn(async move {
                    subscriptions.replay_to(&relay).await;
                });
                self.notify(url, true);
            }
            RelayEvent::Closed { url, reconnecting } => {
                debug!(relay = %url, reconnecting, "relay closed");
                self.notify(url, false);
            }
            RelayEvent::Message { url, text } => {
                if let Incoming::Confirmation(confirmation) =
                    self.subscriptions.handle_incoming(&url, &text)
                {
                    self.publisher.record_confirmation(confirmation);
                }
            }
            RelayEvent::Error { url, message } => {
                warn!(relay = %url, error = %message, "relay error");
            }
        }
    }

    fn notify(&self, url: String, open: bool) {
        if let Some(on_status) = &self.on_status {
            on_status(RelayStatus { url, open });
        }
    }
}
