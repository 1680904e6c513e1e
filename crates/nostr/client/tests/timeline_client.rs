//! End-to-end tests for the timeline client over the in-memory transport.

use async_trait::async_trait;
use nostr::{Event, KIND_TEXT_NOTE, UnsignedEvent};
use nostr_client::{
    ClientConfig, ClientError, MemoryConnector, MemoryRemote, RelayStatus, Result, Signer,
    TimelineClient,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const A: &str = "wss://a.test";
const B: &str = "wss://b.test";
const RECONNECT: Duration = Duration::from_millis(5000);

#[derive(Default)]
struct FakeSigner {
    counter: AtomicUsize,
}

#[async_trait]
impl Signer for FakeSigner {
    async fn get_public_key(&self) -> Result<String> {
        Ok("me".to_string())
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(unsigned.into_signed(format!("local-{}", n), "sig"))
    }
}

struct Fixture {
    connector: MemoryConnector,
    client: TimelineClient,
    events: mpsc::UnboundedReceiver<Event>,
    statuses: mpsc::UnboundedReceiver<RelayStatus>,
    latest: HashMap<String, bool>,
}

fn fixture(signer: Option<Arc<dyn Signer>>) -> Fixture {
    let connector = MemoryConnector::new();
    let (status_tx, statuses) = mpsc::unbounded_channel();
    let config = ClientConfig {
        relays: vec![A.to_string(), B.to_string()],
        wordlist_source: None,
        reconnect_delay: RECONNECT,
        ..ClientConfig::default()
    };

    let mut builder = TimelineClient::builder(config)
        .connector(Arc::new(connector.clone()))
        .on_status(Arc::new(move |status: RelayStatus| {
            let _ = status_tx.send(status);
        }));
    if let Some(signer) = signer {
        builder = builder.signer(signer);
    }
    let (client, events) = builder.build_with_channel();

    Fixture {
        connector,
        client,
        events,
        statuses,
        latest: HashMap::new(),
    }
}

impl Fixture {
    /// Wait until the last reported status of `url` is `open`.
    async fn wait_status(&mut self, url: &str, open: bool) -> Result<()> {
        while self.latest.get(url) != Some(&open) {
            let status = self
                .statuses
                .recv()
                .await
                .ok_or_else(|| ClientError::Internal("status channel closed".to_string()))?;
            self.latest.insert(status.url, status.open);
        }
        Ok(())
    }

    async fn connect_both(&mut self) -> Result<(MemoryRemote, MemoryRemote)> {
        self.client.connect_default().await;
        self.wait_status(A, true).await?;
        self.wait_status(B, true).await?;
        Ok((self.remote(A)?, self.remote(B)?))
    }

    fn remote(&self, url: &str) -> Result<MemoryRemote> {
        self.connector
            .take_remote(url)
            .ok_or_else(|| ClientError::Internal(format!("no session for {}", url)))
    }

    /// Let spawned replays reach the relays.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Let the dispatcher run and the flush window pass.
    async fn delivered(&mut self) -> Vec<Event> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

fn note(subscription_id: &str, id: &str, created_at: u64, content: &str) -> Value {
    json!([
        "EVENT",
        subscription_id,
        {
            "id": id,
            "pubkey": "someone",
            "created_at": created_at,
            "kind": KIND_TEXT_NOTE,
            "tags": [],
            "content": content,
            "sig": "sig"
        }
    ])
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|event| event.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn same_event_from_two_relays_is_delivered_once_in_order() -> Result<()> {
    let mut fixture = fixture(None);
    let (remote_a, remote_b) = fixture.connect_both().await?;
    let subscription = fixture.client.start_default().await;

    assert!(remote_a.send_json(&note(&subscription, "newer", 200, "hello")));
    assert!(remote_b.send_json(&note(&subscription, "newer", 200, "hello")));
    assert!(remote_b.send_json(&note(&subscription, "older", 100, "earlier")));

    let delivered = fixture.delivered().await;
    assert_eq!(ids(&delivered), vec!["older", "newer"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restarted_subscription_ignores_stale_events() -> Result<()> {
    let mut fixture = fixture(None);
    let (mut remote_a, _remote_b) = fixture.connect_both().await?;

    let old_id = fixture.client.start_default().await;
    let new_id = fixture.client.start_default().await;
    let frames = remote_a.received();
    assert_eq!(frames[0][0], "REQ");
    assert_eq!(frames[1], json!(["CLOSE", old_id.clone()]));
    assert_eq!(frames[2][1], Value::String(new_id.clone()));

    remote_a.send_json(&note(&old_id, "stale", 1, "late"));
    remote_a.send_json(&note(&new_id, "fresh", 2, "current"));
    assert_eq!(ids(&fixture.delivered().await), vec!["fresh"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnected_relay_receives_active_request() -> Result<()> {
    let mut fixture = fixture(None);
    let (remote_a, _remote_b) = fixture.connect_both().await?;
    let subscription = fixture.client.start_default().await;

    remote_a.close();
    fixture.wait_status(A, false).await?;
    let closed_at = tokio::time::Instant::now();
    assert!(!fixture.client.status(A).await);

    fixture.wait_status(A, true).await?;
    assert!(closed_at.elapsed() >= RECONNECT);
    assert_eq!(fixture.connector.attempts(A), 2);
    fixture.settle().await;

    let mut replacement = fixture.remote(A)?;
    let frames = replacement.received();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][0], "REQ");
    assert_eq!(frames[0][1], Value::String(subscription));
    assert!(frames[0][2]["since"].is_u64());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn relay_that_opens_late_gets_the_request() -> Result<()> {
    let mut fixture = fixture(None);
    fixture.connector.refuse(B);
    fixture.client.connect_default().await;
    fixture.wait_status(A, true).await?;
    fixture.wait_status(B, false).await?;

    let subscription = fixture.client.start_default().await;
    fixture.connector.accept(B);
    fixture.wait_status(B, true).await?;
    fixture.settle().await;

    let mut remote_b = fixture.remote(B)?;
    let frames = remote_b.received();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][1], Value::String(subscription));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn publish_reaches_every_relay_and_tracks_confirmations() -> Result<()> {
    let mut fixture = fixture(Some(Arc::new(FakeSigner::default())));
    let (mut remote_a, mut remote_b) = fixture.connect_both().await?;
    let subscription = fixture.client.start_default().await;
    remote_a.received();
    remote_b.received();

    let event = fixture.client.publish_note("hello from the test").await?;
    for remote in [&mut remote_a, &mut remote_b] {
        let frames = remote.received();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], "EVENT");
        assert_eq!(frames[0][1]["id"], event.id.as_str());
    }

    remote_a.send_json(&json!(["OK", event.id, true, ""]));
    remote_b.send_json(&json!(["OK", event.id, false, "blocked: spam"]));
    remote_a.send_json(&json!(["EVENT", subscription, event]));

    let delivered = fixture.delivered().await;
    assert_eq!(ids(&delivered), vec![event.id.as_str()]);

    let confirmations = fixture.client.publisher().confirmations(&event.id);
    assert_eq!(confirmations.len(), 2);
    let rejected: Vec<&str> = confirmations
        .iter()
        .filter(|confirmation| !confirmation.accepted)
        .map(|confirmation| confirmation.relay_url.as_str())
        .collect();
    assert_eq!(rejected, vec![B]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn publish_with_no_open_relay_fails() -> Result<()> {
    let mut fixture = fixture(Some(Arc::new(FakeSigner::default())));
    fixture.connector.refuse(A);
    fixture.connector.refuse(B);
    fixture.client.connect_default().await;
    fixture.wait_status(A, false).await?;
    fixture.wait_status(B, false).await?;

    let result = fixture.client.publish_note("nobody hears this").await;
    assert!(matches!(result, Err(ClientError::NoOpenRelay)));
    assert!(fixture.delivered().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reacting_twice_broadcasts_once() -> Result<()> {
    let mut fixture = fixture(Some(Arc::new(FakeSigner::default())));
    let (mut remote_a, _remote_b) = fixture.connect_both().await?;

    let target = Event {
        id: "target".to_string(),
        pubkey: "someone".to_string(),
        created_at: 1,
        kind: KIND_TEXT_NOTE,
        tags: vec![],
        content: "nice".to_string(),
        sig: None,
    };
    assert!(fixture.client.react(&target).await?.is_some());
    assert!(fixture.client.react(&target).await?.is_none());

    let events: Vec<Value> = remote_a
        .received()
        .into_iter()
        .filter(|frame| frame[0] == "EVENT")
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0][1]["tags"], json!([["e", "target"], ["p", "someone"]]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn moderation_list_changes_apply_to_incoming_events() -> Result<()> {
    let mut fixture = fixture(None);
    let (remote_a, _remote_b) = fixture.connect_both().await?;
    fixture
        .client
        .validator()
        .set_user_words(vec!["casino".to_string()]);
    let subscription = fixture.client.start_default().await;

    remote_a.send_json(&note(&subscription, "ad", 1, "Best CASINO online"));
    remote_a.send_json(&note(&subscription, "ok", 2, "good morning"));
    assert_eq!(ids(&fixture.delivered().await), vec!["ok"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_reconnects() -> Result<()> {
    let mut fixture = fixture(None);
    let (mut remote_a, _remote_b) = fixture.connect_both().await?;
    let subscription = fixture.client.start_default().await;

    fixture.client.shutdown().await;
    let frames = remote_a.received();
    assert!(frames.contains(&json!(["CLOSE", subscription])));
    assert!(fixture.client.statuses().await.is_empty());

    tokio::time::sleep(RECONNECT * 4).await;
    assert_eq!(fixture.connector.attempts(A), 1);
    assert_eq!(fixture.connector.attempts(B), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stalled_relay_does_not_hold_up_the_timeline() -> Result<()> {
    let mut fixture = fixture(Some(Arc::new(FakeSigner::default())));
    fixture.connector.stall(B);
    let (mut remote_a, _remote_b) = fixture.connect_both().await?;

    let subscription = fixture.client.start_default().await;
    let frames = remote_a.received();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][0], "REQ");

    let event = fixture.client.publish_note("still flowing").await?;
    let frames = remote_a.received();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][1]["id"], event.id.as_str());

    remote_a.send_json(&note(&subscription, "from-a", 1, "hello"));
    assert_eq!(
        ids(&fixture.delivered().await),
        vec![event.id.as_str(), "from-a"]
    );

    tokio::time::timeout(Duration::from_secs(60), fixture.client.shutdown())
        .await
        .map_err(|_| ClientError::Internal("shutdown hung".to_string()))?;
    assert!(fixture.client.statuses().await.is_empty());
    Ok(())
}
