//! Transport seam between relay connections and the network.
//!
//! A [`Connector`] opens one session and hands back a frame sink and a frame
//! stream. [`WebSocketConnector`] is the production transport;
//! `MemoryConnector` (tests and the `test-utils` feature) keeps everything
//! in-process so connection lifecycles can be driven deterministically.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[cfg(any(test, feature = "test-utils"))]
mod memory;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryConnector, MemoryRemote};

pub type BoxSink = Pin<Box<dyn Sink<Message, Error = ClientError> + Send>>;
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// Opens sessions to relay URLs.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(BoxSink, BoxStream)>;
}

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<(BoxSink, BoxStream)> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        let (writer, reader) = stream.split();
        let writer = writer.sink_map_err(|error| ClientError::WebSocket(error.to_string()));
        let reader =
            reader.map(|frame| frame.map_err(|error| ClientError::WebSocket(error.to_string())));
        Ok((Box::pin(writer), Box::pin(reader)))
    }
}
