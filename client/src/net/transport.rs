//! Socket seam between the connection manager and the network.
//!
//! DESIGN
//! ======
//! A [`Transport`] opens one [`Link`]: a sink of outgoing text frames and a
//! stream of incoming text frames. The manager never sees websocket types,
//! so tests drive it with an in-memory transport while production uses
//! [`WsTransport`] over `tokio-tungstenite`.
//!
//! The end of the incoming stream means the peer went away. Control frames
//! (ping/pong/close) and binary frames never surface as items.

use std::pin::Pin;

use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

/// Outgoing half of a [`Link`].
pub type TextSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
/// Incoming half of a [`Link`].
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Error raised by a transport or an open link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("websocket error: {0}")]
    Socket(Box<tungstenite::Error>),
    #[error("connection closed by peer")]
    Closed,
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// One open bidirectional text connection.
pub struct Link {
    pub sink: TextSink,
    pub stream: TextStream,
}

impl Link {
    #[must_use]
    pub fn new(sink: TextSink, stream: TextStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens links to a URL.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a new link. Each call yields an independent connection.
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// Websocket transport backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|error| TransportError::Connect(Box::new(error)))?;
        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|error| TransportError::Socket(Box::new(error)))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "ws: close frame received");
                    None
                }
                Err(error) => Some(Err(TransportError::Socket(Box::new(error)))),
            })
        });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }
}
