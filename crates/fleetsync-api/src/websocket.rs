//! Persistent channel transport.
//!
//! The [`Connector`] trait is the seam between the connection manager and the
//! network: it performs one handshake and hands back a [`Channel`], a pair of
//! text-frame sink and stream. Reconnection policy lives above this layer.
//! [`WebSocketConnector`] is the production implementation over
//! `tokio-tungstenite`.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetsync_api::websocket::{Connector, WebSocketConnector};
//! use futures_util::{SinkExt, StreamExt};
//! use url::Url;
//!
//! let url = Url::parse("ws://127.0.0.1:8765/ws")?;
//! let mut channel = WebSocketConnector::new().connect(&url).await?;
//! channel.sink.send(r#"{"type":"ping","data":null}"#.into()).await?;
//! while let Some(frame) = channel.stream.next().await {
//!     println!("{}", frame?);
//! }
//! ```

use std::pin::Pin;

use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;

/// Outbound half of a channel: accepts serialized text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a channel: yields text frames until the remote closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

// ── Channel ──────────────────────────────────────────────────────────

/// One established connection, split into its two directions.
///
/// The stream ending (`None`) means the remote closed the channel; an `Err`
/// item means it failed.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Channel {
    pub fn new(
        sink: impl Sink<String, Error = Error> + Send + 'static,
        stream: impl Stream<Item = Result<String, Error>> + Send + 'static,
    ) -> Self {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Establishes a single persistent channel to the remote.
///
/// Implementations perform exactly one handshake per call and never retry;
/// the connection manager owns backoff and give-up decisions.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Channel, Error>>;
}

// ── WebSocketConnector ───────────────────────────────────────────────

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    auth_token: Option<SecretString>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `Authorization: Bearer <token>` on the upgrade request.
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Channel, Error>> {
        Box::pin(open_websocket(url, self.auth_token.as_ref()))
    }
}

/// Perform the upgrade handshake and adapt the split stream into a
/// text-frame [`Channel`].
async fn open_websocket(url: &Url, auth_token: Option<&SecretString>) -> Result<Channel, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = auth_token {
        request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (write, read) = ws_stream.split();

    let sink = write
        .sink_map_err(|e| Error::WebSocketSend(e.to_string()))
        .with(|text: String| future::ready(Ok::<_, Error>(Message::text(text))));

    let stream = futures_util::stream::unfold(read, |mut read| async move {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some((Ok(text.as_str().to_owned()), read));
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong reply itself
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return None;
                }
                Some(Ok(_)) => {
                    // Binary, Pong, Frame -- ignore
                }
                Some(Err(e)) => {
                    return Some((Err(Error::WebSocketConnect(e.to_string())), read));
                }
                None => {
                    tracing::info!("WebSocket stream ended");
                    return None;
                }
            }
        }
    });

    Ok(Channel::new(sink, stream))
}
