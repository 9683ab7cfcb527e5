//! Transport seam between the connection manager and the network.

use futures::{SinkExt, StreamExt, future::BoxFuture};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::debug;

/// Failures raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
    /// The connection broke while reading.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// One established, bidirectional text channel.
pub trait Transport: Send + 'static {
    /// Write one text frame.
    fn send(&mut self, frame: String) -> BoxFuture<'_, Result<(), TransportError>>;
    /// Next inbound text frame; `None` once the peer closed the channel.
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>>;
    /// Close the channel gracefully.
    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Opens transports. Called once per connection attempt.
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`, which already carries the room and token.
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Box<dyn Transport>, TransportError>>;
}

/// Supplies the opaque credential attached to each connection attempt.
pub trait TokenProvider: Send + Sync + 'static {
    /// Current token, if any.
    fn token(&self) -> Option<String>;
}

/// A token that never changes.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Append the `room` and `token` query parameters to a WebSocket endpoint.
pub fn connect_url(base: &str, room: Option<&str>, token: Option<&str>) -> String {
    let mut url = base.to_string();
    let mut separator = if base.contains('?') { '&' } else { '?' };
    for (key, value) in [("room", room), ("token", token)] {
        if let Some(value) = value {
            url.push(separator);
            url.push_str(key);
            url.push('=');
            url.extend(utf8_percent_encode(value, NON_ALPHANUMERIC));
            separator = '&';
        }
    }
    url
}

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Box<dyn Transport>, TransportError>> {
        Box::pin(async move {
            let (stream, _) = connect_async(url.as_str())
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            debug!(%url, "websocket connected");
            Ok(Box::new(WebSocketTransport { stream }) as Box<dyn Transport>)
        })
    }
}

/// Text-frame transport over a tungstenite stream.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, frame: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.stream
                .send(Message::Text(frame.into()))
                .await
                .map_err(|err| TransportError::Send(err.to_string()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, TransportError>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Close(_)) => return None,
                    Ok(_) => continue,
                    Err(err) => return Some(Err(TransportError::Receive(err.to_string()))),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.stream
                .close(None)
                .await
                .map_err(|err| TransportError::Send(err.to_string()))
        })
    }
}
