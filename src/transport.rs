//! The transport boundary: one binary message in, one binary message out.
//! The core library only depends on [`Transport`]; [`WebSocketTransport`]
//! is the one concrete implementation the demo binary wires up, grounded
//! in the reference crate's `tokio-tungstenite` dependency and its
//! `ws.rs` connection handling.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// An ordered, reliable, message-framed channel to one viewer. Implemented
/// for WebSockets here; a Unix socket or QUIC stream could implement the
/// same trait without touching [`crate::hub`] or [`crate::session`].
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), anyhow::Error>;

    /// `Ok(None)` means the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error>;

    async fn close(&mut self);
}

/// A [`Transport`] over an accepted WebSocket connection.
#[derive(Debug)]
pub struct WebSocketTransport {
    inner: WebSocketStream<TcpStream>,
}

impl WebSocketTransport {
    pub fn new(inner: WebSocketStream<TcpStream>) -> Self {
        WebSocketTransport { inner }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), anyhow::Error> {
        self.inner.send(Message::Binary(payload)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/text: not part of this protocol
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
