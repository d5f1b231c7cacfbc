//! Duplex connection abstraction and its WebSocket implementation.
//!
//! A [`Connector`] opens one [`Connection`] per Session. Connections are
//! never pooled or shared.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Error, Result};

/// Opens duplex streaming connections to an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One open duplex connection carrying text messages.
#[async_trait]
pub trait Connection: Send {
  /// Send one text message.
  async fn send(&mut self, text: String) -> Result<()>;

  /// Next inbound text message. `None` once the peer has closed.
  async fn recv(&mut self) -> Option<Result<String>>;
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
  timeout: Duration,
}

impl WebSocketConnector {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }
}

impl Default for WebSocketConnector {
  fn default() -> Self {
    Self::new(Duration::from_secs(10))
  }
}

#[async_trait]
impl Connector for WebSocketConnector {
  async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
    let (stream, _) = tokio::time::timeout(self.timeout, connect_async(url))
      .await
      .map_err(|_| {
        Error::Connection(format!(
          "Connection to {} timed out after {}ms",
          url,
          self.timeout.as_millis()
        ))
      })?
      .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    debug!(url, "websocket connected");
    Ok(Box::new(WebSocketConnection {
      stream,
      failed: false,
    }))
  }
}

/// WebSocket connection.
///
/// After a read error the socket is treated as gone: later reads report close.
pub struct WebSocketConnection {
  stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
  failed: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
  async fn send(&mut self, text: String) -> Result<()> {
    self.stream.send(Message::Text(text)).await?;
    Ok(())
  }

  async fn recv(&mut self) -> Option<Result<String>> {
    if self.failed {
      return None;
    }

    loop {
      match self.stream.next().await? {
        Ok(Message::Text(text)) => return Some(Ok(text)),
        Ok(Message::Binary(data)) => {
          return Some(
            String::from_utf8(data).map_err(|_| Error::Transport("Invalid UTF-8 in binary frame".to_string())),
          )
        }
        Ok(Message::Close(_)) => return None,
        // Ping/pong are answered by tungstenite itself.
        Ok(_) => continue,
        Err(e) => {
          self.failed = true;
          return Some(Err(e.into()));
        }
      }
    }
  }
}
