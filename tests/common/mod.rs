//! Common test utilities: a channel-backed connector standing in for the
//! dashboard server.
//!
//! Each expected connection is registered up front with
//! [`MockConnector::expect_connection`], which returns the server side of
//! that connection. Messages queued on a [`MockPeer`] are delivered in order
//! once the client connects; dropping or closing the peer ends the Session.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use jua::{Connection, Connector, Error, Result};

#[derive(Default)]
pub struct MockConnector {
  pending: Mutex<VecDeque<MockConnection>>,
  urls: Mutex<Vec<String>>,
}

impl MockConnector {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Register the next connection a client will open.
  pub fn expect_connection(&self) -> MockPeer {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    self.pending.lock().unwrap().push_back(MockConnection {
      inbound: inbound_rx,
      outbound: outbound_tx,
    });

    MockPeer {
      to_client: Some(inbound_tx),
      from_client: outbound_rx,
    }
  }

  /// URLs of every connection attempt so far.
  pub fn urls(&self) -> Vec<String> {
    self.urls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Connector for MockConnector {
  async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
    self.urls.lock().unwrap().push(url.to_string());
    match self.pending.lock().unwrap().pop_front() {
      Some(connection) => Ok(Box::new(connection)),
      None => Err(Error::Connection(format!("connection to {} refused", url))),
    }
  }
}

struct MockConnection {
  inbound: mpsc::UnboundedReceiver<Result<String>>,
  outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Connection for MockConnection {
  async fn send(&mut self, text: String) -> Result<()> {
    self.outbound.send(text).map_err(|_| Error::ChannelClosed)
  }

  async fn recv(&mut self) -> Option<Result<String>> {
    self.inbound.recv().await
  }
}

/// Server side of one mock connection.
pub struct MockPeer {
  to_client: Option<mpsc::UnboundedSender<Result<String>>>,
  from_client: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
  /// The next message the client sent.
  pub async fn request(&mut self) -> Option<String> {
    self.from_client.recv().await
  }

  pub fn send(&self, text: impl Into<String>) {
    if let Some(tx) = &self.to_client {
      let _ = tx.send(Ok(text.into()));
    }
  }

  pub fn send_error(&self, detail: &str) {
    if let Some(tx) = &self.to_client {
      let _ = tx.send(Err(Error::Transport(detail.to_string())));
    }
  }

  pub fn metadata(&self, columns: &[(&str, &str)]) {
    let columns: Vec<_> = columns
      .iter()
      .map(|(name, column_type)| json!({"name": name, "type": column_type}))
      .collect();
    self.send(json!({"metadata": {"columns": columns}}).to_string());
  }

  pub fn row(&self, cells: &[&str]) {
    self.send(json!({ "row": cells }).to_string());
  }

  /// End the Session from the server side.
  pub fn close(&mut self) {
    self.to_client = None;
  }
}

pub fn history_row(id: i64) -> Vec<String> {
  vec![
    id.to_string(),
    "PASS".to_string(),
    "12".to_string(),
    format!("2014-01-02 03:04:{:02}.000", id % 60),
  ]
}

pub fn send_history_row(peer: &MockPeer, id: i64) {
  let row = history_row(id);
  let cells: Vec<&str> = row.iter().map(String::as_str).collect();
  peer.row(&cells);
}

pub fn history_metadata(peer: &MockPeer) {
  peer.metadata(&[
    ("ID", "BIGINT"),
    ("STATUS", "VARCHAR"),
    ("SUITE_ID", "BIGINT"),
    ("TIMESTAMP", "TIMESTAMP"),
  ]);
}
