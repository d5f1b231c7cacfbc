//! Folder Feed Service: a push-only Session of folder indexing events.
//!
//! The client sends one empty trigger once the Session opens; after that
//! every server message is a folder event object, indefinitely:
//!
//! ```text
//! {"id": "3", "path": "/reports/nightly", "status": "Importing",
//!  "created": "2014-10-05T11:23:45.123+01:00", "updated": "2014-10-05T11:24:01.002+01:00"}
//! ```
//!
//! The callback flavour has no close. Dropping a [`FolderSubscription`] is
//! the only way to stop listening.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::projection::{self, parse_int, Projection, SchemaKind};
use crate::protocol::FOLDER_FEED_TRIGGER;
use crate::session::{Session, SessionHandler, SessionState};
use crate::transport::{Connector, WebSocketConnector};

/// Indexing state of a watched folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FolderStatus {
  Active,
  ActiveWithErrors,
  Importing,
  Other(String),
}

impl FolderStatus {
  pub fn parse(s: &str) -> Self {
    match s {
      "Active" => FolderStatus::Active,
      "ActiveWithErrors" => FolderStatus::ActiveWithErrors,
      "Importing" => FolderStatus::Importing,
      other => FolderStatus::Other(other.to_string()),
    }
  }
}

impl fmt::Display for FolderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FolderStatus::Active => write!(f, "Active"),
      FolderStatus::ActiveWithErrors => write!(f, "ActiveWithErrors"),
      FolderStatus::Importing => write!(f, "Importing"),
      FolderStatus::Other(s) => write!(f, "{}", s),
    }
  }
}

/// One folder's indexing state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderEvent {
  pub id: i64,
  pub path: String,
  pub status: FolderStatus,
  pub created: DateTime<Utc>,
  pub updated: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
  Number(i64),
  Text(String),
}

#[derive(Deserialize)]
struct WireFolderEvent {
  id: WireId,
  path: String,
  status: String,
  created: String,
  updated: String,
}

impl FolderEvent {
  /// Decode a feed message body.
  pub fn from_json(body: &Value) -> Result<Self> {
    let wire: WireFolderEvent =
      serde_json::from_value(body.clone()).map_err(|_| Error::protocol(body.to_string()))?;

    let id = match wire.id {
      WireId::Number(n) => n,
      WireId::Text(s) => parse_int("id", &s)?,
    };

    Ok(Self {
      id,
      path: wire.path,
      status: FolderStatus::parse(&wire.status),
      created: parse_instant("created", &wire.created)?,
      updated: parse_instant("updated", &wire.updated)?,
    })
  }

  pub fn from_text(text: &str) -> Result<Self> {
    let body: Value = serde_json::from_str(text).map_err(|_| Error::protocol(text))?;
    Self::from_json(&body)
  }
}

/// Positional `SELECT * FROM FOLDER` rows: id, path, status, createdOn, updatedOn.
impl Projection for FolderEvent {
  const KIND: SchemaKind = SchemaKind::Folder;

  fn from_fields(f: &[String]) -> Result<Self> {
    Ok(Self {
      id: parse_int("id", &f[0])?,
      path: f[1].clone(),
      status: FolderStatus::parse(&f[2]),
      created: parse_instant("created", &f[3])?,
      updated: parse_instant("updated", &f[4])?,
    })
  }
}

// Feed timestamps are ISO-8601 with offset; table cells use the result-set format.
fn parse_instant(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
  match DateTime::parse_from_rfc3339(value.trim()) {
    Ok(t) => Ok(t.with_timezone(&Utc)),
    Err(_) => projection::parse_timestamp(field, value),
  }
}

/// How a folder event changed the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
  Root,
  Inserted,
  Updated,
}

/// Client-side folder state keyed by folder id.
///
/// The first event seen is the root folder. Later events insert or update,
/// entries are never removed.
#[derive(Debug, Default)]
pub struct FolderCache {
  root: Option<FolderEvent>,
  folders: Vec<FolderEvent>,
  index: HashMap<i64, usize>,
}

impl FolderCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn apply(&mut self, event: FolderEvent) -> CacheUpdate {
    let is_root = self.root.as_ref().map_or(true, |root| root.id == event.id);
    if is_root {
      self.root = Some(event);
      return CacheUpdate::Root;
    }

    match self.index.get(&event.id) {
      Some(&slot) => {
        self.folders[slot] = event;
        CacheUpdate::Updated
      }
      None => {
        self.index.insert(event.id, self.folders.len());
        self.folders.push(event);
        CacheUpdate::Inserted
      }
    }
  }

  pub fn root(&self) -> Option<&FolderEvent> {
    self.root.as_ref()
  }

  pub fn get(&self, id: i64) -> Option<&FolderEvent> {
    self.index.get(&id).map(|&slot| &self.folders[slot])
  }

  /// Non-root folders in first-seen order.
  pub fn iter(&self) -> impl Iterator<Item = &FolderEvent> {
    self.folders.iter()
  }

  pub fn len(&self) -> usize {
    self.folders.len()
  }

  pub fn is_empty(&self) -> bool {
    self.folders.is_empty()
  }

  /// Path with the root folder's path replaced by `-`.
  pub fn relative_path(&self, folder: &FolderEvent) -> String {
    match &self.root {
      Some(root) if !root.path.is_empty() => folder.path.replacen(&root.path, "-", 1),
      _ => folder.path.clone(),
    }
  }
}

struct FeedDispatcher<F> {
  on_event: F,
}

impl<F> SessionHandler for FeedDispatcher<F>
where
  F: FnMut(FolderEvent) + Send,
{
  fn on_message(&mut self, text: String) -> Result<()> {
    match FolderEvent::from_text(&text) {
      Ok(event) => {
        debug!(id = event.id, status = %event.status, "folder event");
        (self.on_event)(event);
      }
      Err(e) => warn!(error = %e, "skipping malformed folder event"),
    }
    Ok(())
  }

  fn on_error(&mut self, error: &Error) {
    warn!(error = %error, "folder feed error");
  }
}

/// Handle on a running folder feed. Dropping it leaves the feed running.
pub struct FeedHandle {
  state: watch::Receiver<SessionState>,
  task: JoinHandle<Result<()>>,
}

impl FeedHandle {
  pub fn state(&self) -> SessionState {
    *self.state.borrow()
  }

  /// Wait for the server to end the feed.
  pub async fn finished(self) -> Result<()> {
    self
      .task
      .await
      .map_err(|e| Error::InvalidState(format!("feed task ended abnormally: {}", e)))?
  }
}

/// Folder events as an async stream. Dropping it stops listening.
pub struct FolderSubscription {
  rx: mpsc::UnboundedReceiver<FolderEvent>,
  task: JoinHandle<Result<()>>,
}

impl FolderSubscription {
  pub async fn next(&mut self) -> Option<FolderEvent> {
    self.rx.recv().await
  }
}

impl Drop for FolderSubscription {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Opens folder feed Sessions.
#[derive(Clone)]
pub struct FolderFeedService {
  config: ClientConfig,
  connector: Arc<dyn Connector>,
}

impl FolderFeedService {
  pub fn new(config: ClientConfig) -> Self {
    let connector = Arc::new(WebSocketConnector::new(config.connect_timeout));
    Self::with_connector(config, connector)
  }

  pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
    Self { config, connector }
  }

  /// Start the feed, handing every event to `on_event`.
  pub fn folder_feed<F>(&self, on_event: F) -> FeedHandle
  where
    F: FnMut(FolderEvent) + Send + 'static,
  {
    let (mut session, state) = Session::open(self.config.folders_url());
    let connector = Arc::clone(&self.connector);

    debug!(url = session.url(), "starting folder feed");
    let task = tokio::spawn(async move {
      let mut dispatcher = FeedDispatcher { on_event };
      session
        .drive(connector.as_ref(), FOLDER_FEED_TRIGGER.to_string(), &mut dispatcher)
        .await
    });

    FeedHandle { state, task }
  }

  pub fn subscribe(&self) -> FolderSubscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = self.folder_feed(move |event| {
      let _ = tx.send(event);
    });
    FolderSubscription { rx, task: handle.task }
  }
}
