//! Query Request Service.
//!
//! Every query opens its own Session, sends the SQL text verbatim once the
//! Session is open and relays the server's metadata and rows to the caller.
//! The SQL is not validated or sanitised here; the server owns that.
//!
//! # Example
//!
//! ```no_run
//! use jua::{ClientConfig, QueryRequest, QueryService};
//!
//! # async fn example() -> jua::Result<()> {
//! let service = QueryService::new(ClientConfig::parse("localhost:9000")?);
//!
//! let handle = service.query(
//!   QueryRequest::new("SELECT TOP 25 * FROM TESTSUITE ORDER BY TIMESTAMP DESC")
//!     .on_metadata(|columns| println!("{} columns", columns.len()))
//!     .on_row(|row| println!("{:?}", row))
//!     .on_closed(|| println!("done")),
//! );
//! handle.finished().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{self, Column, ServerMessage};
use crate::session::{Session, SessionHandler, SessionState};
use crate::transport::{Connector, WebSocketConnector};

/// Receives the lifecycle of one query. Every method defaults to a no-op.
pub trait QueryObserver: Send {
  fn opened(&mut self) {}

  /// Fires at most once, before any row.
  fn metadata(&mut self, _columns: &[Column]) {}

  /// Fires once per row, in arrival order.
  fn row(&mut self, _row: Vec<String>) {}

  fn error(&mut self, _error: &Error) {}

  /// Fires exactly once, last.
  fn closed(&mut self) {}
}

type Callback = Box<dyn FnMut() + Send>;
type MetadataCallback = Box<dyn FnMut(&[Column]) + Send>;
type RowCallback = Box<dyn FnMut(Vec<String>) + Send>;
type ErrorCallback = Box<dyn FnMut(&Error) + Send>;

/// A query plus optional lifecycle callbacks.
pub struct QueryRequest {
  sql: String,
  on_opened: Option<Callback>,
  on_closed: Option<Callback>,
  on_metadata: Option<MetadataCallback>,
  on_row: Option<RowCallback>,
  on_error: Option<ErrorCallback>,
}

impl QueryRequest {
  pub fn new(sql: impl Into<String>) -> Self {
    Self {
      sql: sql.into(),
      on_opened: None,
      on_closed: None,
      on_metadata: None,
      on_row: None,
      on_error: None,
    }
  }

  pub fn sql(&self) -> &str {
    &self.sql
  }

  pub fn on_opened(mut self, f: impl FnMut() + Send + 'static) -> Self {
    self.on_opened = Some(Box::new(f));
    self
  }

  pub fn on_closed(mut self, f: impl FnMut() + Send + 'static) -> Self {
    self.on_closed = Some(Box::new(f));
    self
  }

  pub fn on_metadata(mut self, f: impl FnMut(&[Column]) + Send + 'static) -> Self {
    self.on_metadata = Some(Box::new(f));
    self
  }

  pub fn on_row(mut self, f: impl FnMut(Vec<String>) + Send + 'static) -> Self {
    self.on_row = Some(Box::new(f));
    self
  }

  pub fn on_error(mut self, f: impl FnMut(&Error) + Send + 'static) -> Self {
    self.on_error = Some(Box::new(f));
    self
  }
}

impl QueryObserver for QueryRequest {
  fn opened(&mut self) {
    if let Some(f) = self.on_opened.as_mut() {
      f();
    }
  }

  fn metadata(&mut self, columns: &[Column]) {
    if let Some(f) = self.on_metadata.as_mut() {
      f(columns);
    }
  }

  fn row(&mut self, row: Vec<String>) {
    if let Some(f) = self.on_row.as_mut() {
      f(row);
    }
  }

  fn error(&mut self, error: &Error) {
    if let Some(f) = self.on_error.as_mut() {
      f(error);
    }
  }

  fn closed(&mut self) {
    if let Some(f) = self.on_closed.as_mut() {
      f();
    }
  }
}

/// Routes decoded Session messages to an observer and enforces that
/// metadata comes at most once and before any row.
struct QueryDispatcher<O> {
  observer: O,
  seen_metadata: bool,
  rows: usize,
}

impl<O: QueryObserver> QueryDispatcher<O> {
  fn new(observer: O) -> Self {
    Self {
      observer,
      seen_metadata: false,
      rows: 0,
    }
  }
}

impl<O: QueryObserver> SessionHandler for QueryDispatcher<O> {
  fn on_opened(&mut self) {
    self.observer.opened();
  }

  fn on_message(&mut self, text: String) -> Result<()> {
    match protocol::decode_text(&text)? {
      ServerMessage::Metadata(columns) => {
        if self.seen_metadata || self.rows > 0 {
          return Err(Error::protocol(text));
        }
        trace!(columns = columns.len(), "metadata");
        self.seen_metadata = true;
        self.observer.metadata(&columns);
      }
      ServerMessage::Row(row) => {
        self.rows += 1;
        trace!(row = self.rows, "row");
        self.observer.row(row);
      }
    }
    Ok(())
  }

  fn on_error(&mut self, error: &Error) {
    self.observer.error(error);
  }

  fn on_closed(&mut self) {
    debug!(rows = self.rows, "query complete");
    self.observer.closed();
  }
}

/// Handle on a running query.
///
/// There is no cancel: [`QueryHandle::abandon`] only stops listening. The
/// server keeps its side open until it has written every row.
pub struct QueryHandle {
  state: watch::Receiver<SessionState>,
  task: JoinHandle<Result<()>>,
}

impl QueryHandle {
  pub fn state(&self) -> SessionState {
    *self.state.borrow()
  }

  /// Wait for the Session to reach `Closed`.
  pub async fn closed(&mut self) {
    let _ = self.state.wait_for(|s| *s == SessionState::Closed).await;
  }

  /// Wait for the Session task to end. Returns the protocol violation or
  /// connection failure that ended it, if any.
  pub async fn finished(self) -> Result<()> {
    self
      .task
      .await
      .map_err(|e| Error::InvalidState(format!("session task ended abnormally: {}", e)))?
  }

  /// Stop listening. No further callbacks fire.
  pub fn abandon(self) {
    self.task.abort();
  }
}

/// Lifecycle events of a streamed query
#[derive(Debug, Clone)]
pub enum QueryEvent {
  Opened,
  Metadata(Vec<Column>),
  Row(Vec<String>),
  Error(Error),
  Closed,
}

struct ChannelObserver {
  tx: mpsc::UnboundedSender<QueryEvent>,
}

impl ChannelObserver {
  fn forward(&self, event: QueryEvent) {
    // The stream may already have been dropped.
    let _ = self.tx.send(event);
  }
}

impl QueryObserver for ChannelObserver {
  fn opened(&mut self) {
    self.forward(QueryEvent::Opened);
  }

  fn metadata(&mut self, columns: &[Column]) {
    self.forward(QueryEvent::Metadata(columns.to_vec()));
  }

  fn row(&mut self, row: Vec<String>) {
    self.forward(QueryEvent::Row(row));
  }

  fn error(&mut self, error: &Error) {
    self.forward(QueryEvent::Error(error.clone()));
  }

  fn closed(&mut self) {
    self.forward(QueryEvent::Closed);
  }
}

/// A query delivered as a stream of events. Dropping it stops listening.
pub struct QueryStream {
  rx: mpsc::UnboundedReceiver<QueryEvent>,
  handle: Option<QueryHandle>,
}

impl QueryStream {
  /// Next event; `None` after `Closed` has been yielded.
  pub async fn next(&mut self) -> Option<QueryEvent> {
    self.rx.recv().await
  }

  pub fn state(&self) -> SessionState {
    self
      .handle
      .as_ref()
      .map(|h| h.state())
      .unwrap_or(SessionState::Closed)
  }
}

impl Drop for QueryStream {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abandon();
    }
  }
}

/// Opens one Session per query.
#[derive(Clone)]
pub struct QueryService {
  config: ClientConfig,
  connector: Arc<dyn Connector>,
}

impl QueryService {
  pub fn new(config: ClientConfig) -> Self {
    let connector = Arc::new(WebSocketConnector::new(config.connect_timeout));
    Self::with_connector(config, connector)
  }

  pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
    Self { config, connector }
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  /// Run a query with callbacks. Must be called within a Tokio runtime.
  pub fn query(&self, request: QueryRequest) -> QueryHandle {
    let sql = request.sql.clone();
    self.observe(sql, request)
  }

  /// Run a query, reporting its lifecycle to `observer`.
  pub fn observe<O>(&self, sql: impl Into<String>, observer: O) -> QueryHandle
  where
    O: QueryObserver + 'static,
  {
    let sql = sql.into();
    let (mut session, state) = Session::open(self.config.query_url());
    let connector = Arc::clone(&self.connector);

    debug!(url = session.url(), sql = %sql, "starting query");
    let task = tokio::spawn(async move {
      let mut dispatcher = QueryDispatcher::new(observer);
      session.drive(connector.as_ref(), sql, &mut dispatcher).await
    });

    QueryHandle { state, task }
  }

  /// Run a query and receive its lifecycle as a stream of events.
  pub fn stream(&self, sql: impl Into<String>) -> QueryStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = self.observe(sql, ChannelObserver { tx });
    QueryStream {
      rx,
      handle: Some(handle),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Recorder {
    events: Vec<String>,
  }

  impl QueryObserver for Recorder {
    fn metadata(&mut self, columns: &[Column]) {
      self.events.push(format!("metadata:{}", columns.len()));
    }

    fn row(&mut self, row: Vec<String>) {
      self.events.push(format!("row:{}", row.join(",")));
    }
  }

  #[test]
  fn test_dispatch_order() {
    let mut dispatcher = QueryDispatcher::new(Recorder::default());
    dispatcher
      .on_message(r#"{"metadata":{"columns":[{"name":"ID","type":"BIGINT"}]}}"#.into())
      .unwrap();
    dispatcher.on_message(r#"{"row":["1"]}"#.into()).unwrap();
    dispatcher.on_message(r#"{"row":["2"]}"#.into()).unwrap();

    assert_eq!(dispatcher.observer.events, vec!["metadata:1", "row:1", "row:2"]);
  }

  #[test]
  fn test_metadata_after_row_is_violation() {
    let mut dispatcher = QueryDispatcher::new(Recorder::default());
    dispatcher.on_message(r#"{"row":["1"]}"#.into()).unwrap();
    let result = dispatcher.on_message(r#"{"metadata":{"columns":[]}}"#.into());
    assert!(matches!(result, Err(Error::ProtocolViolation { .. })));
  }

  #[test]
  fn test_duplicate_metadata_is_violation() {
    let mut dispatcher = QueryDispatcher::new(Recorder::default());
    dispatcher.on_message(r#"{"metadata":{"columns":[]}}"#.into()).unwrap();
    let result = dispatcher.on_message(r#"{"metadata":{"columns":[]}}"#.into());
    assert!(matches!(result, Err(Error::ProtocolViolation { .. })));
  }

  #[test]
  fn test_unknown_message_is_violation() {
    let mut dispatcher = QueryDispatcher::new(Recorder::default());
    let result = dispatcher.on_message(r#"{"status":"ok"}"#.into());
    assert!(result.unwrap_err().is_fatal());
  }

  #[test]
  fn test_absent_callbacks_are_noops() {
    let mut request = QueryRequest::new("SELECT 1");
    request.opened();
    request.metadata(&[]);
    request.row(vec!["1".into()]);
    request.error(&Error::Transport("x".into()));
    request.closed();
  }

  #[test]
  fn test_request_callbacks_fire() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let rows = Arc::clone(&seen);
    let closed = Arc::clone(&seen);

    let mut request = QueryRequest::new("SELECT 1")
      .on_row(move |row| rows.lock().unwrap().push(row.join(",")))
      .on_closed(move || closed.lock().unwrap().push("closed".to_string()));

    assert_eq!(request.sql(), "SELECT 1");
    request.row(vec!["a".into(), "b".into()]);
    request.closed();

    assert_eq!(*seen.lock().unwrap(), vec!["a,b", "closed"]);
  }
}
