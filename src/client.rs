//! Client facade over the query and folder feed services.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::folders::{FeedHandle, FolderEvent, FolderFeedService, FolderSubscription};
use crate::projection::Projection;
use crate::query::{QueryHandle, QueryRequest, QueryService, QueryStream};
use crate::results::QueryContext;
use crate::transport::{Connector, WebSocketConnector};

/// Dashboard server client.
///
/// Holds no connection itself: every query and feed opens its own Session.
#[derive(Clone)]
pub struct JuaClient {
  queries: QueryService,
  folders: FolderFeedService,
}

impl JuaClient {
  pub fn new(config: ClientConfig) -> Self {
    let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new(config.connect_timeout));
    Self::with_connector(config, connector)
  }

  /// Client for a `host:port` address.
  pub fn parse(addr: &str) -> Result<Self> {
    Ok(Self::new(ClientConfig::parse(addr)?))
  }

  pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
    Self {
      queries: QueryService::with_connector(config.clone(), Arc::clone(&connector)),
      folders: FolderFeedService::with_connector(config, connector),
    }
  }

  pub fn config(&self) -> &ClientConfig {
    self.queries.config()
  }

  pub fn queries(&self) -> &QueryService {
    &self.queries
  }

  pub fn folders(&self) -> &FolderFeedService {
    &self.folders
  }

  pub fn query(&self, request: QueryRequest) -> QueryHandle {
    self.queries.query(request)
  }

  pub fn stream(&self, sql: impl Into<String>) -> QueryStream {
    self.queries.stream(sql)
  }

  /// Run `sql` into a fresh context of projected records.
  pub fn fetch<T: Projection + Clone>(&self, sql: impl Into<String>) -> (QueryContext<T>, QueryHandle) {
    let context = QueryContext::new();
    let handle = context.run(&self.queries, sql);
    (context, handle)
  }

  /// Run `sql` to completion and return its projected records.
  pub async fn fetch_all<T: Projection + Clone>(&self, sql: impl Into<String>) -> Result<Vec<T>> {
    let (context, handle) = self.fetch::<T>(sql);
    handle.finished().await?;
    Ok(context.rows())
  }

  pub fn folder_feed<F>(&self, on_event: F) -> FeedHandle
  where
    F: FnMut(FolderEvent) + Send + 'static,
  {
    self.folders.folder_feed(on_event)
  }

  pub fn subscribe_folders(&self) -> FolderSubscription {
    self.folders.subscribe()
  }
}
