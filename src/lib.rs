//! JUA dashboard Rust client
//!
//! Streams ad-hoc query results and folder indexing events from the JUnit
//! analysis dashboard server over WebSockets. Every query opens its own
//! Session: the SQL goes out once, a metadata message and then one message
//! per row come back, and the server closes the Session when done.
//!
//! # Example
//!
//! ```no_run
//! use jua::{dashboard, JuaClient, TestSuite};
//!
//! #[tokio::main]
//! async fn main() -> jua::Result<()> {
//!     let client = JuaClient::parse("localhost:9000")?;
//!
//!     // Most recent suite runs, projected into typed records
//!     let suites: Vec<TestSuite> = client.fetch_all(dashboard::recent_suites(25)).await?;
//!     for suite in &suites {
//!         println!("{} {} passing of {}", suite.file, suite.passing, suite.tests_run);
//!     }
//!
//!     // Follow folder indexing status
//!     let mut folders = client.subscribe_folders();
//!     while let Some(folder) = folders.next().await {
//!         println!("{} {}", folder.path, folder.status);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod accumulator;
mod client;
pub mod compare;
mod config;
pub mod dashboard;
mod error;
pub mod folders;
pub mod projection;
pub mod protocol;
pub mod query;
pub mod results;
pub mod session;
pub mod transport;

pub use accumulator::{Arrival, ArrivalWait, ArrivalWatch, BatchDelivery, RowAccumulator};
pub use client::JuaClient;
pub use compare::{CompareSelection, Slot, Toggle};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use folders::{
  CacheUpdate, FeedHandle, FolderCache, FolderEvent, FolderFeedService, FolderStatus, FolderSubscription,
};
pub use projection::{
  project, ClassTestCount, Projection, Record, SchemaKind, TestEntry, TestHistory, TestResult, TestStatus,
  TestSuite,
};
pub use protocol::{Column, Metadata, ServerMessage, FOLDERS_PATH, FOLDER_FEED_TRIGGER, QUERY_PATH};
pub use query::{QueryEvent, QueryHandle, QueryObserver, QueryRequest, QueryService, QueryStream};
pub use results::QueryContext;
pub use session::{SessionHandler, SessionState};
pub use transport::{Connection, Connector, WebSocketConnector};
