//! Wire protocol types and the query message decoder.
//!
//! Client to server is a single text message: the raw query (or an empty
//! trigger for the folder feed). Server to client is a sequence of JSON
//! text messages:
//!
//! ```text
//! {"metadata": {"columns": [{"name": "ID", "type": "BIGINT"}, ...]}}   at most once, first
//! {"row": ["13921", "uuid-x", ...]}                                    zero or more
//! ```
//!
//! The server closing the connection is the only end-of-results signal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Path of the ad-hoc query endpoint
pub const QUERY_PATH: &str = "/query";

/// Path of the folder status feed endpoint
pub const FOLDERS_PATH: &str = "/folders";

/// Payload that starts the folder feed
pub const FOLDER_FEED_TRIGGER: &str = "";

/// Result-set column descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
  pub name: String,
  #[serde(rename = "type")]
  pub column_type: String,
}

impl Column {
  pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      column_type: column_type.into(),
    }
  }
}

/// Body of a metadata message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  pub columns: Vec<Column>,
}

impl Metadata {
  /// Position of a column by name, ignoring case.
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self
      .columns
      .iter()
      .position(|c| c.name.eq_ignore_ascii_case(name))
  }

  pub fn width(&self) -> usize {
    self.columns.len()
  }
}

/// Classified server message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
  Metadata(Vec<Column>),
  Row(Vec<String>),
}

/// Classify a decoded message body.
///
/// `metadata` is checked before `row`, so a body carrying both is metadata.
/// Anything else is a protocol violation carrying the raw body.
pub fn decode(body: &Value) -> Result<ServerMessage> {
  if let Some(metadata) = body.get("metadata") {
    let metadata: Metadata =
      serde_json::from_value(metadata.clone()).map_err(|_| Error::protocol(body.to_string()))?;
    return Ok(ServerMessage::Metadata(metadata.columns));
  }

  if let Some(row) = body.get("row") {
    return decode_row(row)
      .map(ServerMessage::Row)
      .ok_or_else(|| Error::protocol(body.to_string()));
  }

  Err(Error::protocol(body.to_string()))
}

/// Parse message text as JSON and classify it.
pub fn decode_text(text: &str) -> Result<ServerMessage> {
  let body: Value = serde_json::from_str(text).map_err(|_| Error::protocol(text))?;
  decode(&body)
}

// SQL NULL arrives as JSON null.
fn decode_row(row: &Value) -> Option<Vec<String>> {
  row
    .as_array()?
    .iter()
    .map(|cell| match cell {
      Value::String(s) => Some(s.clone()),
      Value::Null => Some(String::new()),
      _ => None,
    })
    .collect()
}
