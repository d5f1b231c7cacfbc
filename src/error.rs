//! Error types for the dashboard client.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
  #[error("Connection error: {0}")]
  Connection(String),

  #[error("Transport error: {0}")]
  Transport(String),

  /// The server sent something that is neither a metadata nor a row message.
  #[error("Unexpected server message: {body}")]
  ProtocolViolation { body: String },

  #[error("Schema mismatch for {schema}: expected {expected} fields, got {actual}")]
  SchemaMismatch {
    schema: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("Invalid value for field '{field}': {value:?}")]
  InvalidField { field: &'static str, value: String },

  #[error("Reached retry limit: {attempts}")]
  ArrivalTimeout { attempts: u32 },

  #[error("Invalid session state: {0}")]
  InvalidState(String),

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Channel closed")]
  ChannelClosed,
}

impl Error {
  pub(crate) fn protocol(body: impl Into<String>) -> Self {
    Self::ProtocolViolation { body: body.into() }
  }

  pub(crate) fn invalid_field(field: &'static str, value: &str) -> Self {
    Self::InvalidField {
      field,
      value: value.to_string(),
    }
  }

  /// Errors that end the Session they occurred on.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::ProtocolViolation { .. })
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
  fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::Transport(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
