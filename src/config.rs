//! Client configuration.

use std::time::Duration;

use crate::accumulator::ArrivalWait;
use crate::error::{Error, Result};
use crate::protocol::{FOLDERS_PATH, QUERY_PATH};

/// Connection options for the dashboard server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub host: String,
  pub port: u16,
  pub secure: bool,
  pub query_path: String,
  pub folders_path: String,
  pub connect_timeout: Duration,
  pub arrival_wait: ArrivalWait,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self::new("localhost", 9000)
  }
}

impl ClientConfig {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
      secure: false,
      query_path: QUERY_PATH.to_string(),
      folders_path: FOLDERS_PATH.to_string(),
      connect_timeout: Duration::from_secs(10),
      arrival_wait: ArrivalWait::default(),
    }
  }

  /// Parse a `host:port` address.
  pub fn parse(addr: &str) -> Result<Self> {
    let (host, port) = addr
      .rsplit_once(':')
      .ok_or_else(|| Error::InvalidConfig(format!("expected host:port, got {:?}", addr)))?;

    if host.is_empty() {
      return Err(Error::InvalidConfig(format!("missing host in {:?}", addr)));
    }

    let port = port
      .parse::<u16>()
      .map_err(|_| Error::InvalidConfig(format!("invalid port in {:?}", addr)))?;

    Ok(Self::new(host, port))
  }

  /// Use `wss://` endpoints. Connecting needs the `rustls` or `native-tls`
  /// crate feature; without one the connect fails with a `Connection` error.
  pub fn with_tls(mut self, secure: bool) -> Self {
    self.secure = secure;
    self
  }

  pub fn with_query_path(mut self, path: impl Into<String>) -> Self {
    self.query_path = path.into();
    self
  }

  pub fn with_folders_path(mut self, path: impl Into<String>) -> Self {
    self.folders_path = path.into();
    self
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }

  pub fn with_arrival_wait(mut self, wait: ArrivalWait) -> Self {
    self.arrival_wait = wait;
    self
  }

  /// WebSocket URL for a server path.
  pub fn endpoint(&self, path: &str) -> String {
    let scheme = if self.secure { "wss" } else { "ws" };
    let path = if path.starts_with('/') {
      path.to_string()
    } else {
      format!("/{}", path)
    };
    format!("{}://{}:{}{}", scheme, self.host, self.port, path)
  }

  pub fn query_url(&self) -> String {
    self.endpoint(&self.query_path)
  }

  pub fn folders_url(&self) -> String {
    self.endpoint(&self.folders_path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config() {
    let config = ClientConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 9000);
    assert!(!config.secure);
    assert_eq!(config.query_url(), "ws://localhost:9000/query");
    assert_eq!(config.folders_url(), "ws://localhost:9000/folders");
  }

  #[test]
  fn test_parse_address() {
    let config = ClientConfig::parse("dash.example.com:8080").unwrap();
    assert_eq!(config.host, "dash.example.com");
    assert_eq!(config.port, 8080);
  }

  #[test]
  fn test_parse_rejects_bad_addresses() {
    assert!(matches!(ClientConfig::parse("localhost"), Err(Error::InvalidConfig(_))));
    assert!(matches!(ClientConfig::parse(":9000"), Err(Error::InvalidConfig(_))));
    assert!(matches!(ClientConfig::parse("localhost:abc"), Err(Error::InvalidConfig(_))));
  }

  #[test]
  fn test_builder_chain() {
    let config = ClientConfig::new("10.0.0.1", 443)
      .with_tls(true)
      .with_query_path("adhoc")
      .with_connect_timeout(Duration::from_secs(2));

    assert_eq!(config.query_url(), "wss://10.0.0.1:443/adhoc");
    assert_eq!(config.connect_timeout, Duration::from_secs(2));
  }
}
