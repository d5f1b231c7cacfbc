//! End-to-end tests over a loopback WebSocket server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jua::{ClientConfig, Error, JuaClient, QueryEvent, TestHistory};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Accept one connection, check the request, reply with `replies` and close.
async fn serve_once(replies: Vec<String>) -> (u16, tokio::task::JoinHandle<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();

  let server = tokio::spawn(async move {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();

    let request = match ws.next().await {
      Some(Ok(Message::Text(text))) => text.to_string(),
      other => panic!("expected text request, got {:?}", other),
    };

    for reply in replies {
      ws.send(Message::Text(reply.into())).await.unwrap();
    }
    ws.close(None).await.unwrap();
    request
  });

  (port, server)
}

fn history_replies() -> Vec<String> {
  vec![
    json!({"metadata": {"columns": [
      {"name": "ID", "type": "BIGINT"},
      {"name": "STATUS", "type": "VARCHAR"},
      {"name": "SUITE_ID", "type": "BIGINT"},
      {"name": "TIMESTAMP", "type": "TIMESTAMP"},
    ]}})
    .to_string(),
    json!({"row": ["1", "PASS", "10", "2014-10-05 11:00:00.0"]}).to_string(),
    json!({"row": ["2", "FAIL", "11", "2014-10-06 11:00:00.0"]}).to_string(),
  ]
}

#[tokio::test]
async fn test_fetch_over_websocket() {
  let (port, server) = serve_once(history_replies()).await;
  let client = JuaClient::new(ClientConfig::new("127.0.0.1", port));

  let rows: Vec<TestHistory> = client.fetch_all("SELECT HISTORY").await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].id, 1);
  assert!(!rows[1].status.is_pass());

  assert_eq!(server.await.unwrap(), "SELECT HISTORY");
}

#[tokio::test]
async fn test_stream_over_websocket() {
  let (port, server) = serve_once(history_replies()).await;
  let client = JuaClient::new(ClientConfig::new("127.0.0.1", port));

  let mut stream = client.stream("SELECT HISTORY");
  let mut rows = 0;
  let mut closed = false;
  while let Some(event) = stream.next().await {
    match event {
      QueryEvent::Row(_) => rows += 1,
      QueryEvent::Closed => closed = true,
      QueryEvent::Error(e) => panic!("unexpected error: {}", e),
      QueryEvent::Opened | QueryEvent::Metadata(_) => {}
    }
  }

  assert_eq!(rows, 2);
  assert!(closed);
  server.await.unwrap();
}

#[tokio::test]
async fn test_non_protocol_reply_is_violation() {
  let (port, server) = serve_once(vec!["hello".to_string()]).await;
  let client = JuaClient::new(ClientConfig::new("127.0.0.1", port));

  let err = client.fetch_all::<TestHistory>("SELECT 1").await.unwrap_err();
  assert!(matches!(err, Error::ProtocolViolation { ref body } if body == "hello"));
  let _ = server.await;
}

#[tokio::test]
async fn test_connection_refused() {
  let config = ClientConfig::new("127.0.0.1", 59999).with_connect_timeout(Duration::from_secs(2));
  let client = JuaClient::new(config);

  let err = client.fetch_all::<TestHistory>("SELECT 1").await.unwrap_err();
  assert!(matches!(err, Error::Connection(_) | Error::Transport(_)));
}

#[tokio::test]
async fn test_tls_endpoint_against_plain_server() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  tokio::spawn(async move {
    // Accept and hang up without a TLS handshake.
    let _ = listener.accept().await;
  });

  let config = ClientConfig::new("127.0.0.1", port)
    .with_tls(true)
    .with_connect_timeout(Duration::from_secs(2));
  assert!(config.query_url().starts_with("wss://"));

  let err = JuaClient::new(config)
    .fetch_all::<TestHistory>("SELECT 1")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Connection(_)));
  if cfg!(not(any(feature = "rustls", feature = "native-tls"))) {
    assert!(err.to_string().contains("TLS"), "{}", err);
  }
}
