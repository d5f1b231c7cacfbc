//! Transport Session: one connection bound to one query or push feed.
//!
//! The lifecycle is an explicit state machine:
//!
//! ```text
//! Opening --Opened--> Open --Closed--> Closed
//!    \______________Closed______________/
//! ```
//!
//! Errors set an orthogonal `errored` flag and are reported, but never close
//! the Session by themselves. Anything arriving after `Closed` is ignored.

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::transport::{Connection, Connector};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Opening,
  Open,
  Closed,
}

/// Inbound lifecycle event from the underlying connection
#[derive(Debug)]
pub enum SessionEvent {
  Opened,
  Message(String),
  Error(Error),
  Closed,
}

/// What the driver should do with an event
#[derive(Debug)]
pub enum Dispatch {
  Opened,
  Deliver(String),
  Error(Error),
  Closed,
  Ignore,
}

/// Pure Session state machine.
#[derive(Debug)]
pub struct SessionMachine {
  state: SessionState,
  errored: bool,
}

impl Default for SessionMachine {
  fn default() -> Self {
    Self::new()
  }
}

impl SessionMachine {
  /// A freshly opened Session starts in `Opening`.
  pub fn new() -> Self {
    Self {
      state: SessionState::Opening,
      errored: false,
    }
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn is_errored(&self) -> bool {
    self.errored
  }

  pub fn handle(&mut self, event: SessionEvent) -> Dispatch {
    use SessionState::*;

    match (self.state, event) {
      (Closed, _) => Dispatch::Ignore,
      (Opening, SessionEvent::Opened) => {
        self.state = Open;
        Dispatch::Opened
      }
      (Open, SessionEvent::Message(text)) => Dispatch::Deliver(text),
      (_, SessionEvent::Error(e)) => {
        self.errored = true;
        Dispatch::Error(e)
      }
      (_, SessionEvent::Closed) => {
        self.state = Closed;
        Dispatch::Closed
      }
      // Duplicate opens, or messages before the open signal.
      (_, _) => Dispatch::Ignore,
    }
  }

  /// Sending is only valid while `Open`.
  pub fn check_send(&self) -> Result<()> {
    if self.state == SessionState::Open {
      Ok(())
    } else {
      Err(Error::InvalidState(format!("cannot send while {:?}", self.state)))
    }
  }
}

/// Receives the dispatched lifecycle of one Session.
///
/// Returning an error from `on_message` is fatal to the Session: the
/// connection is dropped, the error is reported through `on_error` and
/// `on_closed` fires.
pub trait SessionHandler: Send {
  fn on_opened(&mut self) {}

  fn on_message(&mut self, text: String) -> Result<()>;

  fn on_error(&mut self, _error: &Error) {}

  fn on_closed(&mut self) {}
}

/// One Session bound to an endpoint.
pub struct Session {
  url: String,
  machine: SessionMachine,
  state_tx: watch::Sender<SessionState>,
}

impl Session {
  /// Create a Session in `Opening` along with a watch on its state.
  pub fn open(url: impl Into<String>) -> (Self, watch::Receiver<SessionState>) {
    let machine = SessionMachine::new();
    let (state_tx, state_rx) = watch::channel(machine.state());
    let session = Self {
      url: url.into(),
      machine,
      state_tx,
    };
    (session, state_rx)
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn state(&self) -> SessionState {
    self.machine.state()
  }

  /// Whether any error was reported on this Session.
  pub fn is_errored(&self) -> bool {
    self.machine.is_errored()
  }

  /// Connect, send `payload` once open, then forward inbound messages to
  /// `handler` until the server closes the connection.
  pub async fn drive<H>(&mut self, connector: &dyn Connector, payload: String, handler: &mut H) -> Result<()>
  where
    H: SessionHandler + ?Sized,
  {
    let mut connection = match connector.connect(&self.url).await {
      Ok(connection) => connection,
      Err(e) => {
        warn!(url = %self.url, error = %e, "session failed to open");
        self.apply(SessionEvent::Error(e.clone()), handler);
        self.apply(SessionEvent::Closed, handler);
        return Err(e);
      }
    };

    self.apply(SessionEvent::Opened, handler);
    if let Err(e) = self.send(connection.as_mut(), payload).await {
      self.apply(SessionEvent::Error(e), handler);
    }

    while let Some(inbound) = connection.recv().await {
      let text = match inbound {
        Ok(text) => text,
        Err(e) => {
          warn!(url = %self.url, error = %e, "session transport error");
          self.apply(SessionEvent::Error(e), handler);
          continue;
        }
      };

      if let Dispatch::Deliver(text) = self.machine.handle(SessionEvent::Message(text)) {
        if let Err(e) = handler.on_message(text) {
          error!(url = %self.url, error = %e, "abandoning session");
          self.apply(SessionEvent::Error(e.clone()), handler);
          drop(connection);
          self.apply(SessionEvent::Closed, handler);
          return Err(e);
        }
      }
    }

    self.apply(SessionEvent::Closed, handler);
    Ok(())
  }

  async fn send(&mut self, connection: &mut dyn Connection, payload: String) -> Result<()> {
    self.machine.check_send()?;
    debug!(url = %self.url, bytes = payload.len(), "sending request");
    connection.send(payload).await
  }

  fn apply<H>(&mut self, event: SessionEvent, handler: &mut H)
  where
    H: SessionHandler + ?Sized,
  {
    match self.machine.handle(event) {
      Dispatch::Opened => {
        debug!(url = %self.url, "session open");
        self.state_tx.send_replace(self.machine.state());
        handler.on_opened();
      }
      Dispatch::Error(e) => handler.on_error(&e),
      Dispatch::Closed => {
        debug!(url = %self.url, errored = self.machine.is_errored(), "session closed");
        self.state_tx.send_replace(self.machine.state());
        handler.on_closed();
      }
      Dispatch::Deliver(_) | Dispatch::Ignore => {}
    }
  }
}
