//! Row Accumulator and delivery policies.
//!
//! Rows accumulate in arrival order for the lifetime of one query. Late
//! consumers wait on an arrival signal instead of polling, with the same
//! give-up ceiling as the polling loop ([`ArrivalWait`]).

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Bounded wait for the first rows of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalWait {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl Default for ArrivalWait {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(50),
      max_attempts: 200,
    }
  }
}

impl ArrivalWait {
  pub fn new(interval: Duration, max_attempts: u32) -> Self {
    Self {
      interval,
      max_attempts,
    }
  }

  /// Total time before giving up, saturating at [`Duration::MAX`].
  pub fn deadline(&self) -> Duration {
    self
      .interval
      .checked_mul(self.max_attempts)
      .unwrap_or(Duration::MAX)
  }

  /// Probe every `interval` until `probe` yields a value. Probes exactly
  /// `max_attempts` times before giving up.
  pub async fn poll<T, F>(&self, mut probe: F) -> Result<T>
  where
    F: FnMut() -> Option<T>,
  {
    for _ in 0..self.max_attempts {
      if let Some(value) = probe() {
        return Ok(value);
      }
      tokio::time::sleep(self.interval).await;
    }

    error!(attempts = self.max_attempts, "reached retry limit");
    Err(Error::ArrivalTimeout {
      attempts: self.max_attempts,
    })
  }
}

/// Published accumulator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Arrival {
  pub generation: u64,
  pub count: usize,
  pub frozen: bool,
}

impl Arrival {
  /// Rows are present, or the query ended without any.
  pub fn is_ready(&self) -> bool {
    self.count > 0 || self.frozen
  }
}

/// Ordered, append-only buffer of one query's rows.
#[derive(Debug)]
pub struct RowAccumulator<T> {
  rows: Vec<T>,
  generation: u64,
  frozen: bool,
  arrivals: watch::Sender<Arrival>,
}

impl<T> Default for RowAccumulator<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> RowAccumulator<T> {
  pub fn new() -> Self {
    let (arrivals, _) = watch::channel(Arrival::default());
    Self {
      rows: Vec::new(),
      generation: 0,
      frozen: false,
      arrivals,
    }
  }

  /// Append a row. Fails once the accumulator is frozen.
  pub fn push(&mut self, row: T) -> Result<usize> {
    if self.frozen {
      return Err(Error::InvalidState("accumulator is frozen".to_string()));
    }
    self.rows.push(row);
    self.publish();
    Ok(self.rows.len())
  }

  /// Stop accepting rows; the Session has closed.
  pub fn freeze(&mut self) {
    self.frozen = true;
    self.publish();
  }

  /// Clear for a new query.
  pub fn reset(&mut self) {
    self.rows.clear();
    self.frozen = false;
    self.generation += 1;
    self.publish();
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn rows(&self) -> &[T] {
    &self.rows
  }

  pub fn watch(&self) -> ArrivalWatch {
    ArrivalWatch {
      rx: self.arrivals.subscribe(),
    }
  }

  fn publish(&self) {
    self.arrivals.send_replace(Arrival {
      generation: self.generation,
      count: self.rows.len(),
      frozen: self.frozen,
    });
  }
}

impl<T: Clone> RowAccumulator<T> {
  pub fn snapshot(&self) -> Vec<T> {
    self.rows.clone()
  }
}

/// Late-attaching consumer's view of an accumulator's progress.
#[derive(Debug, Clone)]
pub struct ArrivalWatch {
  rx: watch::Receiver<Arrival>,
}

impl ArrivalWatch {
  pub fn current(&self) -> Arrival {
    *self.rx.borrow()
  }

  /// Wait until rows are present or the query has ended, giving up after
  /// `policy.deadline()`.
  pub async fn wait(&mut self, policy: &ArrivalWait) -> Result<Arrival> {
    let ready = self.rx.wait_for(Arrival::is_ready);
    match tokio::time::timeout(policy.deadline(), ready).await {
      Ok(Ok(arrival)) => Ok(*arrival),
      Ok(Err(_)) => Err(Error::ChannelClosed),
      Err(_) => {
        error!(attempts = policy.max_attempts, "reached retry limit");
        Err(Error::ArrivalTimeout {
          attempts: policy.max_attempts,
        })
      }
    }
  }
}

/// Buffers rows and hands them over as one ordered batch once `target`
/// rows have arrived.
#[derive(Debug)]
pub struct BatchDelivery<T> {
  target: usize,
  buffer: Vec<T>,
  delivered: bool,
  overflow: usize,
}

impl<T> BatchDelivery<T> {
  pub fn new(target: usize) -> Self {
    let target = target.max(1);
    Self {
      target,
      buffer: Vec::with_capacity(target),
      delivered: false,
      overflow: 0,
    }
  }

  pub fn target(&self) -> usize {
    self.target
  }

  pub fn is_delivered(&self) -> bool {
    self.delivered
  }

  /// Rows that arrived after the batch was delivered.
  pub fn overflow(&self) -> usize {
    self.overflow
  }

  /// Buffer a row; returns the batch when this row completes it.
  pub fn push(&mut self, row: T) -> Option<Vec<T>> {
    if self.delivered {
      if self.overflow == 0 {
        warn!(batch_size = self.target, "rows beyond batch target are dropped");
      }
      self.overflow += 1;
      return None;
    }

    self.buffer.push(row);
    if self.buffer.len() == self.target {
      self.delivered = true;
      return Some(std::mem::take(&mut self.buffer));
    }
    None
  }

  /// The Session closed. Hands over a short batch that never reached
  /// `target`, if any rows arrived.
  pub fn finish(&mut self) -> Option<Vec<T>> {
    if self.delivered || self.buffer.is_empty() {
      return None;
    }
    self.delivered = true;
    Some(std::mem::take(&mut self.buffer))
  }
}
