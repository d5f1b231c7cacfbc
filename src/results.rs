//! Per-query result context.
//!
//! A [`QueryContext`] owns the accumulator, metadata and loading flag of one
//! logical view query. Starting a new query resets it; rows still arriving
//! from a superseded Session are discarded by generation.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::accumulator::{ArrivalWait, ArrivalWatch, BatchDelivery, RowAccumulator};
use crate::error::{Error, Result};
use crate::projection::Projection;
use crate::protocol::Column;
use crate::query::{QueryHandle, QueryObserver, QueryService};

struct ContextState<T> {
  accumulator: RowAccumulator<T>,
  metadata: Option<Vec<Column>>,
  loading: bool,
  skipped: usize,
}

/// Shared result state for one view query.
pub struct QueryContext<T> {
  state: Arc<Mutex<ContextState<T>>>,
}

impl<T> Clone for QueryContext<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T: Projection + Clone> Default for QueryContext<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Projection + Clone> QueryContext<T> {
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(ContextState {
        accumulator: RowAccumulator::new(),
        metadata: None,
        loading: false,
        skipped: 0,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, ContextState<T>> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Clear all results ahead of a new query. Returns the new generation.
  pub fn reset(&self) -> u64 {
    let mut state = self.lock();
    state.accumulator.reset();
    state.metadata = None;
    state.loading = false;
    state.skipped = 0;
    state.accumulator.generation()
  }

  /// Start `sql`, accumulating projected rows.
  pub fn run(&self, service: &QueryService, sql: impl Into<String>) -> QueryHandle {
    self.start(service, sql.into(), Delivery::Accumulate)
  }

  /// Start `sql`, also handing each projected row to `on_row` as it arrives.
  pub fn run_streaming<F>(&self, service: &QueryService, sql: impl Into<String>, on_row: F) -> QueryHandle
  where
    F: FnMut(T) + Send + 'static,
  {
    self.start(service, sql.into(), Delivery::Stream(Box::new(on_row)))
  }

  /// Start `sql`, handing rows to `on_update` as a single batch once
  /// `target` rows have arrived (or at close, if fewer arrive).
  pub fn run_batched<F>(
    &self,
    service: &QueryService,
    sql: impl Into<String>,
    target: usize,
    on_update: F,
  ) -> QueryHandle
  where
    F: FnMut(Vec<T>) + Send + 'static,
  {
    let delivery = Delivery::Batch {
      batch: BatchDelivery::new(target),
      on_update: Box::new(on_update),
    };
    self.start(service, sql.into(), delivery)
  }

  fn start(&self, service: &QueryService, sql: String, delivery: Delivery<T>) -> QueryHandle {
    let generation = self.reset();
    let observer = ContextObserver {
      context: self.clone(),
      generation,
      delivery,
    };
    service.observe(sql, observer)
  }

  pub fn rows(&self) -> Vec<T> {
    self.lock().accumulator.snapshot()
  }

  pub fn len(&self) -> usize {
    self.lock().accumulator.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().accumulator.is_empty()
  }

  pub fn is_loading(&self) -> bool {
    self.lock().loading
  }

  pub fn is_complete(&self) -> bool {
    self.lock().accumulator.is_frozen()
  }

  pub fn metadata(&self) -> Option<Vec<Column>> {
    self.lock().metadata.clone()
  }

  /// Rows dropped because they did not fit the schema.
  pub fn skipped_rows(&self) -> usize {
    self.lock().skipped
  }

  pub fn generation(&self) -> u64 {
    self.lock().accumulator.generation()
  }

  pub fn watch(&self) -> ArrivalWatch {
    self.lock().accumulator.watch()
  }

  /// Wait for the first rows (or the end of the query), then snapshot.
  pub async fn wait_for_rows(&self, policy: &ArrivalWait) -> Result<Vec<T>> {
    let mut watch = self.watch();
    watch.wait(policy).await?;
    Ok(self.rows())
  }
}

enum Delivery<T> {
  Accumulate,
  Stream(Box<dyn FnMut(T) + Send>),
  Batch {
    batch: BatchDelivery<T>,
    on_update: Box<dyn FnMut(Vec<T>) + Send>,
  },
}

struct ContextObserver<T> {
  context: QueryContext<T>,
  generation: u64,
  delivery: Delivery<T>,
}

impl<T: Projection + Clone> ContextObserver<T> {
  /// The context's state, unless a newer query has taken it over.
  fn current(&self) -> Option<MutexGuard<'_, ContextState<T>>> {
    let state = self.context.lock();
    if state.accumulator.generation() == self.generation {
      Some(state)
    } else {
      None
    }
  }
}

impl<T: Projection + Clone> QueryObserver for ContextObserver<T> {
  fn opened(&mut self) {
    if let Some(mut state) = self.current() {
      state.loading = true;
    }
  }

  fn metadata(&mut self, columns: &[Column]) {
    if let Some(mut state) = self.current() {
      state.metadata = Some(columns.to_vec());
    }
  }

  fn row(&mut self, row: Vec<String>) {
    let record = {
      let Some(mut state) = self.current() else {
        return;
      };

      let record = match T::project(&row) {
        Ok(record) => record,
        Err(e) => {
          warn!(schema = %T::KIND, error = %e, "skipping row");
          state.skipped += 1;
          return;
        }
      };

      if let Err(e) = state.accumulator.push(record.clone()) {
        warn!(error = %e, "row arrived after close");
        return;
      }
      record
    };

    // Callbacks run outside the lock so they may read the context.
    match &mut self.delivery {
      Delivery::Accumulate => {}
      Delivery::Stream(on_row) => on_row(record),
      Delivery::Batch { batch, on_update } => {
        if let Some(rows) = batch.push(record) {
          debug!(rows = rows.len(), "delivering batch");
          on_update(rows);
        }
      }
    }
  }

  fn error(&mut self, error: &Error) {
    debug!(error = %error, generation = self.generation, "query error");
  }

  fn closed(&mut self) {
    {
      let Some(mut state) = self.current() else {
        return;
      };
      state.loading = false;
      state.accumulator.freeze();
    }

    if let Delivery::Batch { batch, on_update } = &mut self.delivery {
      if let Some(rows) = batch.finish() {
        debug!(rows = rows.len(), "delivering short batch");
        on_update(rows);
      }
    }
  }
}
