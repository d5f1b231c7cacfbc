//! Queries behind the dashboard views.
//!
//! The query service sends SQL verbatim, so these builders are the only
//! place view inputs are turned into SQL text.

/// Most recent `count` test suite runs, newest first.
pub fn recent_suites(count: u32) -> String {
  format!("SELECT TOP {} * FROM TESTSUITE ORDER BY TIMESTAMP DESC", count)
}

pub fn suite_by_id(id: i64) -> String {
  format!("SELECT * FROM TESTSUITE WHERE ID = {}", id)
}

/// Errors, failures and skipped tests of one suite run.
pub fn non_passes_for_suite(suite_id: i64) -> String {
  format!(
    "SELECT * FROM TESTENTRY WHERE STATUS != 'PASS' AND SUITE_ID = {}",
    suite_id
  )
}

pub fn test_by_id(id: i64) -> String {
  format!("SELECT * FROM TESTENTRY WHERE ID = {}", id)
}

/// Last 100 outcomes of one test method across suite runs.
pub fn test_history(class_name: &str, method_name: &str) -> String {
  format!(
    "SELECT TOP 100 TESTENTRY.ID, TESTENTRY.STATUS, TESTENTRY.SUITE_ID, TESTSUITE.TIMESTAMP \
     FROM TESTENTRY INNER JOIN TESTSUITE ON TESTENTRY.SUITE_ID = TESTSUITE.ID \
     WHERE TESTENTRY.CLASSNAME = {} AND TESTENTRY.METHODNAME = {} \
     ORDER BY TIMESTAMP DESC",
    quote(class_name),
    quote(method_name)
  )
}

/// Test methods per test class, largest first.
pub fn class_test_counts() -> String {
  "SELECT DISTINCT CLASSNAME, COUNT(CLASSNAME) AS NUM_TESTS_IN_TESTCASE \
   FROM TESTENTRY \
   GROUP BY CLASSNAME \
   ORDER BY NUM_TESTS_IN_TESTCASE DESC"
    .to_string()
}

fn quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

/// How many recent runs the summary graph shows.
///
/// Values snap to multiples of 5 within 5..=500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryRange {
  count: u32,
}

impl SummaryRange {
  pub const MIN: u32 = 5;
  pub const MAX: u32 = 500;
  pub const STEP: u32 = 5;
  pub const DEFAULT: u32 = 25;

  pub fn new(count: u32) -> Self {
    let snapped = count.saturating_add(Self::STEP / 2) / Self::STEP * Self::STEP;
    Self {
      count: snapped.clamp(Self::MIN, Self::MAX),
    }
  }

  pub fn count(&self) -> u32 {
    self.count
  }

  /// Move the range. Returns the query to re-run when it changed.
  pub fn set(&mut self, count: u32) -> Option<String> {
    let next = Self::new(count);
    if next == *self {
      return None;
    }
    *self = next;
    Some(self.sql())
  }

  pub fn sql(&self) -> String {
    recent_suites(self.count)
  }
}

impl Default for SummaryRange {
  fn default() -> Self {
    Self::new(Self::DEFAULT)
  }
}

/// First `n` rows, for the latest-results grid.
pub fn latest<T: Clone>(rows: &[T], n: usize) -> Vec<T> {
  rows.iter().take(n).cloned().collect()
}

/// Count cell text; zero reads as `---`.
pub fn format_count(count: i64) -> String {
  if count == 0 {
    "---".to_string()
  } else {
    count.to_string()
  }
}

/// Pass-rate cell text.
pub fn format_rate(rate: Option<f64>) -> String {
  match rate {
    Some(rate) => format!("{}", rate),
    None => "---".to_string(),
  }
}
