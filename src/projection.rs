//! Field Projector: positional rows to named, type-coerced records.
//!
//! Every schema has a fixed width. A row of any other width is a
//! [`Error::SchemaMismatch`]; a field that fails to coerce is an
//! [`Error::InvalidField`]. Projection never mutates the raw row.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::folders::FolderEvent;

/// Timestamp format of result-set cells, e.g. `1986-12-26 09:29:29.848`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Known row schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
  TestEntry,
  TestResult,
  TestSuite,
  TestHistory,
  Folder,
  ClassTestCount,
}

impl SchemaKind {
  pub fn name(&self) -> &'static str {
    match self {
      SchemaKind::TestEntry => "test-entry",
      SchemaKind::TestResult => "test-result",
      SchemaKind::TestSuite => "test-suite",
      SchemaKind::TestHistory => "test-history",
      SchemaKind::Folder => "folder",
      SchemaKind::ClassTestCount => "class-test-count",
    }
  }

  /// Number of positional fields a row of this schema carries.
  pub fn width(&self) -> usize {
    match self {
      SchemaKind::TestEntry => 9,
      SchemaKind::TestResult => 10,
      SchemaKind::TestSuite => 12,
      SchemaKind::TestHistory => 4,
      SchemaKind::Folder => 5,
      SchemaKind::ClassTestCount => 2,
    }
  }

  pub fn check_width(&self, row: &[String]) -> Result<()> {
    if row.len() == self.width() {
      Ok(())
    } else {
      Err(Error::SchemaMismatch {
        schema: self.name(),
        expected: self.width(),
        actual: row.len(),
      })
    }
  }
}

impl fmt::Display for SchemaKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

/// A record type with a fixed positional schema.
pub trait Projection: Sized + Send + 'static {
  const KIND: SchemaKind;

  /// Build the record from a row already checked for width.
  fn from_fields(fields: &[String]) -> Result<Self>;

  fn project(row: &[String]) -> Result<Self> {
    Self::KIND.check_width(row)?;
    Self::from_fields(row)
  }
}

/// Outcome of a single test method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TestStatus {
  Pass,
  Fail,
  Error,
  Skipped,
  Other(String),
}

impl TestStatus {
  pub fn parse(s: &str) -> Self {
    match s {
      "PASS" => TestStatus::Pass,
      "FAIL" => TestStatus::Fail,
      "ERROR" => TestStatus::Error,
      "SKIPPED" => TestStatus::Skipped,
      other => TestStatus::Other(other.to_string()),
    }
  }

  pub fn is_pass(&self) -> bool {
    matches!(self, TestStatus::Pass)
  }
}

impl fmt::Display for TestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TestStatus::Pass => write!(f, "PASS"),
      TestStatus::Fail => write!(f, "FAIL"),
      TestStatus::Error => write!(f, "ERROR"),
      TestStatus::Skipped => write!(f, "SKIPPED"),
      TestStatus::Other(s) => write!(f, "{}", s),
    }
  }
}

/// One test method execution (`SELECT * FROM TESTENTRY`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestEntry {
  pub id: i64,
  pub uuid: String,
  pub class_name: String,
  pub method_name: String,
  pub time: String,
  pub status: TestStatus,
  pub exception: String,
  pub message: String,
  pub detail: String,
}

impl TestEntry {
  /// Fully-qualified test name, `class.method`.
  pub fn qualified_name(&self) -> String {
    format!("{}.{}", self.class_name, self.method_name)
  }

  pub fn time_seconds(&self) -> Option<f64> {
    self.time.trim().parse().ok()
  }
}

impl Projection for TestEntry {
  const KIND: SchemaKind = SchemaKind::TestEntry;

  fn from_fields(f: &[String]) -> Result<Self> {
    Ok(Self {
      id: parse_int("id", &f[0])?,
      uuid: f[1].clone(),
      class_name: f[2].clone(),
      method_name: f[3].clone(),
      time: f[4].clone(),
      status: TestStatus::parse(&f[5]),
      exception: f[6].clone(),
      message: f[7].clone(),
      detail: f[8].clone(),
    })
  }
}

/// Per-test tally row with counts and a timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
  pub id: i64,
  pub uuid: String,
  pub class_name: String,
  pub method_name: String,
  pub time: String,
  pub tests_run: i64,
  pub errors: i64,
  pub failures: i64,
  pub skipped: i64,
  pub timestamp: DateTime<Utc>,
  pub passing: i64,
  pub pass_rate: Option<f64>,
}

impl Projection for TestResult {
  const KIND: SchemaKind = SchemaKind::TestResult;

  fn from_fields(f: &[String]) -> Result<Self> {
    let tests_run = parse_int("testsRun", &f[5])?;
    let errors = parse_int("errors", &f[6])?;
    let failures = parse_int("failures", &f[7])?;
    let skipped = parse_int("skipped", &f[8])?;

    Ok(Self {
      id: parse_int("id", &f[0])?,
      uuid: f[1].clone(),
      class_name: f[2].clone(),
      method_name: f[3].clone(),
      time: f[4].clone(),
      tests_run,
      errors,
      failures,
      skipped,
      timestamp: parse_timestamp("timestamp", &f[9])?,
      passing: passing(tests_run, errors, failures, skipped)?,
      pass_rate: pass_rate(tests_run, errors, failures),
    })
  }
}

/// One test suite run (`SELECT * FROM TESTSUITE`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSuite {
  pub id: i64,
  pub uuid: String,
  pub package_name: String,
  pub class_name: String,
  pub time: String,
  pub folder: String,
  pub file: String,
  pub tests_run: i64,
  pub failures: i64,
  pub errors: i64,
  pub skipped: i64,
  pub timestamp: DateTime<Utc>,
  pub passing: i64,
  pub pass_rate: Option<f64>,
}

impl TestSuite {
  pub fn has_failures(&self) -> bool {
    self.errors > 0 || self.failures > 0
  }

  pub fn time_seconds(&self) -> Option<f64> {
    self.time.trim().parse().ok()
  }
}

impl Projection for TestSuite {
  const KIND: SchemaKind = SchemaKind::TestSuite;

  fn from_fields(f: &[String]) -> Result<Self> {
    let tests_run = parse_int("testsRun", &f[7])?;
    let failures = parse_int("failures", &f[8])?;
    let errors = parse_int("errors", &f[9])?;
    let skipped = parse_int("skipped", &f[10])?;

    Ok(Self {
      id: parse_int("id", &f[0])?,
      uuid: f[1].clone(),
      package_name: f[2].clone(),
      class_name: f[3].clone(),
      time: f[4].clone(),
      folder: f[5].clone(),
      file: f[6].clone(),
      tests_run,
      failures,
      errors,
      skipped,
      timestamp: parse_timestamp("timestamp", &f[11])?,
      passing: passing(tests_run, errors, failures, skipped)?,
      pass_rate: pass_rate(tests_run, errors, failures),
    })
  }
}

/// Status of one test method in one historical suite run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestHistory {
  pub id: i64,
  pub status: TestStatus,
  pub suite_id: i64,
  pub timestamp: DateTime<Utc>,
}

impl Projection for TestHistory {
  const KIND: SchemaKind = SchemaKind::TestHistory;

  fn from_fields(f: &[String]) -> Result<Self> {
    Ok(Self {
      id: parse_int("id", &f[0])?,
      status: TestStatus::parse(&f[1]),
      suite_id: parse_int("suiteId", &f[2])?,
      timestamp: parse_timestamp("timestamp", &f[3])?,
    })
  }
}

/// Number of test methods per test class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassTestCount {
  pub class_name: String,
  pub tests: i64,
}

impl Projection for ClassTestCount {
  const KIND: SchemaKind = SchemaKind::ClassTestCount;

  fn from_fields(f: &[String]) -> Result<Self> {
    Ok(Self {
      class_name: f[0].clone(),
      tests: parse_int("tests", &f[1])?,
    })
  }
}

/// Any projected record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
  TestEntry(TestEntry),
  TestResult(TestResult),
  TestSuite(TestSuite),
  TestHistory(TestHistory),
  Folder(FolderEvent),
  ClassTestCount(ClassTestCount),
}

/// Project a raw row according to `kind`.
pub fn project(kind: SchemaKind, row: &[String]) -> Result<Record> {
  Ok(match kind {
    SchemaKind::TestEntry => Record::TestEntry(TestEntry::project(row)?),
    SchemaKind::TestResult => Record::TestResult(TestResult::project(row)?),
    SchemaKind::TestSuite => Record::TestSuite(TestSuite::project(row)?),
    SchemaKind::TestHistory => Record::TestHistory(TestHistory::project(row)?),
    SchemaKind::Folder => Record::Folder(FolderEvent::project(row)?),
    SchemaKind::ClassTestCount => Record::ClassTestCount(ClassTestCount::project(row)?),
  })
}

/// `testsRun - (errors + failures + skipped)`. Counts whose arithmetic
/// overflows are an [`Error::InvalidField`].
pub fn passing(tests_run: i64, errors: i64, failures: i64, skipped: i64) -> Result<i64> {
  errors
    .checked_add(failures)
    .and_then(|n| n.checked_add(skipped))
    .and_then(|n| tests_run.checked_sub(n))
    .ok_or_else(|| {
      let counts = format!("{} - ({} + {} + {})", tests_run, errors, failures, skipped);
      Error::invalid_field("passing", &counts)
    })
}

/// Percentage of non-failing tests, with the failing share rounded to two
/// decimals first. `None` when no tests ran.
pub fn pass_rate(tests_run: i64, errors: i64, failures: i64) -> Option<f64> {
  if tests_run == 0 {
    return None;
  }
  let non_passing = (errors as f64 + failures as f64) / tests_run as f64 * 100.0;
  Some(100.0 - round2(non_passing))
}

pub fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

pub(crate) fn parse_int(field: &'static str, value: &str) -> Result<i64> {
  value
    .trim()
    .parse::<i64>()
    .map_err(|_| Error::invalid_field(field, value))
}

pub(crate) fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
    .map(|t| t.and_utc())
    .map_err(|_| Error::invalid_field(field, value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Datelike, Timelike};

  fn row(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
  }

  fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
  }

  #[test]
  fn test_project_test_result() {
    let raw = row(&[
      "13921", "uuid-x", "org.Foo", "m", "0.374", "10", "2", "1", "0", "1986-12-26 09:29:29.848",
    ]);
    let result = TestResult::project(&raw).unwrap();

    assert_eq!(result.id, 13921);
    assert_eq!(result.time, "0.374");
    assert_eq!(result.tests_run, 10);
    assert_eq!(result.errors, 2);
    assert_eq!(result.failures, 1);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.passing, 7);
    assert_close(result.pass_rate.unwrap(), 70.0);

    assert_eq!(result.timestamp.year(), 1986);
    assert_eq!(result.timestamp.hour(), 9);
    assert_eq!(result.timestamp.timestamp_subsec_millis(), 848);
  }

  #[test]
  fn test_project_test_suite() {
    let raw = row(&[
      "42",
      "7d0c",
      "org.jua",
      "ImporterTest",
      "1.5",
      "/reports",
      "TEST-ImporterTest.xml",
      "30",
      "2",
      "1",
      "3",
      "2014-10-05 11:23:45.1",
    ]);
    let suite = TestSuite::project(&raw).unwrap();

    assert_eq!(suite.id, 42);
    assert_eq!(suite.package_name, "org.jua");
    assert_eq!(suite.file, "TEST-ImporterTest.xml");
    assert_eq!(suite.failures, 2);
    assert_eq!(suite.errors, 1);
    assert_eq!(suite.skipped, 3);
    assert_eq!(suite.passing, 24);
    assert_close(suite.pass_rate.unwrap(), 90.0);
    assert!(suite.has_failures());
    assert_close(suite.time_seconds().unwrap(), 1.5);
  }

  #[test]
  fn test_project_test_entry() {
    let raw = row(&[
      "7", "u", "org.Foo", "testBar", "0.01", "FAIL", "AssertionError", "expected 1", "at org.Foo",
    ]);
    let entry = TestEntry::project(&raw).unwrap();

    assert_eq!(entry.id, 7);
    assert_eq!(entry.status, TestStatus::Fail);
    assert_eq!(entry.qualified_name(), "org.Foo.testBar");
    assert_eq!(entry.exception, "AssertionError");
  }

  #[test]
  fn test_project_history_and_counts() {
    let history = TestHistory::project(&row(&["3", "PASS", "12", "2014-01-02 03:04:05.000"])).unwrap();
    assert!(history.status.is_pass());
    assert_eq!(history.suite_id, 12);

    let count = ClassTestCount::project(&row(&["org.Foo", "17"])).unwrap();
    assert_eq!(count.tests, 17);
  }

  #[test]
  fn test_width_mismatch() {
    match TestSuite::project(&row(&["1", "2"])) {
      Err(Error::SchemaMismatch {
        schema,
        expected,
        actual,
      }) => {
        assert_eq!(schema, "test-suite");
        assert_eq!(expected, 12);
        assert_eq!(actual, 2);
      }
      other => panic!("Expected schema mismatch, got {:?}", other),
    }
  }

  #[test]
  fn test_invalid_fields() {
    let bad_id = row(&["x", "PASS", "12", "2014-01-02 03:04:05.000"]);
    assert!(matches!(
      TestHistory::project(&bad_id),
      Err(Error::InvalidField { field: "id", .. })
    ));

    let bad_time = row(&["1", "PASS", "12", "yesterday"]);
    assert!(matches!(
      TestHistory::project(&bad_time),
      Err(Error::InvalidField { field: "timestamp", .. })
    ));
  }

  #[test]
  fn test_pass_rate_without_tests() {
    assert_eq!(pass_rate(0, 0, 0), None);
    assert_eq!(passing(0, 0, 0, 0).unwrap(), 0);
  }

  #[test]
  fn test_overflowing_counts_are_invalid() {
    let raw = row(&[
      "1", "u", "c", "m", "0.1", "10", "9223372036854775807", "1", "0", "1986-12-26 09:29:29.848",
    ]);
    assert!(matches!(
      TestResult::project(&raw),
      Err(Error::InvalidField { field: "passing", .. })
    ));

    assert!(passing(i64::MIN, 0, 0, 1).is_err());
    assert!(pass_rate(1, i64::MAX, i64::MAX).is_some());
  }

  #[test]
  fn test_pass_rate_rounds_failing_share() {
    // 1 of 3 failing is 33.333..%, rounded to 33.33
    assert_close(pass_rate(3, 0, 1).unwrap(), 100.0 - 33.33);
    assert_close(pass_rate(10, 0, 0).unwrap(), 100.0);
  }

  #[test]
  fn test_dynamic_project() {
    let record = project(SchemaKind::ClassTestCount, &row(&["org.Foo", "4"])).unwrap();
    assert!(matches!(record, Record::ClassTestCount(ClassTestCount { tests: 4, .. })));

    let err = project(SchemaKind::TestEntry, &row(&["1"])).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { expected: 9, .. }));
  }
}
