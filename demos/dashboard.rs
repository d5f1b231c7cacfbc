//! Dashboard walkthrough: summary grid, one suite's failures, a method's
//! history and the folder feed.

use jua::dashboard::{self, SummaryRange};
use jua::{CompareSelection, FolderCache, JuaClient, QueryContext, TestEntry, TestHistory, TestSuite};

#[tokio::main]
async fn main() -> jua::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jua=info")),
    )
    .init();

  let addr = std::env::args().nth(1).unwrap_or_else(|| "localhost:9000".to_string());
  let client = JuaClient::parse(&addr)?;
  println!("Dashboard at {}", client.config().query_url());

  // Summary of recent suite runs
  let range = SummaryRange::default();
  let suites: Vec<TestSuite> = client.fetch_all(range.sql()).await?;
  println!("{:<8} {:<40} {:>6} {:>6} {:>6}", "ID", "FILE", "RUN", "FAIL", "RATE");
  for suite in dashboard::latest(&suites, 5) {
    println!(
      "{:<8} {:<40} {:>6} {:>6} {:>6}",
      suite.id,
      suite.file,
      suite.tests_run,
      dashboard::format_count(suite.failures + suite.errors),
      dashboard::format_rate(suite.pass_rate)
    );
  }

  let Some(suite) = suites.iter().find(|s| s.has_failures()) else {
    println!("No failing suites in the last {} runs", range.count());
    return Ok(());
  };

  // Non-passing tests of the first failing suite, read by a late consumer
  let (failures, _handle) = client.fetch::<TestEntry>(dashboard::non_passes_for_suite(suite.id));
  let failures = failures.wait_for_rows(&client.config().arrival_wait).await?;
  for entry in &failures {
    println!("  {} {} {}", entry.status, entry.qualified_name(), entry.message);
  }

  // History of the first failing method, streamed row by row
  if let Some(entry) = failures.first() {
    let history = QueryContext::<TestHistory>::new();
    let mut compare = CompareSelection::new();
    let handle = history.run_streaming(
      client.queries(),
      dashboard::test_history(&entry.class_name, &entry.method_name),
      |run| println!("  {} {} suite {}", run.timestamp, run.status, run.suite_id),
    );
    handle.finished().await?;

    for run in history.rows().into_iter().take(2) {
      compare.toggle(run.suite_id);
    }
    if let Some((left, right)) = compare.pair() {
      println!("Compare suites {} and {}", left, right);
    }
  }

  // Folder indexing status, until interrupted
  let mut cache = FolderCache::new();
  let mut folders = client.subscribe_folders();
  while let Some(event) = folders.next().await {
    let update = cache.apply(event.clone());
    println!("{:?} {} {}", update, cache.relative_path(&event), event.status);
  }

  Ok(())
}
