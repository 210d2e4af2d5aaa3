//! Sequential named test runner.
//!
//! A [`TestSuite`] holds [`TestCase`]s in registration order. The
//! [`Harness`] runs them one at a time, each under its own deadline and a
//! child of the harness [`CancellationToken`]. A failing, panicking,
//! timed-out or cancelled action is recorded as a failure and the run moves
//! on to the next case, so a [`RunSummary`] always holds exactly one
//! [`TestResult`] per registered case.
//!
//! # Example
//!
//! ```no_run
//! use foundry_probe::harness::{Harness, Reporter, TestCase, TestSuite};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut suite = TestSuite::new();
//! suite.register(TestCase::new("always-passes", || async { Ok(()) }))?;
//! suite.register(TestCase::skipped("needs-a-model", "no model configured"))?;
//!
//! let mut harness = Harness::new(Duration::from_secs(30), Reporter::stdio(true));
//! let summary = harness.run_all(suite).await;
//! assert_eq!(summary.total(), 2);
//! # Ok(())
//! # }
//! ```

pub mod reporter;

use crate::error::FailureReport;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use reporter::{OutputHandle, Reporter, SharedBuffer};

/// Deferred test body
pub type TestAction = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    #[error("Test name must not be empty")]
    EmptyName,
    #[error("Duplicate test name: {0}")]
    DuplicateName(String),
}

/// A named test, optionally skipped at registration time
pub struct TestCase {
    name: String,
    action: Option<TestAction>,
    skip_reason: Option<String>,
    timeout: Option<Duration>,
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Some(Box::new(move || action().boxed())),
            skip_reason: None,
            timeout: None,
        }
    }

    /// A case recorded as skipped whose body never runs
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: None,
            skip_reason: Some(reason.into()),
            timeout: None,
        }
    }

    /// Overrides the harness-wide deadline for this case
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("skip_reason", &self.skip_reason)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of uniquely named cases
#[derive(Debug, Default)]
pub struct TestSuite {
    cases: Vec<TestCase>,
    names: HashSet<String>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, case: TestCase) -> Result<(), HarnessError> {
        if case.name.trim().is_empty() {
            return Err(HarnessError::EmptyName);
        }
        if !self.names.insert(case.name.clone()) {
            return Err(HarnessError::DuplicateName(case.name));
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name.as_str()).collect()
    }
}

/// How a single test ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Failed(FailureReport),
    Skipped(String),
}

/// Result of one test, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped(_))
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match &self.outcome {
            Outcome::Failed(report) => Some(report),
            _ => None,
        }
    }
}

/// Aggregate of a full run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.skipped()).count()
    }

    /// Skipped tests count towards the total
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// `"<passed>/<total> tests passed"`, plus the skip count when non-zero
    pub fn summary_line(&self) -> String {
        let mut line = format!("{}/{} tests passed", self.passed(), self.total());
        if self.skipped() > 0 {
            line.push_str(&format!(" ({} skipped)", self.skipped()));
        }
        line
    }

    /// 0 when nothing failed, 1 otherwise; `lenient` always yields 0
    pub fn exit_code(&self, lenient: bool) -> u8 {
        if lenient || self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Runs test cases and reports on them
#[derive(Debug)]
pub struct Harness {
    test_timeout: Duration,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl Harness {
    pub fn new(test_timeout: Duration, reporter: Reporter) -> Self {
        Self {
            test_timeout,
            cancel: CancellationToken::new(),
            reporter,
        }
    }

    /// Uses `token` as the parent of every per-test token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Runs `action` as a one-off test named `name`.
    ///
    /// Failures of the action are recorded in the returned result and
    /// never propagated.
    pub async fn run_test<F, Fut>(&mut self, name: &str, action: F) -> TestResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.run_case(TestCase::new(name, action)).await
    }

    pub async fn run_case(&mut self, case: TestCase) -> TestResult {
        let TestCase {
            name,
            action,
            skip_reason,
            timeout,
        } = case;

        self.reporter.header(&name);
        let start_time = Instant::now();

        let outcome = match (action, skip_reason) {
            (Some(action), None) => {
                tracing::info!("🧪 running {}", name);
                self.execute(action, timeout.unwrap_or(self.test_timeout))
                    .await
            }
            (_, reason) => {
                let reason = reason.unwrap_or_else(|| "no action".to_string());
                tracing::info!("🧪 skipping {}: {}", name, reason);
                Outcome::Skipped(reason)
            }
        };

        let result = TestResult {
            name,
            outcome,
            duration: start_time.elapsed(),
        };
        self.reporter.result(&result);
        result
    }

    /// Runs every case in order without stopping on failure
    pub async fn run_all(&mut self, suite: TestSuite) -> RunSummary {
        let mut summary = RunSummary::default();
        for case in suite.cases {
            let result = self.run_case(case).await;
            summary.results.push(result);
        }
        self.reporter.summary(&summary);
        tracing::info!("📊 {}", summary.summary_line());
        summary
    }

    async fn execute(&self, action: TestAction, timeout: Duration) -> Outcome {
        let token = self.cancel.child_token();

        let future = match std::panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(future) => future,
            Err(panic) => return Outcome::Failed(panic_report(panic)),
        };
        let guarded = AssertUnwindSafe(future).catch_unwind();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!("⛔ test cancelled");
                Outcome::Failed(FailureReport::message("cancelled"))
            }
            finished = tokio::time::timeout(timeout, guarded) => match finished {
                Err(_) => Outcome::Failed(FailureReport::message(format!(
                    "timed out after {}",
                    format_timeout(timeout)
                ))),
                Ok(Err(panic)) => Outcome::Failed(panic_report(panic)),
                Ok(Ok(Err(error))) => Outcome::Failed(FailureReport::from_error(&error)),
                Ok(Ok(Ok(()))) => Outcome::Passed,
            },
        }
    }
}

fn panic_report(panic: Box<dyn Any + Send>) -> FailureReport {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    FailureReport::message(format!("panicked: {}", detail))
}

fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
