//! Human-readable run report.
//!
//! Progress and the summary go to the `out` writer (stdout in the binary);
//! failure details go to the `err` writer (stderr), each failure exactly
//! once. Upstream response bodies are shortened and have the API key
//! redacted before they are printed.

use crate::harness::{Outcome, RunSummary, TestResult};
use crate::utils::logging::{preview, redact};
use colored::{Color, Colorize};
use std::io::Write;
use std::sync::{Arc, Mutex};

const BODY_PREVIEW_CHARS: usize = 500;

/// Cloneable line writer shared by the reporter and the checks, so check
/// output lands in the same stream, in order, as the report around it
#[derive(Clone)]
pub struct OutputHandle {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle").finish_non_exhaustive()
    }
}

impl OutputHandle {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Writes `text` followed by a newline
    pub fn line(&self, text: impl AsRef<str>) {
        let mut writer = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        // A closed stdout must not turn into a test failure
        if let Err(e) = writeln!(writer, "{}", text.as_ref()) {
            tracing::debug!("report write failed: {}", e);
        }
    }

    fn flush(&self) {
        let mut writer = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let _ = writer.flush();
    }
}

pub struct Reporter {
    out: OutputHandle,
    err: Box<dyn Write + Send>,
    color: bool,
    secret: Option<String>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("color", &self.color)
            .field("redacts_secret", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>, color: bool) -> Self {
        Self {
            out: OutputHandle::new(out),
            err,
            color,
            secret: None,
        }
    }

    /// Reporter writing to the process stdout and stderr
    pub fn stdio(color: bool) -> Self {
        Self::new(
            Box::new(std::io::stdout()),
            Box::new(std::io::stderr()),
            color,
        )
    }

    /// Masks `secret` wherever it shows up in printed response bodies
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = (!secret.is_empty()).then_some(secret);
        self
    }

    /// Handle onto the progress stream, for check bodies to print into
    pub fn output(&self) -> OutputHandle {
        self.out.clone()
    }

    pub fn header(&mut self, name: &str) {
        let title = self.paint(&format!("🧪 {}", name), Color::BrightCyan);
        self.line_out(String::new());
        self.line_out(title);
        self.line_out("-".repeat(50));
    }

    pub fn result(&mut self, result: &TestResult) {
        let secs = result.duration.as_secs_f64();
        match &result.outcome {
            Outcome::Passed => {
                let line = self.paint(
                    &format!("✅ {} passed ({:.2}s)", result.name, secs),
                    Color::BrightGreen,
                );
                self.line_out(line);
            }
            Outcome::Skipped(reason) => {
                let line = self.paint(
                    &format!("⏭️  {} skipped: {}", result.name, reason),
                    Color::BrightYellow,
                );
                self.line_out(line);
            }
            Outcome::Failed(report) => {
                let line = self.paint(
                    &format!("❌ {} failed ({:.2}s)", result.name, secs),
                    Color::BrightRed,
                );
                self.line_out(line);

                let label = self.paint("Error:", Color::BrightRed);
                self.line_err(format!("{} {}", label, report.message));
                if let Some(cause) = &report.cause {
                    self.line_err(format!("  Caused by: {}", cause));
                }
                if let Some(status) = report.status {
                    self.line_err(format!("  HTTP status: {}", status));
                }
                if let Some(body) = &report.body {
                    let body = match &self.secret {
                        Some(secret) => redact(body, secret),
                        None => body.clone(),
                    };
                    self.line_err(format!(
                        "  Response body: {}",
                        preview(&body, BODY_PREVIEW_CHARS)
                    ));
                }
            }
        }
    }

    pub fn summary(&mut self, summary: &RunSummary) {
        self.line_out(String::new());
        let title = self.paint("📊 Summary", Color::BrightCyan);
        self.line_out(title);
        self.line_out("=".repeat(50));

        for result in &summary.results {
            let glyph = match result.outcome {
                Outcome::Passed => "✅",
                Outcome::Failed(_) => "❌",
                Outcome::Skipped(_) => "⏭️ ",
            };
            self.line_out(format!("{} {}", glyph, result.name));
        }

        self.line_out(String::new());
        let color = if summary.all_passed() {
            Color::BrightGreen
        } else {
            Color::BrightRed
        };
        let line = self.paint(&summary.summary_line(), color);
        self.line_out(line);
        self.flush();
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.color(color).bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn line_out(&mut self, line: String) {
        self.out.line(line);
    }

    fn line_err(&mut self, line: String) {
        if let Err(e) = writeln!(self.err, "{}", line) {
            tracing::debug!("report write failed: {}", e);
        }
    }

    fn flush(&mut self) {
        self.out.flush();
        let _ = self.err.flush();
    }
}

/// Cloneable in-memory writer for capturing a report
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut bytes = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReport;
    use std::time::Duration;

    fn capture() -> (Reporter, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let reporter = Reporter::new(Box::new(out.clone()), Box::new(err.clone()), false);
        (reporter, out, err)
    }

    fn failed(report: FailureReport) -> TestResult {
        TestResult {
            name: "chat".to_string(),
            outcome: Outcome::Failed(report),
            duration: Duration::from_millis(1200),
        }
    }

    #[test]
    fn test_failure_details_go_to_stderr_once() {
        let (mut reporter, out, err) = capture();
        reporter.result(&failed(FailureReport {
            message: "chat request failed".to_string(),
            cause: Some("foundry-v1 returned HTTP 401".to_string()),
            status: Some(401),
            body: Some("invalid key".to_string()),
        }));

        let out = out.contents();
        let err = err.contents();
        assert!(out.contains("❌ chat failed (1.20s)"));
        assert!(!out.contains("chat request failed"));
        assert_eq!(err.matches("chat request failed").count(), 1);
        assert!(err.contains("Caused by: foundry-v1 returned HTTP 401"));
        assert!(err.contains("HTTP status: 401"));
        assert!(err.contains("Response body: invalid key"));
    }

    #[test]
    fn test_body_is_redacted_and_truncated() {
        let (reporter, _, err) = capture();
        let mut reporter = reporter.with_secret("sk-secret-value-1234");
        let body = format!("key sk-secret-value-1234 rejected {}", "x".repeat(600));
        reporter.result(&failed(FailureReport {
            body: Some(body),
            ..FailureReport::message("denied")
        }));

        let err = err.contents();
        assert!(!err.contains("sk-secret-value-1234"));
        assert!(err.contains("..."));
    }

    #[test]
    fn test_summary_lines() {
        let (mut reporter, out, _) = capture();
        let summary = RunSummary {
            results: vec![
                TestResult {
                    name: "basic-generation".to_string(),
                    outcome: Outcome::Passed,
                    duration: Duration::ZERO,
                },
                TestResult {
                    name: "video-generation".to_string(),
                    outcome: Outcome::Skipped("video_model not set".to_string()),
                    duration: Duration::ZERO,
                },
            ],
        };
        reporter.summary(&summary);

        let out = out.contents();
        assert!(out.contains("📊 Summary"));
        assert!(out.contains("✅ basic-generation"));
        assert!(out.contains("video-generation"));
        assert!(out.contains("1/2 tests passed (1 skipped)"));
    }

    #[test]
    fn test_output_handle_shares_the_progress_stream() {
        let (mut reporter, out, _) = capture();
        let output = reporter.output();
        reporter.header("streaming");
        output.line("✅ Streamed 2 fragment(s)");
        reporter.result(&TestResult {
            name: "streaming".to_string(),
            outcome: Outcome::Passed,
            duration: Duration::ZERO,
        });

        let out = out.contents();
        let header = out.find("🧪 streaming").unwrap();
        let body = out.find("Streamed 2 fragment(s)").unwrap();
        let verdict = out.find("✅ streaming passed").unwrap();
        assert!(header < body && body < verdict);
    }

    #[test]
    fn test_header_contains_name() {
        let (mut reporter, out, _) = capture();
        reporter.header("streaming");
        assert!(out.contents().contains("🧪 streaming"));
    }
}
