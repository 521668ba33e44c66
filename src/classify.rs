//! Outcome classification from a captured simulator log.
//!
//! The log is scanned once, line by line, tracking four signals: failure
//! markers (UVM errors/fatals and assertion failures), a timeout marker, and
//! the explicit pass/fail banners. A timeout wins outright; otherwise a run
//! passes only with a pass banner, no fail banner, and zero failure markers.
use crate::runner::RUN_COMMAND_PREFIX;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictCode {
    Pass,
    Fail,
    Timeout,
}

impl VerdictCode {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictCode::Pass => "PASS",
            VerdictCode::Fail => "FAIL",
            VerdictCode::Timeout => "TIMEOUT",
        }
    }

    /// Process exit status surfaced by the CLI.
    pub fn exit_code(self) -> u8 {
        match self {
            VerdictCode::Pass => 0,
            VerdictCode::Fail => 1,
            VerdictCode::Timeout => 2,
        }
    }
}

impl std::fmt::Display for VerdictCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals collected from one pass over a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub failure_markers: u32,
    /// 1-based line number in the log file of the first failure marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure_line: Option<u64>,
    pub timeout_observed: bool,
    pub pass_seen: bool,
    pub fail_seen: bool,
    pub lines_scanned: u64,
}

impl LogSummary {
    pub fn verdict(&self) -> VerdictCode {
        if self.timeout_observed {
            VerdictCode::Timeout
        } else if self.failure_markers == 0 && self.pass_seen && !self.fail_seen {
            VerdictCode::Pass
        } else {
            VerdictCode::Fail
        }
    }
}

/// Compiled marker patterns.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    framework: Regex,
    assertion: Regex,
    timeout: Regex,
    passed: Regex,
    failed: Regex,
}

impl MarkerSet {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).with_context(|| format!("compile marker {pattern:?}"))
        };
        Ok(Self {
            framework: compile(r"(?i)uvm_(?:error|fatal)(\s+)(:)?")?,
            assertion: compile(r"ERROR: Assertion failed.")?,
            timeout: compile(r"PH_TIMEOUT")?,
            passed: compile(r"(?:TEST\s+)?PASSED")?,
            failed: compile(r"(?:TEST\s+)?FAILED")?,
        })
    }

    /// A UVM error or fatal report.
    ///
    /// Report-server summary lines such as `UVM_ERROR :    0` are not
    /// failures: a single whitespace character followed by `:` is excluded.
    fn is_framework_failure(&self, line: &str) -> bool {
        self.framework.captures_iter(line).any(|caps| {
            let spaces = caps.get(1).map_or(0, |m| m.as_str().chars().count());
            spaces >= 2 || caps.get(2).is_none()
        })
    }

    fn observe(&self, line: &str, line_number: u64, summary: &mut LogSummary) {
        let mut hits = 0;
        if self.is_framework_failure(line) {
            hits += 1;
        }
        if self.assertion.is_match(line) {
            hits += 1;
        }
        if hits > 0 {
            summary.failure_markers += hits;
            if summary.first_failure_line.is_none() {
                summary.first_failure_line = Some(line_number);
            }
        }
        if self.timeout.is_match(line) {
            summary.timeout_observed = true;
        }
        if self.passed.is_match(line) {
            summary.pass_seen = true;
        }
        if self.failed.is_match(line) {
            summary.fail_seen = true;
        }
        summary.lines_scanned += 1;
    }

    /// Scan a log stream. The `RUN COMMAND:` record on the first line is
    /// skipped so test names and plusargs cannot trigger markers.
    pub fn scan<R: BufRead>(&self, mut reader: R) -> Result<LogSummary> {
        let mut summary = LogSummary::default();
        let mut raw = Vec::new();
        let mut line_number: u64 = 0;
        loop {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw).context("read log")?;
            if read == 0 {
                break;
            }
            line_number += 1;
            if line_number == 1 && raw.starts_with(RUN_COMMAND_PREFIX.as_bytes()) {
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            self.observe(&line, line_number, &mut summary);
        }
        Ok(summary)
    }
}

/// Classify the log at `path`. A missing log means the runner never ran and
/// is an error rather than a verdict.
pub fn classify_log(path: &Path) -> Result<LogSummary> {
    if !path.is_file() {
        return Err(anyhow!("simulator log not found at {}", path.display()));
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let markers = MarkerSet::new()?;
    let summary = markers
        .scan(BufReader::new(file))
        .with_context(|| format!("scan {}", path.display()))?;
    tracing::debug!(
        log = %path.display(),
        failure_markers = summary.failure_markers,
        timeout = summary.timeout_observed,
        pass = summary.pass_seen,
        fail = summary.fail_seen,
        "log scanned"
    );
    Ok(summary)
}
