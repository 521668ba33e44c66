//! End-to-end run: stage, execute, classify.
//!
//! Each stage completes before the next starts; any stage error aborts the
//! run before a verdict exists.
use crate::classify::{classify_log, VerdictCode};
use crate::config::{resolve_program, RunnerConfig};
use crate::invocation::Invocation;
use crate::request::RunRequest;
use crate::runner::{execute, EchoSink, ExecutionLimits, ExecutionReport};
use crate::staging::{run_name, stage_run};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Caller-facing result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub code: VerdictCode,
    pub name: String,
    pub seed: u32,
    pub run_dir: PathBuf,
    pub failure_markers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure_line: Option<u64>,
    pub execution: ExecutionReport,
}

/// Run one test and classify its outcome.
///
/// A run killed at its deadline is a TIMEOUT whatever the log says; otherwise
/// the verdict comes from the log alone.
pub fn run_test(
    config: &RunnerConfig,
    request: &RunRequest,
    limits: &ExecutionLimits,
) -> Result<Verdict> {
    let name = run_name(request.test_name(), request.plusargs());
    let invocation = Invocation::build(config, request)?;
    // Check the simulator before staging so a bad install leaves no run dir.
    resolve_program(&invocation.program)?;

    let staged = stage_run(config, &name, request.seed())?;
    let echo = if request.echo {
        Some(EchoSink::stdout(request.highlight)?)
    } else {
        None
    };
    let report = execute(&staged.path, &invocation, echo, limits)?;
    let summary = classify_log(&report.log_path)?;

    let code = if report.deadline_exceeded {
        VerdictCode::Timeout
    } else {
        summary.verdict()
    };
    tracing::info!(
        run = %name,
        seed = request.seed(),
        %code,
        failure_markers = summary.failure_markers,
        "run classified"
    );

    Ok(Verdict {
        code,
        name,
        seed: request.seed(),
        run_dir: staged.path,
        failure_markers: summary.failure_markers,
        first_failure_line: summary.first_failure_line,
        execution: report,
    })
}
