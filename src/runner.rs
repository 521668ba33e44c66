//! Simulator execution and output capture.
//!
//! The simulator runs with the run directory as its working directory. Its
//! stdout is read line by line on a dedicated thread and appended verbatim to
//! `output.txt`, optionally echoed to the console. Stderr is inherited.
use crate::config::resolve_program;
use crate::highlight::Highlighter;
use crate::invocation::Invocation;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const LOG_FILE_NAME: &str = "output.txt";
pub const RUN_COMMAND_PREFIX: &str = "RUN COMMAND: ";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bounds on how long the runner waits for the simulator.
///
/// Without a deadline the runner waits for as long as the simulator runs; a
/// hung simulator blocks forever and only its own `PH_TIMEOUT` report ends
/// the run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLimits {
    pub deadline: Option<Duration>,
}

/// Console destination for echoed output.
pub struct EchoSink {
    writer: Box<dyn Write + Send>,
    highlighter: Option<Highlighter>,
}

impl EchoSink {
    pub fn new(writer: Box<dyn Write + Send>, highlight: bool) -> Result<Self> {
        let highlighter = if highlight {
            Some(Highlighter::new()?)
        } else {
            None
        };
        Ok(Self {
            writer,
            highlighter,
        })
    }

    pub fn stdout(highlight: bool) -> Result<Self> {
        Self::new(Box::new(std::io::stdout()), highlight)
    }

    fn echo(&mut self, line: &[u8]) -> std::io::Result<()> {
        match &self.highlighter {
            Some(highlighter) => {
                let text = String::from_utf8_lossy(line);
                self.writer
                    .write_all(highlighter.highlight(&text).as_bytes())?;
            }
            None => self.writer.write_all(line)?,
        }
        self.writer.flush()
    }
}

/// What happened while the simulator ran.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub command_line: String,
    pub log_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub lines_captured: u64,
    pub bytes_captured: u64,
    pub elapsed_ms: u128,
    pub deadline_exceeded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CaptureStats {
    lines: u64,
    bytes: u64,
}

/// Run the simulator in `run_dir` and capture its stdout to `output.txt`.
///
/// Returns once the simulator has exited and its output stream is closed.
pub fn execute(
    run_dir: &Path,
    invocation: &Invocation,
    echo: Option<EchoSink>,
    limits: &ExecutionLimits,
) -> Result<ExecutionReport> {
    let program = resolve_program(&invocation.program)?;
    let command_line = invocation.command_line();

    let log_path = run_dir.join(LOG_FILE_NAME);
    let mut log =
        File::create(&log_path).with_context(|| format!("create {}", log_path.display()))?;
    writeln!(log, "{RUN_COMMAND_PREFIX}{command_line}")
        .with_context(|| format!("write {}", log_path.display()))?;

    let mut command = Command::new(&program);
    command
        .args(&invocation.args)
        .current_dir(run_dir)
        .stdout(Stdio::piped());
    // A deadline kill must reach wrapper children too, and they share the pipe.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if limits.deadline.is_some() {
            command.process_group(0);
        }
    }

    let start = Instant::now();
    let mut child = command
        .spawn()
        .with_context(|| format!("spawn simulator {}", program.display()))?;
    tracing::info!(pid = child.id(), command = %command_line, "simulator started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("simulator stdout was not captured"))?;
    let reader = thread::Builder::new()
        .name("simrun-output".to_string())
        .spawn(move || {
            let mut echo = echo;
            capture_output(BufReader::new(stdout), &mut log, echo.as_mut())
        })
        .context("spawn output reader")?;

    let (status, deadline_exceeded) = wait_for_exit(&mut child, &reader, start, limits)?;
    let stats = reader
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
        .with_context(|| format!("capture simulator output to {}", log_path.display()))?;
    let elapsed_ms = start.elapsed().as_millis();

    if deadline_exceeded {
        tracing::warn!(elapsed_ms, lines = stats.lines, "simulator killed after deadline");
    } else {
        tracing::info!(
            exit_code = ?status.code(),
            elapsed_ms,
            lines = stats.lines,
            "simulator exited"
        );
    }

    Ok(ExecutionReport {
        command_line,
        log_path,
        exit_code: status.code(),
        lines_captured: stats.lines,
        bytes_captured: stats.bytes,
        elapsed_ms,
        deadline_exceeded,
    })
}

/// Wait for the simulator and its output stream, killing its process group
/// once the deadline passes. The flag is true when the run was killed.
///
/// The stream can outlive the simulator when a wrapper leaves children
/// behind, so the deadline covers both.
fn wait_for_exit<T>(
    child: &mut Child,
    reader: &JoinHandle<T>,
    start: Instant,
    limits: &ExecutionLimits,
) -> Result<(ExitStatus, bool)> {
    let Some(deadline) = limits.deadline else {
        let status = child.wait().context("wait for simulator")?;
        return Ok((status, false));
    };
    let mut exited = None;
    loop {
        if exited.is_none() {
            exited = child.try_wait().context("check simulator status")?;
        }
        if let Some(status) = exited {
            if reader.is_finished() {
                return Ok((status, false));
            }
        }
        if start.elapsed() >= deadline {
            kill_simulator(child);
            let status = match exited {
                Some(status) => status,
                None => child.wait().context("wait for killed simulator")?,
            };
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGKILL the simulator's process group, which it leads.
#[cfg(unix)]
fn kill_simulator(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: killpg takes plain integers and only sends a signal.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_simulator(child: &mut Child) {
    let _ = child.kill();
}

/// Copy `reader` to `log` one line at a time, echoing each line if asked.
///
/// Lines are raw bytes, so non-UTF-8 output reaches the log unchanged. An
/// echo failure (closed console, broken pipe) disables echo but never stops
/// the log.
fn capture_output<R: BufRead, W: Write>(
    mut reader: R,
    log: &mut W,
    mut echo: Option<&mut EchoSink>,
) -> Result<CaptureStats> {
    let mut stats = CaptureStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .context("read simulator output")?;
        if read == 0 {
            break;
        }
        log.write_all(&line).context("append to log")?;
        log.flush().context("flush log")?;
        stats.lines += 1;
        stats.bytes += read as u64;

        let echo_failed = match echo.as_deref_mut().map(|sink| sink.echo(&line)) {
            Some(Err(err)) => {
                tracing::warn!(error = %err, "echo disabled");
                true
            }
            _ => false,
        };
        if echo_failed {
            echo = None;
        }
    }
    Ok(stats)
}
