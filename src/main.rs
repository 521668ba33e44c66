use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

mod classify;
mod cli;
mod config;
mod highlight;
mod invocation;
mod request;
mod runner;
mod staging;
mod workflow;

use cli::RunArgs;
use config::{PathOverrides, RunnerConfig};
use request::RunRequest;
use runner::ExecutionLimits;
use workflow::{run_test, Verdict};

/// Exit status for runs that never reached a verdict.
const FATAL_EXIT_CODE: u8 = 3;

fn main() -> ExitCode {
    let args = match RunArgs::try_parse() {
        Ok(args) => args,
        // Usage errors would otherwise exit 2, which reads as TIMEOUT.
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::from(FATAL_EXIT_CODE);
        }
        Err(err) => err.exit(),
    };
    init_logging(args.verbose);

    match run(&args) {
        Ok(verdict) => ExitCode::from(verdict.code.exit_code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn run(args: &RunArgs) -> Result<Verdict> {
    let overrides = PathOverrides {
        workarea: args.workarea.clone(),
        run_dir: args.run_dir.clone(),
        build_dir: args.build_dir.clone(),
    };
    let config = RunnerConfig::resolve(&overrides, |key| std::env::var(key).ok())?;

    let mut request = RunRequest::new(
        &args.test_name,
        args.seed,
        &args.uvm_verbosity,
        args.plusargs.clone(),
    )?;
    request.echo = args.echo_enabled();
    request.highlight = !args.no_highlight;

    let limits = ExecutionLimits {
        deadline: args
            .timeout_secs
            .or(config.simulator.timeout_seconds)
            .map(Duration::from_secs),
    };

    let verdict = run_test(&config, &request, &limits)?;
    if args.json {
        let text = serde_json::to_string_pretty(&verdict)?;
        println!("{text}");
    } else {
        println!(
            "Test {} finished with status {} (seed {})",
            verdict.name, verdict.code, verdict.seed
        );
    }
    Ok(verdict)
}

/// Log to stderr so stdout stays reserved for simulator echo and the verdict.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "simrun=debug" } else { "simrun=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
