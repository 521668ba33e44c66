//! CLI argument parsing for a single test run.
//!
//! The CLI only gathers inputs; path defaults that depend on the environment
//! are resolved in `config` so the core never reads ambient state.
use clap::Parser;
use std::path::PathBuf;

/// Default UVM verbosity passed through to the simulator.
pub const DEFAULT_VERBOSITY: &str = "UVM_LOW";

/// Root CLI entrypoint: run one named test and report its verdict.
#[derive(Parser, Debug)]
#[command(
    name = "simrun",
    version,
    about = "Run a UVM test in an isolated run directory and classify its outcome",
    after_help = "Environment:\n  WORKAREA  Workarea root (batch script, waveform configs, simrun.json)\n  WORKDIR   Build directory holding the elaborated snapshot\n\nExamples:\n  simrun smoke_test\n  simrun smoke_test --seed 1234 --plusargs NUM_TXNS=50 FAST\n  simrun smoke_test --json"
)]
pub struct RunArgs {
    /// UVM test to run
    pub test_name: String,

    /// Base run directory (defaults to $WORKAREA/runs)
    #[arg(long, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// Build directory holding the simulation snapshot (defaults to $WORKDIR)
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Workarea root (defaults to $WORKAREA)
    #[arg(long, value_name = "DIR")]
    pub workarea: Option<PathBuf>,

    /// Simulation seed (random when omitted)
    #[arg(long)]
    pub seed: Option<u32>,

    /// UVM_VERBOSITY level
    #[arg(long, default_value = DEFAULT_VERBOSITY)]
    pub uvm_verbosity: String,

    /// Don't echo simulator output to stdout
    #[arg(long = "no-print")]
    pub no_print_stdout: bool,

    /// Don't highlight keywords in echoed output
    #[arg(long)]
    pub no_highlight: bool,

    /// Kill the simulator after this many seconds (overrides simrun.json)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Plusargs passed to the simulator as --testplusarg
    #[arg(long, num_args = 1.., value_name = "ARG")]
    pub plusargs: Vec<String>,

    /// Emit the verdict as JSON (implies --no-print)
    #[arg(long)]
    pub json: bool,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Whether simulator output is echoed. A JSON verdict owns stdout.
    pub fn echo_enabled(&self) -> bool {
        !self.no_print_stdout && !self.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plusargs_take_multiple_values_in_order() {
        let args = RunArgs::try_parse_from([
            "simrun",
            "smoke",
            "--plusargs",
            "B=2",
            "A=1",
            "FAST",
            "--seed",
            "7",
        ])
        .expect("parse args");
        assert_eq!(args.test_name, "smoke");
        assert_eq!(args.plusargs, vec!["B=2", "A=1", "FAST"]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.uvm_verbosity, DEFAULT_VERBOSITY);
        assert!(!args.no_print_stdout);
        assert!(!args.no_highlight);
    }

    #[test]
    fn json_turns_off_echo() {
        let args = RunArgs::try_parse_from(["simrun", "smoke"]).expect("parse args");
        assert!(args.echo_enabled());
        let args = RunArgs::try_parse_from(["simrun", "smoke", "--json"]).expect("parse args");
        assert!(!args.echo_enabled());
        let args = RunArgs::try_parse_from(["simrun", "smoke", "--no-print"]).expect("parse args");
        assert!(!args.echo_enabled());
    }

    #[test]
    fn timeout_must_be_positive() {
        assert!(RunArgs::try_parse_from(["simrun", "smoke", "--timeout-secs", "0"]).is_err());
        let args = RunArgs::try_parse_from(["simrun", "smoke", "--timeout-secs", "5"])
            .expect("parse args");
        assert_eq!(args.timeout_secs, Some(5));
    }

    #[test]
    fn seed_must_fit_in_u32() {
        let err = RunArgs::try_parse_from(["simrun", "smoke", "--seed", "4294967296"]);
        assert!(err.is_err());
    }
}
