//! Simulator command construction.
use crate::config::RunnerConfig;
use crate::request::RunRequest;
use anyhow::Result;

const TEST_PLUSARG_FLAG: &str = "--testplusarg";

/// Program and arguments used to launch the simulator for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Build the simulator command for `request`.
    ///
    /// Plusargs are passed in the order given, each as its own
    /// `--testplusarg`, after the test name and verbosity.
    pub fn build(config: &RunnerConfig, request: &RunRequest) -> Result<Self> {
        let mut argv = config.simulator_argv()?.into_iter();
        let program = argv.next().unwrap_or_default();
        let mut args: Vec<String> = argv.collect();

        args.push(config.simulator.top_entity.clone());
        args.push("--tclbatch".to_string());
        args.push(config.batch_script_path().display().to_string());
        args.push("--sv_seed".to_string());
        args.push(request.seed().to_string());
        args.push(TEST_PLUSARG_FLAG.to_string());
        args.push(format!("UVM_TESTNAME={}", request.test_name()));
        args.push(TEST_PLUSARG_FLAG.to_string());
        args.push(format!("UVM_VERBOSITY={}", request.verbosity()));
        for plusarg in request.plusargs() {
            args.push(TEST_PLUSARG_FLAG.to_string());
            args.push(plusarg.clone());
        }

        Ok(Self { program, args })
    }

    /// The command as recorded in the log: all parts joined by single spaces.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}
