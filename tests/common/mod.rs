//! Shared test infrastructure for integration tests.
//!
//! A `Workarea` is a throwaway workarea + build directory pair with a fake
//! simulator script standing in for the real one.

use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary workarea wired to a fake simulator.
pub struct Workarea {
    _root: TempDir,
    pub workarea: PathBuf,
    pub build_dir: PathBuf,
    pub simulator: PathBuf,
}

/// Result of one `simrun` invocation.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// Parse stdout as the `--json` verdict record.
    pub fn verdict(&self) -> Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }
}

impl Workarea {
    /// Create a workarea whose simulator runs `script` under `/bin/sh`.
    pub fn with_simulator(script: &str) -> Self {
        let root = TempDir::new().expect("tempdir");
        let workarea = root.path().join("workarea");
        let build_dir = root.path().join("build");
        fs::create_dir_all(&workarea).expect("create workarea");
        fs::create_dir_all(build_dir.join("xsim.dir/tb_top_snapshot")).expect("create snapshot");
        fs::write(
            build_dir.join("xsim.dir/tb_top_snapshot/xsimk"),
            b"snapshot kernel",
        )
        .expect("write snapshot kernel");

        let simulator = workarea.join("fake-xsim.sh");
        write_script(&simulator, script);
        let config = serde_json::json!({ "simulator": simulator.display().to_string() });
        fs::write(
            workarea.join("simrun.json"),
            serde_json::to_vec_pretty(&config).expect("serialize config"),
        )
        .expect("write simrun.json");

        Self {
            _root: root,
            workarea,
            build_dir,
            simulator,
        }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.workarea.join("runs")
    }

    /// Run `simrun` with WORKAREA/WORKDIR pointing at this fixture.
    pub fn run(&self, args: &[&str]) -> RunResult {
        let output = Command::new(env!("CARGO_BIN_EXE_simrun"))
            .args(args)
            .env("WORKAREA", &self.workarea)
            .env("WORKDIR", &self.build_dir)
            .env_remove("RUST_LOG")
            .output()
            .expect("spawn simrun");
        RunResult::from_output(output)
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}
