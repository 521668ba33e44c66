//! Runner configuration.
//!
//! Every location the core touches is resolved here once, from CLI overrides,
//! then environment, then defaults, and passed down explicitly. Simulator
//! settings live in an optional workarea-owned `simrun.json`.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "simrun.json";
pub const WORKAREA_ENV: &str = "WORKAREA";
pub const WORKDIR_ENV: &str = "WORKDIR";

/// Simulator settings loaded from `{workarea}/simrun.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Command used to launch the simulator, split with shell-word rules.
    #[serde(default = "default_simulator")]
    pub simulator: String,
    /// Elaborated top-level snapshot handed to the simulator.
    #[serde(default = "default_top_entity")]
    pub top_entity: String,
    /// Batch-mode script, relative to the workarea unless absolute.
    #[serde(default = "default_batch_script")]
    pub batch_script: String,
    /// Build-directory subtree copied into every run directory.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn default_simulator() -> String {
    "xsim".to_string()
}

fn default_top_entity() -> String {
    "tb_top_snapshot".to_string()
}

fn default_batch_script() -> String {
    "xsim_cfg.tcl".to_string()
}

fn default_snapshot_dir() -> String {
    "xsim.dir".to_string()
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            simulator: default_simulator(),
            top_entity: default_top_entity(),
            batch_script: default_batch_script(),
            snapshot_dir: default_snapshot_dir(),
            timeout_seconds: None,
        }
    }
}

/// Path overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub workarea: Option<PathBuf>,
    pub run_dir: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workarea: PathBuf,
    pub run_dir: PathBuf,
    pub build_dir: PathBuf,
    pub simulator: SimulatorConfig,
}

impl RunnerConfig {
    /// Resolve paths from overrides and an environment lookup, then load the
    /// workarea's simulator config.
    pub fn resolve<F>(overrides: &PathOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let workarea = overrides
            .workarea
            .clone()
            .or_else(|| lookup(WORKAREA_ENV).map(PathBuf::from))
            .ok_or_else(|| anyhow!("workarea not set; pass --workarea or set ${WORKAREA_ENV}"))?;
        let run_dir = overrides
            .run_dir
            .clone()
            .unwrap_or_else(|| workarea.join("runs"));
        let build_dir = overrides
            .build_dir
            .clone()
            .or_else(|| lookup(WORKDIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| workarea.join("build"));
        let simulator = load_simulator_config(&workarea)?;

        Ok(Self {
            workarea,
            run_dir,
            build_dir,
            simulator,
        })
    }

    /// Absolute location of the batch-mode script.
    pub fn batch_script_path(&self) -> PathBuf {
        self.workarea.join(&self.simulator.batch_script)
    }

    /// Simulator command split into program and leading arguments.
    pub fn simulator_argv(&self) -> Result<Vec<String>> {
        let argv = shell_words::split(&self.simulator.simulator)
            .with_context(|| format!("parse simulator command: {}", self.simulator.simulator))?;
        if argv.is_empty() {
            return Err(anyhow!("simulator command is empty"));
        }
        Ok(argv)
    }
}

/// Load `{workarea}/simrun.json`, falling back to defaults when absent.
pub fn load_simulator_config(workarea: &Path) -> Result<SimulatorConfig> {
    let path = workarea.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        return Ok(SimulatorConfig::default());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: SimulatorConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse simulator config {}", path.display()))?;
    validate_simulator_config(&config)?;
    Ok(config)
}

fn validate_simulator_config(config: &SimulatorConfig) -> Result<()> {
    if config.simulator.trim().is_empty() {
        return Err(anyhow!("simulator command must not be empty"));
    }
    if config.top_entity.trim().is_empty() {
        return Err(anyhow!("top_entity must not be empty"));
    }
    if config.snapshot_dir.trim().is_empty() {
        return Err(anyhow!("snapshot_dir must not be empty"));
    }
    if config.timeout_seconds == Some(0) {
        return Err(anyhow!("timeout_seconds must be positive"));
    }
    Ok(())
}

/// Locate the simulator program on `PATH`, or check an explicit path.
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    which::which(program).with_context(|| format!("simulator {program:?} not found"))
}
