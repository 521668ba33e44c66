//! Immutable description of a single run.
use anyhow::{anyhow, Result};
use rand::Rng;

/// Inputs for one test run. The seed is fixed once the request exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    test_name: String,
    seed: u32,
    verbosity: String,
    plusargs: Vec<String>,
    pub echo: bool,
    pub highlight: bool,
}

impl RunRequest {
    /// Build a request, drawing a random seed when none is supplied.
    pub fn new(
        test_name: &str,
        seed: Option<u32>,
        verbosity: &str,
        plusargs: Vec<String>,
    ) -> Result<Self> {
        if test_name.trim().is_empty() {
            return Err(anyhow!("test name must not be empty"));
        }
        if test_name.trim() != test_name {
            return Err(anyhow!(
                "test name {test_name:?} must not have surrounding whitespace"
            ));
        }
        if test_name.contains('/') || test_name.contains('\\') {
            return Err(anyhow!("test name {test_name:?} must not contain a path separator"));
        }
        if verbosity.trim().is_empty() {
            return Err(anyhow!("verbosity must not be empty"));
        }
        if let Some(arg) = plusargs.iter().find(|arg| arg.trim().is_empty()) {
            return Err(anyhow!("plusargs must not contain empty entries ({arg:?})"));
        }
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        Ok(Self {
            test_name: test_name.to_string(),
            seed,
            verbosity: verbosity.to_string(),
            plusargs,
            echo: true,
            highlight: true,
        })
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn verbosity(&self) -> &str {
        &self.verbosity
    }

    /// Extra arguments in the order the caller supplied them.
    pub fn plusargs(&self) -> &[String] {
        &self.plusargs
    }
}
