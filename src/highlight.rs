//! Keyword highlighting for echoed simulator output.
//!
//! Only the console copy is coloured; the log file always receives the
//! simulator's bytes unchanged.
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::borrow::Cow;

const CYAN: &str = "\x1b[01;96m";
const GREEN: &str = "\x1b[01;92m";
const YELLOW: &str = "\x1b[01;93m";
const RED: &str = "\x1b[01;91m";
const RESET: &str = "\x1b[0m";

// Longer alternatives come first so `UVM_ERROR` is coloured once, not split
// into a `UVM_` prefix and an `ERROR` match.
const KEYWORDS: &str = r"(?P<info>(?i:uvm_info))|(?P<warning>(?i:uvm_warning))|(?P<error>(?i:uvm_error|uvm_fatal|error))|(?P<passed>(?:TEST\s+)?PASSED)|(?P<failed>(?:TEST\s+)?FAILED)";

/// Wraps UVM severities and pass/fail banners in ANSI colour codes.
#[derive(Debug, Clone)]
pub struct Highlighter {
    keywords: Regex,
}

impl Highlighter {
    pub fn new() -> Result<Self> {
        let keywords = Regex::new(KEYWORDS).context("compile highlight keywords")?;
        Ok(Self { keywords })
    }

    pub fn highlight<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.keywords.replace_all(line, |caps: &Captures<'_>| {
            let color = if caps.name("info").is_some() {
                CYAN
            } else if caps.name("warning").is_some() {
                YELLOW
            } else if caps.name("passed").is_some() {
                GREEN
            } else {
                RED
            };
            format!("{color}{}{RESET}", &caps[0])
        })
    }
}
