//! Decide whether to re-execute the test program under a memory checker.
//!
//! The decision is a pure function of the policy, an injected
//! [`Environment`] and the argument vector, so it can be tested without
//! touching the real process.

use crate::isolate::{MEMCHECK_EXIT_CODE, WORKER_ENV};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Set in the relaunched process so it does not relaunch again
pub const UNDER_TOOL_ENV: &str = "ENSAYO_UNDER_TOOL";

/// What the process can see of its surroundings
pub trait Environment {
    /// Value of an environment variable
    fn var(&self, key: &str) -> Option<String>;
    /// Whether a program exists at `path`
    fn program_exists(&self, path: &Path) -> bool;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn program_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Map-backed environment
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
    programs: Vec<PathBuf>,
}

impl MapEnvironment {
    /// Empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Add an existing program
    #[must_use]
    pub fn with_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.programs.push(path.into());
        self
    }
}

impl Environment for MapEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn program_exists(&self, path: &Path) -> bool {
        self.programs.iter().any(|p| p == path)
    }
}

/// Relaunch policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaunchPolicy {
    /// Relaunch at all
    #[serde(default)]
    pub enabled: bool,
    /// Tool program
    #[serde(default = "default_tool")]
    pub tool: PathBuf,
    /// Arguments placed before the original argv
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,
}

fn default_tool() -> PathBuf {
    PathBuf::from("/usr/bin/valgrind")
}

fn default_tool_args() -> Vec<String> {
    vec![
        "-q".to_string(),
        "--tool=memcheck".to_string(),
        "--trace-children=yes".to_string(),
        format!("--error-exitcode={MEMCHECK_EXIT_CODE}"),
    ]
}

impl Default for RelaunchPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            tool: default_tool(),
            tool_args: default_tool_args(),
        }
    }
}

impl RelaunchPolicy {
    /// Memcheck policy, enabled
    #[must_use]
    pub fn memcheck() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Command to exec instead of continuing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchCommand {
    /// Program to run
    pub program: PathBuf,
    /// Full argument list
    pub args: Vec<String>,
    /// Variables to add to the environment
    pub env: Vec<(String, String)>,
}

/// Why the process continues as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedReason {
    /// Relaunching is off
    Disabled,
    /// Already running under the tool
    AlreadyUnderTool,
    /// Running as a worker; the controller decides for it
    Worker,
    /// The tool is not installed
    ToolMissing,
}

/// Outcome of [`decide`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelaunchDecision {
    /// Keep running in this process
    Proceed(ProceedReason),
    /// Exec this command and exit with its status
    Relaunch(RelaunchCommand),
}

/// Decide whether the current process should relaunch itself
#[must_use]
pub fn decide(policy: &RelaunchPolicy, env: &dyn Environment, argv: &[String]) -> RelaunchDecision {
    if !policy.enabled {
        return RelaunchDecision::Proceed(ProceedReason::Disabled);
    }
    if env.var(UNDER_TOOL_ENV).is_some() {
        return RelaunchDecision::Proceed(ProceedReason::AlreadyUnderTool);
    }
    if env.var(WORKER_ENV).is_some() {
        return RelaunchDecision::Proceed(ProceedReason::Worker);
    }
    if !env.program_exists(&policy.tool) {
        tracing::warn!(tool = %policy.tool.display(), "memory checker not found, running without it");
        return RelaunchDecision::Proceed(ProceedReason::ToolMissing);
    }
    let mut args = policy.tool_args.clone();
    args.extend(argv.iter().cloned());
    RelaunchDecision::Relaunch(RelaunchCommand {
        program: policy.tool.clone(),
        args,
        env: vec![(UNDER_TOOL_ENV.to_string(), "1".to_string())],
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn argv() -> Vec<String> {
        vec!["/tmp/suite".to_string(), "-j".to_string(), "2".to_string()]
    }

    fn with_valgrind() -> MapEnvironment {
        MapEnvironment::new().with_program("/usr/bin/valgrind")
    }

    #[test]
    fn test_disabled_by_default() {
        assert_eq!(
            decide(&RelaunchPolicy::default(), &with_valgrind(), &argv()),
            RelaunchDecision::Proceed(ProceedReason::Disabled)
        );
    }

    #[test]
    fn test_relaunch_command() {
        let RelaunchDecision::Relaunch(cmd) = decide(&RelaunchPolicy::memcheck(), &with_valgrind(), &argv()) else {
            panic!("expected relaunch");
        };
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/valgrind"));
        assert_eq!(
            cmd.args,
            vec![
                "-q",
                "--tool=memcheck",
                "--trace-children=yes",
                "--error-exitcode=97",
                "/tmp/suite",
                "-j",
                "2"
            ]
        );
        assert_eq!(cmd.env, vec![(UNDER_TOOL_ENV.to_string(), "1".to_string())]);
    }

    #[test]
    fn test_no_second_relaunch() {
        let env = with_valgrind().with_var(UNDER_TOOL_ENV, "1");
        assert_eq!(
            decide(&RelaunchPolicy::memcheck(), &env, &argv()),
            RelaunchDecision::Proceed(ProceedReason::AlreadyUnderTool)
        );
    }

    #[test]
    fn test_workers_never_relaunch() {
        let env = with_valgrind().with_var(WORKER_ENV, "suite.one");
        assert_eq!(
            decide(&RelaunchPolicy::memcheck(), &env, &argv()),
            RelaunchDecision::Proceed(ProceedReason::Worker)
        );
    }

    #[test]
    fn test_missing_tool() {
        assert_eq!(
            decide(&RelaunchPolicy::memcheck(), &MapEnvironment::new(), &argv()),
            RelaunchDecision::Proceed(ProceedReason::ToolMissing)
        );
    }

    #[test]
    fn test_policy_yaml_defaults() {
        let policy: RelaunchPolicy = serde_yaml_ng::from_str("enabled: true").unwrap();
        assert_eq!(policy, RelaunchPolicy::memcheck());
    }
}
