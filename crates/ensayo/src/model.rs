//! Core data model: discovered functions, roles and verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One function found by introspecting a binary.
///
/// Immutable once discovered. A finished [`TestTree`](crate::TestTree) holds
/// each `FunctionRef` in exactly one node slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Symbol name
    pub name: String,
    /// Path of the defining compile unit (empty when unknown)
    #[serde(default)]
    pub compile_unit: PathBuf,
    /// Entry address as reported by the introspection provider
    #[serde(default)]
    pub address: u64,
    /// Definition line, when debug info provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl FunctionRef {
    /// Create a function reference
    #[must_use]
    pub fn new(name: impl Into<String>, compile_unit: impl Into<PathBuf>, address: u64) -> Self {
        Self {
            name: name.into(),
            compile_unit: compile_unit.into(),
            address,
            line: None,
        }
    }

    /// Set the definition line
    #[must_use]
    pub const fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Defining compile unit
    #[must_use]
    pub fn unit(&self) -> &Path {
        &self.compile_unit
    }

    /// `unit:name` location string used in diagnostics
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}", self.compile_unit.display(), self.name)
    }
}

/// Role a function plays in the test tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Setup fixture
    Before,
    /// Test body
    Test,
    /// Teardown fixture
    After,
}

impl Role {
    /// All roles, in slot order
    pub const ALL: [Self; 3] = [Self::Before, Self::Test, Self::After];

    /// Slot index inside a node's function table
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Before => 0,
            Self::Test => 1,
            Self::After => 2,
        }
    }

    /// Lower-case name used in text output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Test => "test",
            Self::After => "after",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one test node.
///
/// Ordered by severity: merging two verdicts keeps the worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Verdict {
    /// No result assigned yet
    #[default]
    Unknown,
    /// Test passed
    Pass,
    /// Test skipped because of environment or fixture conditions
    NotApplicable,
    /// Test failed
    Fail,
}

impl Verdict {
    /// Merge two verdicts, keeping the more severe
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Check if this verdict counts as a failure
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Text label used in result lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "???",
            Self::Pass => "PASS",
            Self::NotApplicable => "N/A",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
