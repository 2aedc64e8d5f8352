//! Execution events captured while a test node runs.

use crate::model::{Role, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of captured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Assertion failed inside a test or fixture
    Assert,
    /// Unexpected exit of the execution context
    Exit,
    /// Execution context terminated by a signal
    Signal,
    /// Log line emitted by the code under test
    Log,
    /// A fixture failed
    Fixture,
    /// Test explicitly declared itself passed
    ExpectedPass,
    /// Test explicitly declared itself failed
    ExpectedFail,
    /// Test explicitly declared itself not applicable
    ExpectedNotApplicable,
    /// Memory checker reported errors
    LeakChecker,
    /// An expected log pattern never matched
    StringMatch,
}

impl EventKind {
    /// Tag used in text output
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Assert => "ASSERT",
            Self::Exit => "EXIT",
            Self::Signal => "SIGNAL",
            Self::Log => "LOG",
            Self::Fixture => "FIXTURE",
            Self::ExpectedPass => "EXPASS",
            Self::ExpectedFail => "EXFAIL",
            Self::ExpectedNotApplicable => "EXNA",
            Self::LeakChecker => "MEMCHECK",
            Self::StringMatch => "SLMATCH",
        }
    }

    /// Verdict this kind of event forces on the test, if any
    #[must_use]
    pub const fn verdict(self) -> Option<Verdict> {
        match self {
            Self::Assert
            | Self::Exit
            | Self::Signal
            | Self::Fixture
            | Self::ExpectedFail
            | Self::LeakChecker
            | Self::StringMatch => Some(Verdict::Fail),
            Self::ExpectedPass => Some(Verdict::Pass),
            Self::ExpectedNotApplicable => Some(Verdict::NotApplicable),
            Self::Log => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where an event happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLocation {
    /// Source file
    pub file: Option<String>,
    /// Source line
    pub line: Option<u32>,
    /// Enclosing function
    pub function: Option<String>,
    /// Role of the enclosing function
    pub role: Option<Role>,
}

/// One captured event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind
    pub kind: EventKind,
    /// Human-readable description
    pub description: String,
    /// Source location, when known
    #[serde(default)]
    pub location: EventLocation,
    /// Captured return addresses, innermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<u64>,
}

impl Event {
    /// Create an event without location
    #[must_use]
    pub fn new(kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            location: EventLocation::default(),
            stack: Vec::new(),
        }
    }

    /// Failed assertion
    #[must_use]
    pub fn assert(description: impl Into<String>) -> Self {
        Self::new(EventKind::Assert, description)
    }

    /// Unexpected exit with status code
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self::new(EventKind::Exit, format!("exited with status {code}"))
    }

    /// Termination by signal
    #[must_use]
    pub fn signal(signo: i32) -> Self {
        Self::new(EventKind::Signal, format!("killed by signal {signo}"))
    }

    /// Log line
    #[must_use]
    pub fn log(line: impl Into<String>) -> Self {
        Self::new(EventKind::Log, line)
    }

    /// Fixture failure
    #[must_use]
    pub fn fixture(description: impl Into<String>) -> Self {
        Self::new(EventKind::Fixture, description)
    }

    /// Attach source file and line
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location.file = Some(file.into());
        self.location.line = Some(line);
        self
    }

    /// Attach enclosing function and its role
    #[must_use]
    pub fn in_function(mut self, function: impl Into<String>, role: Role) -> Self {
        self.location.function = Some(function.into());
        self.location.role = Some(role);
        self
    }

    /// Attach a captured stack
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<u64>) -> Self {
        self.stack = stack;
        self
    }

    /// Verdict this event forces, if any
    #[must_use]
    pub const fn verdict(&self) -> Option<Verdict> {
        self.kind.verdict()
    }
}

impl fmt::Display for Event {
    /// `KIND description[ at file:line][ in role function]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.description)?;
        if let (Some(file), Some(line)) = (&self.location.file, self.location.line) {
            if !file.is_empty() && line > 0 {
                write!(f, " at {file}:{line}")?;
            }
        }
        if let Some(function) = &self.location.function {
            if !function.is_empty() {
                match self.location.role {
                    Some(role) => write!(f, " in {role} {function}")?,
                    None => write!(f, " in {function}")?,
                }
            }
        }
        Ok(())
    }
}

/// Fold a sequence of events into a verdict.
///
/// Events that force nothing leave the result untouched; with no forcing
/// event at all the test passed.
#[must_use]
pub fn verdict_from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Verdict {
    let merged = events
        .into_iter()
        .filter_map(Event::verdict)
        .fold(Verdict::Unknown, Verdict::merge);
    if merged == Verdict::Unknown {
        Verdict::Pass
    } else {
        merged
    }
}
