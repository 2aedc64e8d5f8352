//! Listener protocol and the built-in result reporters.
//!
//! Callback order for a run is
//! `begin, (begin_test, add_event*, finished, end_test)*, end`.
//! `begin_test` is delivered when a test is launched, the rest of the
//! test's callbacks arrive together when it completes. With more than one
//! test in flight, several `begin_test` calls may precede the matching
//! `end_test` calls, so every per-test callback carries its [`TestInfo`].

#![allow(clippy::format_push_string)]

use crate::event::Event;
use crate::model::Verdict;
use crate::tree::NodeId;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Identity of a running test
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestInfo {
    /// Tree node
    pub node: NodeId,
    /// Dotted full name
    pub name: String,
}

impl TestInfo {
    /// Create test info
    #[must_use]
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

/// Receives run progress. Every callback defaults to a no-op.
pub trait Listener: Send {
    /// The run started
    fn begin(&mut self) {}
    /// A test was launched
    fn begin_test(&mut self, _test: &TestInfo) {}
    /// An event was captured for a test
    fn add_event(&mut self, _test: &TestInfo, _event: &Event) {}
    /// A test's verdict is known
    fn finished(&mut self, _test: &TestInfo, _verdict: Verdict) {}
    /// A test is complete
    fn end_test(&mut self, _test: &TestInfo) {}
    /// The run is complete
    fn end(&mut self) {}
}

/// Ordered fan-out to registered listeners
#[derive(Default)]
pub struct Listeners {
    inner: Vec<Box<dyn Listener>>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}

impl Listeners {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; it is called after all earlier ones
    pub fn push(&mut self, listener: Box<dyn Listener>) {
        self.inner.push(listener);
    }

    /// Number of listeners
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no listener is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Listener for Listeners {
    fn begin(&mut self) {
        self.inner.iter_mut().for_each(|l| l.begin());
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.inner.iter_mut().for_each(|l| l.begin_test(test));
    }

    fn add_event(&mut self, test: &TestInfo, event: &Event) {
        self.inner.iter_mut().for_each(|l| l.add_event(test, event));
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        self.inner.iter_mut().for_each(|l| l.finished(test, verdict));
    }

    fn end_test(&mut self, test: &TestInfo) {
        self.inner.iter_mut().for_each(|l| l.end_test(test));
    }

    fn end(&mut self) {
        self.inner.iter_mut().for_each(|l| l.end());
    }
}

/// Plain-text reporter, the default when nothing else is attached.
///
/// ```text
/// ensayo: running
/// ensayo: running: "suite.test_one"
/// EVENT ASSERT x == 2 at suite.c:42 in test test_one
/// FAIL suite.test_one
/// ensayo: 1 run 1 failed
/// ```
pub struct TextListener {
    out: Box<dyn Write + Send>,
    verdicts: HashMap<NodeId, Verdict>,
    run: usize,
    failed: usize,
}

impl std::fmt::Debug for TextListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextListener")
            .field("run", &self.run)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl Default for TextListener {
    fn default() -> Self {
        Self::stderr()
    }
}

impl TextListener {
    /// Report to stderr
    #[must_use]
    pub fn stderr() -> Self {
        Self::to_writer(Box::new(std::io::stderr()))
    }

    /// Report to any writer
    #[must_use]
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            verdicts: HashMap::new(),
            run: 0,
            failed: 0,
        }
    }

    fn line(&mut self, text: &str) {
        // reporting must never abort a run
        let _ = writeln!(self.out, "{text}");
    }
}

/// Render one event in the text format, including its stack
#[must_use]
pub fn format_event(event: &Event) -> String {
    let mut s = format!("EVENT {event}");
    if !event.stack.is_empty() {
        s.push_str("\nCalled from");
        for addr in &event.stack {
            s.push_str(&format!("\n    0x{addr:016x}"));
        }
    }
    s
}

impl Listener for TextListener {
    fn begin(&mut self) {
        self.run = 0;
        self.failed = 0;
        self.line("ensayo: running");
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.verdicts.insert(test.node, Verdict::Unknown);
        self.line(&format!("ensayo: running: \"{}\"", test.name));
    }

    fn add_event(&mut self, _test: &TestInfo, event: &Event) {
        self.line(&format_event(event));
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        self.verdicts.insert(test.node, verdict);
    }

    fn end_test(&mut self, test: &TestInfo) {
        let verdict = self.verdicts.remove(&test.node).unwrap_or_default();
        self.run += 1;
        if verdict == Verdict::Fail {
            self.failed += 1;
        }
        self.line(&format!("{verdict} {}", test.name));
    }

    fn end(&mut self) {
        let summary = format!("ensayo: {} run {} failed", self.run, self.failed);
        self.line(&summary);
        let _ = self.out.flush();
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Begin,
    BeginTest { test: &'a str },
    Event { test: &'a str, event: &'a Event },
    Finished { test: &'a str, verdict: Verdict },
    EndTest { test: &'a str },
    End,
}

/// JSON-lines reporter: one object per callback
pub struct JsonListener {
    out: Box<dyn Write + Send>,
}

impl std::fmt::Debug for JsonListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonListener").finish_non_exhaustive()
    }
}

impl JsonListener {
    /// Report to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::to_writer(Box::new(std::io::stdout()))
    }

    /// Report to any writer
    #[must_use]
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    fn emit(&mut self, record: &JsonRecord<'_>) {
        match serde_json::to_string(record) {
            Ok(line) => {
                let _ = writeln!(self.out, "{line}");
            }
            Err(e) => tracing::error!(error = %e, "cannot serialize listener record"),
        }
    }
}

impl Listener for JsonListener {
    fn begin(&mut self) {
        self.emit(&JsonRecord::Begin);
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.emit(&JsonRecord::BeginTest { test: &test.name });
    }

    fn add_event(&mut self, test: &TestInfo, event: &Event) {
        self.emit(&JsonRecord::Event {
            test: &test.name,
            event,
        });
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        self.emit(&JsonRecord::Finished {
            test: &test.name,
            verdict,
        });
    }

    fn end_test(&mut self, test: &TestInfo) {
        self.emit(&JsonRecord::EndTest { test: &test.name });
    }

    fn end(&mut self) {
        self.emit(&JsonRecord::End);
        let _ = self.out.flush();
    }
}

#[derive(Debug, Clone)]
struct JunitCase {
    name: String,
    verdict: Verdict,
    duration: Duration,
    failure: Option<String>,
    system_out: Vec<String>,
}

/// JUnit XML reporter for CI integration, written at the end of the run
#[derive(Debug)]
pub struct JunitListener {
    suite_name: String,
    output_path: Option<PathBuf>,
    started: HashMap<NodeId, Instant>,
    pending: HashMap<NodeId, JunitCase>,
    cases: Vec<JunitCase>,
}

impl JunitListener {
    /// Reporter writing to a file at `end()`
    #[must_use]
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            suite_name: "ensayo".to_string(),
            output_path: Some(output_path.into()),
            started: HashMap::new(),
            pending: HashMap::new(),
            cases: Vec::new(),
        }
    }

    /// Reporter that only collects; use [`Self::render_junit`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            output_path: None,
            ..Self::new(PathBuf::new())
        }
    }

    /// Set the suite name
    #[must_use]
    pub fn with_suite_name(mut self, name: impl Into<String>) -> Self {
        self.suite_name = name.into();
        self
    }

    /// Number of failed cases collected so far
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.verdict.is_failed()).count()
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let total: Duration = self.cases.iter().map(|c| c.duration).sum();
        let skipped = self
            .cases
            .iter()
            .filter(|c| c.verdict == Verdict::NotApplicable)
            .count();

        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}">"#,
            escape_xml(&self.suite_name),
            self.cases.len(),
            self.failed_count(),
            skipped,
            total.as_secs_f64()
        ));
        xml.push('\n');

        for case in &self.cases {
            xml.push_str(&format!(
                r#"  <testcase name="{}" time="{:.3}">"#,
                escape_xml(&case.name),
                case.duration.as_secs_f64()
            ));
            xml.push('\n');
            match case.verdict {
                Verdict::Fail => {
                    let message = case.failure.as_deref().unwrap_or("failed");
                    xml.push_str(&format!(
                        r#"    <failure message="{}">{}</failure>"#,
                        escape_xml(message),
                        escape_xml(message)
                    ));
                    xml.push('\n');
                }
                Verdict::NotApplicable => xml.push_str("    <skipped/>\n"),
                Verdict::Pass | Verdict::Unknown => {}
            }
            if !case.system_out.is_empty() {
                xml.push_str(&format!(
                    "    <system-out>{}</system-out>\n",
                    escape_xml(&case.system_out.join("\n"))
                ));
            }
            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

impl Listener for JunitListener {
    fn begin(&mut self) {
        self.cases.clear();
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.started.insert(test.node, Instant::now());
        self.pending.insert(
            test.node,
            JunitCase {
                name: test.name.clone(),
                verdict: Verdict::Unknown,
                duration: Duration::ZERO,
                failure: None,
                system_out: Vec::new(),
            },
        );
    }

    fn add_event(&mut self, test: &TestInfo, event: &Event) {
        let Some(case) = self.pending.get_mut(&test.node) else {
            return;
        };
        if event.verdict() == Some(Verdict::Fail) && case.failure.is_none() {
            case.failure = Some(event.to_string());
        }
        case.system_out.push(format_event(event));
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        if let Some(case) = self.pending.get_mut(&test.node) {
            case.verdict = verdict;
        }
    }

    fn end_test(&mut self, test: &TestInfo) {
        if let Some(mut case) = self.pending.remove(&test.node) {
            if let Some(start) = self.started.remove(&test.node) {
                case.duration = start.elapsed();
            }
            self.cases.push(case);
        }
    }

    fn end(&mut self) {
        let Some(path) = &self.output_path else {
            return;
        };
        if let Err(e) = std::fs::write(path, self.render_junit()) {
            tracing::error!(path = %path.display(), error = %e, "cannot write JUnit report");
        }
    }
}

/// Escape XML special characters.
///
/// Characters XML 1.0 cannot carry at all, such as the escape codes of
/// coloured log output, become U+FFFD.
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            '\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => out.push('\u{fffd}'),
            _ => out.push(c),
        }
    }
    out
}
