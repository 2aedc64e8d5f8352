//! Progress reporting and styled result lines

use crate::error::{CliError, CliResult};
use console::{style, Style, Term};
use ensayo::{format_event, Event, JunitListener, Listener, TestInfo, Verdict};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// `PASS name` style line, coloured by verdict when asked
#[must_use]
pub fn verdict_line(verdict: Verdict, name: &str, use_color: bool) -> String {
    if !use_color {
        return format!("{verdict} {name}");
    }
    let styled = match verdict {
        Verdict::Pass => style(verdict.label()).green().bold(),
        Verdict::Fail => style(verdict.label()).red().bold(),
        Verdict::NotApplicable => style(verdict.label()).yellow(),
        Verdict::Unknown => style(verdict.label()).magenta(),
    };
    format!("{styled} {name}")
}

/// Summary line printed after the bar finishes
#[must_use]
pub fn summary_line(
    passed: usize,
    failed: usize,
    skipped: usize,
    duration: Duration,
    use_color: bool,
) -> String {
    let total = passed + failed + skipped;
    let duration_secs = duration.as_secs_f64();
    if use_color {
        let passed_style = Style::new().green().bold();
        let failed_style = Style::new().red().bold();
        let status = if failed > 0 {
            failed_style.apply_to("FAILED")
        } else {
            passed_style.apply_to("PASSED")
        };
        format!(
            "{status} {total} tests in {duration_secs:.2}s ({} passed, {} failed, {} not applicable)",
            passed_style.apply_to(passed),
            if failed > 0 {
                failed_style.apply_to(failed).to_string()
            } else {
                failed.to_string()
            },
            Style::new().yellow().apply_to(skipped)
        )
    } else {
        let status = if failed > 0 { "FAILED" } else { "PASSED" };
        format!(
            "{status} {total} tests in {duration_secs:.2}s ({passed} passed, {failed} failed, {skipped} not applicable)"
        )
    }
}

/// Listener drawing an `indicatif` progress bar.
///
/// Failing tests print their events above the bar; passing tests only
/// advance it.
#[derive(Debug)]
pub struct ProgressListener {
    term: Term,
    bar: ProgressBar,
    use_color: bool,
    quiet: bool,
    pending: HashMap<String, (Vec<Event>, Verdict)>,
    counts: [usize; 3],
    started: Option<Instant>,
}

impl ProgressListener {
    /// Progress over `total` tests, drawn on stderr
    #[must_use]
    pub fn new(total: u64, use_color: bool, quiet: bool) -> Self {
        let target = if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self::with_target(total, use_color, quiet, target)
    }

    /// Progress with an explicit draw target
    #[must_use]
    pub fn with_target(total: u64, use_color: bool, quiet: bool, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), target);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self {
            term: Term::stderr(),
            bar,
            use_color,
            quiet,
            pending: HashMap::new(),
            counts: [0; 3],
            started: None,
        }
    }

    /// Passed, failed and not-applicable counts so far
    #[must_use]
    pub const fn counts(&self) -> (usize, usize, usize) {
        (self.counts[0], self.counts[1], self.counts[2])
    }

    fn print(&self, line: &str) {
        if self.bar.is_hidden() {
            let _ = self.term.write_line(line);
        } else {
            self.bar.println(line);
        }
    }
}

impl Listener for ProgressListener {
    fn begin(&mut self) {
        self.started = Some(Instant::now());
        self.counts = [0; 3];
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.pending
            .insert(test.name.clone(), (Vec::new(), Verdict::Unknown));
        self.bar.set_message(test.name.clone());
    }

    fn add_event(&mut self, test: &TestInfo, event: &Event) {
        if let Some((events, _)) = self.pending.get_mut(&test.name) {
            events.push(event.clone());
        }
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        if let Some((_, slot)) = self.pending.get_mut(&test.name) {
            *slot = verdict;
        }
    }

    fn end_test(&mut self, test: &TestInfo) {
        let (events, verdict) = self.pending.remove(&test.name).unwrap_or_default();
        match verdict {
            Verdict::Pass => self.counts[0] += 1,
            Verdict::Fail | Verdict::Unknown => self.counts[1] += 1,
            Verdict::NotApplicable => self.counts[2] += 1,
        }
        // failures are always shown, even in quiet mode
        let failed = verdict != Verdict::Pass;
        if failed {
            for event in &events {
                self.print(&format_event(event));
            }
        }
        if failed || !self.quiet {
            self.print(&verdict_line(verdict, &test.name, self.use_color));
        }
        self.bar.inc(1);
    }

    fn end(&mut self) {
        self.bar.finish_and_clear();
        let (passed, failed, skipped) = self.counts();
        if self.quiet && failed == 0 {
            return;
        }
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let _ = self
            .term
            .write_line(&summary_line(passed, failed, skipped, elapsed, self.use_color));
    }
}

/// Outcome of writing the report files once the listeners are gone
#[derive(Debug, Clone, Default)]
pub struct ReportStatus(Arc<Mutex<Option<CliError>>>);

impl ReportStatus {
    fn fail(&self, path: PathBuf, source: std::io::Error) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(CliError::Report { path, source });
        }
    }

    /// Error for the first report that could not be written
    pub fn check(&self) -> CliResult<()> {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// JUnit XML written at the end of the run, with write failures
/// recorded in a [`ReportStatus`]
#[derive(Debug)]
pub struct JunitReport {
    inner: JunitListener,
    path: PathBuf,
    status: ReportStatus,
}

impl JunitReport {
    /// Report to `path`, failing `status` when it cannot be written
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, status: ReportStatus) -> Self {
        Self {
            inner: JunitListener::in_memory(),
            path: path.into(),
            status,
        }
    }
}

impl Listener for JunitReport {
    fn begin(&mut self) {
        self.inner.begin();
    }

    fn begin_test(&mut self, test: &TestInfo) {
        self.inner.begin_test(test);
    }

    fn add_event(&mut self, test: &TestInfo, event: &Event) {
        self.inner.add_event(test, event);
    }

    fn finished(&mut self, test: &TestInfo, verdict: Verdict) {
        self.inner.finished(test, verdict);
    }

    fn end_test(&mut self, test: &TestInfo) {
        self.inner.end_test(test);
    }

    fn end(&mut self) {
        if let Err(e) = std::fs::write(&self.path, self.inner.render_junit()) {
            tracing::error!(path = %self.path.display(), error = %e, "cannot write JUnit report");
            self.status.fail(self.path.clone(), e);
        }
    }
}
