//! Execution contexts for scheduled jobs.
//!
//! [`ThreadIsolation`] runs each job on its own OS thread; panics are
//! contained, but a crash takes the whole process down. [`ProcessIsolation`]
//! re-executes a worker program per job, so signals and aborts only fail
//! the job that caused them.
//!
//! ## Worker protocol
//!
//! The worker is started with `ENSAYO_WORKER=<full name>` and writes one
//! line per message on stdout:
//!
//! ```text
//! @@ensayo@@ {"Event":{"kind":"Assert","description":"...","location":{...}}}
//! @@ensayo@@ {"Finished":"Fail"}
//! ```
//!
//! Any other stdout text is reported as a `LOG` event. Test output without
//! a trailing newline may share a line with the next protocol message; the
//! text before the prefix is split off as its own `LOG` event. Bytes that
//! are not UTF-8 are decoded lossily.

use crate::event::{Event, EventKind};
use crate::exec::{Executor, FunctionInvoker};
use crate::model::Verdict;
use crate::platform::{CaptureMode, Interceptor};
use crate::result::{EnsayoError, EnsayoResult};
use crate::sched::{Isolation, Job, JobId, WorkerMessage};
use crate::tree::TestTree;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Environment variable naming the node a worker process must run
pub const WORKER_ENV: &str = "ENSAYO_WORKER";

/// Prefix of protocol lines on a worker's stdout
pub const PROTOCOL_PREFIX: &str = "@@ensayo@@ ";

/// Exit status the memory checker uses to report errors
pub const MEMCHECK_EXIT_CODE: i32 = 97;

/// Message on the worker wire; one job per worker, so no job id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Captured event
    Event(Event),
    /// Final verdict
    Finished(Verdict),
}

/// Render a wire message as one protocol line (without newline)
///
/// # Errors
///
/// Returns a JSON error if the message cannot be serialized.
pub fn encode_line(message: &WireMessage) -> EnsayoResult<String> {
    Ok(format!("{PROTOCOL_PREFIX}{}", serde_json::to_string(message)?))
}

/// Classify one stdout line of a worker
///
/// # Errors
///
/// Returns [`EnsayoError::Protocol`] for a prefixed line that does not parse.
pub fn decode_line(line: &str) -> EnsayoResult<WireMessage> {
    match line.strip_prefix(PROTOCOL_PREFIX) {
        Some(json) => serde_json::from_str(json.trim())
            .map_err(|e| EnsayoError::protocol(format!("bad worker line: {e}"))),
        None => Ok(WireMessage::Event(Event::log(line))),
    }
}

/// Split a worker stdout line into test output and the protocol message
/// glued after it, if any
#[must_use]
pub fn split_line(line: &str) -> (&str, Option<&str>) {
    match line.find(PROTOCOL_PREFIX) {
        Some(at) => (&line[..at], Some(&line[at..])),
        None => (line, None),
    }
}

/// Forward a worker's stdout as messages for `job` until end of stream.
///
/// Returns the verdict the worker reported, if it got that far.
fn pump(mut reader: impl BufRead, job: JobId, tx: &Sender<WorkerMessage>) -> Option<Verdict> {
    let mut reported = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(job = job.0, error = %e, "worker stdout unreadable");
                break;
            }
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        let (output, protocol) = split_line(line);
        if protocol.is_none() || !output.is_empty() {
            let _ = tx.send(WorkerMessage::Event {
                job,
                event: Event::log(output),
            });
        }
        let Some(protocol) = protocol else { continue };
        match decode_line(protocol) {
            Ok(WireMessage::Event(event)) => {
                let _ = tx.send(WorkerMessage::Event { job, event });
            }
            Ok(WireMessage::Finished(verdict)) => reported = Some(verdict),
            Err(e) => {
                let _ = tx.send(WorkerMessage::Event {
                    job,
                    event: Event::log(format!("{e}: {protocol}")),
                });
            }
        }
    }
    reported
}

/// Shared, read-only state a job needs to run
#[derive(Clone)]
pub struct ExecShared {
    /// Test tree
    pub tree: Arc<TestTree>,
    /// Function invoker
    pub invoker: Arc<dyn FunctionInvoker>,
    /// Platform interceptor
    pub interceptor: Arc<dyn Interceptor>,
    /// Capture mode probed at startup
    pub mode: CaptureMode,
}

impl std::fmt::Debug for ExecShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecShared")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// One OS thread per job
#[derive(Debug)]
pub struct ThreadIsolation {
    shared: ExecShared,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
}

impl ThreadIsolation {
    /// Create a thread isolation over shared state
    #[must_use]
    pub fn new(shared: ExecShared) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { shared, tx, rx }
    }
}

impl Isolation for ThreadIsolation {
    fn launch(&mut self, job: Job) -> EnsayoResult<()> {
        let shared = self.shared.clone();
        let tx = self.tx.clone();
        let Job { id, node, name } = job;
        std::thread::Builder::new()
            .name(format!("ensayo-{name}"))
            .spawn(move || {
                let exec = Executor::new(
                    &shared.tree,
                    shared.invoker.as_ref(),
                    shared.interceptor.as_ref(),
                    &shared.mode,
                );
                let verdict = exec.run(node, &mut |event| {
                    let _ = tx.send(WorkerMessage::Event { job: id, event });
                });
                let _ = tx.send(WorkerMessage::Finished { job: id, verdict });
            })
            .map_err(|e| EnsayoError::Spawn {
                test: name.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn recv(&mut self) -> EnsayoResult<WorkerMessage> {
        self.rx
            .recv()
            .map_err(|_| EnsayoError::worker("execution threads disconnected"))
    }
}

/// One child process per job
#[derive(Debug)]
pub struct ProcessIsolation {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
}

impl ProcessIsolation {
    /// Re-run `program` as the worker for each job
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            tx,
            rx,
        }
    }

    /// Worker for the currently running executable
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the executable path is unavailable.
    pub fn current_exe() -> EnsayoResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Extra arguments for every worker
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Extra environment for every worker
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Isolation for ProcessIsolation {
    fn launch(&mut self, job: Job) -> EnsayoResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(WORKER_ENV, &job.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EnsayoError::Spawn {
                test: job.name.clone(),
                message: e.to_string(),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| EnsayoError::Spawn {
            test: job.name.clone(),
            message: "worker stdout not captured".to_string(),
        })?;
        tracing::debug!(test = %job.name, pid = child.id(), "worker started");

        let tx = self.tx.clone();
        let id = job.id;
        std::thread::Builder::new()
            .name(format!("ensayo-reader-{}", job.name))
            .spawn(move || {
                let reported = pump(BufReader::new(stdout), id, &tx);
                let status = child.wait();
                let (events, verdict) = match status {
                    Ok(status) => settle(reported, status),
                    Err(e) => (
                        vec![Event::new(EventKind::Exit, format!("cannot reap worker: {e}"))],
                        Verdict::Fail,
                    ),
                };
                for event in events {
                    let _ = tx.send(WorkerMessage::Event { job: id, event });
                }
                let _ = tx.send(WorkerMessage::Finished { job: id, verdict });
            })
            .map_err(|e| EnsayoError::Spawn {
                test: job.name.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn recv(&mut self) -> EnsayoResult<WorkerMessage> {
        self.rx
            .recv()
            .map_err(|_| EnsayoError::worker("worker readers disconnected"))
    }
}

/// Decide the final verdict of a worker from what it reported and how it
/// ended. Returns extra events to deliver before the verdict.
#[must_use]
pub fn settle(reported: Option<Verdict>, status: ExitStatus) -> (Vec<Event>, Verdict) {
    if let Some(signo) = exit_signal(&status) {
        return (vec![Event::signal(signo)], Verdict::Fail);
    }
    let code = status.code().unwrap_or(-1);
    if code == MEMCHECK_EXIT_CODE {
        let event = Event::new(EventKind::LeakChecker, "memory checker reported errors");
        return (vec![event], Verdict::Fail);
    }
    match reported {
        Some(verdict) if code == 0 => (Vec::new(), verdict),
        Some(_) | None => (vec![Event::exit(code)], Verdict::Fail),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Worker side of [`ProcessIsolation`]: run the node named `name` and
/// write protocol lines to `out`.
///
/// # Errors
///
/// Returns [`EnsayoError::Worker`] if no node has that name, or an I/O
/// error if `out` fails.
pub fn serve_worker(shared: &ExecShared, name: &str, out: &mut dyn Write) -> EnsayoResult<Verdict> {
    let node = shared
        .tree
        .find(name)
        .ok_or_else(|| EnsayoError::worker(format!("no test named {name}")))?;
    let exec = Executor::new(
        &shared.tree,
        shared.invoker.as_ref(),
        shared.interceptor.as_ref(),
        &shared.mode,
    );
    let mut write_error = None;
    let verdict = exec.run(node, &mut |event| {
        if write_error.is_some() {
            return;
        }
        let result = encode_line(&WireMessage::Event(event)).and_then(|line| {
            writeln!(out, "{line}")?;
            out.flush()?;
            Ok(())
        });
        if let Err(e) = result {
            write_error = Some(e);
        }
    });
    if let Some(e) = write_error {
        return Err(e);
    }
    writeln!(out, "{}", encode_line(&WireMessage::Finished(verdict))?)?;
    out.flush()?;
    Ok(verdict)
}
