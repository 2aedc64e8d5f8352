//! Bounded-concurrency scheduler.
//!
//! Pulls nodes from a [`Plan`], launches up to `limit` jobs through an
//! [`Isolation`], and funnels everything the jobs report back into the
//! listeners. Results only ever arrive through [`Isolation::recv`], which
//! is the single place the scheduler blocks.

use crate::event::{Event, EventKind};
use crate::listener::{Listener, TestInfo};
use crate::model::Verdict;
use crate::plan::Plan;
use crate::result::{EnsayoError, EnsayoResult};
use crate::tree::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of one launched job, unique within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// One test node scheduled for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Job identifier
    pub id: JobId,
    /// Node to run
    pub node: NodeId,
    /// Dotted full name of the node
    pub name: String,
}

/// Message from a running job back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// An event was captured
    Event {
        /// Job that produced the event
        job: JobId,
        /// The event
        event: Event,
    },
    /// The job completed
    Finished {
        /// Job that completed
        job: JobId,
        /// Final verdict
        verdict: Verdict,
    },
}

/// Execution-context strategy: where and how a job runs
pub trait Isolation {
    /// Start a job in a fresh execution context.
    ///
    /// # Errors
    ///
    /// [`EnsayoError::Spawn`] when no context can be created; fatal to the run.
    fn launch(&mut self, job: Job) -> EnsayoResult<()>;

    /// Block until some running job reports.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel from the jobs is broken.
    fn recv(&mut self) -> EnsayoResult<WorkerMessage>;
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started
    Idle,
    /// Launching jobs from the plan
    Running,
    /// Plan exhausted, waiting for active jobs
    Draining,
    /// All jobs reported
    Done,
}

/// Counters of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tests run
    pub run: usize,
    /// Tests passed
    pub passed: usize,
    /// Tests failed
    pub failed: usize,
    /// Tests not applicable
    pub not_applicable: usize,
}

impl RunSummary {
    fn record(&mut self, verdict: Verdict) {
        self.run += 1;
        match verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail => self.failed += 1,
            Verdict::NotApplicable => self.not_applicable += 1,
            Verdict::Unknown => {}
        }
    }

    /// No test failed
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Process exit status: non-zero iff any test failed
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Effective number of concurrent jobs.
///
/// `0` means one per available CPU; anything else below 1 is clamped to 1.
#[must_use]
pub fn effective_concurrency(requested: i64) -> usize {
    if requested == 0 {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    } else {
        usize::try_from(requested.max(1)).unwrap_or(usize::MAX)
    }
}

struct ActiveJob {
    info: TestInfo,
    events: Vec<Event>,
}

/// Drives a plan to completion
#[derive(Debug)]
pub struct Scheduler {
    limit: usize,
    state: SchedulerState,
    next_job: u64,
}

impl Scheduler {
    /// Scheduler with a requested concurrency (see [`effective_concurrency`])
    #[must_use]
    pub fn new(concurrency: i64) -> Self {
        Self {
            limit: effective_concurrency(concurrency),
            state: SchedulerState::Idle,
            next_job: 0,
        }
    }

    /// Maximum number of jobs in flight
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run every node of the plan.
    ///
    /// A launch failure fails that test, stops further launches and lets
    /// the jobs already running report before the error is returned.
    ///
    /// # Errors
    ///
    /// Launch failures and broken worker channels abort the run.
    pub fn run(
        &mut self,
        mut plan: Plan,
        isolation: &mut dyn Isolation,
        listener: &mut dyn Listener,
    ) -> EnsayoResult<RunSummary> {
        let tree = std::sync::Arc::clone(plan.tree());
        let mut summary = RunSummary::default();
        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();
        let mut aborted: Option<EnsayoError> = None;

        listener.begin();
        self.state = SchedulerState::Running;
        tracing::debug!(limit = self.limit, "scheduler running");

        loop {
            while self.state == SchedulerState::Running && active.len() < self.limit {
                let Some(node) = plan.next() else {
                    self.state = SchedulerState::Draining;
                    tracing::debug!(active = active.len(), "plan exhausted, draining");
                    break;
                };
                let job = Job {
                    id: JobId(self.next_job),
                    node,
                    name: tree.full_name(node),
                };
                self.next_job += 1;
                let id = job.id;
                let info = TestInfo::new(node, job.name.clone());
                listener.begin_test(&info);
                if let Err(e) = isolation.launch(job) {
                    tracing::error!(test = %info.name, error = %e, "launch failed, aborting run");
                    listener.add_event(&info, &Event::new(EventKind::Exit, e.to_string()));
                    listener.finished(&info, Verdict::Fail);
                    listener.end_test(&info);
                    summary.record(Verdict::Fail);
                    self.state = SchedulerState::Draining;
                    aborted = Some(e);
                    break;
                }
                active.insert(
                    id,
                    ActiveJob {
                        info,
                        events: Vec::new(),
                    },
                );
            }

            if active.is_empty() {
                break;
            }

            match isolation.recv()? {
                WorkerMessage::Event { job, event } => match active.get_mut(&job) {
                    Some(entry) => entry.events.push(event),
                    None => tracing::warn!(job = job.0, "event for unknown job dropped"),
                },
                WorkerMessage::Finished { job, verdict } => {
                    let Some(done) = active.remove(&job) else {
                        return Err(EnsayoError::protocol(format!(
                            "completion for unknown job {}",
                            job.0
                        )));
                    };
                    for event in &done.events {
                        listener.add_event(&done.info, event);
                    }
                    listener.finished(&done.info, verdict);
                    listener.end_test(&done.info);
                    summary.record(verdict);
                }
            }
        }

        self.state = SchedulerState::Done;
        listener.end();
        tracing::debug!(
            run = summary.run,
            failed = summary.failed,
            "scheduler done"
        );
        match aborted {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
