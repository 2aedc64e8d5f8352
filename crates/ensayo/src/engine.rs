//! The engine: discovered tree, classifier chain, configuration and
//! listeners for one run.
//!
//! Several engines can live side by side; nothing here is global.

use crate::classify::ClassifierChain;
use crate::config::{EngineConfig, IsolationMode};
use crate::discover::FunctionSource;
use crate::exec::FunctionInvoker;
use crate::isolate::{ExecShared, ProcessIsolation, ThreadIsolation};
use crate::listener::{Listener, Listeners, TextListener};
use crate::plan::Plan;
use crate::platform::{CaptureMode, Interceptor};
use crate::result::EnsayoResult;
use crate::sched::{Isolation, RunSummary, Scheduler};
use crate::tree::{BuildReport, TestTree, TreeBuilder};
use std::sync::Arc;

/// Context object for discovery, planning and running
#[derive(Debug)]
pub struct Engine {
    tree: Arc<TestTree>,
    chain: ClassifierChain,
    config: EngineConfig,
    listeners: Listeners,
    report: BuildReport,
}

impl Engine {
    /// Discover tests with the default rules plus the configured extras.
    ///
    /// Extra rules that fail to compile are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EnsayoError::Discovery`] if the source cannot list
    /// its functions.
    pub fn discover(source: &dyn FunctionSource, config: EngineConfig) -> EnsayoResult<Self> {
        let mut chain = ClassifierChain::with_defaults();
        chain.extend_lenient(&config.extra_rules);
        Self::discover_with_chain(source, chain, config)
    }

    /// Discover tests with an explicit classifier chain
    ///
    /// # Errors
    ///
    /// Same as [`Self::discover`].
    pub fn discover_with_chain(
        source: &dyn FunctionSource,
        chain: ClassifierChain,
        config: EngineConfig,
    ) -> EnsayoResult<Self> {
        let functions = source.enumerate_functions()?;
        let mut builder = TreeBuilder::new(&chain);
        if !config.collapse_prefix {
            builder = builder.without_collapse();
        }
        let (tree, report) = builder.build(functions);
        tracing::info!(
            tests = report.placed,
            conflicts = report.conflicts.len(),
            "discovery complete"
        );
        Ok(Self {
            tree: Arc::new(tree),
            chain,
            config,
            listeners: Listeners::new(),
            report,
        })
    }

    /// The test tree
    #[must_use]
    pub fn tree(&self) -> &Arc<TestTree> {
        &self.tree
    }

    /// The classifier chain used for discovery
    #[must_use]
    pub fn chain(&self) -> &ClassifierChain {
        &self.chain
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// What discovery placed, skipped and rejected
    #[must_use]
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Plan the given specs; empty means everything
    ///
    /// # Errors
    ///
    /// Returns [`crate::EnsayoError::UnknownSpec`] for a spec naming no node.
    pub fn plan<S: AsRef<str>>(&self, specs: &[S]) -> EnsayoResult<Plan> {
        Plan::new(&self.tree, specs)
    }

    /// Full names of the tests a plan would run, in order
    #[must_use]
    pub fn list_tests(&self, plan: &Plan) -> Vec<String> {
        plan.names()
    }

    /// Attach a listener; listeners are notified in attach order
    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    /// Number of attached listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Shared execution state for isolations built over this engine
    #[must_use]
    pub fn exec_shared(
        &self,
        invoker: Arc<dyn FunctionInvoker>,
        interceptor: Arc<dyn Interceptor>,
        mode: CaptureMode,
    ) -> ExecShared {
        ExecShared {
            tree: Arc::clone(&self.tree),
            invoker,
            interceptor,
            mode,
        }
    }

    /// The isolation the configuration asks for.
    ///
    /// Process isolation re-runs the current executable as a worker.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the current executable cannot be located.
    pub fn isolation(&self, shared: ExecShared) -> EnsayoResult<Box<dyn Isolation>> {
        Ok(match self.config.isolation {
            IsolationMode::Thread => Box::new(ThreadIsolation::new(shared)),
            IsolationMode::Process => Box::new(ProcessIsolation::current_exe()?),
        })
    }

    /// Run a plan. A [`TextListener`] on stderr is attached first if no
    /// listener is.
    ///
    /// # Errors
    ///
    /// Launch failures and broken worker channels abort the run.
    pub fn run(&mut self, plan: Plan, isolation: &mut dyn Isolation) -> EnsayoResult<RunSummary> {
        if self.listeners.is_empty() {
            self.listeners.push(Box::new(TextListener::stderr()));
        }
        let mut scheduler = Scheduler::new(self.config.concurrency);
        let summary = scheduler.run(plan, isolation, &mut self.listeners)?;
        tracing::info!(
            run = summary.run,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }
}
