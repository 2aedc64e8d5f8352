//! Ensayo: unit-testing engine for native binaries
//!
//! Ensayo ("rehearsal") finds tests by reading a program's own function
//! symbols, arranges them into a tree by source file, attaches setup and
//! teardown fixtures, and runs each test in its own execution context so
//! a crash in one test is reported instead of ending the run.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ FunctionSrc  │──►│ Classifier   │──►│ TestTree     │──►│ Plan         │
//! │ (nm, manifest│   │ Chain        │   │ (arena)      │   │ (pre-order)  │
//! │  registry)   │   │              │   │              │   │              │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                  │
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐          │
//! │ Listeners    │◄──│ Scheduler    │◄──│ Isolation    │◄─────────┘
//! │ (text, json, │   │ (bounded     │   │ (process or  │
//! │  junit)      │   │  concurrency)│   │  thread)     │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ensayo::{Engine, EngineConfig, Registry};
//!
//! let registry = Registry::new()
//!     .with("math.c", "setup", || {})
//!     .with("math.c", "test_add", || assert_eq!(2 + 2, 4))
//!     .with("math.c", "test_sub", || assert_eq!(2 - 2, 0));
//! let engine = Engine::discover(&registry, EngineConfig::new()).unwrap();
//! let plan = engine.plan::<&str>(&[]).unwrap();
//! assert_eq!(engine.list_tests(&plan), vec!["math.test_add", "math.test_sub"]);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod classify;
mod config;
#[allow(clippy::missing_errors_doc)]
mod discover;
mod engine;
mod event;
#[allow(clippy::module_name_repetitions)]
mod exec;
mod isolate;
mod listener;
mod model;
mod plan;
mod result;
mod sched;
mod tree;

/// Platform boundary: symbol interception, module maps, debugger checks
pub mod platform;

/// Relaunching under a memory checker
pub mod relaunch;

pub use classify::{Classification, ClassifierChain, ClassifierRule, RuleConfig, DEFAULT_RULES};
pub use config::{EngineConfig, IsolationMode, CONFIG_ENV, DEFAULT_CONFIG_FILE};
pub use discover::{parse_nm_output, FunctionSource, ManifestSource, NmSource};
pub use engine::Engine;
pub use event::{verdict_from_events, Event, EventKind, EventLocation};
pub use exec::{
    anchor_address, ensayo_anchor, expect_log, fail, log, not_applicable, panic_message, pass,
    AddressInvoker, Executor, ExplicitVerdict, FunctionInvoker, Registry, TestFn, ANCHOR_SYMBOL,
};
pub use isolate::{
    decode_line, encode_line, serve_worker, settle, ExecShared, ProcessIsolation, ThreadIsolation,
    WireMessage, MEMCHECK_EXIT_CODE, PROTOCOL_PREFIX, WORKER_ENV,
};
pub use listener::{
    format_event, JsonListener, JunitListener, Listener, Listeners, TestInfo, TextListener,
};
pub use model::{FunctionRef, Role, Verdict};
pub use plan::Plan;
pub use platform::{probe, CapabilityError, CaptureMode, HostPlatform, Interceptor, NullInterceptor};
pub use relaunch::{decide, RelaunchDecision, RelaunchPolicy};
pub use result::{EnsayoError, EnsayoResult};
pub use sched::{
    effective_concurrency, Isolation, Job, JobId, RunSummary, Scheduler, SchedulerState,
    WorkerMessage,
};
pub use tree::{
    scope_path, BuildReport, Conflict, FixtureLevel, NodeId, TestNode, TestTree, TreeBuilder,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    mod facade_tests {
        use super::*;

        #[test]
        fn test_discover_and_run_through_facade() {
            let registry = Registry::new()
                .with("io.c", "init", || log("opening"))
                .with("io.c", "test_read", || {})
                .with("io.c", "test_write", || fail("disk full"))
                .with("io.c", "test_seek", || not_applicable());
            let mut engine = Engine::discover(
                &registry,
                EngineConfig::new().with_isolation(IsolationMode::Thread),
            )
            .unwrap();
            engine.add_listener(Box::new(JunitListener::in_memory()));
            let shared = engine.exec_shared(
                Arc::new(registry),
                Arc::new(NullInterceptor),
                CaptureMode::Degraded("test".into()),
            );
            let mut isolation = engine.isolation(shared).unwrap();
            let plan = engine.plan::<&str>(&[]).unwrap();
            let summary = engine.run(plan, isolation.as_mut()).unwrap();
            assert_eq!(summary.run, 3);
            assert_eq!(summary.passed, 1);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.not_applicable, 1);
        }

        #[test]
        fn test_error_display() {
            let err = EnsayoError::UnknownSpec {
                spec: "suite.missing".into(),
            };
            assert!(err.to_string().contains("suite.missing"));
        }
    }
}
