//! Execution of one test node: fixtures, body, and event capture.
//!
//! Every function runs under [`std::panic::catch_unwind`]. A process-wide
//! panic hook, installed on first use, records the panic location on
//! executor threads and keeps the default "thread panicked" message off
//! stderr; panics on other threads go to the previous hook unchanged.
//!
//! Test code talks to the executor through [`pass`], [`fail`],
//! [`not_applicable`], [`log`] and [`expect_log`].

use crate::discover::FunctionSource;
use crate::event::{Event, EventKind};
use crate::model::{FunctionRef, Role, Verdict};
use crate::platform::{CaptureMode, InterceptGuard, Interceptor};
use crate::result::{EnsayoError, EnsayoResult};
use crate::tree::{NodeId, TestTree};
use regex::Regex;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Once};

/// Calls a discovered function
pub trait FunctionInvoker: Send + Sync {
    /// Invoke `func` on the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Invoke`] when the function cannot be called.
    /// Failures inside the function surface as panics, not errors.
    fn invoke(&self, func: &FunctionRef) -> EnsayoResult<()>;
}

/// Body of a registered test function
pub type TestFn = Arc<dyn Fn() + Send + Sync>;

/// In-process table of named functions.
///
/// Serves both as a discovery source and as the invoker for the
/// functions it lists.
///
/// ```
/// use ensayo::Registry;
///
/// let registry = Registry::new()
///     .with("math/add.rs", "test_add", || assert_eq!(1 + 1, 2))
///     .with("math/add.rs", "setup", || {});
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    functions: Vec<FunctionRef>,
    bodies: HashMap<String, TestFn>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a compile-unit path.
    ///
    /// Registering the same unit and name again replaces the body.
    pub fn register<F>(&mut self, unit: impl Into<PathBuf>, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let func = FunctionRef::new(name, unit, self.functions.len() as u64 + 1);
        let key = func.location();
        if self.bodies.insert(key, Arc::new(body)).is_none() {
            self.functions.push(func);
        }
        self
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with<F>(mut self, unit: impl Into<PathBuf>, name: impl Into<String>, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(unit, name, body);
        self
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FunctionSource for Registry {
    fn enumerate_functions(&self) -> EnsayoResult<Vec<FunctionRef>> {
        Ok(self.functions.clone())
    }
}

impl FunctionInvoker for Registry {
    fn invoke(&self, func: &FunctionRef) -> EnsayoResult<()> {
        let body = self
            .bodies
            .get(&func.location())
            .ok_or_else(|| EnsayoError::Invoke {
                function: func.name.clone(),
                message: "not registered".to_string(),
            })?;
        body();
        Ok(())
    }
}

/// Symbol used to calibrate link-time addresses against the running image
pub const ANCHOR_SYMBOL: &str = "ensayo_anchor";

/// Calibration anchor; its link-time address is found by discovery.
#[allow(unsafe_code)]
#[no_mangle]
pub extern "C" fn ensayo_anchor() {}

/// Runtime address of [`ensayo_anchor`]
#[must_use]
pub fn anchor_address() -> u64 {
    ensayo_anchor as extern "C" fn() as usize as u64
}

/// Calls C-ABI `extern "C" fn()` entry points by discovered address.
///
/// Discovery reports link-time addresses; the difference to the running
/// image is measured once through [`ANCHOR_SYMBOL`].
pub struct AddressInvoker {
    slide: u64,
    interceptor: Arc<dyn Interceptor>,
}

impl std::fmt::Debug for AddressInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressInvoker")
            .field("slide", &format_args!("{:#x}", self.slide))
            .finish_non_exhaustive()
    }
}

impl AddressInvoker {
    /// Calibrate against the anchor entry of a discovered function list
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Invoke`] if the anchor symbol was not discovered.
    pub fn calibrate(functions: &[FunctionRef], interceptor: Arc<dyn Interceptor>) -> EnsayoResult<Self> {
        let anchor = functions
            .iter()
            .find(|f| f.name == ANCHOR_SYMBOL)
            .ok_or_else(|| EnsayoError::Invoke {
                function: ANCHOR_SYMBOL.to_string(),
                message: "anchor symbol not found; is the ensayo library linked?".to_string(),
            })?;
        let runtime = interceptor.normalize_address(anchor_address());
        let slide = runtime.wrapping_sub(anchor.address);
        tracing::debug!(slide = format_args!("{slide:#x}"), "address invoker calibrated");
        Ok(Self { slide, interceptor })
    }

    /// Runtime address for a discovered function
    #[must_use]
    pub fn runtime_address(&self, func: &FunctionRef) -> u64 {
        func.address.wrapping_add(self.slide)
    }
}

impl FunctionInvoker for AddressInvoker {
    #[allow(unsafe_code)]
    fn invoke(&self, func: &FunctionRef) -> EnsayoResult<()> {
        if func.address == 0 {
            return Err(EnsayoError::Invoke {
                function: func.name.clone(),
                message: "no address".to_string(),
            });
        }
        let addr = self.interceptor.normalize_address(self.runtime_address(func));
        let addr = usize::try_from(addr).map_err(|e| EnsayoError::Invoke {
            function: func.name.clone(),
            message: e.to_string(),
        })?;
        // SAFETY: discovery lists text symbols only, and the classifier
        // selects test and fixture functions, which take no arguments.
        let entry: extern "C" fn() = unsafe { std::mem::transmute::<usize, extern "C" fn()>(addr) };
        entry();
        Ok(())
    }
}

/// Payload of an explicit verdict raised from test code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitVerdict {
    /// Verdict requested by the test
    pub verdict: Verdict,
    /// Optional reason
    pub message: Option<String>,
}

impl ExplicitVerdict {
    fn into_event(self) -> Event {
        let (kind, default) = match self.verdict {
            Verdict::Pass => (EventKind::ExpectedPass, "test passed explicitly"),
            Verdict::NotApplicable => (EventKind::ExpectedNotApplicable, "test is not applicable"),
            Verdict::Fail | Verdict::Unknown => (EventKind::ExpectedFail, "test failed explicitly"),
        };
        Event::new(kind, self.message.unwrap_or_else(|| default.to_string()))
    }
}

/// End the current test or fixture call with a pass
pub fn pass() -> ! {
    panic::panic_any(ExplicitVerdict {
        verdict: Verdict::Pass,
        message: None,
    })
}

/// End the current test or fixture call with a failure
pub fn fail(message: impl Into<String>) -> ! {
    panic::panic_any(ExplicitVerdict {
        verdict: Verdict::Fail,
        message: Some(message.into()),
    })
}

/// End the current test as not applicable
pub fn not_applicable() -> ! {
    panic::panic_any(ExplicitVerdict {
        verdict: Verdict::NotApplicable,
        message: None,
    })
}

/// Emit a log line from test code.
///
/// Lines matching an [`expect_log`] pattern are consumed; the rest become
/// `LOG` events. Outside an executor the line goes to `tracing`.
pub fn log(message: impl AsRef<str>) {
    let message = message.as_ref();
    let handled = CONTEXT.with(|ctx| match ctx.borrow_mut().as_mut() {
        Some(ctx) => {
            ctx.log(message);
            true
        }
        None => false,
    });
    if !handled {
        tracing::info!(target: "ensayo::log", "{message}");
    }
}

/// Expect a log line matching `pattern` before the test body returns.
///
/// An expectation that never matches fails the test with a `SLMATCH`
/// event. A malformed pattern fails the test immediately.
pub fn expect_log(pattern: &str) {
    let regex = match Regex::new(pattern) {
        Ok(r) => r,
        Err(e) => fail(format!("bad log pattern /{pattern}/: {e}")),
    };
    CONTEXT.with(|ctx| {
        if let Some(ctx) = ctx.borrow_mut().as_mut() {
            ctx.expectations.push(Expectation {
                regex,
                matched: false,
            });
        }
    });
}

#[derive(Debug)]
struct Expectation {
    regex: Regex,
    matched: bool,
}

#[derive(Debug, Default)]
struct TestContext {
    current: Option<(String, Role)>,
    pending: Vec<Event>,
    expectations: Vec<Expectation>,
}

impl TestContext {
    fn log(&mut self, message: &str) {
        if let Some(exp) = self
            .expectations
            .iter_mut()
            .find(|e| !e.matched && e.regex.is_match(message))
        {
            exp.matched = true;
            return;
        }
        let mut event = Event::log(message);
        if let Some((name, role)) = &self.current {
            event = event.in_function(name.clone(), *role);
        }
        self.pending.push(event);
    }
}

#[derive(Debug, Clone)]
struct PanicRecord {
    message: String,
    file: String,
    line: u32,
}

thread_local! {
    static IN_EXECUTOR: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
    static CONTEXT: RefCell<Option<TestContext>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_EXECUTOR.with(Cell::get) {
                previous(info);
                return;
            }
            if info.payload().is::<ExplicitVerdict>() {
                return;
            }
            let (file, line) = info
                .location()
                .map_or((String::new(), 0), |l| (l.file().to_string(), l.line()));
            let record = PanicRecord {
                message: panic_message(info.payload()),
                file,
                line,
            };
            LAST_PANIC.with(|p| *p.borrow_mut() = Some(record));
        }));
    });
}

/// Text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(v) = payload.downcast_ref::<ExplicitVerdict>() {
        v.message.clone().unwrap_or_else(|| v.verdict.to_string())
    } else {
        "panicked with a non-string payload".to_string()
    }
}

/// Marks the current thread as an executor for the guard's lifetime
struct ContextScope {
    was_executor: bool,
    outer: Option<TestContext>,
}

impl ContextScope {
    fn enter() -> Self {
        let was_executor = IN_EXECUTOR.with(|f| f.replace(true));
        let outer = CONTEXT.with(|c| c.replace(Some(TestContext::default())));
        Self {
            was_executor,
            outer,
        }
    }

    fn set_current(func: &FunctionRef, role: Role) {
        CONTEXT.with(|c| {
            if let Some(ctx) = c.borrow_mut().as_mut() {
                ctx.current = Some((func.name.clone(), role));
            }
        });
    }

    fn take_pending() -> Vec<Event> {
        CONTEXT.with(|c| {
            c.borrow_mut()
                .as_mut()
                .map(|ctx| std::mem::take(&mut ctx.pending))
                .unwrap_or_default()
        })
    }

    fn take_unmatched() -> Vec<String> {
        CONTEXT.with(|c| {
            c.borrow_mut()
                .as_mut()
                .map(|ctx| {
                    std::mem::take(&mut ctx.expectations)
                        .into_iter()
                        .filter(|e| !e.matched)
                        .map(|e| e.regex.as_str().to_string())
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        IN_EXECUTOR.with(|f| f.set(self.was_executor));
        let outer = self.outer.take();
        CONTEXT.with(|c| *c.borrow_mut() = outer);
    }
}

enum CallOutcome {
    Returned,
    Explicit(ExplicitVerdict),
    Failed(Event),
}

/// Forwards events and folds their verdicts
struct Recorder<'s> {
    sink: &'s mut dyn FnMut(Event),
    verdict: Verdict,
}

impl Recorder<'_> {
    fn emit(&mut self, event: Event) {
        if let Some(v) = event.verdict() {
            self.verdict = self.verdict.merge(v);
        }
        (self.sink)(event);
    }

    fn fixture_failed(&mut self, func: &FunctionRef, role: Role) {
        self.emit(
            Event::fixture(format!("{role} fixture {} failed", func.location()))
                .in_function(func.name.clone(), role),
        );
    }
}

/// Runs test nodes on the current thread
pub struct Executor<'a> {
    tree: &'a TestTree,
    invoker: &'a dyn FunctionInvoker,
    interceptor: &'a dyn Interceptor,
    mode: &'a CaptureMode,
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("mode", self.mode)
            .finish_non_exhaustive()
    }
}

impl<'a> Executor<'a> {
    /// Create an executor
    #[must_use]
    pub fn new(
        tree: &'a TestTree,
        invoker: &'a dyn FunctionInvoker,
        interceptor: &'a dyn Interceptor,
        mode: &'a CaptureMode,
    ) -> Self {
        Self {
            tree,
            invoker,
            interceptor,
            mode,
        }
    }

    /// Run one node: Before fixtures outermost first, the test body, then
    /// After fixtures innermost first.
    ///
    /// A failing Before at some level skips the body, that level's After
    /// and everything deeper; Afters of the levels already entered still
    /// run. Every event goes to `sink` as soon as it is known.
    pub fn run(&self, node: NodeId, sink: &mut dyn FnMut(Event)) -> Verdict {
        install_panic_hook();
        let _scope = ContextScope::enter();
        let mut rec = Recorder {
            sink,
            verdict: Verdict::Unknown,
        };

        let levels = self.tree.fixture_levels(node);
        let mut entered = 0;
        let mut proceed = true;
        for level in &levels {
            if let Some(before) = level.before {
                match self.call(before, Role::Before, &mut rec) {
                    CallOutcome::Returned => {}
                    CallOutcome::Explicit(ex) if ex.verdict == Verdict::Pass => {}
                    CallOutcome::Explicit(ex) if ex.verdict == Verdict::NotApplicable => {
                        rec.emit(ex.into_event().in_function(before.name.clone(), Role::Before));
                        proceed = false;
                        break;
                    }
                    CallOutcome::Explicit(ex) => {
                        rec.emit(ex.into_event().in_function(before.name.clone(), Role::Before));
                        rec.fixture_failed(before, Role::Before);
                        proceed = false;
                        break;
                    }
                    CallOutcome::Failed(event) => {
                        rec.emit(event);
                        rec.fixture_failed(before, Role::Before);
                        proceed = false;
                        break;
                    }
                }
            }
            entered += 1;
        }

        if proceed {
            if let Some(test) = self.tree.node(node).function(Role::Test) {
                match self.call(test, Role::Test, &mut rec) {
                    CallOutcome::Returned => {}
                    CallOutcome::Explicit(ex) => {
                        rec.emit(ex.into_event().in_function(test.name.clone(), Role::Test));
                    }
                    CallOutcome::Failed(event) => rec.emit(event),
                }
                for pattern in ContextScope::take_unmatched() {
                    rec.emit(
                        Event::new(
                            EventKind::StringMatch,
                            format!("expected log matching /{pattern}/ was not emitted"),
                        )
                        .in_function(test.name.clone(), Role::Test),
                    );
                }
            }
        }

        for level in levels[..entered].iter().rev() {
            let Some(after) = level.after else { continue };
            match self.call(after, Role::After, &mut rec) {
                CallOutcome::Returned => {}
                CallOutcome::Explicit(ex) if ex.verdict == Verdict::Pass => {}
                CallOutcome::Explicit(ex) if ex.verdict == Verdict::NotApplicable => {
                    rec.emit(ex.into_event().in_function(after.name.clone(), Role::After));
                }
                CallOutcome::Explicit(ex) => {
                    rec.emit(ex.into_event().in_function(after.name.clone(), Role::After));
                    rec.fixture_failed(after, Role::After);
                }
                CallOutcome::Failed(event) => {
                    rec.emit(event);
                    rec.fixture_failed(after, Role::After);
                }
            }
        }

        if rec.verdict == Verdict::Unknown {
            Verdict::Pass
        } else {
            rec.verdict
        }
    }

    fn call(&self, func: &FunctionRef, role: Role, rec: &mut Recorder<'_>) -> CallOutcome {
        ContextScope::set_current(func, role);
        LAST_PANIC.with(|p| p.borrow_mut().take());

        let _intercept = if self.mode.is_intercepting() {
            let addr = self.interceptor.normalize_address(func.address);
            InterceptGuard::install(self.interceptor, addr)
                .map_err(|e| tracing::debug!(error = %e, function = %func.name, "call not intercepted"))
                .ok()
        } else {
            None
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.invoker.invoke(func)));

        for event in ContextScope::take_pending() {
            rec.emit(event);
        }

        match result {
            Ok(Ok(())) => CallOutcome::Returned,
            Ok(Err(e)) => CallOutcome::Failed(
                Event::assert(e.to_string()).in_function(func.name.clone(), role),
            ),
            Err(payload) => match payload.downcast::<ExplicitVerdict>() {
                Ok(explicit) => CallOutcome::Explicit(*explicit),
                Err(payload) => {
                    let record = LAST_PANIC.with(|p| p.borrow_mut().take());
                    let mut event = match record {
                        Some(r) => Event::assert(r.message).at(r.file, r.line),
                        None => Event::assert(panic_message(payload.as_ref())),
                    };
                    event = event.in_function(func.name.clone(), role);
                    if self.mode.is_intercepting() {
                        if let Ok(stack) = self.interceptor.capture_stack_trace() {
                            event = event.with_stack(stack);
                        }
                    }
                    CallOutcome::Failed(event)
                }
            },
        }
    }
}
