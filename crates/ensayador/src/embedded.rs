//! Entry points for test programs that link the engine.
//!
//! A test program calls [`embedded_main`] (closures in a
//! [`ensayo::Registry`]) or [`native_main`] (C-ABI functions found in its
//! own symbol table) from `main`. The same program then serves as
//! controller and, when `ENSAYO_WORKER` is set, as the worker for a
//! single test.

use crate::commands::EmbeddedArgs;
use crate::config::{CliConfig, Verbosity};
use crate::error::CliResult;
use crate::runner::{attach_listeners, exit_code, init_tracing, load_engine_config, maybe_relaunch};
use clap::Parser;
use ensayo::{
    probe, serve_worker, AddressInvoker, CaptureMode, Engine, FunctionInvoker, FunctionSource,
    HostPlatform, Interceptor, NmSource, NullInterceptor, WORKER_ENV,
};
use std::process::ExitCode;
use std::sync::Arc;

/// Run the tests of a program whose functions come from `source` and are
/// called through `invoker`
pub fn embedded_main(source: &dyn FunctionSource, invoker: Arc<dyn FunctionInvoker>) -> ExitCode {
    let mode = CaptureMode::Degraded("functions are called through a registry".to_string());
    finish(dispatch(source, invoker, Arc::new(NullInterceptor), mode))
}

/// Run the `extern "C"` test functions linked into the current executable
pub fn native_main() -> ExitCode {
    finish(native_dispatch())
}

fn native_dispatch() -> CliResult<ExitCode> {
    let exe = std::env::current_exe()?;
    let source = NmSource::new(exe);
    let functions = source.enumerate_functions()?;
    let interceptor: Arc<dyn Interceptor> = Arc::new(HostPlatform);
    let invoker = AddressInvoker::calibrate(&functions, Arc::clone(&interceptor))?;
    let mode = probe(interceptor.as_ref());
    dispatch(&functions, Arc::new(invoker), interceptor, mode)
}

fn finish(result: CliResult<ExitCode>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(
    source: &dyn FunctionSource,
    invoker: Arc<dyn FunctionInvoker>,
    interceptor: Arc<dyn Interceptor>,
    mode: CaptureMode,
) -> CliResult<ExitCode> {
    if let Ok(name) = std::env::var(WORKER_ENV) {
        return run_worker(source, invoker, interceptor, mode, &name);
    }

    let args = EmbeddedArgs::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    init_tracing(verbosity);

    let mut config = load_engine_config(None)?;
    if let Some(jobs) = args.jobs {
        config = config.with_concurrency(jobs);
    }
    if let Some(isolation) = args.isolation {
        config = config.with_isolation(isolation.into());
    }
    if args.memcheck {
        config = config.with_memcheck(true);
    }
    if let Some(code) = maybe_relaunch(config.memcheck)? {
        return Ok(code);
    }

    let mut engine = Engine::discover(source, config)?;
    if args.tree {
        print!("{}", engine.tree().dump());
        return Ok(ExitCode::SUCCESS);
    }
    let plan = engine.plan(args.specs.as_slice())?;
    if args.list {
        for name in engine.list_tests(&plan) {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut cli = CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(args.color.into())
        .with_format(args.format.into());
    if let Some(path) = args.junit {
        cli = cli.with_junit(path);
    }
    cli.color.apply();
    let reports = attach_listeners(&mut engine, &cli, &plan);

    mode.report_once();
    let shared = engine.exec_shared(invoker, interceptor, mode);
    let mut isolation = engine.isolation(shared)?;
    let summary = engine.run(plan, isolation.as_mut())?;
    reports.check()?;
    Ok(exit_code(&summary))
}

/// Worker side: run one test and report over stdout
fn run_worker(
    source: &dyn FunctionSource,
    invoker: Arc<dyn FunctionInvoker>,
    interceptor: Arc<dyn Interceptor>,
    mode: CaptureMode,
    name: &str,
) -> CliResult<ExitCode> {
    init_tracing(Verbosity::Quiet);
    let engine = Engine::discover(source, load_engine_config(None)?)?;
    let shared = engine.exec_shared(invoker, interceptor, mode);
    serve_worker(&shared, name, &mut std::io::stdout())?;
    Ok(ExitCode::SUCCESS)
}
