//! Ensayador CLI: discover, list and run unit tests in native binaries
//!
//! ## Usage
//!
//! ```bash
//! ensayador list ./suite                    # Tests in run order
//! ensayador tree ./suite                    # Tree with fixtures
//! ensayador run ./suite -j 4 io net.tcp     # Run selected tests
//! ensayador run ./suite --junit junit.xml   # Also write JUnit XML
//! ```

use clap::Parser;
use ensayador::{
    attach_listeners, exit_code, init_tracing, load_engine_config, maybe_relaunch, Cli, CliConfig,
    CliResult, Commands, ListArgs, RunArgs, SourceArgs, TreeArgs, Verbosity, COLLAPSE_ENV,
};
use ensayo::{
    probe, Engine, EngineConfig, FunctionSource, HostPlatform, ManifestSource, NmSource,
    ProcessIsolation, CONFIG_ENV,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);
    config.color.apply();

    match cli.command {
        Commands::List(args) => run_list(&args),
        Commands::Tree(args) => run_tree(&args),
        Commands::Run(args) => run_tests(config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
}

fn source_for(args: &SourceArgs) -> Box<dyn FunctionSource> {
    if let Some(manifest) = &args.manifest {
        return Box::new(ManifestSource::new(manifest));
    }
    let mut source = NmSource::new(&args.binary);
    if let Some(nm) = &args.nm {
        source = source.with_nm(nm);
    }
    Box::new(source)
}

fn engine_config(args: &SourceArgs) -> CliResult<EngineConfig> {
    let mut config = load_engine_config(args.config.as_deref())?;
    if args.no_collapse {
        config = config.with_collapse_prefix(false);
    }
    Ok(config)
}

fn discover(args: &SourceArgs) -> CliResult<Engine> {
    let source = source_for(args);
    let engine = Engine::discover(source.as_ref(), engine_config(args)?)?;
    for conflict in &engine.report().conflicts {
        eprintln!("warning: {conflict}");
    }
    Ok(engine)
}

fn run_list(args: &ListArgs) -> CliResult<ExitCode> {
    let engine = discover(&args.source)?;
    let plan = engine.plan(args.specs.as_slice())?;
    for name in engine.list_tests(&plan) {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_tree(args: &TreeArgs) -> CliResult<ExitCode> {
    let engine = discover(&args.source)?;
    print!("{}", engine.tree().dump());
    Ok(ExitCode::SUCCESS)
}

fn run_tests(mut config: CliConfig, args: &RunArgs) -> CliResult<ExitCode> {
    if let Some(code) = maybe_relaunch(args.memcheck)? {
        return Ok(code);
    }
    let mut engine_config = engine_config(&args.source)?;
    if let Some(jobs) = args.jobs {
        engine_config = engine_config.with_concurrency(jobs);
    }
    let collapse = engine_config.collapse_prefix;
    let mut engine = Engine::discover(source_for(&args.source).as_ref(), engine_config)?;
    let plan = engine.plan(args.specs.as_slice())?;

    config = config.with_format(args.format.into());
    if let Some(path) = &args.junit {
        config = config.with_junit(path);
    }
    let reports = attach_listeners(&mut engine, &config, &plan);
    probe(&HostPlatform).report_once();

    // workers rebuild the tree themselves and must agree on names
    let mut isolation = ProcessIsolation::new(&args.source.binary)
        .with_env(COLLAPSE_ENV, if collapse { "1" } else { "0" });
    if let Some(path) = &args.source.config {
        isolation = isolation.with_env(CONFIG_ENV, path.display().to_string());
    }
    let summary = engine.run(plan, &mut isolation)?;
    reports.check()?;
    Ok(exit_code(&summary))
}
