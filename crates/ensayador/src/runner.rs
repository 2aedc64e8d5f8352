//! Shared plumbing for the `ensayador` subcommands and embedded test
//! programs: logging setup, configuration, listeners and relaunching.

use crate::config::{CliConfig, ReportFormat, Verbosity};
use crate::error::{CliError, CliResult};
use crate::output::{JunitReport, ProgressListener, ReportStatus};
use ensayo::relaunch::{ProcessEnvironment, RelaunchCommand};
use ensayo::{
    decide, Engine, EngineConfig, JsonListener, Plan, RelaunchDecision, RelaunchPolicy,
    TextListener, CONFIG_ENV,
};
use std::path::Path;
use std::process::{Command, ExitCode};

/// Overrides the worker's prefix collapsing so its names match the controller's
pub const COLLAPSE_ENV: &str = "ENSAYO_COLLAPSE";

/// Install a stderr `tracing` subscriber; `RUST_LOG` wins over verbosity
pub fn init_tracing(verbosity: Verbosity) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Engine configuration from an explicit file, `$ENSAYO_CONFIG`, or
/// `ensayo.yaml` in the working directory
pub fn load_engine_config(explicit: Option<&Path>) -> CliResult<EngineConfig> {
    let mut config = match explicit {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let cwd = std::env::current_dir()?;
            EngineConfig::discover(std::env::var(CONFIG_ENV).ok().as_deref(), &cwd)?
        }
    };
    if let Ok(value) = std::env::var(COLLAPSE_ENV) {
        config.collapse_prefix = parse_flag(&value)
            .ok_or_else(|| CliError::config(format!("{COLLAPSE_ENV}={value} is not 0 or 1")))?;
    }
    Ok(config)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Attach the listeners the CLI configuration asks for.
///
/// Check the returned status after the run: report files are written
/// when the run ends.
pub fn attach_listeners(engine: &mut Engine, config: &CliConfig, plan: &Plan) -> ReportStatus {
    let status = ReportStatus::default();
    let use_color = config.color.should_color();
    match config.format {
        ReportFormat::Text => engine.add_listener(Box::new(TextListener::stderr())),
        ReportFormat::Json => engine.add_listener(Box::new(JsonListener::stdout())),
        ReportFormat::Progress => {
            let total = plan.clone().count() as u64;
            engine.add_listener(Box::new(ProgressListener::new(
                total,
                use_color,
                config.verbosity.is_quiet(),
            )));
        }
    }
    if let Some(path) = &config.junit {
        engine.add_listener(Box::new(JunitReport::new(path, status.clone())));
    }
    status
}

/// Re-execute under the memory checker when asked to.
///
/// Returns the exit code to end with when the run happened in the
/// relaunched process, `None` to carry on here.
pub fn maybe_relaunch(memcheck: bool) -> CliResult<Option<ExitCode>> {
    let policy = RelaunchPolicy {
        enabled: memcheck,
        ..RelaunchPolicy::default()
    };
    let argv: Vec<String> = std::env::args().collect();
    match decide(&policy, &ProcessEnvironment, &argv) {
        RelaunchDecision::Proceed(reason) => {
            tracing::debug!(?reason, "running in this process");
            Ok(None)
        }
        RelaunchDecision::Relaunch(cmd) => exec_relaunch(&cmd).map(Some),
    }
}

fn exec_relaunch(cmd: &RelaunchCommand) -> CliResult<ExitCode> {
    tracing::info!(tool = %cmd.program.display(), "relaunching under memory checker");
    let status = Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .map_err(|source| CliError::Relaunch {
            tool: cmd.program.clone(),
            source,
        })?;
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Exit code for a finished run
#[must_use]
pub fn exit_code(summary: &ensayo::RunSummary) -> ExitCode {
    if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
