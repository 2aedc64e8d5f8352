//! Ensayador: command-line front end for the Ensayo test engine
//!
//! Two ways in:
//!
//! - the `ensayador` binary lists, shows and runs the tests of a test
//!   program from the outside, discovering functions from its symbol
//!   table or from a JSON manifest;
//! - test programs call [`embedded_main`] or [`native_main`] from their
//!   own `main` and get the same command line built in.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod embedded;
mod error;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, EmbeddedArgs, FormatArg, IsolationArg, ListArgs, RunArgs, SourceArgs,
    TreeArgs,
};
pub use config::{CliConfig, ColorChoice, ReportFormat, Verbosity};
pub use embedded::{embedded_main, native_main};
pub use error::{CliError, CliResult};
pub use output::{summary_line, verdict_line, JunitReport, ProgressListener, ReportStatus};
pub use runner::{
    attach_listeners, exit_code, init_tracing, load_engine_config, maybe_relaunch, COLLAPSE_ENV,
};
