//! CLI command definitions using clap

use crate::config::{ColorChoice, ReportFormat};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ensayador: discover, list and run unit tests in native binaries
#[derive(Parser, Debug)]
#[command(name = "ensayador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures and summary only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the tests a binary contains, in run order
    List(ListArgs),

    /// Show the discovered test tree with fixture assignments
    Tree(TreeArgs),

    /// Run tests, each in a fresh worker process of the binary
    Run(RunArgs),
}

/// Where functions come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Test binary (linked against ensayo)
    pub binary: PathBuf,

    /// Read functions from a JSON manifest instead of the symbol table
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// `nm` program used for symbol discovery
    #[arg(long, env = "NM")]
    pub nm: Option<PathBuf>,

    /// Engine configuration file (YAML)
    #[arg(long, env = "ENSAYO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep the directory prefix shared by all tests in names
    #[arg(long)]
    pub no_collapse: bool,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Function source
    #[command(flatten)]
    pub source: SourceArgs,

    /// Test specs (dotted or slashed names); empty selects everything
    pub specs: Vec<String>,
}

/// Arguments for the tree command
#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    /// Function source
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Function source
    #[command(flatten)]
    pub source: SourceArgs,

    /// Test specs (dotted or slashed names); empty selects everything
    pub specs: Vec<String>,

    /// Tests in flight at once (0 = one per CPU)
    #[arg(short = 'j', long = "jobs", allow_negative_numbers = true)]
    pub jobs: Option<i64>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Also write a JUnit XML report
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Run under the memory checker
    #[arg(long)]
    pub memcheck: bool,
}

/// Command line of a test program that embeds the engine
#[derive(Parser, Debug)]
#[command(author, version, about = "Unit tests discovered by ensayo", long_about = None)]
pub struct EmbeddedArgs {
    /// Test specs (dotted or slashed names); empty selects everything
    pub specs: Vec<String>,

    /// Tests in flight at once (0 = one per CPU)
    #[arg(short = 'j', long = "jobs", allow_negative_numbers = true)]
    pub jobs: Option<i64>,

    /// Print the selected tests and exit
    #[arg(short, long)]
    pub list: bool,

    /// Print the test tree and exit
    #[arg(long)]
    pub tree: bool,

    /// Where each test runs
    #[arg(long, value_enum)]
    pub isolation: Option<IsolationArg>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Also write a JUnit XML report
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Run under the memory checker
    #[arg(long)]
    pub memcheck: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (failures and summary only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorArg,
}

/// Isolation argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationArg {
    /// A child process per test
    Process,
    /// A thread per test
    Thread,
}

impl From<IsolationArg> for ensayo::IsolationMode {
    fn from(arg: IsolationArg) -> Self {
        match arg {
            IsolationArg::Process => Self::Process,
            IsolationArg::Thread => Self::Thread,
        }
    }
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Line-oriented text on stderr
    #[default]
    Text,
    /// JSON lines on stdout
    Json,
    /// Progress bar
    Progress,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Progress => Self::Progress,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
