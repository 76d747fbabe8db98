//! CLI surface (spec §6): a single compile mode, unlike the teacher's
//! `Build`/`Setup` subcommand split — there is only one thing this binary
//! does, so `Cli` is a flat `clap::Parser` struct rather than wrapping a
//! `Subcommand` enum.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// The C source file to compile.
    #[arg(index = 1)]
    pub input_file: PathBuf,

    /// Additional include search directory. Repeatable; `-Ifoo` and `-I foo`
    /// are both accepted.
    #[arg(short = 'I', action = clap::ArgAction::Append)]
    pub include_dirs: Vec<PathBuf>,

    /// Specify the log level of the compiler.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,

    /// Accepted for compatibility; this compiler only ever produces objects.
    #[arg(short = 'c')]
    pub compile_only: bool,

    /// The output path.
    #[arg(short, long, default_value = "out.obj")]
    pub output: PathBuf,

    /// Emit textual LLVM IR instead of an object file.
    #[arg(long)]
    pub emit_llvm: bool,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level of the compiler.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// Also logs warnings (e.g. a skipped `__attribute__`).
    #[value(alias("1"))]
    Warn,

    /// Also logs which file is being compiled and each top-level node as it
    /// is processed.
    #[value(alias("2"))]
    Info,

    /// Logs Sema table insertions and declarator resolution steps.
    #[value(alias("3"))]
    Debug,

    /// Logs per-token lexing. Very verbose.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
