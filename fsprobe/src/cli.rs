//! The CLI surface: every flag is optional here and only wins over the
//! config file's value when the user actually passed it, so the config file
//! can stand alone or be overridden flag by flag.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fsprobe")]
#[command(about = "Observes VFS filesystem activity and emits structured events")]
pub struct Cli {
    /// One or more root paths to watch. With `--paths-filtering` (the
    /// default) at least one is required.
    pub paths: Vec<PathBuf>,

    #[arg(long, value_enum)]
    pub dentry_resolution_mode: Option<DentryResolutionModeArg>,

    #[arg(long)]
    pub recursive: Option<bool>,

    #[arg(long = "paths-filtering")]
    pub paths_filtering: Option<bool>,

    #[arg(long)]
    pub follow: Option<bool>,

    /// Repeatable; omit entirely to watch every event kind except Modify
    /// (§4.6's Configure default).
    #[arg(long = "event")]
    pub events: Vec<String>,

    #[arg(long = "chan-size")]
    pub chan_size: Option<usize>,

    #[arg(long = "perf-buffer-size")]
    pub perf_buffer_size: Option<usize>,

    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DentryResolutionModeArg {
    Fragments,
    SingleFragment,
    PerfBuffer,
}

impl DentryResolutionModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            DentryResolutionModeArg::Fragments => "fragments",
            DentryResolutionModeArg::SingleFragment => "single_fragment",
            DentryResolutionModeArg::PerfBuffer => "perf_buffer",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatArg {
    Table,
    Json,
    None,
}

impl FormatArg {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatArg::Table => "table",
            FormatArg::Json => "json",
            FormatArg::None => "none",
        }
    }
}
