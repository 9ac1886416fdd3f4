use std::ffi::OsString;
use std::path::PathBuf;

use aero_capture::CaptureOptions;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "aero-capture-resolve", version, about)]
struct Args {
    /// JSON record-graph dump to resolve.
    graph: PathBuf,

    /// Resolution root (repeatable). Replaces the roots listed in the dump.
    #[arg(long = "root", value_name = "ID")]
    roots: Vec<u64>,

    /// Treat every non-ignored record as a root.
    ///
    /// Also enabled by `AERO_CAPTURE_REF_ALL_RESOURCES`.
    #[arg(long)]
    all: bool,

    /// Print the chunk ids as a JSON array instead of one per line.
    #[arg(long)]
    json: bool,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `AERO_CAPTURE_LOG`.
    #[arg(long, env = "AERO_CAPTURE_LOG")]
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub graph: PathBuf,
    pub roots: Vec<u64>,
    pub all_records: bool,
    pub json: bool,
    pub log_level: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::from_args(Args::parse(), CaptureOptions::from_env()?))
    }

    /// Parse an explicit argument list (the first item is the program name).
    pub fn try_parse_from<I, T>(args: I, options: CaptureOptions) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_args(Args::try_parse_from(args)?, options))
    }

    fn from_args(args: Args, options: CaptureOptions) -> Self {
        let log_level = args
            .log_level
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "warn".to_string());

        Self {
            graph: args.graph,
            roots: args.roots,
            all_records: args.all || options.ref_all_resources,
            json: args.json,
            log_level,
        }
    }
}
