use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubetab",
    version,
    about = "Live, diff-highlighted Kubernetes resource tables in the terminal."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub refresh_ms: u64,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Resource to show: an alias such as po or deploy, or group/version/resource
    #[arg(short, long, default_value = "po")]
    pub kind: String,

    /// Show wide columns
    #[arg(short, long)]
    pub wide: bool,

    /// Comma-separated list of columns to display, in order
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Comma-separated label keys to show as columns instead of the regular ones
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Sort column as NAME[:asc|desc]
    #[arg(long)]
    pub sort: Option<String>,

    /// Print a single snapshot to stdout and exit
    #[arg(long)]
    pub once: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn refresh_ms(&self) -> u64 {
        self.refresh_ms.max(500)
    }
}
