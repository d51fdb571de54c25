use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "detectr",
    about = "Find package-manager projects and extract their dependency graphs",
    version
)]
pub struct Cli {
    /// Project path to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Config file [default: ./.detectr/config.toml, fallback ~/.config/detectr/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Write the extracted code locations as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Never run the named detectable, e.g. "Maven CLI" (repeatable)
    #[arg(long = "exclude-detectable", value_name = "NAME")]
    pub exclude_detectable: Vec<String>,

    /// Deepest directory below PATH to search
    #[arg(long, value_name = "N")]
    pub depth: Option<usize>,

    /// Explain every entry point that was not found
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}
