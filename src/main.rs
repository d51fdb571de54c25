//! `detectr` — find package-manager projects and extract their dependency graphs.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]) and apply CLI overrides.
//! 3. Build the default rule set and an evaluator honouring exclusions.
//! 4. Scan the directory tree ([`scan::scan`]).
//! 5. Render the requested report and optionally write code locations.
//! 6. Exit `0` (clean) or `1` (a present ecosystem failed, or an accuracy requirement was missed).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use detectr::cli::{self, Cli, ReportFormat};
use detectr::config::{self, load_config};
use detectr::detectables::default_rule_set;
use detectr::detector::{DetectorRuleEvaluator, NameExclusionPolicy, RuleSearcher};
use detectr::logging;
use detectr::report;
use detectr::scan::{self, ScanOptions, ScanSummary};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose, cli.quiet));

    // Resolve project path
    let path = cli
        .path
        .canonicalize()
        .with_context(|| format!("cannot scan {}", cli.path.display()))?;

    let mut config = load_config(&path, cli.config.as_deref())?;
    apply_overrides(&mut config.detect, &cli);

    let rule_set = Arc::new(default_rule_set()?);
    let evaluator = DetectorRuleEvaluator::new(
        RuleSearcher,
        NameExclusionPolicy::new(&config.detect.excluded_detectables),
    );

    let mut options = ScanOptions::from(&config.detect);
    options.show_progress = !cli.quiet && cli.report == ReportFormat::Terminal;

    let evaluations = scan::scan(&path, rule_set, evaluator, &options).await?;
    let summary = ScanSummary::new(&evaluations, &options.accuracy_required);

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&evaluations, &summary, &path, cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => {
            report::json::render(&evaluations, &summary, &path)?;
        }
    }

    if let Some(output) = &cli.output {
        report::json::write_code_locations(&evaluations, output)?;
        info!(output = %output.display(), "wrote code locations");
    }

    if !summary.is_clean() {
        std::process::exit(1);
    }

    Ok(())
}

fn apply_overrides(detect: &mut config::DetectConfig, cli: &cli::Cli) {
    detect
        .excluded_detectables
        .extend(cli.exclude_detectable.iter().cloned());
    if let Some(depth) = cli.depth {
        detect.search_depth = depth;
    }
}
