use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use super::json::code_locations;
use crate::detector::{DetectableAccuracy, DirectoryEvaluation, RuleStatus};
use crate::scan::ScanSummary;

/// Render a colored terminal report.
pub fn render(
    evaluations: &[DirectoryEvaluation],
    summary: &ScanSummary,
    root: &Path,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    if quiet {
        println!(
            "Directories: {}  Extracted: {}  Failed: {}  Accuracy: {}",
            summary.directories,
            summary.extracted.to_string().green(),
            summary.failed.to_string().red(),
            summary.accuracy_violations.len().to_string().yellow(),
        );
        return Ok(());
    }

    println!("\n {} v{}", "detectr".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Scanning: {}\n", root.display());

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Directories scanned : {}", summary.directories));
    println!(
        " │  {:<48} │",
        format!("{}  Extracted          : {:>4}", "✓".green(), summary.extracted)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Failed             : {:>4}", "✗".red(), summary.failed)
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Accuracy violations: {:>4}",
            "⚠".yellow(),
            summary.accuracy_violations.len()
        )
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    if summary.extracted > 0 {
        println!(" {} Extracted code locations:\n", "[OK]".green().bold());
        render_locations(evaluations, root);
        println!();
    }

    if summary.failed > 0 {
        println!(" {} Ecosystems present but not extracted:\n", "[FAILED]".red().bold());
        render_explanations(evaluations, root, RuleStatus::Failed);
        println!();
    }

    if !summary.accuracy_violations.is_empty() {
        println!(" {} Extracted with low accuracy:\n", "[ACCURACY]".yellow().bold());
        for violation in &summary.accuracy_violations {
            println!(
                "   {} {} via {}",
                relative(&violation.directory, root),
                violation.detector_type,
                violation.definition
            );
        }
        println!();
    }

    if verbose {
        println!(" {} Entry points not found:\n", "[SKIPPED]".dimmed().bold());
        render_not_found(evaluations, root);
        println!();
    }

    Ok(())
}

fn relative(directory: &Path, root: &Path) -> String {
    match directory.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => directory.display().to_string(),
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

fn render_locations(evaluations: &[DirectoryEvaluation], root: &Path) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Directory", "Detector", "Definition", "Project", "Dependencies", "Accuracy", "Warnings"]));

    for record in code_locations(evaluations) {
        let project = record
            .external_id
            .map(|id| id.to_purl())
            .or_else(|| record.project_name.map(str::to_string))
            .unwrap_or_else(|| "-".to_string());
        let directory = match record.source_path {
            Some(sub) => format!("{}/{}", relative(record.directory, root), sub.display()),
            None => relative(record.directory, root),
        };
        let accuracy_color = match record.accuracy {
            DetectableAccuracy::High => Color::Green,
            DetectableAccuracy::Low => Color::Yellow,
        };

        table.add_row(vec![
            Cell::new(directory),
            Cell::new(record.detector_type),
            Cell::new(record.definition),
            Cell::new(project),
            Cell::new(record.graph.len()).set_alignment(CellAlignment::Right),
            Cell::new(record.accuracy).fg(accuracy_color),
            Cell::new(record.warnings.len()).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{}", table);
}

fn render_explanations(evaluations: &[DirectoryEvaluation], root: &Path, status: RuleStatus) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Directory", "Detector", "Explanation"]));

    for directory in evaluations {
        for evaluation in directory.with_status(status) {
            table.add_row(vec![
                Cell::new(relative(&directory.directory, root)),
                Cell::new(&evaluation.detector_type).fg(Color::Red),
                Cell::new(evaluation.explain().join("\n")),
            ]);
        }
    }

    println!("{}", table);
}

fn render_not_found(evaluations: &[DirectoryEvaluation], root: &Path) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Directory", "Detector", "Entry point", "Reason"]));

    for directory in evaluations {
        for evaluation in &directory.evaluations {
            for not_found in &evaluation.not_found {
                table.add_row(vec![
                    Cell::new(relative(&directory.directory, root)),
                    Cell::new(&evaluation.detector_type),
                    Cell::new(not_found.entry_point()),
                    Cell::new(not_found.description()).fg(Color::DarkGrey),
                ]);
            }
        }
    }

    println!("{}", table);
}
