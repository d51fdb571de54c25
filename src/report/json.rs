use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::detector::{DetectableAccuracy, DetectorType, DirectoryEvaluation};
use crate::graph::DependencyGraph;
use crate::models::{Extraction, ExternalId, Forge};
use crate::scan::ScanSummary;

/// Full machine-readable scan record.
#[derive(Serialize)]
struct ScanRecord<'a> {
    root: &'a Path,
    summary: &'a ScanSummary,
    directories: &'a [DirectoryEvaluation],
}

/// One extracted code location with the context it was found in.
#[derive(Debug, Serialize)]
pub struct CodeLocationRecord<'a> {
    pub directory: &'a Path,
    pub detector_type: &'a DetectorType,
    pub definition: &'a str,
    pub accuracy: DetectableAccuracy,
    pub group: Option<Forge>,
    pub project_name: Option<&'a str>,
    pub project_version: Option<&'a str>,
    pub external_id: Option<&'a ExternalId>,
    pub source_path: Option<&'a Path>,
    pub warnings: &'a [String],
    pub graph: &'a DependencyGraph,
}

/// Every code location produced by a successful extraction, in scan order.
pub fn code_locations(evaluations: &[DirectoryEvaluation]) -> Vec<CodeLocationRecord<'_>> {
    let mut records = Vec::new();
    for directory in evaluations {
        for evaluation in &directory.evaluations {
            let Some(attempt) = evaluation.successful_attempt() else {
                continue;
            };
            let Some(Extraction::Success {
                code_locations,
                project_name,
                project_version,
            }) = &attempt.extraction
            else {
                continue;
            };
            for location in code_locations {
                records.push(CodeLocationRecord {
                    directory: &directory.directory,
                    detector_type: &evaluation.detector_type,
                    definition: &attempt.definition,
                    accuracy: attempt.accuracy,
                    group: attempt.group,
                    project_name: project_name.as_deref(),
                    project_version: project_version.as_deref(),
                    external_id: location.external_id.as_ref(),
                    source_path: location.source_path.as_deref(),
                    warnings: &location.warnings,
                    graph: &location.graph,
                });
            }
        }
    }
    records
}

/// Print the full per-directory evaluation record to stdout.
pub fn render(evaluations: &[DirectoryEvaluation], summary: &ScanSummary, root: &Path) -> Result<()> {
    let record = ScanRecord {
        root,
        summary,
        directories: evaluations,
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Write the extracted code locations to `output` as a JSON array.
pub fn write_code_locations(evaluations: &[DirectoryEvaluation], output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&code_locations(evaluations))?;
    std::fs::write(output, json).with_context(|| format!("failed to write {}", output.display()))
}
