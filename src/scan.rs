//! Directory discovery and the level-by-level scan driver.
//!
//! Directories at the same depth are independent and are evaluated in parallel,
//! bounded by [`ScanOptions::parallelism`]. A level only starts once its parent
//! level has finished, so every directory sees the detector types applied in
//! its ancestors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::DetectConfig;
use crate::detector::{
    DetectableAccuracy, DetectableEnvironment, DetectorRuleEvaluator, DetectorRuleSet, DetectorType,
    DirectoryEvaluation, RuleStatus,
};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("directory evaluation panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid progress template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub search_depth: usize,
    pub excluded_directories: Vec<String>,
    pub parallelism: usize,
    pub accuracy_required: Vec<DetectorType>,
    pub show_progress: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&DetectConfig::default())
    }
}

impl From<&DetectConfig> for ScanOptions {
    fn from(config: &DetectConfig) -> Self {
        Self {
            search_depth: config.search_depth,
            excluded_directories: config.excluded_directories.clone(),
            parallelism: config.parallelism.max(1),
            accuracy_required: config.accuracy_required.iter().map(|t| DetectorType::new(t.as_str())).collect(),
            show_progress: false,
        }
    }
}

fn is_pruned(entry: &DirEntry, excluded: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || excluded.iter().any(|e| e.as_str() == name)
}

/// Directories under `root` (inclusive) down to `search_depth`, with their depth.
pub fn discover_directories(root: &Path, options: &ScanOptions) -> Vec<(PathBuf, usize)> {
    WalkDir::new(root)
        .max_depth(options.search_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_pruned(entry, &options.excluded_directories))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| {
            let depth = entry.depth();
            (entry.into_path(), depth)
        })
        .collect()
}

/// Evaluate every rule in every discovered directory.
///
/// Returns one [`DirectoryEvaluation`] per directory, sorted by path.
pub async fn scan(
    root: &Path,
    rule_set: Arc<DetectorRuleSet>,
    evaluator: DetectorRuleEvaluator,
    options: &ScanOptions,
) -> Result<Vec<DirectoryEvaluation>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut levels: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
    for (directory, depth) in discover_directories(root, options) {
        levels.entry(depth).or_default().push(directory);
    }
    let total: usize = levels.values().map(Vec::len).sum();
    debug!(directories = total, root = %root.display(), "discovered directories");

    let pb = if options.show_progress {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    // Detector types applied in a directory or any of its ancestors.
    let mut applied: HashMap<PathBuf, BTreeSet<DetectorType>> = HashMap::new();
    let mut results = Vec::with_capacity(total);

    for (depth, directories) in levels {
        for batch in directories.chunks(options.parallelism.max(1)) {
            let tasks: Vec<_> = batch
                .iter()
                .map(|directory| {
                    let ancestors = directory
                        .parent()
                        .and_then(|parent| applied.get(parent))
                        .cloned()
                        .unwrap_or_default();
                    let rule_set = Arc::clone(&rule_set);
                    let evaluator = evaluator.clone();
                    let environment = DetectableEnvironment::new(directory.clone());
                    let inherited = ancestors.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        evaluator.evaluate_directory(&rule_set, &environment, depth, ancestors)
                    });
                    async move { (inherited, task.await) }
                })
                .collect();

            for (inherited, result) in join_all(tasks).await {
                let evaluation = result?;
                let mut cumulative = inherited;
                cumulative.extend(evaluation.applied_types());
                applied.insert(evaluation.directory.clone(), cumulative);

                if let Some(pb) = &pb {
                    pb.set_message(evaluation.directory.display().to_string());
                    pb.inc(1);
                }
                results.push(evaluation);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    results.sort_by(|a, b| a.directory.cmp(&b.directory));
    Ok(results)
}

/// A required-accuracy detector type that was satisfied by a low-accuracy strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyViolation {
    pub directory: PathBuf,
    pub detector_type: DetectorType,
    pub definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub directories: usize,
    pub extracted: usize,
    pub failed: usize,
    pub accuracy_violations: Vec<AccuracyViolation>,
}

impl ScanSummary {
    pub fn new(evaluations: &[DirectoryEvaluation], accuracy_required: &[DetectorType]) -> Self {
        let mut summary = ScanSummary {
            directories: evaluations.len(),
            ..Default::default()
        };

        for directory in evaluations {
            summary.extracted += directory.with_status(RuleStatus::Extracted).count();
            summary.failed += directory.with_status(RuleStatus::Failed).count();

            for evaluation in &directory.evaluations {
                if !accuracy_required.contains(&evaluation.detector_type) {
                    continue;
                }
                if let Some(attempt) = evaluation.successful_attempt() {
                    if attempt.accuracy == DetectableAccuracy::Low {
                        summary.accuracy_violations.push(AccuracyViolation {
                            directory: directory.directory.clone(),
                            detector_type: evaluation.detector_type.clone(),
                            definition: attempt.definition.clone(),
                        });
                    }
                }
            }
        }
        summary
    }

    /// No failed ecosystem and no accuracy violation.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.accuracy_violations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectables::default_rule_set;
    use crate::detector::{NameExclusionPolicy, RuleSearcher};

    fn evaluator(excluded: &[&str]) -> DetectorRuleEvaluator {
        DetectorRuleEvaluator::new(RuleSearcher, NameExclusionPolicy::new(excluded.iter().copied()))
    }

    fn options() -> ScanOptions {
        ScanOptions {
            parallelism: 2,
            ..ScanOptions::default()
        }
    }

    fn evaluation<'a>(results: &'a [DirectoryEvaluation], directory: &Path, detector: &str) -> &'a crate::detector::RuleEvaluation {
        results
            .iter()
            .find(|d| d.directory == directory)
            .and_then(|d| d.evaluations.iter().find(|e| e.detector_type == DetectorType::from(detector)))
            .unwrap()
    }

    #[test]
    fn test_discovery_prunes_excluded_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a/b/c/d", "node_modules/x", ".git/objects", "web"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }

        let found: Vec<_> = discover_directories(dir.path(), &options())
            .into_iter()
            .map(|(path, depth)| (path.strip_prefix(dir.path()).unwrap().to_path_buf(), depth))
            .collect();

        assert!(found.contains(&(PathBuf::new(), 0)));
        assert!(found.contains(&(PathBuf::from("a/b/c"), 3)));
        assert!(found.contains(&(PathBuf::from("web"), 1)));
        assert!(!found.iter().any(|(p, _)| p.starts_with("a/b/c/d")));
        assert!(!found.iter().any(|(p, _)| p.starts_with("node_modules") || p.starts_with(".git")));
    }

    #[tokio::test]
    async fn test_scan_yields_and_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("Cargo.toml"), "[package]\nname = \"app\"\nversion = \"0.1.0\"\n").unwrap();
        std::fs::write(
            root.join("Cargo.lock"),
            "[[package]]\nname = \"app\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        std::fs::create_dir(root.join("member")).unwrap();
        std::fs::write(root.join("member/Cargo.toml"), "[package]\nname = \"member\"\n").unwrap();

        std::fs::create_dir(root.join("web")).unwrap();
        std::fs::write(root.join("web/package.json"), r#"{"name": "web", "dependencies": {}}"#).unwrap();
        std::fs::write(
            root.join("web/package-lock.json"),
            r#"{"name": "web", "lockfileVersion": 3, "packages": {"": {"name": "web"}}}"#,
        )
        .unwrap();

        let rules = Arc::new(default_rule_set().unwrap());
        let results = scan(root, rules, evaluator(&["Cargo CLI"]), &options()).await.unwrap();

        let root_path = root.to_path_buf();
        assert_eq!(results.first().map(|d| &d.directory), Some(&root_path));

        let cargo = evaluation(&results, root, "CARGO");
        assert_eq!(cargo.status(), RuleStatus::Extracted);
        assert_eq!(cargo.successful_attempt().unwrap().definition, "Cargo Lockfile");

        let nested = evaluation(&results, &root.join("member"), "CARGO");
        assert_eq!(nested.status(), RuleStatus::NotPresent);
        assert!(nested.explain()[0].contains("not nestable"));

        assert_eq!(evaluation(&results, &root.join("web"), "NPM_PACKAGE_LOCK").status(), RuleStatus::Extracted);
        let package_json = evaluation(&results, &root.join("web"), "NPM_PACKAGE_JSON");
        assert_eq!(package_json.status(), RuleStatus::NotPresent);
        assert!(package_json.explain()[0].contains("Yielded to NPM_PACKAGE_LOCK"));
    }

    #[tokio::test]
    async fn test_scan_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let rules = Arc::new(default_rule_set().unwrap());
        let err = scan(&dir.path().join("missing"), rules, evaluator(&[]), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_summary_reports_low_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();

        let rules = Arc::new(default_rule_set().unwrap());
        let results = scan(dir.path(), rules, evaluator(&[]), &options()).await.unwrap();

        let summary = ScanSummary::new(&results, &[DetectorType::from("PIP")]);
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.accuracy_violations.len(), 1);
        assert_eq!(summary.accuracy_violations[0].definition, "Pip Requirements");
        assert!(!summary.is_clean());

        assert!(ScanSummary::new(&results, &[]).is_clean());
    }
}
