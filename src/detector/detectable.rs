use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::graph::GraphError;
use crate::models::Extraction;

/// The directory a [`Detectable`] is bound to.
#[derive(Debug, Clone)]
pub struct DetectableEnvironment {
    directory: PathBuf,
}

impl DetectableEnvironment {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of `name` inside the directory, if it is an existing file.
    pub fn file(&self, name: &str) -> Option<PathBuf> {
        let path = self.directory.join(name);
        path.is_file().then_some(path)
    }

    /// Passes when every file in `names` exists.
    pub fn require_files(&self, names: &[&str]) -> DetectableResult {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.file(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            DetectableResult::passed(format!("Found {}", names.join(", ")))
        } else {
            DetectableResult::FilesNotFound { patterns: missing }
        }
    }

    /// Passes when at least one file in `names` exists; returns the first found.
    pub fn require_any_file(&self, names: &[&str]) -> (DetectableResult, Option<PathBuf>) {
        match names.iter().find_map(|name| self.file(name)) {
            Some(path) => (
                DetectableResult::passed(format!("Found {}", path.display())),
                Some(path),
            ),
            None => (
                DetectableResult::FilesNotFound {
                    patterns: names.iter().map(|n| n.to_string()).collect(),
                },
                None,
            ),
        }
    }
}

/// Outcome of the applicable and extractable stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DetectableResult {
    Passed { explanations: Vec<String> },
    FilesNotFound { patterns: Vec<String> },
    ExecutableNotFound { executable: String },
    Failed { reason: String },
}

impl DetectableResult {
    pub fn passed(explanation: impl Into<String>) -> Self {
        DetectableResult::Passed {
            explanations: vec![explanation.into()],
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        DetectableResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, DetectableResult::Passed { .. })
    }

    pub fn description(&self) -> String {
        match self {
            DetectableResult::Passed { explanations } => {
                if explanations.is_empty() {
                    "Passed.".to_string()
                } else {
                    explanations.join("; ")
                }
            }
            DetectableResult::FilesNotFound { patterns } => {
                format!("No files were found with any of the patterns: {}", patterns.join(", "))
            }
            DetectableResult::ExecutableNotFound { executable } => {
                format!("No {} executable was found", executable)
            }
            DetectableResult::Failed { reason } => reason.clone(),
        }
    }
}

impl std::fmt::Display for DetectableResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised inside a detectable's extraction.
///
/// The evaluator records these as [`Extraction::Exception`] and moves on to the
/// next candidate.
#[derive(Debug, Error)]
pub enum DetectableError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Executable {
        command: String,
        status: String,
        stderr: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Parse(String),
}

/// Read a file, attaching its path to any I/O error.
pub fn read_file(path: &Path) -> Result<String, DetectableError> {
    std::fs::read_to_string(path).map_err(|source| DetectableError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// One ecosystem strategy, bound to a single directory.
///
/// `check_applicable` and `check_extractable` may be called repeatedly;
/// `extract` consumes the detectable and therefore runs at most once.
pub trait Detectable: Send {
    /// Cheap check: are the files this strategy needs present?
    fn check_applicable(&mut self) -> DetectableResult;

    /// Can this strategy run here (executables, readable lockfiles, ...)?
    fn check_extractable(&mut self) -> DetectableResult;

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        let env = DetectableEnvironment::new(dir.path());

        assert!(env.require_files(&["Cargo.toml"]).is_passed());
        assert_eq!(
            env.require_files(&["Cargo.toml", "Cargo.lock"]),
            DetectableResult::FilesNotFound {
                patterns: vec!["Cargo.lock".into()]
            }
        );
    }

    #[test]
    fn test_require_any_file_returns_first_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("npm-shrinkwrap.json"), "{}").unwrap();
        let env = DetectableEnvironment::new(dir.path());

        let (result, path) = env.require_any_file(&["package-lock.json", "npm-shrinkwrap.json"]);
        assert!(result.is_passed());
        assert!(path.unwrap().ends_with("npm-shrinkwrap.json"));

        let (result, path) = env.require_any_file(&["yarn.lock"]);
        assert!(!result.is_passed());
        assert!(path.is_none());
    }
}
