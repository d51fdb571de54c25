use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;

/// Package namespace an [`ExternalId`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Forge {
    Cargo,
    Npm,
    Maven,
    Pypi,
}

impl std::fmt::Display for Forge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Forge::Cargo => write!(f, "cargo"),
            Forge::Npm => write!(f, "npm"),
            Forge::Maven => write!(f, "maven"),
            Forge::Pypi => write!(f, "pypi"),
        }
    }
}

/// Fully qualified, forge-namespaced identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalId {
    pub forge: Forge,
    /// Maven group id; `None` for forges without namespaces.
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

impl ExternalId {
    pub fn new(forge: Forge, name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            forge,
            namespace: None,
            name: name.into(),
            version,
        }
    }

    pub fn maven(group: impl Into<String>, artifact: impl Into<String>, version: Option<String>) -> Self {
        Self {
            forge: Forge::Maven,
            namespace: Some(group.into()),
            name: artifact.into(),
            version,
        }
    }

    /// Render as a package URL, e.g. `pkg:maven/org.slf4j/slf4j-api@2.0.9`.
    pub fn to_purl(&self) -> String {
        let mut purl = format!("pkg:{}/", self.forge);
        if let Some(namespace) = &self.namespace {
            purl.push_str(namespace);
            purl.push('/');
        }
        purl.push_str(&self.name);
        if let Some(version) = &self.version {
            purl.push('@');
            purl.push_str(version);
        }
        purl
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_purl())
    }
}

/// A fully identified graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub external_id: ExternalId,
}

impl Dependency {
    pub fn new(forge: Forge, name: impl Into<String>, version: Option<String>) -> Self {
        let name = name.into();
        Self {
            external_id: ExternalId::new(forge, name.clone(), version.clone()),
            name,
            version,
        }
    }

    /// Maven dependencies are named `group:artifact` to retain coordinates.
    pub fn maven(group: &str, artifact: &str, version: Option<String>) -> Self {
        Self {
            name: format!("{}:{}", group, artifact),
            version: version.clone(),
            external_id: ExternalId::maven(group, artifact, version),
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One independently reportable unit of dependency data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeLocation {
    pub graph: DependencyGraph,
    pub external_id: Option<ExternalId>,
    /// Sub-path of the scanned directory this location was read from.
    pub source_path: Option<PathBuf>,
    /// Input the extraction skipped, such as malformed tree lines.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CodeLocation {
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            graph,
            external_id: None,
            source_path: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_external_id(mut self, external_id: ExternalId) -> Self {
        self.external_id = Some(external_id);
        self
    }

    pub fn with_source_path(mut self, source_path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Outcome of [`Detectable::extract`](crate::detector::Detectable::extract).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Extraction {
    Success {
        code_locations: Vec<CodeLocation>,
        project_name: Option<String>,
        project_version: Option<String>,
    },
    /// The detectable ran but could not produce a graph.
    Failure { description: String },
    /// The detectable raised an error.
    Exception { error: String },
}

impl Extraction {
    pub fn success(code_locations: Vec<CodeLocation>) -> Self {
        Extraction::Success {
            code_locations,
            project_name: None,
            project_version: None,
        }
    }

    pub fn success_with_project(
        code_locations: Vec<CodeLocation>,
        project_name: Option<String>,
        project_version: Option<String>,
    ) -> Self {
        Extraction::Success {
            code_locations,
            project_name,
            project_version,
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Extraction::Failure {
            description: description.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Extraction::Success { .. })
    }

    pub fn code_locations(&self) -> &[CodeLocation] {
        match self {
            Extraction::Success { code_locations, .. } => code_locations,
            _ => &[],
        }
    }

    pub fn description(&self) -> String {
        match self {
            Extraction::Success { code_locations, .. } => {
                format!("Extracted {} code location(s)", code_locations.len())
            }
            Extraction::Failure { description } => description.clone(),
            Extraction::Exception { error } => format!("Exception: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purl_rendering() {
        let npm = ExternalId::new(Forge::Npm, "left-pad", Some("1.3.0".into()));
        assert_eq!(npm.to_purl(), "pkg:npm/left-pad@1.3.0");

        let maven = ExternalId::maven("org.slf4j", "slf4j-api", Some("2.0.9".into()));
        assert_eq!(maven.to_purl(), "pkg:maven/org.slf4j/slf4j-api@2.0.9");

        let unversioned = ExternalId::new(Forge::Pypi, "requests", None);
        assert_eq!(unversioned.to_purl(), "pkg:pypi/requests");
    }

    #[test]
    fn test_extraction_description() {
        assert_eq!(
            Extraction::failure("lockfile too old").description(),
            "lockfile too old"
        );
        assert!(Extraction::success(Vec::new()).is_success());
        assert!(Extraction::success(Vec::new()).code_locations().is_empty());
    }
}
