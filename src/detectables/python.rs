use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::detector::detectable::read_file;
use crate::detector::{Detectable, DetectableEnvironment, DetectableError, DetectableResult};
use crate::graph::{DependencyGraph, LazyDependencyGraphBuilder, LazyId};
use crate::models::{CodeLocation, Dependency, Extraction, Forge};

/// Pip treats `-`, `_` and `.` as equivalent and names as case-insensitive.
fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(['_', '.'], "-")
}

fn flat_graph(dependencies: Vec<Dependency>) -> Result<DependencyGraph, DetectableError> {
    let mut builder = LazyDependencyGraphBuilder::new();
    for dependency in dependencies {
        let id = match &dependency.version {
            Some(version) => LazyId::name_version(&dependency.name, version),
            None => LazyId::name(&dependency.name),
        };
        builder.set_dependency_info(id.clone(), dependency);
        builder.add_root(id);
    }
    Ok(builder.build()?)
}

/// Pinned packages from the `default` section of `Pipfile.lock`.
pub struct PipenvLockDetectable {
    environment: DetectableEnvironment,
}

impl PipenvLockDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
        }
    }
}

impl Detectable for PipenvLockDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["Pipfile.lock"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        DetectableResult::passed("Pipfile.lock is read directly")
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let content = read_file(&self.environment.directory().join("Pipfile.lock"))?;
        let graph = flat_graph(parse_pipfile_lock(&content)?)?;
        Ok(Extraction::success(vec![CodeLocation::new(graph)]))
    }
}

fn parse_pipfile_lock(content: &str) -> Result<Vec<Dependency>, DetectableError> {
    let json: Value = serde_json::from_str(content)?;
    let packages = json
        .get("default")
        .and_then(|v| v.as_object())
        .ok_or_else(|| DetectableError::Parse("Pipfile.lock has no 'default' section".into()))?;

    Ok(packages
        .iter()
        .map(|(name, info)| {
            let version = info
                .get("version")
                .and_then(|v| v.as_str())
                .map(|v| v.trim_start_matches("==").to_string());
            Dependency::new(Forge::Pypi, normalize_name(name), version)
        })
        .collect())
}

/// Declarations from `requirements.txt`.
pub struct PipRequirementsDetectable {
    environment: DetectableEnvironment,
}

impl PipRequirementsDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
        }
    }
}

impl Detectable for PipRequirementsDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["requirements.txt"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        DetectableResult::passed("requirements.txt is read directly")
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let content = read_file(&self.environment.directory().join("requirements.txt"))?;
        let graph = flat_graph(parse_requirements(&content)?)?;
        Ok(Extraction::success(vec![CodeLocation::new(graph)]))
    }
}

/// `name[extras] == version ; marker`. Only exact pins keep their version.
fn parse_requirements(content: &str) -> Result<Vec<Dependency>, DetectableError> {
    let re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9_\-\.]*)\s*(?:\[[^\]]*\])?\s*(?:==\s*([^\s;,]+))?")
        .map_err(|e| DetectableError::Parse(e.to_string()))?;
    let mut deps = Vec::new();

    for line in content.lines() {
        let line = line.split(" #").next().unwrap_or_default().trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        match re.captures(line) {
            Some(caps) => {
                let version = caps.get(2).map(|m| m.as_str().to_string());
                deps.push(Dependency::new(Forge::Pypi, normalize_name(&caps[1]), version));
            }
            None => debug!(%line, "skipping unrecognised requirement"),
        }
    }

    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pypi(name: &str, version: Option<&str>) -> Dependency {
        Dependency::new(Forge::Pypi, name, version.map(str::to_string))
    }

    #[test]
    fn test_parse_requirements() {
        let content = "\
# comment
-r base.txt
--index-url https://pypi.example.com/simple
requests==2.28.1
flask>=2.0.0
numpy==1.24.0 ; python_version >= '3.8'
uvicorn[standard]==0.23.2  # server
Django_Rest.Framework
";
        let deps = parse_requirements(content).unwrap();
        assert_eq!(
            deps,
            vec![
                pypi("requests", Some("2.28.1")),
                pypi("flask", None),
                pypi("numpy", Some("1.24.0")),
                pypi("uvicorn", Some("0.23.2")),
                pypi("django-rest-framework", None),
            ]
        );
    }

    #[test]
    fn test_parse_pipfile_lock_default_only() {
        let content = r#"{
  "_meta": {"hash": {"sha256": "abc"}},
  "default": {
    "requests": {"version": "==2.31.0"},
    "certifi": {"version": "==2023.7.22"}
  },
  "develop": {
    "pytest": {"version": "==7.4.0"}
  }
}"#;
        let mut deps = parse_pipfile_lock(content).unwrap();
        deps.sort();
        assert_eq!(
            deps,
            vec![pypi("certifi", Some("2023.7.22")), pypi("requests", Some("2.31.0"))]
        );
    }

    #[test]
    fn test_pipfile_lock_without_default_fails() {
        assert!(matches!(
            parse_pipfile_lock(r#"{"develop": {}}"#),
            Err(DetectableError::Parse(_))
        ));
    }

    #[test]
    fn test_requirements_detectable_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests==2.28.1\nflask\n").unwrap();
        let env = DetectableEnvironment::new(dir.path());

        let mut detectable = Box::new(PipRequirementsDetectable::new(&env));
        assert!(detectable.check_applicable().is_passed());
        let extraction = detectable.extract().unwrap();
        let graph = &extraction.code_locations()[0].graph;
        assert!(graph.is_root(&pypi("requests", Some("2.28.1"))));
        assert!(graph.is_root(&pypi("flask", None)));
    }
}
