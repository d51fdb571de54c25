use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::warn;

use crate::detector::detectable::read_file;
use crate::detector::{Detectable, DetectableEnvironment, DetectableError, DetectableResult};
use crate::graph::{DependencyGraph, LazyDependencyGraphBuilder, LazyId};
use crate::models::{CodeLocation, Dependency, Extraction, Forge};

const PACKAGE_LOCK_FILES: &[&str] = &["package-lock.json", "npm-shrinkwrap.json"];

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// `name → range` pairs from a `dependencies`-style object.
fn dependency_map(value: &Value, key: &str) -> Vec<(String, String)> {
    value
        .get(key)
        .and_then(|v| v.as_object())
        .map(|deps| {
            deps.iter()
                .map(|(name, range)| (name.clone(), range.as_str().unwrap_or("*").to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn success(graph: DependencyGraph, name: Option<String>, version: Option<String>) -> Extraction {
    let mut code_location = CodeLocation::new(graph);
    if let Some(name) = &name {
        code_location = code_location.with_external_id(Dependency::new(Forge::Npm, name, version.clone()).external_id);
    }
    Extraction::success_with_project(vec![code_location], name, version)
}

// ---------------------------------------------------------------------------
// package-lock.json
// ---------------------------------------------------------------------------

/// Reads `package-lock.json` (or `npm-shrinkwrap.json`), lockfile version 2 or 3.
pub struct NpmPackageLockDetectable {
    environment: DetectableEnvironment,
    lockfile: Option<PathBuf>,
}

impl NpmPackageLockDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
            lockfile: None,
        }
    }
}

impl Detectable for NpmPackageLockDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        let (result, lockfile) = self.environment.require_any_file(PACKAGE_LOCK_FILES);
        self.lockfile = lockfile;
        result
    }

    fn check_extractable(&mut self) -> DetectableResult {
        match &self.lockfile {
            Some(_) => DetectableResult::passed("Lockfile located"),
            None => self.check_applicable(),
        }
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let Some(lockfile) = self.lockfile else {
            return Ok(Extraction::failure("No npm lockfile was found"));
        };
        let json: Value = serde_json::from_str(&read_file(&lockfile)?)?;

        let lockfile_version = json.get("lockfileVersion").and_then(|v| v.as_u64()).unwrap_or(1);
        if lockfile_version < 2 {
            return Ok(Extraction::failure(format!(
                "lockfileVersion {} is not supported; regenerate the lockfile with npm 7 or newer",
                lockfile_version
            )));
        }

        let graph = parse_package_lock(&json)?;
        Ok(success(graph, string_field(&json, "name"), string_field(&json, "version")))
    }
}

/// Name of the package installed at `path`: `node_modules/a/node_modules/@s/b` → `@s/b`.
fn package_name_from_path(path: &str) -> &str {
    match path.rfind("node_modules/") {
        Some(index) => &path[index + "node_modules/".len()..],
        None => path,
    }
}

/// Node's upward lookup: the nearest `node_modules/<name>` visible from `from`.
fn resolve_install_path(packages: &Map<String, Value>, from: &str, name: &str) -> Option<String> {
    let mut base = from.to_string();
    loop {
        let candidate = if base.is_empty() {
            format!("node_modules/{}", name)
        } else {
            format!("{}/node_modules/{}", base, name)
        };
        if packages.contains_key(&candidate) {
            return Some(candidate);
        }
        if base.is_empty() {
            return None;
        }
        base = match base.rfind("/node_modules/") {
            Some(index) => base[..index].to_string(),
            None => String::new(),
        };
    }
}

fn parse_package_lock(json: &Value) -> Result<DependencyGraph, DetectableError> {
    let packages = json
        .get("packages")
        .and_then(|v| v.as_object())
        .ok_or_else(|| DetectableError::Parse("lockfile has no 'packages' section".into()))?;

    let mut builder = LazyDependencyGraphBuilder::new();

    for (path, info) in packages {
        if path.is_empty() {
            continue;
        }
        let name = string_field(info, "name").unwrap_or_else(|| package_name_from_path(path).to_string());
        builder.set_dependency_info(
            LazyId::key(path),
            Dependency::new(Forge::Npm, name, string_field(info, "version")),
        );
    }

    for (path, info) in packages {
        let required = dependency_map(info, "dependencies").into_iter().map(|d| (d, false));
        let optional = dependency_map(info, "optionalDependencies")
            .into_iter()
            .map(|d| (d, true));

        for ((name, _range), is_optional) in required.chain(optional) {
            let Some(child) = resolve_install_path(packages, path, &name) else {
                if !is_optional {
                    warn!(package = %path, dependency = %name, "dependency is not installed in the lockfile");
                }
                continue;
            };
            if path.is_empty() {
                builder.add_root(LazyId::key(child));
            } else {
                builder.add_child_to_parent(LazyId::key(child), LazyId::key(path));
            }
        }
    }

    Ok(builder.build()?)
}

// ---------------------------------------------------------------------------
// package.json
// ---------------------------------------------------------------------------

/// Declared dependencies only; versions are the declared ranges.
pub struct NpmPackageJsonDetectable {
    environment: DetectableEnvironment,
}

impl NpmPackageJsonDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
        }
    }
}

impl Detectable for NpmPackageJsonDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["package.json"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        DetectableResult::passed("package.json is read directly")
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let path = self.environment.directory().join("package.json");
        let json: Value = serde_json::from_str(&read_file(&path)?)?;

        let mut builder = LazyDependencyGraphBuilder::new();
        for (name, range) in dependency_map(&json, "dependencies") {
            let id = LazyId::name_version(&name, &range);
            builder.set_dependency_info(id.clone(), Dependency::new(Forge::Npm, name, Some(range)));
            builder.add_root(id);
        }

        Ok(success(
            builder.build()?,
            string_field(&json, "name"),
            string_field(&json, "version"),
        ))
    }
}

// ---------------------------------------------------------------------------
// yarn.lock
// ---------------------------------------------------------------------------

/// Reads a classic (v1) `yarn.lock` together with `package.json`.
pub struct YarnLockDetectable {
    environment: DetectableEnvironment,
}

impl YarnLockDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
        }
    }
}

impl Detectable for YarnLockDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["yarn.lock"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        self.environment.require_files(&["package.json"])
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let directory = self.environment.directory();
        let package_json: Value = serde_json::from_str(&read_file(&directory.join("package.json"))?)?;
        let lock = read_file(&directory.join("yarn.lock"))?;

        if lock.lines().any(|l| l.starts_with("__metadata:")) {
            return Ok(Extraction::failure("yarn berry lockfiles are not supported"));
        }

        let roots = dependency_map(&package_json, "dependencies");
        let graph = parse_yarn_lock(&lock, &roots)?;
        Ok(success(
            graph,
            string_field(&package_json, "name"),
            string_field(&package_json, "version"),
        ))
    }
}

#[derive(Default)]
struct YarnEntry {
    specs: Vec<String>,
    version: Option<String>,
    dependencies: Vec<(String, String)>,
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// `@scope/name@^1.0.0` → `@scope/name`.
fn spec_name(spec: &str) -> &str {
    match spec.get(1..).and_then(|rest| rest.find('@')) {
        Some(index) => &spec[..index + 1],
        None => spec,
    }
}

fn spec_key(name: &str, range: &str) -> LazyId {
    LazyId::key(format!("{}@{}", name, range))
}

/// Every `name@range` spec becomes a key aliased to the resolved `name@version`.
fn parse_yarn_lock(content: &str, roots: &[(String, String)]) -> Result<DependencyGraph, DetectableError> {
    let mut entries: Vec<YarnEntry> = Vec::new();
    let mut in_dependencies = false;

    for line in content.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if indent == 0 {
            let header = trimmed.trim_end_matches(':');
            entries.push(YarnEntry {
                specs: header.split(',').map(|s| unquote(s).to_string()).collect(),
                ..YarnEntry::default()
            });
            in_dependencies = false;
            continue;
        }

        let Some(entry) = entries.last_mut() else { continue };
        if indent <= 2 {
            in_dependencies = matches!(trimmed, "dependencies:" | "optionalDependencies:");
            if let Some(version) = trimmed.strip_prefix("version ") {
                entry.version = Some(unquote(version).to_string());
            }
        } else if in_dependencies {
            if let Some((name, range)) = trimmed.split_once(' ') {
                entry.dependencies.push((unquote(name).to_string(), unquote(range).to_string()));
            }
        }
    }

    let mut builder = LazyDependencyGraphBuilder::new();
    for entry in entries {
        let Some(first) = entry.specs.first() else { continue };
        let Some(version) = entry.version else {
            warn!(entry = %first, "yarn.lock entry has no version");
            continue;
        };
        let name = spec_name(first).to_string();
        let resolved = LazyId::name_version(&name, &version);
        builder.set_dependency_info(resolved.clone(), Dependency::new(Forge::Npm, name, Some(version)));

        for spec in &entry.specs {
            builder.set_alias(LazyId::key(spec), resolved.clone());
        }
        for (dependency, range) in &entry.dependencies {
            builder.add_child_to_parent(spec_key(dependency, range), resolved.clone());
        }
    }

    for (name, range) in roots {
        builder.add_root(spec_key(name, range));
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphError;

    fn npm(name: &str, version: &str) -> Dependency {
        Dependency::new(Forge::Npm, name, Some(version.into()))
    }

    #[test]
    fn test_parse_package_lock_resolves_nested_installs() {
        let json: Value = serde_json::from_str(
            r#"{
  "name": "web",
  "version": "1.0.0",
  "lockfileVersion": 3,
  "packages": {
    "": {
      "name": "web",
      "dependencies": { "express": "^4.18.0", "debug": "^4.0.0" },
      "optionalDependencies": { "fsevents": "^2.3.0" }
    },
    "node_modules/express": {
      "version": "4.18.2",
      "dependencies": { "debug": "2.6.9", "@types/qs": "*" }
    },
    "node_modules/express/node_modules/debug": { "version": "2.6.9" },
    "node_modules/debug": { "version": "4.3.4", "dependencies": { "ms": "2.1.2" } },
    "node_modules/ms": { "version": "2.1.2" },
    "node_modules/@types/qs": { "version": "6.9.7" }
  }
}"#,
        )
        .unwrap();

        let graph = parse_package_lock(&json).unwrap();

        assert!(graph.is_root(&npm("express", "4.18.2")));
        assert!(graph.is_root(&npm("debug", "4.3.4")));
        assert!(graph.has_edge(&npm("express", "4.18.2"), &npm("debug", "2.6.9")));
        assert!(graph.has_edge(&npm("express", "4.18.2"), &npm("@types/qs", "6.9.7")));
        assert!(graph.has_edge(&npm("debug", "4.3.4"), &npm("ms", "2.1.2")));
        assert!(!graph.has_edge(&npm("express", "4.18.2"), &npm("debug", "4.3.4")));
    }

    #[test]
    fn test_package_name_from_path() {
        assert_eq!(package_name_from_path("node_modules/a/node_modules/@s/b"), "@s/b");
        assert_eq!(package_name_from_path("packages/app"), "packages/app");
    }

    #[test]
    fn test_old_lockfile_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package-lock.json"),
            r#"{"lockfileVersion": 1, "dependencies": {}}"#,
        )
        .unwrap();
        let env = DetectableEnvironment::new(dir.path());

        let mut detectable = Box::new(NpmPackageLockDetectable::new(&env));
        assert!(detectable.check_applicable().is_passed());
        assert!(detectable.check_extractable().is_passed());
        let extraction = detectable.extract().unwrap();
        assert!(matches!(extraction, Extraction::Failure { .. }));
    }

    #[test]
    fn test_package_json_declared_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "web", "version": "1.0.0", "dependencies": {"react": "^18.2.0"}}"#,
        )
        .unwrap();
        let env = DetectableEnvironment::new(dir.path());

        let extraction = Box::new(NpmPackageJsonDetectable::new(&env)).extract().unwrap();
        let graph = &extraction.code_locations()[0].graph;
        assert!(graph.is_root(&npm("react", "^18.2.0")));
    }

    const YARN_LOCK: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
  version "7.22.13"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.22.13.tgz"
  dependencies:
    "@babel/highlight" "^7.22.13"
    chalk "^2.4.2"

"@babel/highlight@^7.22.13":
  version "7.22.20"

chalk@^2.4.2:
  version "2.4.2"
"#;

    #[test]
    fn test_parse_yarn_lock_aliases_specs() {
        let roots = vec![
            ("@babel/code-frame".to_string(), "^7.10.4".to_string()),
            ("chalk".to_string(), "^2.4.2".to_string()),
        ];
        let graph = parse_yarn_lock(YARN_LOCK, &roots).unwrap();

        assert!(graph.is_root(&npm("@babel/code-frame", "7.22.13")));
        assert!(graph.is_root(&npm("chalk", "2.4.2")));
        assert!(graph.has_edge(&npm("@babel/code-frame", "7.22.13"), &npm("@babel/highlight", "7.22.20")));
        assert!(graph.has_edge(&npm("@babel/code-frame", "7.22.13"), &npm("chalk", "2.4.2")));
    }

    #[test]
    fn test_yarn_root_missing_from_lock_fails() {
        let roots = vec![("left-pad".to_string(), "^1.3.0".to_string())];
        let err = parse_yarn_lock(YARN_LOCK, &roots).unwrap_err();
        assert!(matches!(
            err,
            DetectableError::Graph(GraphError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn test_spec_name() {
        assert_eq!(spec_name("@babel/core@^7.0.0"), "@babel/core");
        assert_eq!(spec_name("lodash@^4.17.21"), "lodash");
        assert_eq!(spec_name("lodash"), "lodash");
    }
}
