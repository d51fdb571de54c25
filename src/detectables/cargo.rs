use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use super::executable::{find_executable, run};
use crate::detector::detectable::read_file;
use crate::detector::{Detectable, DetectableEnvironment, DetectableError, DetectableResult};
use crate::graph::depth::numeric_prefix_depth;
use crate::graph::{DependencyGraph, DepthTreeParser, LazyDependencyGraphBuilder, LazyId, TreeLine};
use crate::models::{CodeLocation, Dependency, Extraction, Forge};

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    /// Packages without a `source` field are local workspace members.
    source: Option<String>,
    /// `"name"`, `"name version"` or `"name version (source)"`.
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Project name and version from `Cargo.toml`, when it declares a `[package]`.
fn read_manifest(path: &Path) -> (Option<String>, Option<String>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return (None, None);
    };
    let Ok(manifest) = toml::from_str::<toml::Value>(&content) else {
        return (None, None);
    };
    let package = manifest.get("package");
    let field = |key: &str| {
        package
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    (field("name"), field("version"))
}

/// Builds the graph from `Cargo.lock`.
pub struct CargoLockfileDetectable {
    environment: DetectableEnvironment,
    lockfile: Option<PathBuf>,
}

impl CargoLockfileDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
            lockfile: None,
        }
    }
}

impl Detectable for CargoLockfileDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["Cargo.toml"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        let result = self.environment.require_files(&["Cargo.lock"]);
        self.lockfile = self.environment.file("Cargo.lock");
        result
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let Some(lockfile) = self.lockfile else {
            return Ok(Extraction::failure("Cargo.lock was not found"));
        };
        let graph = parse_cargo_lock(&read_file(&lockfile)?)?;

        let (name, version) = read_manifest(&self.environment.directory().join("Cargo.toml"));
        let mut code_location = CodeLocation::new(graph);
        if let Some(name) = &name {
            code_location = code_location.with_external_id(Dependency::new(Forge::Cargo, name, version.clone()).external_id);
        }
        Ok(Extraction::success_with_project(vec![code_location], name, version))
    }
}

fn parse_lock_reference(reference: &str) -> LazyId {
    let mut parts = reference.split_whitespace();
    let name = parts.next().unwrap_or(reference);
    match parts.next() {
        Some(version) => LazyId::name_version(name, version),
        None => LazyId::name(name),
    }
}

/// Parse `Cargo.lock` into a graph rooted at the workspace members' dependencies.
fn parse_cargo_lock(content: &str) -> Result<DependencyGraph, DetectableError> {
    let lock: CargoLock = toml::from_str(content)?;
    let mut builder = LazyDependencyGraphBuilder::new();

    for package in &lock.package {
        let id = LazyId::name_version(&package.name, &package.version);
        builder.set_dependency_info(
            id.clone(),
            Dependency::new(Forge::Cargo, &package.name, Some(package.version.clone())),
        );

        let is_member = package.source.is_none();
        for reference in &package.dependencies {
            let child = parse_lock_reference(reference);
            if is_member {
                builder.add_root(child);
            } else {
                builder.add_child_to_parent(child, id.clone());
            }
        }
    }

    // Cargo only writes the version when more than one is locked.
    builder.alias_name_only_references()?;
    Ok(builder.build()?)
}

/// Runs `cargo tree` and parses its depth-prefixed output.
pub struct CargoCliDetectable {
    environment: DetectableEnvironment,
    cargo: Option<PathBuf>,
}

impl CargoCliDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
            cargo: None,
        }
    }
}

impl Detectable for CargoCliDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["Cargo.toml"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        self.cargo = find_executable("cargo");
        match &self.cargo {
            Some(cargo) => DetectableResult::passed(format!("Found cargo at {}", cargo.display())),
            None => DetectableResult::ExecutableNotFound {
                executable: "cargo".into(),
            },
        }
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let Some(cargo) = self.cargo else {
            return Ok(Extraction::failure("cargo executable was not resolved"));
        };
        let directory = self.environment.directory();
        let output = run(
            &cargo,
            &["tree", "--workspace", "--prefix", "depth", "--edges", "normal"],
            directory,
        )?;

        let members = parse_cargo_tree(&output)?;
        if members.is_empty() {
            return Ok(Extraction::failure("cargo tree printed no workspace members"));
        }

        let project_name = members.first().map(|m| m.project.name.clone());
        let project_version = members.first().and_then(|m| m.project.version.clone());
        let code_locations = members
            .into_iter()
            .map(|member| member.into_code_location(directory))
            .collect();

        Ok(Extraction::success_with_project(code_locations, project_name, project_version))
    }
}

fn relative_source_path(directory: &Path, member: &str) -> Option<PathBuf> {
    let relative = Path::new(member).strip_prefix(directory).ok()?;
    (!relative.as_os_str().is_empty()).then(|| relative.to_path_buf())
}

struct CargoTreeMember {
    project: Dependency,
    path: Option<String>,
    graph: DependencyGraph,
    warnings: Vec<String>,
}

impl CargoTreeMember {
    fn into_code_location(self, directory: &Path) -> CodeLocation {
        let mut location = CodeLocation::new(self.graph)
            .with_external_id(self.project.external_id)
            .with_warnings(self.warnings);
        if let Some(path) = self.path.and_then(|p| relative_source_path(directory, &p)) {
            location = location.with_source_path(path);
        }
        location
    }
}

/// Split `name v1.2.3 (source) (*)` into the dependency and the parenthesised source.
fn parse_crate_descriptor(descriptor: &str) -> Result<(Dependency, Option<String>), String> {
    let mut parts = descriptor.splitn(3, ' ');
    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing crate name".to_string())?;
    let version = parts
        .next()
        .and_then(|v| v.strip_prefix('v'))
        .ok_or_else(|| format!("missing version for crate '{}'", name))?;
    let source = parts
        .next()
        .map(|rest| rest.trim_end_matches("(*)").trim())
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::to_string);

    Ok((Dependency::new(Forge::Cargo, name, Some(version.to_string())), source))
}

fn parse_tree_line(line: &str) -> Result<Option<TreeLine>, String> {
    let Some((depth, descriptor)) = numeric_prefix_depth(line.trim_end())? else {
        return Ok(None);
    };
    let (dependency, _) = parse_crate_descriptor(descriptor)?;
    let id = LazyId::name_version(&dependency.name, dependency.version.clone().unwrap_or_default());
    Ok(Some(TreeLine { depth, id, dependency }))
}

/// One graph per depth-0 workspace member in `cargo tree --prefix depth` output.
fn parse_cargo_tree(output: &str) -> Result<Vec<CargoTreeMember>, DetectableError> {
    let mut sections: Vec<(&str, Vec<&str>)> = Vec::new();
    for line in output.lines() {
        match numeric_prefix_depth(line) {
            Ok(Some((0, project))) => sections.push((project, Vec::new())),
            _ => {
                if let Some((_, lines)) = sections.last_mut() {
                    lines.push(line);
                }
            }
        }
    }

    let parser = DepthTreeParser::new(1);
    let mut members = Vec::new();
    for (project_line, lines) in sections {
        let (project, path) = parse_crate_descriptor(project_line).map_err(DetectableError::Parse)?;

        let mut builder = LazyDependencyGraphBuilder::new();
        let report = parser.parse(lines, &mut builder, parse_tree_line);
        for warning in &report.warnings {
            warn!(project = %project, "cargo tree: {}", warning);
        }

        members.push(CargoTreeMember {
            project,
            path,
            graph: builder.build()?,
            warnings: report.warnings,
        });
    }
    Ok(members)
}
