use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::PathBuf;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::warn;

use super::executable::{find_executable, find_local_executable, run};
use crate::detector::detectable::read_file;
use crate::detector::{Detectable, DetectableEnvironment, DetectableError, DetectableResult};
use crate::graph::depth::glyph_depth;
use crate::graph::{DepthTreeParser, LazyDependencyGraphBuilder, LazyId, TreeLine};
use crate::models::{CodeLocation, Dependency, Extraction};

/// Width of one level in `dependency:tree` output (`+- `, `|  `, `\- `).
const TREE_INDENT: usize = 3;

// ---------------------------------------------------------------------------
// mvn dependency:tree
// ---------------------------------------------------------------------------

/// Runs `dependency:tree` through the project's wrapper or `mvn`.
pub struct MavenCliDetectable {
    environment: DetectableEnvironment,
    maven: Option<PathBuf>,
}

impl MavenCliDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
            maven: None,
        }
    }
}

impl Detectable for MavenCliDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["pom.xml"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        self.maven = find_local_executable(self.environment.directory(), "mvnw").or_else(|| find_executable("mvn"));
        match &self.maven {
            Some(maven) => DetectableResult::passed(format!("Found maven at {}", maven.display())),
            None => DetectableResult::ExecutableNotFound {
                executable: "mvn".into(),
            },
        }
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let Some(maven) = self.maven else {
            return Ok(Extraction::failure("maven executable was not resolved"));
        };
        let output = run(&maven, &["dependency:tree", "-B"], self.environment.directory())?;

        let modules = parse_maven_tree(&output)?;
        if modules.is_empty() {
            return Ok(Extraction::failure("dependency:tree printed no modules"));
        }

        let project_name = modules.first().map(|(project, _)| project.name.clone());
        let project_version = modules.first().and_then(|(project, _)| project.version.clone());
        let code_locations = modules.into_iter().map(|(_, location)| location).collect();

        Ok(Extraction::success_with_project(code_locations, project_name, project_version))
    }
}

/// `group:artifact:type[:classifier]:version[:scope]`, optionally followed by
/// annotations such as `(version managed from 1.0)`.
fn parse_coordinates(descriptor: &str, has_scope: bool) -> Result<Dependency, String> {
    let coordinates = descriptor.split_whitespace().next().unwrap_or_default();
    let parts: Vec<&str> = coordinates.split(':').collect();
    let version_index = match (parts.len(), has_scope) {
        (4, false) | (5, true) => 3,
        (5, false) | (6, true) => 4,
        _ => return Err(format!("unrecognised maven coordinates '{}'", coordinates)),
    };
    Ok(Dependency::maven(parts[0], parts[1], Some(parts[version_index].to_string())))
}

fn parse_tree_line(line: &str) -> Result<Option<TreeLine>, String> {
    let (depth, descriptor) = glyph_depth(line.trim_end(), TREE_INDENT);
    if descriptor.is_empty() {
        return Ok(None);
    }
    let dependency = parse_coordinates(descriptor, true)?;
    let id = LazyId::name_version(&dependency.name, dependency.version.clone().unwrap_or_default());
    Ok(Some(TreeLine { depth, id, dependency }))
}

/// Content of `[INFO]` lines; other log levels are not part of the tree.
fn info_content(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("[INFO]")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// One `(project, code location)` per module printed by `dependency:tree`.
fn parse_maven_tree(output: &str) -> Result<Vec<(Dependency, CodeLocation)>, DetectableError> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    let mut in_tree = false;

    for line in output.lines() {
        let Some(content) = info_content(line) else {
            in_tree = false;
            continue;
        };
        if content.starts_with("--- ") && content.contains(":tree ") {
            sections.push(Vec::new());
            in_tree = true;
            continue;
        }
        if !in_tree {
            continue;
        }
        if content.trim().is_empty() || content.starts_with("---") {
            in_tree = false;
            continue;
        }
        if let Some(section) = sections.last_mut() {
            section.push(content);
        }
    }

    let parser = DepthTreeParser::new(1);
    let mut modules = Vec::new();
    for section in sections {
        let Some((project_line, lines)) = section.split_first() else {
            continue;
        };
        let project = parse_coordinates(project_line.trim(), false).map_err(DetectableError::Parse)?;

        let mut builder = LazyDependencyGraphBuilder::new();
        let report = parser.parse(lines.iter().copied(), &mut builder, parse_tree_line);
        for warning in &report.warnings {
            warn!(project = %project, "dependency:tree: {}", warning);
        }
        let location = CodeLocation::new(builder.build()?)
            .with_external_id(project.external_id.clone())
            .with_warnings(report.warnings);
        modules.push((project, location));
    }
    Ok(modules)
}

// ---------------------------------------------------------------------------
// pom.xml
// ---------------------------------------------------------------------------

/// Direct dependencies declared in `pom.xml`.
pub struct MavenPomDetectable {
    environment: DetectableEnvironment,
}

impl MavenPomDetectable {
    pub fn new(environment: &DetectableEnvironment) -> Self {
        Self {
            environment: environment.clone(),
        }
    }
}

impl Detectable for MavenPomDetectable {
    fn check_applicable(&mut self) -> DetectableResult {
        self.environment.require_files(&["pom.xml"])
    }

    fn check_extractable(&mut self) -> DetectableResult {
        let path = self.environment.directory().join("pom.xml");
        match read_file(&path).map(|content| root_element(&content)) {
            Ok(Ok(Some(root))) if root == "project" => DetectableResult::passed("pom.xml declares a project"),
            Ok(Ok(Some(root))) => DetectableResult::failed(format!("pom.xml root element is <{}>, not <project>", root)),
            Ok(Ok(None)) => DetectableResult::failed("pom.xml has no root element"),
            Ok(Err(err)) | Err(err) => DetectableResult::failed(err.to_string()),
        }
    }

    fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
        let content = read_file(&self.environment.directory().join("pom.xml"))?;
        let pom = parse_pom(&content)?;

        let mut builder = LazyDependencyGraphBuilder::new();
        for dependency in &pom.dependencies {
            let id = LazyId::name_version(&dependency.name, dependency.version.clone().unwrap_or_default());
            builder.set_dependency_info(id.clone(), dependency.clone());
            builder.add_root(id);
        }

        let mut code_location = CodeLocation::new(builder.build()?);
        if let (Some(group), Some(artifact)) = (&pom.group_id, &pom.artifact_id) {
            code_location =
                code_location.with_external_id(Dependency::maven(group, artifact, pom.version.clone()).external_id);
        }
        Ok(Extraction::success_with_project(
            vec![code_location],
            pom.artifact_id,
            pom.version,
        ))
    }
}

#[derive(Debug, Default)]
struct Pom {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Default)]
struct DeclaredDependency {
    group_id: String,
    artifact_id: String,
    version: Option<String>,
}

/// A node reached while walking `pom.xml`.
enum PomEvent<'a> {
    Start,
    Text(&'a str),
    End,
}

/// Walk `content`, calling `visit` with the element path of every opening
/// element, text node and closing element. Stops early when `visit` breaks.
fn visit_elements<F>(content: &str, mut visit: F) -> Result<(), DetectableError>
where
    F: FnMut(&[&str], PomEvent<'_>) -> ControlFlow<()>,
{
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        let flow = match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                path.push(String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned());
                let elements: Vec<&str> = path.iter().map(String::as_str).collect();
                visit(&elements, PomEvent::Start)
            }
            Event::End(_) => {
                let elements: Vec<&str> = path.iter().map(String::as_str).collect();
                let flow = visit(&elements, PomEvent::End);
                path.pop();
                flow
            }
            Event::Text(ref e) => {
                let text = e.unescape().unwrap_or_default();
                let elements: Vec<&str> = path.iter().map(String::as_str).collect();
                visit(&elements, PomEvent::Text(&text))
            }
            Event::Eof => break,
            _ => ControlFlow::Continue(()),
        };
        if flow.is_break() {
            break;
        }
        buf.clear();
    }
    Ok(())
}

/// Name of the document's root element; reading stops as soon as it is seen.
fn root_element(content: &str) -> Result<Option<String>, DetectableError> {
    let mut root = None;
    visit_elements(content, |path, event| match event {
        PomEvent::Start => {
            root = path.first().map(|name| name.to_string());
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(()),
    })?;
    Ok(root)
}

fn parse_pom(content: &str) -> Result<Pom, DetectableError> {
    let mut pom = Pom::default();
    let mut parent_group: Option<String> = None;
    let mut parent_version: Option<String> = None;
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut managed: HashMap<String, String> = HashMap::new();
    let mut declared: Vec<DeclaredDependency> = Vec::new();
    let mut current = DeclaredDependency::default();

    visit_elements(content, |path, event| {
        match event {
            PomEvent::Start => {}
            PomEvent::Text(text) => match path {
                ["project", "groupId"] => pom.group_id = Some(text.to_string()),
                ["project", "artifactId"] => pom.artifact_id = Some(text.to_string()),
                ["project", "version"] => pom.version = Some(text.to_string()),
                ["project", "parent", "groupId"] => parent_group = Some(text.to_string()),
                ["project", "parent", "version"] => parent_version = Some(text.to_string()),
                ["project", "properties", name] => {
                    properties.insert(name.to_string(), text.to_string());
                }
                ["project", "dependencies", "dependency", field]
                | ["project", "dependencyManagement", "dependencies", "dependency", field] => match *field {
                    "groupId" => current.group_id = text.to_string(),
                    "artifactId" => current.artifact_id = text.to_string(),
                    "version" => current.version = Some(text.to_string()),
                    _ => {}
                },
                _ => {}
            },
            PomEvent::End => match path {
                ["project", "dependencies", "dependency"] => declared.push(std::mem::take(&mut current)),
                ["project", "dependencyManagement", "dependencies", "dependency"] => {
                    let entry = std::mem::take(&mut current);
                    if let Some(version) = entry.version {
                        managed.insert(format!("{}:{}", entry.group_id, entry.artifact_id), version);
                    }
                }
                // Anything after the project element is not part of the model.
                ["project"] => return ControlFlow::Break(()),
                _ => {}
            },
        }
        ControlFlow::Continue(())
    })?;

    if pom.group_id.is_none() {
        pom.group_id = parent_group;
    }
    if pom.version.is_none() {
        pom.version = parent_version.clone();
    }
    if let Some(version) = &pom.version {
        properties.insert("project.version".into(), version.clone());
        properties.insert("pom.version".into(), version.clone());
    }
    if let Some(group) = &pom.group_id {
        properties.insert("project.groupId".into(), group.clone());
    }
    if let Some(version) = parent_version {
        properties.insert("project.parent.version".into(), version);
    }

    let resolver = PropertyResolver::new(&properties);
    for entry in declared {
        if entry.artifact_id.is_empty() {
            continue;
        }
        let group = resolver.resolve(&entry.group_id);
        let artifact = resolver.resolve(&entry.artifact_id);
        let version = entry
            .version
            .or_else(|| managed.get(&format!("{}:{}", entry.group_id, entry.artifact_id)).cloned())
            .map(|v| resolver.resolve(&v));
        pom.dependencies.push(Dependency::maven(&group, &artifact, version));
    }

    Ok(pom)
}

/// Expands `${name}` references from `<properties>` and the project's own
/// coordinates. Unknown properties are left as written.
struct PropertyResolver<'a> {
    properties: &'a HashMap<String, String>,
    pattern: Option<Regex>,
}

impl<'a> PropertyResolver<'a> {
    /// Properties may refer to other properties; expansion stops after this many passes.
    const MAX_PASSES: usize = 8;

    fn new(properties: &'a HashMap<String, String>) -> Self {
        Self {
            properties,
            pattern: Regex::new(r"\$\{([^}]+)\}").ok(),
        }
    }

    fn resolve(&self, value: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return value.to_string();
        };
        let mut resolved = value.to_string();
        for _ in 0..Self::MAX_PASSES {
            if !pattern.is_match(&resolved) {
                break;
            }
            let next = pattern
                .replace_all(&resolved, |caps: &regex::Captures| {
                    self.properties
                        .get(&caps[1])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
            if next == resolved {
                break;
            }
            resolved = next;
        }
        resolved
    }
}
