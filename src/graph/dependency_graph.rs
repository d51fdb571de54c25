use std::collections::{BTreeMap, BTreeSet};

use serde::ser::{Serialize, Serializer};

use crate::models::Dependency;

/// Finalized dependency graph.
///
/// Ordered collections keep iteration (and therefore reports) deterministic, and
/// make two graphs built from the same facts compare equal regardless of the
/// order those facts were recorded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    roots: BTreeSet<Dependency>,
    children: BTreeMap<Dependency, BTreeSet<Dependency>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a direct dependency of the scanned project.
    pub fn add_root(&mut self, dependency: Dependency) {
        self.roots.insert(dependency);
    }

    /// Record `parent → child`. Repeated edges are collapsed.
    pub fn add_child(&mut self, parent: Dependency, child: Dependency) {
        self.children.entry(parent).or_default().insert(child);
    }

    pub fn root_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.roots.iter()
    }

    pub fn is_root(&self, dependency: &Dependency) -> bool {
        self.roots.contains(dependency)
    }

    pub fn has_edge(&self, parent: &Dependency, child: &Dependency) -> bool {
        self.children
            .get(parent)
            .map_or(false, |children| children.contains(child))
    }

    /// Every `(parent, child)` edge in order.
    pub fn edges(&self) -> impl Iterator<Item = (&Dependency, &Dependency)> {
        self.children
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |child| (parent, child)))
    }

    /// Every distinct node reachable from a root or an edge.
    pub fn dependencies(&self) -> BTreeSet<&Dependency> {
        let mut nodes: BTreeSet<&Dependency> = self.roots.iter().collect();
        for (parent, child) in self.edges() {
            nodes.insert(parent);
            nodes.insert(child);
        }
        nodes
    }

    pub fn len(&self) -> usize {
        self.dependencies().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.children.is_empty()
    }
}

/// Flat, JSON-friendly view: components plus relationships keyed by package URL.
#[derive(serde::Serialize)]
struct GraphRecord<'a> {
    components: Vec<&'a Dependency>,
    roots: Vec<String>,
    relationships: Vec<Relationship>,
}

#[derive(serde::Serialize)]
struct Relationship {
    parent: String,
    children: Vec<String>,
}

impl Serialize for DependencyGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = GraphRecord {
            components: self.dependencies().into_iter().collect(),
            roots: self
                .roots
                .iter()
                .map(|d| d.external_id.to_purl())
                .collect(),
            relationships: self
                .children
                .iter()
                .map(|(parent, children)| Relationship {
                    parent: parent.external_id.to_purl(),
                    children: children.iter().map(|c| c.external_id.to_purl()).collect(),
                })
                .collect(),
        };
        record.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Forge;

    fn dep(name: &str) -> Dependency {
        Dependency::new(Forge::Npm, name, Some("1.0.0".into()))
    }

    #[test]
    fn test_edges_are_deduplicated() {
        let mut graph = DependencyGraph::new();
        graph.add_root(dep("a"));
        graph.add_root(dep("a"));
        graph.add_child(dep("a"), dep("b"));
        graph.add_child(dep("a"), dep("b"));

        assert_eq!(graph.root_dependencies().count(), 1);
        assert_eq!(graph.edges().count(), 1);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_serializes_relationships_by_purl() {
        let mut graph = DependencyGraph::new();
        graph.add_root(dep("a"));
        graph.add_child(dep("a"), dep("b"));

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["roots"][0], "pkg:npm/a@1.0.0");
        assert_eq!(json["relationships"][0]["parent"], "pkg:npm/a@1.0.0");
        assert_eq!(json["relationships"][0]["children"][0], "pkg:npm/b@1.0.0");
        assert_eq!(json["components"].as_array().unwrap().len(), 2);
    }
}
