use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DependencyGraph, GraphError};
use crate::models::Dependency;

/// Key for a graph node whose identity may not be known yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LazyId {
    /// Name-only reference, reconciled later (see
    /// [`LazyDependencyGraphBuilder::alias_name_only_references`]).
    Name(String),
    NameVersion(String, String),
    /// Ecosystem-specific key such as an install path or a `name@range` spec.
    Key(String),
}

impl LazyId {
    pub fn name(name: impl Into<String>) -> Self {
        LazyId::Name(name.into())
    }

    pub fn name_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        LazyId::NameVersion(name.into(), version.into())
    }

    pub fn key(key: impl Into<String>) -> Self {
        LazyId::Key(key.into())
    }
}

impl std::fmt::Display for LazyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LazyId::Name(name) => write!(f, "'{}'", name),
            LazyId::NameVersion(name, version) => write!(f, "'{}' version '{}'", name, version),
            LazyId::Key(key) => write!(f, "key '{}'", key),
        }
    }
}

/// Accumulates dependency facts in any order and resolves them in [`build`](Self::build).
///
/// Edges may reference identifiers before (or without) their info being recorded;
/// nothing is validated until finalization. One builder per extraction.
#[derive(Debug, Default)]
pub struct LazyDependencyGraphBuilder {
    roots: Vec<LazyId>,
    /// `(parent, child)` pairs.
    edges: Vec<(LazyId, LazyId)>,
    /// Every distinct identity recorded per id; more than one is a conflict.
    infos: HashMap<LazyId, BTreeSet<Dependency>>,
    /// Every distinct target declared per alias; more than one is a conflict.
    aliases: HashMap<LazyId, BTreeSet<LazyId>>,
}

impl LazyDependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, id: LazyId) {
        self.roots.push(id);
    }

    pub fn add_child_to_parent(&mut self, child: LazyId, parent: LazyId) {
        self.edges.push((parent, child));
    }

    pub fn add_parent_with_child(&mut self, parent: LazyId, child: LazyId) {
        self.edges.push((parent, child));
    }

    /// Record the identity of `id`.
    ///
    /// Repeating an identical identity is harmless; recording a different one for
    /// the same id makes [`build`](Self::build) fail with
    /// [`GraphError::ConflictingIdentity`].
    pub fn set_dependency_info(&mut self, id: LazyId, dependency: Dependency) {
        self.infos.entry(id).or_default().insert(dependency);
    }

    /// Declare that `alias` refers to the same package as `target`.
    ///
    /// Aliases take precedence over info recorded directly on `alias`. Declaring
    /// two different targets for one alias makes [`build`](Self::build) fail with
    /// [`GraphError::ConflictingAlias`].
    pub fn set_alias(&mut self, alias: LazyId, target: LazyId) {
        if alias != target {
            self.aliases.entry(alias).or_default().insert(target);
        }
    }

    /// Alias every referenced, unresolved [`LazyId::Name`] to the single described
    /// [`LazyId::NameVersion`] carrying that name.
    ///
    /// Fails with [`GraphError::AmbiguousVersion`] when several versions of the
    /// name were described. Names with no described version are left alone and
    /// surface as missing identities in [`build`](Self::build).
    pub fn alias_name_only_references(&mut self) -> Result<(), GraphError> {
        let mut versions_by_name: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in self.infos.keys() {
            if let LazyId::NameVersion(name, version) = id {
                versions_by_name.entry(name).or_default().insert(version);
            }
        }

        let referenced: BTreeSet<&LazyId> = self
            .roots
            .iter()
            .chain(self.edges.iter().flat_map(|(p, c)| [p, c]))
            .chain(self.aliases.values().flatten())
            .collect();

        let mut resolved = Vec::new();
        for id in referenced {
            let LazyId::Name(name) = id else { continue };
            if self.infos.contains_key(id) || self.aliases.contains_key(id) {
                continue;
            }
            match versions_by_name.get(name.as_str()) {
                Some(versions) if versions.len() == 1 => {
                    let version = versions.iter().next().copied().unwrap_or_default();
                    resolved.push((id.clone(), LazyId::name_version(name.clone(), version)));
                }
                Some(versions) => {
                    return Err(GraphError::AmbiguousVersion {
                        name: name.clone(),
                        versions: versions.iter().map(|v| v.to_string()).collect(),
                    });
                }
                None => {}
            }
        }

        for (alias, target) in resolved {
            self.set_alias(alias, target);
        }
        Ok(())
    }

    /// Resolve every recorded fact into a [`DependencyGraph`].
    ///
    /// Conflicting aliases or identities are reported before anything is resolved,
    /// smallest id first, so the outcome never depends on the order facts arrived in.
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        self.check_conflicts()?;
        let mut graph = DependencyGraph::new();

        for root in &self.roots {
            graph.add_root(self.resolve(root)?);
        }

        for (parent, child) in &self.edges {
            let parent = self.resolve(parent)?;
            let child = self.resolve(child)?;
            if parent == child {
                tracing::trace!(dependency = %parent, "dropping self edge");
                continue;
            }
            graph.add_child(parent, child);
        }

        Ok(graph)
    }

    fn check_conflicts(&self) -> Result<(), GraphError> {
        let conflicting_alias = self
            .aliases
            .iter()
            .filter(|(_, targets)| targets.len() > 1)
            .min_by_key(|(alias, _)| *alias);
        if let Some((alias, targets)) = conflicting_alias {
            return Err(GraphError::ConflictingAlias {
                alias: alias.clone(),
                targets: targets.iter().cloned().collect(),
            });
        }

        let conflicting_info = self
            .infos
            .iter()
            .filter(|(_, dependencies)| dependencies.len() > 1)
            .min_by_key(|(id, _)| *id);
        if let Some((id, dependencies)) = conflicting_info {
            return Err(GraphError::ConflictingIdentity {
                id: id.clone(),
                dependencies: dependencies.iter().cloned().collect(),
            });
        }
        Ok(())
    }

    fn alias_target(&self, id: &LazyId) -> Option<&LazyId> {
        self.aliases.get(id).and_then(|targets| targets.iter().next())
    }

    fn canonical<'a>(&'a self, id: &'a LazyId) -> Result<&'a LazyId, GraphError> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(next) = self.alias_target(current) {
            if chain.contains(&next) {
                chain.push(next);
                return Err(GraphError::AliasCycle {
                    chain: chain.into_iter().cloned().collect(),
                });
            }
            chain.push(next);
            current = next;
        }
        Ok(current)
    }

    fn resolve(&self, id: &LazyId) -> Result<Dependency, GraphError> {
        let canonical = self.canonical(id)?;
        self.infos
            .get(canonical)
            .and_then(|dependencies| dependencies.iter().next())
            .cloned()
            .ok_or_else(|| GraphError::MissingIdentity {
                id: canonical.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Forge;
    use proptest::prelude::*;

    fn crate_dep(name: &str, version: &str) -> Dependency {
        Dependency::new(Forge::Cargo, name, Some(version.to_string()))
    }

    #[test]
    fn test_forward_reference_is_tolerated_until_build() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.add_child_to_parent(LazyId::name("foo"), LazyId::name("bar"));
        builder.set_dependency_info(LazyId::name("foo"), crate_dep("foo", "1.0.0"));
        builder.set_dependency_info(LazyId::name("bar"), crate_dep("bar", "2.0.0"));

        let graph = builder.build().unwrap();
        assert!(graph.has_edge(&crate_dep("bar", "2.0.0"), &crate_dep("foo", "1.0.0")));
    }

    #[test]
    fn test_missing_identity_fails_build() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.add_child_to_parent(LazyId::name("foo"), LazyId::name("bar"));
        builder.set_dependency_info(LazyId::name("foo"), crate_dep("foo", "1.0.0"));

        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingIdentity {
                id: LazyId::name("bar")
            }
        );
        assert!(err.to_string().contains("'bar'"));
    }

    #[test]
    fn test_missing_root_identity_fails_build() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.add_root(LazyId::key("node_modules/ghost"));
        assert!(matches!(
            builder.build(),
            Err(GraphError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn test_alias_resolves_to_same_node() {
        let mut via_alias = LazyDependencyGraphBuilder::new();
        via_alias.set_alias(LazyId::key("serde@^1"), LazyId::name_version("serde", "1.0.190"));
        via_alias.set_dependency_info(
            LazyId::name_version("serde", "1.0.190"),
            crate_dep("serde", "1.0.190"),
        );
        via_alias.add_root(LazyId::key("serde@^1"));

        let mut direct = LazyDependencyGraphBuilder::new();
        direct.set_dependency_info(
            LazyId::name_version("serde", "1.0.190"),
            crate_dep("serde", "1.0.190"),
        );
        direct.add_root(LazyId::name_version("serde", "1.0.190"));

        assert_eq!(via_alias.build().unwrap(), direct.build().unwrap());
    }

    #[test]
    fn test_alias_chain_is_followed() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_alias(LazyId::key("a"), LazyId::key("b"));
        builder.set_alias(LazyId::key("b"), LazyId::key("c"));
        builder.set_dependency_info(LazyId::key("c"), crate_dep("c", "0.1.0"));
        builder.add_root(LazyId::key("a"));

        let graph = builder.build().unwrap();
        assert!(graph.is_root(&crate_dep("c", "0.1.0")));
    }

    #[test]
    fn test_alias_cycle_fails_loudly() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_alias(LazyId::key("a"), LazyId::key("b"));
        builder.set_alias(LazyId::key("b"), LazyId::key("a"));
        builder.set_dependency_info(LazyId::key("a"), crate_dep("a", "1.0.0"));
        builder.add_root(LazyId::key("a"));

        match builder.build() {
            Err(GraphError::AliasCycle { chain }) => {
                assert_eq!(chain, vec![LazyId::key("a"), LazyId::key("b"), LazyId::key("a")]);
            }
            other => panic!("expected alias cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_name_only_reference_reconciled_to_single_version() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_dependency_info(LazyId::name_version("app", "0.1.0"), crate_dep("app", "0.1.0"));
        builder.set_dependency_info(LazyId::name_version("log", "0.4.20"), crate_dep("log", "0.4.20"));
        builder.add_parent_with_child(LazyId::name_version("app", "0.1.0"), LazyId::name("log"));

        builder.alias_name_only_references().unwrap();
        let graph = builder.build().unwrap();
        assert!(graph.has_edge(&crate_dep("app", "0.1.0"), &crate_dep("log", "0.4.20")));
    }

    #[test]
    fn test_name_only_reference_with_two_versions_is_ambiguous() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_dependency_info(LazyId::name_version("syn", "1.0.109"), crate_dep("syn", "1.0.109"));
        builder.set_dependency_info(LazyId::name_version("syn", "2.0.39"), crate_dep("syn", "2.0.39"));
        builder.add_root(LazyId::name("syn"));

        assert_eq!(
            builder.alias_name_only_references(),
            Err(GraphError::AmbiguousVersion {
                name: "syn".into(),
                versions: vec!["1.0.109".into(), "2.0.39".into()],
            })
        );
    }

    #[test]
    fn test_name_only_alias_target_reconciled() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_dependency_info(LazyId::name_version("log", "0.4.20"), crate_dep("log", "0.4.20"));
        builder.set_alias(LazyId::key("log-spec"), LazyId::name("log"));
        builder.add_root(LazyId::key("log-spec"));

        builder.alias_name_only_references().unwrap();
        let graph = builder.build().unwrap();
        assert!(graph.is_root(&crate_dep("log", "0.4.20")));
    }

    #[test]
    fn test_conflicting_alias_fails_in_either_order() {
        let build = |targets: [&str; 2]| {
            let mut builder = LazyDependencyGraphBuilder::new();
            for version in targets {
                builder.set_dependency_info(LazyId::name_version("a", version), crate_dep("a", version));
                builder.set_alias(LazyId::key("a@^1"), LazyId::name_version("a", version));
            }
            builder.add_root(LazyId::key("a@^1"));
            builder.build()
        };

        let expected = Err(GraphError::ConflictingAlias {
            alias: LazyId::key("a@^1"),
            targets: vec![LazyId::name_version("a", "1"), LazyId::name_version("a", "2")],
        });
        assert_eq!(build(["1", "2"]), expected);
        assert_eq!(build(["2", "1"]), expected);
    }

    #[test]
    fn test_conflicting_identity_fails_in_either_order() {
        let build = |versions: [&str; 2]| {
            let mut builder = LazyDependencyGraphBuilder::new();
            for version in versions {
                builder.set_dependency_info(LazyId::name("a"), crate_dep("a", version));
            }
            builder.add_root(LazyId::name("a"));
            builder.build()
        };

        let expected = Err(GraphError::ConflictingIdentity {
            id: LazyId::name("a"),
            dependencies: vec![crate_dep("a", "1"), crate_dep("a", "2")],
        });
        assert_eq!(build(["1", "2"]), expected);
        assert_eq!(build(["2", "1"]), expected);
        assert!(build(["1", "2"]).unwrap_err().to_string().contains("a 1, a 2"));
    }

    #[test]
    fn test_identical_repeated_facts_are_accepted() {
        let mut builder = LazyDependencyGraphBuilder::new();
        for _ in 0..2 {
            builder.set_dependency_info(LazyId::name_version("a", "1"), crate_dep("a", "1"));
            builder.set_alias(LazyId::key("a@^1"), LazyId::name_version("a", "1"));
        }
        builder.add_root(LazyId::key("a@^1"));

        let graph = builder.build().unwrap();
        assert!(graph.is_root(&crate_dep("a", "1")));
    }

    #[test]
    fn test_self_edges_are_dropped() {
        let mut builder = LazyDependencyGraphBuilder::new();
        builder.set_alias(LazyId::name("a"), LazyId::name_version("a", "1"));
        builder.set_dependency_info(LazyId::name_version("a", "1"), crate_dep("a", "1"));
        builder.add_parent_with_child(LazyId::name_version("a", "1"), LazyId::name("a"));

        let graph = builder.build().unwrap();
        assert_eq!(graph.edges().count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Fact {
        Root(LazyId),
        Edge(LazyId, LazyId),
        Info(LazyId, Dependency),
        Alias(LazyId, LazyId),
    }

    fn sample_facts() -> Vec<Fact> {
        vec![
            Fact::Root(LazyId::key("app->a")),
            Fact::Root(LazyId::name("d")),
            Fact::Edge(LazyId::key("app->a"), LazyId::name("b")),
            Fact::Edge(LazyId::key("app->a"), LazyId::name_version("c", "3")),
            Fact::Edge(LazyId::name("d"), LazyId::name("b")),
            Fact::Edge(LazyId::name_version("c", "3"), LazyId::name("d")),
            Fact::Alias(LazyId::key("app->a"), LazyId::name("a")),
            Fact::Info(LazyId::name("a"), crate_dep("a", "1")),
            Fact::Info(LazyId::name("b"), crate_dep("b", "2")),
            Fact::Info(LazyId::name_version("c", "3"), crate_dep("c", "3")),
            Fact::Info(LazyId::name("d"), crate_dep("d", "4")),
        ]
    }

    fn build_from(facts: &[Fact]) -> DependencyGraph {
        let mut builder = LazyDependencyGraphBuilder::new();
        for fact in facts.iter().cloned() {
            match fact {
                Fact::Root(id) => builder.add_root(id),
                Fact::Edge(parent, child) => builder.add_child_to_parent(child, parent),
                Fact::Info(id, dep) => builder.set_dependency_info(id, dep),
                Fact::Alias(alias, target) => builder.set_alias(alias, target),
            }
        }
        builder.build().unwrap()
    }

    proptest! {
        #[test]
        fn prop_fact_order_does_not_change_graph(facts in Just(sample_facts()).prop_shuffle()) {
            prop_assert_eq!(build_from(&facts), build_from(&sample_facts()));
        }
    }
}
