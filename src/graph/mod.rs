//! Dependency graph model.
//!
//! - [`dependency_graph`] — the finalized, fully identified graph handed to reporting.
//! - [`lazy`] — deferred-identity builder: ecosystems record facts keyed by
//!   [`LazyId`] in any order, identities are resolved once in [`LazyDependencyGraphBuilder::build`].
//! - [`depth`] — stack-based parser turning depth-annotated tree output into builder facts.

pub mod dependency_graph;
pub mod depth;
pub mod lazy;

use thiserror::Error;

use crate::models::Dependency;

pub use dependency_graph::DependencyGraph;
pub use depth::{DepthParseReport, DepthTreeParser, TreeLine};
pub use lazy::{LazyDependencyGraphBuilder, LazyId};

/// Model-integrity errors raised while finalizing a graph.
///
/// Any of these aborts the extraction it occurs in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("no dependency information was recorded for {id}")]
    MissingIdentity { id: LazyId },

    #[error("alias cycle detected: {}", format_chain(.chain))]
    AliasCycle { chain: Vec<LazyId> },

    #[error("name-only reference to '{name}' is ambiguous between versions {}", .versions.join(", "))]
    AmbiguousVersion { name: String, versions: Vec<String> },

    #[error("{alias} is aliased to several packages: {}", format_list(.targets))]
    ConflictingAlias { alias: LazyId, targets: Vec<LazyId> },

    #[error("{id} was described as several packages: {}", format_list(.dependencies))]
    ConflictingIdentity {
        id: LazyId,
        dependencies: Vec<Dependency>,
    },
}

fn format_list<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn format_chain(chain: &[LazyId]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
