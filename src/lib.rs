//! `detectr` — find package-manager projects in a directory tree and extract
//! their dependency graphs.
//!
//! - [`detector`] — the rule engine: which strategy runs where, with full explanations.
//! - [`graph`] — dependency graphs, the deferred-identity builder and the depth tree parser.
//! - [`detectables`] — bundled ecosystem strategies and [`detectables::default_rule_set`].
//! - [`scan`] — directory discovery and the parallel, level-by-level driver.
//! - [`report`] — terminal and JSON output.

pub mod cli;
pub mod config;
pub mod detectables;
pub mod detector;
pub mod graph;
pub mod logging;
pub mod models;
pub mod report;
pub mod scan;
