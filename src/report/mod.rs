//! Report renderers for scan results.
//!
//! - [`terminal`] — colored, tabular output with summary box; respects `--verbose` / `--quiet`.
//! - [`json`] — the full evaluation record, and the code-location export written by `--output`.

pub mod json;
pub mod terminal;
