use super::{LazyDependencyGraphBuilder, LazyId};
use crate::models::Dependency;

/// A parsed tree line: its depth and the node it describes.
#[derive(Debug, Clone)]
pub struct TreeLine {
    pub depth: usize,
    pub id: LazyId,
    pub dependency: Dependency,
}

/// What happened while feeding a tree into a builder.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DepthParseReport {
    pub parsed: usize,
    pub warnings: Vec<String>,
}

/// Turns flat, depth-annotated tree output into lazy graph facts.
///
/// `root_depth` is the depth at which a tool prints direct dependencies: `0` for
/// tools that omit the project line, `1` for tools (cargo, maven) that print the
/// project itself at depth `0`.
#[derive(Debug, Clone, Copy)]
pub struct DepthTreeParser {
    root_depth: usize,
}

impl DepthTreeParser {
    pub fn new(root_depth: usize) -> Self {
        Self { root_depth }
    }

    /// Parse `lines` into `builder`.
    ///
    /// `parse_line` returns `Ok(None)` for lines that are not part of the tree and
    /// `Err(reason)` for malformed descriptors; the latter are skipped and reported.
    pub fn parse<'a, I, F>(
        &self,
        lines: I,
        builder: &mut LazyDependencyGraphBuilder,
        mut parse_line: F,
    ) -> DepthParseReport
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str) -> Result<Option<TreeLine>, String>,
    {
        let mut report = DepthParseReport::default();
        let mut stack: Vec<LazyId> = Vec::new();

        for (index, line) in lines.into_iter().enumerate() {
            let line_number = index + 1;
            let tree_line = match parse_line(line) {
                Ok(Some(tree_line)) => tree_line,
                Ok(None) => continue,
                Err(reason) => {
                    report.warnings.push(format!("line {}: {}", line_number, reason));
                    continue;
                }
            };

            let TreeLine {
                depth,
                id,
                dependency,
            } = tree_line;
            if depth < self.root_depth {
                report.warnings.push(format!(
                    "line {}: depth {} is above the root depth {}",
                    line_number, depth, self.root_depth
                ));
                continue;
            }
            let level = depth - self.root_depth;

            if level == 0 {
                builder.add_root(id.clone());
                stack.clear();
            } else {
                stack.truncate(level);
                let Some(parent) = stack.last() else {
                    report.warnings.push(format!(
                        "line {}: '{}' has no parent in the tree",
                        line_number, dependency
                    ));
                    continue;
                };
                if stack.len() < level {
                    report.warnings.push(format!(
                        "line {}: depth {} skips a level, attaching to the nearest ancestor",
                        line_number, depth
                    ));
                }
                builder.add_child_to_parent(id.clone(), parent.clone());
            }

            builder.set_dependency_info(id.clone(), dependency);
            stack.push(id);
            report.parsed += 1;
        }

        report
    }
}

/// Split a `cargo tree --prefix depth` style line into its numeric depth and the rest.
///
/// `Ok(None)` means the line has no depth prefix; a prefix that does not fit a
/// depth is malformed.
pub fn numeric_prefix_depth(line: &str) -> Result<Option<(usize, &str)>, String> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Ok(None);
    }
    let depth = line[..digits]
        .parse()
        .map_err(|_| format!("depth prefix '{}' is out of range", &line[..digits]))?;
    Ok(Some((depth, &line[digits..])))
}

/// Depth of a line drawn with tree glyphs (`+- `, `|  `, `\- `, `├── `, ...), where
/// each level takes `indent_width` characters. Returns the depth and the descriptor.
pub fn glyph_depth(line: &str, indent_width: usize) -> (usize, &str) {
    let is_glyph = |c: char| matches!(c, ' ' | '|' | '+' | '-' | '\\' | '`' | '│' | '├' | '└' | '─');
    let descriptor = line.trim_start_matches(is_glyph);
    let prefix_chars = line[..line.len() - descriptor.len()].chars().count();
    (prefix_chars / indent_width.max(1), descriptor)
}
