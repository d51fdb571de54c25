use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Root configuration structure, deserialized from `.detectr/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detect: DetectConfig,
}

/// Controls which directories are searched and which strategies may run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Detectable definition names never to run (case-insensitive).
    pub excluded_detectables: Vec<String>,
    /// Directory names pruned from the search.
    pub excluded_directories: Vec<String>,
    /// Deepest directory below the scan root that is evaluated.
    pub search_depth: usize,
    /// Detector types whose extraction must come from a high-accuracy strategy.
    pub accuracy_required: Vec<String>,
    /// Directories evaluated concurrently.
    pub parallelism: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            excluded_detectables: Vec::new(),
            excluded_directories: vec!["node_modules".into(), ".git".into(), "target".into()],
            search_depth: 3,
            accuracy_required: Vec::new(),
            parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid configuration in {}", path.display()))
}

/// Load the configuration, searching in order:
///
/// 1. `config_override` — path passed via `--config`
/// 2. `<project_path>/.detectr/config.toml`
/// 3. `~/.config/detectr/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".detectr").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("detectr").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[detect]
excluded_detectables = ["Maven CLI"]
search_depth = 1
"#,
        )
        .unwrap();

        assert_eq!(config.detect.excluded_detectables, vec!["Maven CLI"]);
        assert_eq!(config.detect.search_depth, 1);
        assert_eq!(config.detect.excluded_directories, vec!["node_modules", ".git", "target"]);
        assert!(config.detect.parallelism >= 1);
    }

    #[test]
    fn test_project_config_is_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".detectr")).unwrap();
        std::fs::write(
            dir.path().join(".detectr").join("config.toml"),
            "[detect]\naccuracy_required = [\"CARGO\"]\n",
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.detect.accuracy_required, vec!["CARGO"]);
    }

    #[test]
    fn test_override_wins_and_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "[detect]\nsearch_depth = 7\n").unwrap();

        let config = load_config(dir.path(), Some(&custom)).unwrap();
        assert_eq!(config.detect.search_depth, 7);

        assert!(load_config(dir.path(), Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("bad.toml");
        std::fs::write(&custom, "[detect]\nsearch_depth = \"deep\"\n").unwrap();

        assert!(load_config(dir.path(), Some(&custom)).is_err());
    }
}
