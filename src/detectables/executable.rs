use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::detector::DetectableError;

/// Locate `name` on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(executable_file_name(name));
        candidate.is_file().then_some(candidate)
    })
}

/// A wrapper script (e.g. `mvnw`) shipped in the project directory.
pub fn find_local_executable(directory: &Path, name: &str) -> Option<PathBuf> {
    let candidate = directory.join(executable_file_name(name));
    candidate.is_file().then_some(candidate)
}

#[cfg(windows)]
fn executable_file_name(name: &str) -> String {
    format!("{}.exe", name)
}

#[cfg(not(windows))]
fn executable_file_name(name: &str) -> String {
    name.to_string()
}

/// Run `executable` in `directory` and return its stdout.
pub fn run(executable: &Path, args: &[&str], directory: &Path) -> Result<String, DetectableError> {
    let command = format!("{} {}", executable.display(), args.join(" "));
    debug!(%command, directory = %directory.display(), "running");

    let output = Command::new(executable)
        .args(args)
        .current_dir(directory)
        .output()
        .map_err(|source| DetectableError::Launch {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(DetectableError::Executable {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable() {
        assert!(find_executable("definitely-not-a-real-tool-7f3a").is_none());
    }

    #[test]
    fn test_local_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_local_executable(dir.path(), "mvnw").is_none());
        std::fs::write(dir.path().join(executable_file_name("mvnw")), "").unwrap();
        assert!(find_local_executable(dir.path(), "mvnw").is_some());
    }

    #[test]
    fn test_launch_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(Path::new("/nonexistent/tool"), &["--version"], dir.path()).unwrap_err();
        assert!(matches!(err, DetectableError::Launch { .. }));
    }
}
