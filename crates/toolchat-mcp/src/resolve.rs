//! Launch command resolution

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use toolchat_core::{ChatError, Result};
use tracing::debug;

/// Launchers that are looked up on `PATH` before spawning.
pub const LAUNCHER_ALIASES: &[&str] = &["npx", "uvx", "uv", "node", "bunx", "deno"];

pub fn is_launcher_alias(command: &str) -> bool {
    LAUNCHER_ALIASES.contains(&command)
}

/// Resolve a configured command against the current `PATH`.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    let path_var = env::var_os("PATH");
    resolve_command_in(command, path_var.as_deref())
}

/// Resolve `command` using an explicit search path.
///
/// Launcher aliases must resolve to an executable or the call fails with a
/// configuration error; any other command is returned unchanged.
pub fn resolve_command_in(command: &str, path_var: Option<&OsStr>) -> Result<PathBuf> {
    if !is_launcher_alias(command) {
        return Ok(PathBuf::from(command));
    }

    let resolved = path_var.and_then(|paths| find_executable(command, paths));
    match resolved {
        Some(path) => {
            debug!("Resolved launcher '{}' to {}", command, path.display());
            Ok(path)
        }
        None => Err(ChatError::ConfigError(format!(
            "Could not resolve '{}' on PATH; install it or configure an absolute command",
            command
        ))),
    }
}

fn find_executable(name: &str, paths: &OsStr) -> Option<PathBuf> {
    env::split_paths(paths)
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    ["", ".exe", ".cmd", ".bat"]
        .iter()
        .map(|ext| dir.join(format!("{}{}", name, ext)))
        .collect()
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
