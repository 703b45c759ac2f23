use notices_core::{paths, NoticeError};
use std::path::{Path, PathBuf};

/// Resolve the configuration file.
///
/// Priority:
/// 1. `--config` flag / `NOTICES_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `notices.yaml`
pub fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let cwd = current_dir();
    match paths::find_config(&cwd) {
        Some(p) => Ok(p),
        None => {
            let wanted = cwd.join(paths::CONFIG_FILE).display().to_string();
            Err(NoticeError::ConfigNotFound(wanted).into())
        }
    }
}

/// Directory `init` scaffolds into: the explicit config's directory, else `cwd`.
pub fn init_dir(explicit: Option<&Path>) -> PathBuf {
    match explicit.and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => current_dir(),
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
