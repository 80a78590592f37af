//! Platform-specific path helpers.

use std::path::{Path, PathBuf};

/// Directory name under the platform data directory.
const APP_DIR_NAME: &str = "codex-switch";

/// Get the platform-specific application data directory.
///
/// Returns:
/// - Windows: `%LOCALAPPDATA%\codex-switch`
/// - macOS: `~/Library/Application Support/codex-switch`
/// - Linux: `~/.local/share/codex-switch`
pub fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR_NAME)
}

/// Ensure the data directory exists, creating it if necessary.
pub fn ensure_data_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Database file path inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("codex-switch.db")
}

/// Snapshot directory inside a data directory.
pub fn snapshots_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("snapshots")
}

/// Path of the live auth file the codex CLI reads: `<home>/.codex/auth.json`.
pub fn default_auth_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".codex").join("auth.json"))
}
