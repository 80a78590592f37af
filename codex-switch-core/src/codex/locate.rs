//! Locating the codex CLI binary.
//!
//! Probes an ordered, OS-specific candidate list and keeps the first entry
//! whose `--version` invocation succeeds. The result is cached for the
//! session.

use crate::{CodexSwitchError, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// An invocable CLI entry point. Script entries (e.g. `codex.ps1`) need an
/// interpreter in front of the actual argument list.
#[derive(Debug, Clone)]
pub struct LocatedCli {
    pub program: PathBuf,
    pub prefix_args: Vec<OsString>,
    pub display: String,
}

impl LocatedCli {
    fn direct(program: impl Into<PathBuf>, display: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            display: display.into(),
        }
    }

    /// Build a command for this entry with the prefix arguments applied.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.prefix_args);
        command
    }
}

/// Session-scoped locator with a probe cache.
pub struct CliLocator {
    cached: Mutex<Option<LocatedCli>>,
}

impl Default for CliLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CliLocator {
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    /// Locate the CLI, probing candidates on first use.
    pub fn locate(&self) -> Result<LocatedCli> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| CodexSwitchError::Store("locator lock poisoned".to_string()))?;
        if let Some(found) = cached.as_ref() {
            return Ok(found.clone());
        }

        let found = probe_candidates(candidate_entries())?;
        tracing::info!(entry = %found.display, "located codex CLI");
        *cached = Some(found.clone());
        Ok(found)
    }

    /// The located entry if a probe already succeeded this session.
    pub fn cached(&self) -> Option<LocatedCli> {
        self.cached.lock().ok().and_then(|cached| cached.clone())
    }
}

fn probe_candidates(candidates: Vec<LocatedCli>) -> Result<LocatedCli> {
    let mut probed = Vec::new();
    for candidate in candidates {
        if version_check(&candidate) {
            return Ok(candidate);
        }
        probed.push(candidate.display);
    }
    Err(CodexSwitchError::CliNotFound { probed })
}

fn version_check(candidate: &LocatedCli) -> bool {
    candidate
        .command()
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "windows")]
fn candidate_entries() -> Vec<LocatedCli> {
    let mut candidates = vec![
        LocatedCli::direct("codex.cmd", "codex.cmd (PATH)"),
        LocatedCli::direct("codex.exe", "codex.exe (PATH)"),
        LocatedCli::direct("codex", "codex (PATH)"),
    ];

    for path in find_files_on_path("codex.ps1") {
        candidates.push(LocatedCli {
            program: PathBuf::from("powershell"),
            prefix_args: vec![
                OsString::from("-NoProfile"),
                OsString::from("-ExecutionPolicy"),
                OsString::from("Bypass"),
                OsString::from("-File"),
                path.as_os_str().to_os_string(),
            ],
            display: format!("powershell -File {}", path.display()),
        });
    }

    // Vendored entries beneath the global npm root.
    if let Some(appdata) = std::env::var_os("APPDATA") {
        let npm_root = PathBuf::from(appdata).join("npm");
        for name in ["codex.cmd", "codex.exe"] {
            let path = npm_root.join(name);
            candidates.push(LocatedCli::direct(
                path.clone(),
                format!("{} (npm root)", path.display()),
            ));
        }
    }

    candidates
}

#[cfg(target_os = "windows")]
fn find_files_on_path(file_name: &str) -> Vec<PathBuf> {
    let Some(path_env) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    std::env::split_paths(&path_env)
        .map(|dir| dir.join(file_name))
        .filter(|path| path.is_file())
        .collect()
}

#[cfg(not(target_os = "windows"))]
fn candidate_entries() -> Vec<LocatedCli> {
    let mut candidates = vec![LocatedCli::direct("codex", "codex (PATH)")];

    let mut prefixes = vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ];
    if let Some(home) = dirs::home_dir() {
        prefixes.push(home.join(".local").join("bin"));
    }
    for prefix in prefixes {
        let path = prefix.join("codex");
        candidates.push(LocatedCli::direct(
            path.clone(),
            format!("codex ({})", path.display()),
        ));
    }

    candidates
}
