//! Enumerating and terminating codex CLI processes.
//!
//! Matching is conservative: the host process is always excluded, and a
//! process whose path collides with the CLI only by basename must also carry
//! the CLI name in its argument vector.

use crate::{CodexSwitchError, Result};
use std::path::Path;
use std::time::Duration;
use sysinfo::{
    get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, Signal, System,
};

/// Known on-disk entry names of the CLI.
const CLI_ENTRY_NAMES: [&str; 5] = ["codex", "codex.exe", "codex.cmd", "codex.ps1", "codex.bat"];

fn refresh_processes() -> System {
    let refresh = RefreshKind::nothing().with_processes(ProcessRefreshKind::everything());
    let mut system = System::new_with_specifics(refresh);
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
}

fn normalize_file_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() {
        return None;
    }
    let file_name = Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| trimmed.to_string());
    Some(file_name.to_lowercase())
}

fn is_entry_name(name: &str) -> bool {
    CLI_ENTRY_NAMES.iter().any(|candidate| *candidate == name)
}

fn is_host_name(name: &str) -> bool {
    name.contains("codex-switch") || name.contains("codex_switch")
}

/// Pure matching over the fields sysinfo exposes for a process.
fn matches_cli_process(
    process_name: &str,
    exe_path: Option<&str>,
    cmd_tokens: &[String],
    located_path: Option<&str>,
    current_exe_name: Option<&str>,
) -> bool {
    let name = normalize_file_name(process_name);
    let exe_name = exe_path.and_then(normalize_file_name);
    let argv0 = cmd_tokens.first().and_then(|token| normalize_file_name(token));

    // Never the host application itself.
    if name.as_deref().map(is_host_name).unwrap_or(false)
        || exe_name.as_deref().map(is_host_name).unwrap_or(false)
    {
        return false;
    }
    if let Some(current) = current_exe_name.and_then(normalize_file_name) {
        if name.as_deref() == Some(current.as_str()) || exe_name.as_deref() == Some(current.as_str())
        {
            return false;
        }
    }

    // Exact executable-path match against the located binary.
    if let (Some(located), Some(exe)) = (located_path, exe_path) {
        if located.eq_ignore_ascii_case(exe) {
            return true;
        }
    }

    // The argv0 or executable basename is a known CLI entry name.
    if argv0.as_deref().map(is_entry_name).unwrap_or(false)
        || exe_name.as_deref().map(is_entry_name).unwrap_or(false)
    {
        return true;
    }

    // Basename-only collision on the process name: require the argument
    // vector to mention the CLI before trusting it.
    if name.as_deref().map(is_entry_name).unwrap_or(false) {
        return cmd_tokens
            .iter()
            .skip(1)
            .any(|token| token.to_lowercase().contains("codex"));
    }

    false
}

fn collect_cli_pids(system: &System, located_path: Option<&Path>) -> Vec<Pid> {
    let current_pid = get_current_pid().ok();
    let current_exe_name = std::env::current_exe().ok().and_then(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
    });
    let located = located_path.map(|path| path.to_string_lossy().to_string());

    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            if current_pid.map(|me| me == *pid).unwrap_or(false) {
                return None;
            }

            let process_name = process.name().to_string_lossy().to_string();
            let exe_path = process.exe().map(|path| path.to_string_lossy().to_string());
            let cmd_tokens: Vec<String> = process
                .cmd()
                .iter()
                .map(|part| part.to_string_lossy().to_string())
                .collect();

            matches_cli_process(
                &process_name,
                exe_path.as_deref(),
                &cmd_tokens,
                located.as_deref(),
                current_exe_name.as_deref(),
            )
            .then_some(*pid)
        })
        .collect()
}

/// Number of CLI processes currently running.
pub fn count_cli_processes(located_path: Option<&Path>) -> usize {
    let system = refresh_processes();
    collect_cli_pids(&system, located_path).len()
}

/// Terminate every enumerated CLI process: graceful signal first, forced
/// kill for survivors after the grace period. Returns the number terminated.
pub fn terminate_cli_processes(located_path: Option<&Path>, grace: Duration) -> Result<usize> {
    let system = refresh_processes();
    let targets = collect_cli_pids(&system, located_path);
    if targets.is_empty() {
        return Ok(0);
    }

    for pid in &targets {
        if let Some(process) = system.process(*pid) {
            // SIGTERM where the platform has it; sysinfo falls back to a
            // plain kill on Windows.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
        }
    }

    std::thread::sleep(grace);

    let system = refresh_processes();
    for pid in &targets {
        if let Some(process) = system.process(*pid) {
            tracing::warn!(pid = pid.as_u32(), "process survived graceful signal, forcing kill");
            if !process.kill_with(Signal::Kill).unwrap_or_else(|| process.kill()) {
                return Err(CodexSwitchError::KillFailed {
                    pid: pid.as_u32(),
                    reason: "forced kill was rejected by the OS".to_string(),
                });
            }
        }
    }

    tracing::info!(count = targets.len(), "terminated codex CLI processes");
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cli_by_executable_path() {
        let cmd = vec!["/usr/local/bin/codex".to_string()];
        assert!(matches_cli_process(
            "codex",
            Some("/usr/local/bin/codex"),
            &cmd,
            Some("/usr/local/bin/codex"),
            Some("codex-switch"),
        ));
    }

    #[test]
    fn detects_cli_by_entry_basename() {
        let cmd = vec!["C:\\Tools\\codex.exe".to_string()];
        assert!(matches_cli_process(
            "codex.exe",
            Some("C:\\Tools\\codex.exe"),
            &cmd,
            None,
            Some("codex-switch.exe"),
        ));
    }

    #[test]
    fn ignores_the_host_process() {
        let cmd = vec!["/opt/codex-switch/codex-switch".to_string()];
        assert!(!matches_cli_process(
            "codex-switch",
            Some("/opt/codex-switch/codex-switch"),
            &cmd,
            None,
            Some("codex-switch"),
        ));
    }

    #[test]
    fn ignores_unrelated_process_with_codex_argument() {
        let cmd = vec![
            "node".to_string(),
            "worker.js".to_string(),
            "--project=codex-switch".to_string(),
        ];
        assert!(!matches_cli_process(
            "node",
            Some("/usr/bin/node"),
            &cmd,
            None,
            Some("codex-switch"),
        ));
    }

    #[test]
    fn basename_only_collision_needs_cli_in_argv() {
        // Process name says "codex" but there is no exe path and argv0 is a
        // wrapper; only an argv mention of the CLI qualifies it.
        let without = vec!["wrapper".to_string(), "--daemon".to_string()];
        assert!(!matches_cli_process("codex", None, &without, None, None));

        let with = vec!["wrapper".to_string(), "codex login".to_string()];
        assert!(matches_cli_process("codex", None, &with, None, None));
    }

    #[test]
    fn counting_does_not_panic() {
        // Smoke test against the live process table.
        let _ = count_cli_processes(None);
    }
}
