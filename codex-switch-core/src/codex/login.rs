//! Driving the CLI login flow.
//!
//! Spawns `codex login --web` (falling back to bare `login` when the flag is
//! unrecognized) and waits for exit or timeout. Interactive output is never
//! parsed; login completion is observed through the live auth file by the
//! import flow.

use crate::codex::locate::LocatedCli;
use crate::{CodexSwitchError, Result};
use std::io::Read;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run the login subcommand to completion.
pub fn run_login(cli: &LocatedCli, timeout: Duration) -> Result<()> {
    match run_login_once(cli, &["login", "--web"], timeout) {
        Ok(()) => Ok(()),
        Err(web_reason) if is_web_flag_unsupported(&web_reason) => {
            tracing::info!("codex CLI does not support `login --web`, retrying bare login");
            run_login_once(cli, &["login"], timeout)
                .map_err(|reason| CodexSwitchError::LoginFailed { reason })
        }
        Err(reason) => Err(CodexSwitchError::LoginFailed { reason }),
    }
}

fn run_login_once(
    cli: &LocatedCli,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<(), String> {
    let mut child = cli
        .command()
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| format!("failed to spawn `{}`: {error}", cli.display))?;

    wait_for_exit(&mut child, args, timeout)
}

fn wait_for_exit(
    child: &mut Child,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<(), String> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                let stderr = capture_stderr(child);
                return Err(if stderr.is_empty() {
                    format!("`codex {}` exited with {status}", args.join(" "))
                } else {
                    format!("`codex {}` exited with {status}: {stderr}", args.join(" "))
                });
            }
            Ok(None) => {}
            Err(error) => return Err(format!("failed to wait for login process: {error}")),
        }

        if started.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!(
                "`codex {}` timed out after {}s",
                args.join(" "),
                timeout.as_secs()
            ));
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn capture_stderr(child: &mut Child) -> String {
    let Some(stderr) = child.stderr.as_mut() else {
        return String::new();
    };
    let mut text = String::new();
    let _ = stderr.read_to_string(&mut text);
    let compact = text.replace(['\n', '\r'], " ");
    let trimmed = compact.trim();
    trimmed.chars().take(400).collect()
}

/// Whether an error message means the CLI rejected the `--web` flag itself
/// (as opposed to the login failing for another reason).
fn is_web_flag_unsupported(message: &str) -> bool {
    let lower = message.to_lowercase();
    let mentions_flag = lower.contains("--web");
    let unrecognized = lower.contains("unexpected argument")
        || lower.contains("unknown option")
        || lower.contains("unrecognized option")
        || lower.contains("no such option");
    mentions_flag && unrecognized
}
