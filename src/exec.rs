//! External process execution
//!
//! Every external binary Burrow drives (tar, sudo, chroot, mount,
//! env-update, upgrade hooks) goes through these helpers so callers get
//! uniform error context and logging.

use crate::error::{BurrowError, BurrowResult};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

fn render(program: &str, args: &[String]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

/// Run a command and capture stdout, failing on non-zero exit
pub async fn run_output(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
) -> BurrowResult<String> {
    let rendered = render(program, args);
    debug!("Executing: {}", rendered);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| BurrowError::command_failed(rendered.clone(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BurrowError::command_exec(
            rendered,
            output.status.code().unwrap_or(-1),
            stderr.trim().to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command with inherited stdio and return its exit code uninterpreted
pub async fn run_interactive(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
) -> BurrowResult<i32> {
    let rendered = render(program, args);
    debug!("Executing interactively: {}", rendered);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }

    let status = cmd
        .status()
        .await
        .map_err(|e| BurrowError::command_failed(rendered, e))?;

    Ok(status.code().unwrap_or(-1))
}

/// Run a command synchronously, failing on non-zero exit
///
/// For the lock/cache layer, which stays synchronous and is driven from
/// async code through `spawn_blocking`.
pub fn run_sync(program: &str, args: &[String], cwd: Option<&Path>) -> BurrowResult<()> {
    let rendered = render(program, args);
    debug!("Executing: {}", rendered);

    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .map_err(|e| BurrowError::command_failed(rendered.clone(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BurrowError::command_exec(
            rendered,
            output.status.code().unwrap_or(-1),
            stderr.trim().to_string(),
        ));
    }

    Ok(())
}
