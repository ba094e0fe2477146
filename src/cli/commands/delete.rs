//! Delete command - remove an existing chroot
//!
//! The recovery path for failed creates and deprecated chroots. Only the
//! chroot tree itself is removed; persistent `out` storage (caches,
//! logs, home directories) survives and is picked up again by the next
//! create.

use crate::chroot::{ensure_outside_chroot, mount, Chroot};
use crate::cli::args::DeleteArgs;
use crate::cli::commands::CommandContext;
use crate::config::Config;
use crate::error::{BurrowError, BurrowResult};
use crate::exec;
use console::style;
use std::collections::HashMap;
use std::io::{self, Write};
use tracing::debug;

/// Execute the delete command
pub async fn execute(args: DeleteArgs, config: &Config) -> BurrowResult<()> {
    ensure_outside_chroot()?;
    let ctx = CommandContext::resolve(config)?;

    if !ctx.chroot.path().exists() {
        println!("No chroot at {}", ctx.chroot.path().display());
        return Ok(());
    }

    if !args.yes {
        let prompt = format!(
            "{} Delete chroot at {}?",
            style("Warning:").yellow().bold(),
            ctx.chroot.path().display()
        );
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    remove_chroot(&ctx.chroot).await?;
    println!(
        "{} Deleted chroot at {}",
        style("✓").green(),
        ctx.chroot.path().display()
    );
    Ok(())
}

/// Unmount (if needed) and remove the chroot tree
///
/// The tree contains root-owned files after a create, so removal goes
/// through sudo. `--one-file-system` guards against deleting through a
/// mount that a lazy unmount has not detached yet.
pub(crate) async fn remove_chroot(chroot: &Chroot) -> BurrowResult<()> {
    let path = chroot.path().display().to_string();

    if mount::is_mounted(chroot.path())? {
        debug!("Unmounting {}", path);
        exec::run_output(
            "sudo",
            &["umount".to_string(), "-R".to_string(), "-l".to_string(), path.clone()],
            None,
            &HashMap::new(),
        )
        .await?;
    }

    exec::run_output(
        "sudo",
        &[
            "rm".to_string(),
            "-rf".to_string(),
            "--one-file-system".to_string(),
            path,
        ],
        None,
        &HashMap::new(),
    )
    .await?;
    Ok(())
}

/// Ask for confirmation on stdin
fn confirm(prompt: &str) -> BurrowResult<bool> {
    print!("{prompt} [y/N] ");
    io::stdout()
        .flush()
        .map_err(|e| BurrowError::io("flushing stdout", e))?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .map_err(|e| BurrowError::io("reading confirmation", e))?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
