//! CLI argument definitions using clap derive

use crate::fetch::sdk::SdkComponent;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Burrow - Build chroot and SDK cache manager
///
/// Creates, upgrades, and enters build chroots, fetching versioned SDK
/// components through a locked on-disk tarball cache.
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BURROW_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a chroot from an SDK tarball
    Create(CreateArgs),

    /// Run a command (or a shell) inside the chroot
    Enter(EnterArgs),

    /// Apply pending chroot upgrade hooks
    Update,

    /// Materialize SDK components into the cache
    Sdk(SdkArgs),

    /// Inspect or prune the tarball cache
    Cache(CacheArgs),

    /// Delete an existing chroot
    Delete(DeleteArgs),
}

/// Arguments for the create command
#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Board to create the chroot for
    #[arg(short, long)]
    pub board: Option<String>,

    /// Explicit SDK version
    #[arg(long)]
    pub version: Option<String>,

    /// Local SDK tarball (or directory of tarballs), bypassing version
    /// resolution
    #[arg(long, conflicts_with = "version")]
    pub sdk_path: Option<PathBuf>,

    /// Delete any existing chroot first
    #[arg(long)]
    pub replace: bool,
}

/// Arguments for the enter command
#[derive(Parser, Debug)]
pub struct EnterArgs {
    /// Remount the chroot read-only for this session
    #[arg(long)]
    pub read_only: bool,

    /// Working directory inside the chroot
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Additional environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Command and arguments to run (defaults to a login shell)
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Arguments for the sdk command
#[derive(Parser, Debug)]
pub struct SdkArgs {
    /// Board to fetch components for
    #[arg(short, long)]
    pub board: Option<String>,

    /// Explicit SDK version
    #[arg(long)]
    pub version: Option<String>,

    /// Local directory of component tarballs, bypassing version
    /// resolution
    #[arg(long, conflicts_with = "version")]
    pub sdk_path: Option<PathBuf>,

    /// Components to materialize (default: target_toolchain, sysroot,
    /// environment)
    #[arg(long = "component", value_name = "NAME", value_parser = parse_component)]
    pub components: Vec<SdkComponent>,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache location and size
    Stats,

    /// Evict entries untouched for too long
    Prune {
        /// Evict entries older than N days (default: from config)
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Dry run - show what would be evicted
        #[arg(long)]
        dry_run: bool,
    },
}

/// Arguments for the delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse an SDK component name
fn parse_component(s: &str) -> Result<SdkComponent, String> {
    s.parse()
}
