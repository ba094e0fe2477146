//! Cache command - inspect or prune the tarball cache

use crate::cache::{format_bytes, DiskCache};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{BurrowError, BurrowResult};
use console::style;
use std::path::Path;
use std::time::Duration;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> BurrowResult<()> {
    let cache_dir = config
        .cache
        .dir
        .clone()
        .unwrap_or_else(ConfigManager::default_cache_dir);

    match args.action {
        CacheAction::Stats => stats(&cache_dir),
        CacheAction::Prune {
            max_age_days,
            dry_run,
        } => {
            let days = max_age_days.unwrap_or(config.cache.max_age_days);
            prune(&cache_dir, days, dry_run).await
        }
    }
}

/// Show cache location and size
fn stats(dir: &Path) -> BurrowResult<()> {
    let cache = DiskCache::new(dir)?;
    println!("Cache root: {}", cache.root().display());
    println!("Total size: {}", format_bytes(cache.total_size()));
    Ok(())
}

/// Evict (or list) entries untouched for `max_age_days`
async fn prune(dir: &Path, max_age_days: u32, dry_run: bool) -> BurrowResult<()> {
    let cache = DiskCache::new(dir)?;
    let max_age = Duration::from_secs(u64::from(max_age_days) * 86_400);

    if dry_run {
        let stale = cache.stale_entries(max_age)?;
        if stale.is_empty() {
            println!("Nothing older than {max_age_days} day(s).");
            return Ok(());
        }
        println!("Would evict {} entries:", stale.len());
        for entry in stale {
            println!("  {}", entry.display());
        }
        return Ok(());
    }

    // The sweep takes per-entry locks; keep it off the async runtime
    let removed = tokio::task::spawn_blocking(move || cache.delete_stale(max_age))
        .await
        .map_err(|e| BurrowError::Internal(format!("cache sweep task failed: {e}")))??;
    println!(
        "{} Evicted {} stale cache entries",
        style("✓").green(),
        removed
    );
    Ok(())
}
