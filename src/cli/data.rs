//! Cache, queue and maintenance command handlers.

use anyhow::{Context, Result};

use raido::cache::RedisCache;
use raido::config::{settings, Settings};
use raido::maintenance::{MaintenanceManager, RetentionPolicy};
use raido::storage::ActivityStore;

/// Queues inspected by `raido queues`.
const KNOWN_QUEUES: &[&str] = &["tasks", "events"];

pub(crate) async fn cmd_cache_clear(pattern: &str) -> Result<()> {
    let settings = settings();
    let cache = RedisCache::connect(&settings.redis_url)
        .await
        .with_context(|| format!("Cannot reach redis at {}", settings.redis_url))?;
    let removed = cache.clear_pattern(pattern).await?;
    println!("Removed {} cached entries matching '{}'.", removed, pattern);
    Ok(())
}

pub(crate) async fn cmd_queues() -> Result<()> {
    let settings = settings();
    let cache = RedisCache::connect(&settings.redis_url)
        .await
        .with_context(|| format!("Cannot reach redis at {}", settings.redis_url))?;

    println!("Queues:");
    for queue in KNOWN_QUEUES {
        let len = cache.queue_len(queue).await?;
        println!("  {:<8} {} tasks", queue, len);
    }
    Ok(())
}

pub(crate) async fn cmd_maintenance(
    log_days: u32,
    metric_days: u32,
    command_days: u32,
) -> Result<()> {
    let settings = Settings::from_env()?;
    settings.ensure_dirs()?;

    let store = ActivityStore::open(&settings.database_path)?;
    let manager = MaintenanceManager::new(store, settings.data_dir.clone());
    let report = manager
        .run(RetentionPolicy {
            log_days,
            metric_days,
            command_days,
        })
        .await?;

    println!("Maintenance finished:");
    println!("  Logs removed:     {}", report.logs_removed);
    println!("  Metrics removed:  {}", report.metrics_removed);
    println!("  Commands removed: {}", report.commands_removed);
    match report.backup {
        Some(stem) => println!("  Vault backup:     {}", stem.display()),
        None => println!("  Vault backup:     skipped (no vault)"),
    }
    Ok(())
}
