//! Cache command - manage the layer artifact cache

use crate::cache::{CacheRecord, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{StratumError, StratumResult};
use crate::plan::digest::short_digest;
use crate::ui::{self, UiContext};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> StratumResult<()> {
    match args.action {
        CacheAction::List { format } => list_cache(format).await,
        CacheAction::Gc { days, dry_run } => gc_cache(config, days, dry_run).await,
        CacheAction::Clear { yes } => clear_cache(yes).await,
    }
}

/// List cached layer artifacts
async fn list_cache(format: OutputFormat) -> StratumResult<()> {
    let store = CacheStore::open(ConfigManager::records_path()).await?;

    if store.is_empty() {
        println!("No cached layers.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_cache_table(&store),
        OutputFormat::Json => print_cache_json(&store)?,
        OutputFormat::Plain => print_cache_plain(&store),
    }

    Ok(())
}

fn print_cache_table(store: &CacheStore) {
    println!("{:<14} {:<10} {:<20} ARTIFACT", "DIGEST", "STATE", "CREATED");
    println!("{}", "-".repeat(80));

    for record in store.records() {
        let state = if Path::new(&record.artifact).exists() {
            "staged"
        } else {
            "missing"
        };
        println!(
            "{:<14} {:<10} {:<20} {}",
            short_digest(&record.digest),
            state,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.artifact,
        );
    }

    println!();
    println!("Total: {} cached layer(s)", store.len());
}

fn print_cache_json(store: &CacheStore) -> StratumResult<()> {
    let records: Vec<&CacheRecord> = store.records();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn print_cache_plain(store: &CacheStore) {
    for record in store.records() {
        println!("{}\t{}", record.digest, record.artifact);
    }
}

/// Remove cached layers older than the retention window, plus any
/// staging leftovers from crashed runs
async fn gc_cache(config: &Config, days: Option<u32>, dry_run: bool) -> StratumResult<()> {
    let ctx = UiContext::detect();
    let days = days.unwrap_or(config.cache.gc_days);

    if days == 0 {
        ui::step_warn_hint(
            &ctx,
            "Cache gc is disabled",
            "Pass --days N or set cache.gc_days",
        );
        return Ok(());
    }

    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let mut store = CacheStore::open(ConfigManager::records_path()).await?;

    let expired: Vec<CacheRecord> = store
        .records()
        .into_iter()
        .filter(|r| r.created_at < cutoff)
        .cloned()
        .collect();

    // Orphans are dirs no record references at all; expired dirs are
    // handled separately below
    let recorded_digests: HashSet<String> = store
        .records()
        .into_iter()
        .map(|r| r.digest.clone())
        .collect();

    let orphans = find_orphan_dirs(&ConfigManager::layers_dir(), &recorded_digests).await?;

    if expired.is_empty() && orphans.is_empty() {
        ui::step_ok(&ctx, &format!("Nothing older than {} day(s) to remove", days));
        return Ok(());
    }

    if dry_run {
        for record in &expired {
            ui::step_info(
                &ctx,
                &format!("Would remove layer {}", short_digest(&record.digest)),
            );
        }
        for orphan in &orphans {
            ui::step_info(&ctx, &format!("Would remove orphan {}", orphan));
        }
        return Ok(());
    }

    let layers_dir = ConfigManager::layers_dir();
    for record in &expired {
        // Only touch artifacts that live inside the layers directory
        let artifact = Path::new(&record.artifact);
        if artifact.starts_with(&layers_dir) && artifact.exists() {
            tokio::fs::remove_dir_all(artifact)
                .await
                .map_err(|e| StratumError::io(format!("removing {}", record.artifact), e))?;
        }
        debug!("Removed expired layer {}", record.digest);
    }
    for orphan in &orphans {
        let path = layers_dir.join(orphan);
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| StratumError::io(format!("removing {}", path.display()), e))?;
    }

    let removed = store.compact(|r| r.created_at >= cutoff).await?;
    ui::step_ok(
        &ctx,
        &format!(
            "Removed {} expired layer(s) and {} orphan dir(s)",
            removed,
            orphans.len()
        ),
    );

    Ok(())
}

/// Directories under the layers dir not referenced by any record
async fn find_orphan_dirs(
    layers_dir: &Path,
    recorded_digests: &HashSet<String>,
) -> StratumResult<Vec<String>> {
    let mut orphans = Vec::new();

    let mut read_dir = match tokio::fs::read_dir(layers_dir).await {
        Ok(rd) => rd,
        Err(_) => return Ok(orphans), // Directory doesn't exist yet
    };

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| StratumError::io("reading layers directory", e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        // Staging leftovers from crashed runs are always orphans
        if name.starts_with(".staging-") || !recorded_digests.contains(&name) {
            orphans.push(name);
        }
    }

    orphans.sort();
    Ok(orphans)
}

/// Clear all cached layers, build contexts, and records
async fn clear_cache(yes: bool) -> StratumResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let confirmed = ui::confirm(&ctx, "Remove all cached layers and records?", false).await?;
    if !confirmed {
        ui::outro_warn(&ctx, "Cache clear aborted");
        return Ok(());
    }

    for dir in [ConfigManager::layers_dir(), ConfigManager::builds_dir()] {
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| StratumError::io(format!("removing {}", dir.display()), e))?;
        }
    }

    let records = ConfigManager::records_path();
    if records.exists() {
        tokio::fs::remove_file(&records)
            .await
            .map_err(|e| StratumError::io("removing cache records", e))?;
    }

    ConfigManager::ensure_state_dirs().await?;
    ui::step_ok(&ctx, "Cache cleared");

    Ok(())
}
