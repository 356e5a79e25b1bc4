//! Classify command - show how files in a build tree classify

use crate::cache::format_bytes;
use crate::classify::{scan_tree, FileEntry};
use crate::cli::args::{ClassifyArgs, OutputFormat};
use crate::config::Config;
use crate::error::StratumResult;
use crate::plan::digest::short_digest;

/// Execute the classify command
pub async fn execute(args: ClassifyArgs, config: &Config) -> StratumResult<()> {
    let project_dir = super::plan::resolve_project_dir(args.project.as_deref())?;
    let entries = scan_tree(&project_dir, &config.scan.rules()).await?;

    if entries.is_empty() {
        println!("No files found under {}", project_dir.display());
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&entries, config),
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Plain => print_plain(&entries),
    }

    Ok(())
}

fn print_table(entries: &[FileEntry], config: &Config) {
    println!("{:<50} {:<20} {:>10} {:<14}", "PATH", "CLASS", "SIZE", "HASH");
    println!("{}", "-".repeat(96));

    for entry in entries {
        println!(
            "{:<50} {:<20} {:>10} {:<14}",
            entry.path,
            entry.class.to_string(),
            format_bytes(entry.size),
            short_digest(&entry.content_hash),
        );
    }

    println!();
    for class in &config.layout.volatility_order {
        let (count, bytes) = entries
            .iter()
            .filter(|e| e.class == *class)
            .fold((0usize, 0u64), |(c, b), e| (c + 1, b + e.size));
        if count > 0 {
            println!("{}: {} file(s), {}", class, count, format_bytes(bytes));
        }
    }
    println!("Total: {} file(s)", entries.len());
}

fn print_json(entries: &[FileEntry]) -> StratumResult<()> {
    println!("{}", serde_json::to_string_pretty(entries)?);
    Ok(())
}

fn print_plain(entries: &[FileEntry]) {
    for entry in entries {
        println!("{}\t{}", entry.class, entry.path);
    }
}
