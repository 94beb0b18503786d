//! Vault statistics.
//!
//! A quick summary of what the catalog holds: counts per status, DOI
//! coverage, a per-type breakdown, on-disk size and the purgatory backlog.
//! Used by `tome stats`.

use anyhow::Result;
use walkdir::WalkDir;

use crate::vault::Vault;

/// Run the stats command: query the catalog and print a summary.
pub async fn run_stats(vault: &Vault) -> Result<()> {
    let stats = vault.catalog().stats().await?;
    let staged = vault.purgatory().list()?.len();
    let catalog_path = vault.config().vault.catalog_path();
    let db_size = std::fs::metadata(&catalog_path)
        .map(|m| m.len())
        .unwrap_or(0);
    let archive_bytes = dir_size(&vault.layout().root().join(crate::layout::TOME_DIR));

    println!("Tome Vault Stats");
    println!("================");
    println!();
    println!("  Root:        {}", vault.layout().root().display());
    println!("  Catalog:     {} ({})", catalog_path.display(), format_bytes(db_size));
    println!("  Archives:    {}", format_bytes(archive_bytes));
    println!();
    println!("  Documents:   {}", stats.total);
    println!("    verified:  {}", stats.verified);
    println!("    manual:    {}", stats.manual);
    println!("    review:    {}", stats.review);
    println!(
        "  With DOI:    {} / {} ({}%)",
        stats.with_doi,
        stats.total,
        if stats.total > 0 {
            (stats.with_doi * 100) / stats.total
        } else {
            0
        }
    );
    println!("  Purgatory:   {}", staged);

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>6}", "TYPE", "DOCS");
        println!("  {}", "-".repeat(23));
        for (doc_type, count) in &stats.by_type {
            println!("  {:<16} {:>6}", doc_type, count);
        }
    }

    println!();
    Ok(())
}

fn dir_size(dir: &std::path::Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
