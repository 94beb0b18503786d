//! Tabular listings for `tome list`, `tome purgatory` and `tome project`.

use anyhow::Result;
use tome_core::models::{DocType, Status};

use crate::catalog::ListFilter;
use crate::vault::Vault;

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub async fn run_list(
    vault: &Vault,
    status: Option<Status>,
    doc_type: Option<DocType>,
    json: bool,
) -> Result<()> {
    let entries = vault.catalog().list(&ListFilter { status, doc_type }).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<28} {:<9} {:<9} {:>5}  TITLE", "KEY", "STATUS", "TYPE", "YEAR");
    for e in &entries {
        println!(
            "{:<28} {:<9} {:<9} {:>5}  {}",
            clip(&e.key, 28),
            e.status,
            e.doc_type,
            e.year.map(|y| y.to_string()).unwrap_or_default(),
            clip(&e.title, 60)
        );
    }
    println!();
    println!("{} document(s)", entries.len());
    Ok(())
}

pub fn run_purgatory(vault: &Vault, json: bool) -> Result<()> {
    let entries = vault.purgatory().list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Purgatory is empty.");
        return Ok(());
    }

    for e in &entries {
        println!(
            "{}  (conf {:.2}, staged {})",
            e.temp_key,
            e.triage.confidence,
            e.staged_at.format("%Y-%m-%d %H:%M")
        );
        println!("  title: {}", clip(&e.meta.title, 72));
        if !e.triage.key_suggested.is_empty() && e.triage.key_suggested != e.temp_key {
            println!("  suggested key: {}", e.triage.key_suggested);
        }
        for issue in &e.triage.issues {
            println!("  - {}", issue);
        }
    }
    println!();
    println!("{} staged", entries.len());
    Ok(())
}

pub async fn run_project(vault: &Vault, project_id: &str, json: bool) -> Result<()> {
    let links = vault.catalog().project_papers(project_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&links)?);
        return Ok(());
    }
    if links.is_empty() {
        println!("No documents linked to project '{}'.", project_id);
        return Ok(());
    }
    println!("{:<28} {:<28} ADDED", "LOCAL KEY", "VAULT KEY");
    for link in &links {
        println!("{:<28} {:<28} {}", link.local_key, link.key, link.added_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghijkl", 5), "abcd…");
    }
}
