//! Document lookup for `tome show`.
//!
//! Accepts a key, a DOI or a full content hash. The catalog row is the
//! primary answer; the archive is opened only for its manifest so a
//! missing or corrupt archive is reported, not fatal.

use anyhow::{bail, Result};
use serde::Serialize;
use tome_core::ContentHash;

use crate::archive;
use crate::catalog::{CatalogEntry, TitleSource};
use crate::vault::Vault;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub title_sources: Vec<TitleSource>,
    pub archive: ArchiveState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArchiveState {
    Present {
        page_count: usize,
        chunk_count: Option<usize>,
        embedding_dims: Option<usize>,
    },
    Missing,
    Corrupt {
        reason: String,
    },
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub async fn find_document(vault: &Vault, id: &str) -> Result<Option<DocumentView>> {
    let catalog = vault.catalog();
    let entry = if is_hex_digest(id) {
        catalog.get(&ContentHash::from_hex(id.to_lowercase())).await?
    } else if id.starts_with("10.") {
        catalog.get_by_doi(&id.to_lowercase()).await?
    } else {
        catalog.get_by_key(id).await?
    };
    let Some(entry) = entry else {
        return Ok(None);
    };

    let hash = ContentHash::from_hex(entry.content_hash.clone());
    let title_sources = catalog.title_sources(&hash).await?;
    let archive = match archive::read_manifest(&vault.layout().archive_path(&entry.key)) {
        Ok(manifest) => ArchiveState::Present {
            page_count: manifest.page_count,
            chunk_count: manifest.chunk_count,
            embedding_dims: manifest.embedding_dims,
        },
        Err(crate::error::VaultError::ArchiveNotFound(_)) => ArchiveState::Missing,
        Err(e) => ArchiveState::Corrupt {
            reason: e.to_string(),
        },
    };

    Ok(Some(DocumentView {
        entry,
        title_sources,
        archive,
    }))
}

/// CLI entry point: print one document.
pub async fn run_show(vault: &Vault, id: &str, json: bool) -> Result<()> {
    let Some(doc) = find_document(vault, id).await? else {
        bail!("document not found: {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let e = &doc.entry;
    println!("--- Document ---");
    println!("key:          {}", e.key);
    println!("title:        {}", e.title);
    println!("first_author: {}", e.first_author);
    if let Some(year) = e.year {
        println!("year:         {}", year);
    }
    if let Some(ref journal) = e.journal {
        println!("journal:      {}", journal);
    }
    if let Some(ref doi) = e.doi {
        println!(
            "doi:          {}{}",
            doi,
            if e.doi_verified { " (verified)" } else { "" }
        );
    }
    println!("status:       {}", e.status);
    println!("type:         {}", e.doc_type);
    println!("pages:        {}", e.page_count);
    println!("content_hash: {}", e.content_hash);
    if let Some(ref path) = e.vault_path {
        println!("vault_path:   {}", path);
    }
    if let Some(ref at) = e.ingested_at {
        println!("ingested_at:  {}", at);
    }

    if !doc.title_sources.is_empty() {
        println!();
        println!("--- Title sources ---");
        for s in &doc.title_sources {
            let conf = s
                .confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<16} {:>5}  {}", s.source, conf, s.title);
        }
    }

    println!();
    match &doc.archive {
        ArchiveState::Present {
            page_count,
            chunk_count,
            ..
        } => println!(
            "archive: {} pages, {} chunks",
            page_count,
            chunk_count.unwrap_or(0)
        ),
        ArchiveState::Missing => println!("archive: missing (run `tome rebuild` after restoring it)"),
        ArchiveState::Corrupt { reason } => println!("archive: corrupt ({})", reason),
    }
    Ok(())
}
