//! Promotion out of purgatory.
//!
//! Promote is a small state machine over four resources (source bytes,
//! archive, catalog row, staging directory). Each step checks whether its
//! effect is already present before acting, so a promote interrupted at any
//! point can simply be run again:
//!
//! ```text
//! load entry → apply overrides → copy bytes → write archive → upsert catalog → remove staging
//! ```
//!
//! Two promotions of the same entry race to the same end state; the later
//! one's overrides win. A promotion never replaces a catalog row for the
//! same bytes that it did not write itself, and an explicit key that
//! belongs to another document is refused rather than suffixed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tome_core::models::Status;
use tome_core::slug::{surname_from_author, validate_key};
use tome_core::ContentHash;

use crate::error::{Result, VaultError};
use crate::vault::{CommitStep, Vault};

/// Reviewer corrections applied before promotion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoteOverrides {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// One string, authors joined by `" and "`.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    /// An empty string clears the DOI.
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromoteOutcome {
    pub temp_key: String,
    pub key: String,
    pub content_hash: ContentHash,
    pub status: Status,
    /// Steps that did work on this run; already-done steps are omitted.
    pub performed: Vec<CommitStep>,
    pub message: String,
}

impl Vault {
    /// Move a staged document into the vault under its final key.
    pub async fn promote(&self, temp_key: &str, overrides: PromoteOverrides) -> Result<PromoteOutcome> {
        let entry = self.purgatory().get(temp_key)?;
        let mut meta = entry.meta;

        if let Some(title) = overrides.title.filter(|t| !t.trim().is_empty()) {
            meta.title_sources.insert("manual".to_string(), title.clone());
            meta.title = title;
        }
        if let Some(author) = overrides.author {
            let authors: Vec<String> = author
                .split(" and ")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            if let Some(first) = authors.first() {
                meta.first_author = surname_from_author(first);
                meta.authors = authors;
            }
        }
        if let Some(year) = overrides.year {
            meta.year = Some(year);
        }
        if let Some(journal) = overrides.journal {
            meta.journal = Some(journal).filter(|j| !j.trim().is_empty());
        }
        if let Some(doi) = overrides.doi {
            let doi = doi.trim().to_lowercase();
            meta.doi = (!doi.is_empty()).then_some(doi);
        }
        if let Some(entry_type) = overrides.entry_type.filter(|t| !t.trim().is_empty()) {
            meta.entry_type = entry_type;
        }

        match overrides.key.filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                self.claim_key(&key, &meta.content_hash).await?;
                meta.key = key;
            }
            None => {
                let key = Some(entry.triage.key_suggested.clone())
                    .filter(|k| !k.is_empty())
                    .or_else(|| Some(meta.key.clone()).filter(|k| !k.is_empty()))
                    .unwrap_or_else(|| temp_key.to_string());
                validate_key(&key)?;
                meta.key = self.free_key(&key, &meta.content_hash).await?;
            }
        }

        meta.status = meta.status.after_review();
        meta.verified_at = Some(Utc::now());

        // The same bytes may have been accepted since they were staged. Only
        // a row this promotion already wrote may be replaced.
        if let Some(row) = self.catalog().get(&meta.content_hash).await? {
            if row.key != meta.key || row.status != meta.status.as_str() || row.doi != meta.doi {
                return Err(VaultError::DuplicateContent {
                    content_hash: meta.content_hash.as_str().to_string(),
                    existing_key: row.key,
                });
            }
        }

        let bytes = self.purgatory().read_source(temp_key)?;
        let pages = match self.purgatory().read_pages(temp_key)? {
            Some(pages) => pages,
            None => {
                self.extractor
                    .extract(&bytes)
                    .map_err(|e| VaultError::Extraction(format!("{:#}", e)))?
                    .pages
            }
        };

        let mut performed = self.commit(&mut meta, &bytes, &pages).await?;
        if self.purgatory().remove(temp_key)? {
            performed.push(CommitStep::RemoveStaging);
        }

        tracing::info!(temp_key, key = %meta.key, status = %meta.status, "promoted");
        Ok(PromoteOutcome {
            temp_key: temp_key.to_string(),
            message: format!("Promoted '{}' as '{}' ({})", temp_key, meta.key, meta.status),
            key: meta.key,
            content_hash: meta.content_hash,
            status: meta.status,
            performed,
        })
    }

    /// Drop a staged document. Idempotent.
    pub fn discard(&self, temp_key: &str) -> Result<bool> {
        self.purgatory().discard(temp_key)
    }
}
