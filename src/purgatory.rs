//! Purgatory: the staging store for documents awaiting review.
//!
//! One directory per staged document, named by a collision-resolved
//! temporary key:
//!
//! ```text
//! purgatory/<temp_key>/
//!   source.pdf     raw bytes
//!   meta.json      candidate DocumentMeta (versioned envelope)
//!   triage.json    TriageResult (versioned envelope)
//!   pages.json     extracted page texts
//! ```
//!
//! Entries never expire. They leave only through promote or discard, both
//! of which delete the directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tome_core::models::{DocumentMeta, TriageResult};
use tome_core::slug::{sanitize_key, validate_key};

use crate::error::{Result, VaultError};

pub const SOURCE_FILE: &str = "source.pdf";
pub const META_FILE: &str = "meta.json";
pub const TRIAGE_FILE: &str = "triage.json";
pub const PAGES_FILE: &str = "pages.json";

const FALLBACK_SLOT: &str = "staged";

/// One staged document as read back from disk.
#[derive(Debug, Clone, Serialize)]
pub struct StagedEntry {
    pub temp_key: String,
    pub meta: DocumentMeta,
    pub triage: TriageResult,
    pub staged_at: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Purgatory {
    dir: PathBuf,
}

impl Purgatory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_dir(&self, temp_key: &str) -> Result<PathBuf> {
        validate_key(temp_key)?;
        Ok(self.dir.join(temp_key))
    }

    /// Claim a fresh slot named after `suggested`. Existing slots are never
    /// reused: `name`, `name_2`, `name_3` ... until `create_dir` succeeds.
    fn allocate(&self, suggested: &str) -> Result<(String, PathBuf)> {
        std::fs::create_dir_all(&self.dir)?;
        let base = Some(sanitize_key(suggested))
            .filter(|k| validate_key(k).is_ok())
            .unwrap_or_else(|| FALLBACK_SLOT.to_string());

        let mut n = 1u32;
        loop {
            let name = if n == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, n)
            };
            let path = self.dir.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok((name, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Persist a document for review and return its temporary key.
    pub fn stage(
        &self,
        bytes: &[u8],
        meta: &DocumentMeta,
        triage: &TriageResult,
        pages: &[String],
    ) -> Result<String> {
        let suggested = if triage.key_suggested.is_empty() {
            meta.key.as_str()
        } else {
            triage.key_suggested.as_str()
        };
        let (temp_key, path) = self.allocate(suggested)?;

        let written = (|| -> Result<()> {
            std::fs::write(path.join(SOURCE_FILE), bytes)?;
            std::fs::write(path.join(META_FILE), meta.to_json()?)?;
            std::fs::write(path.join(TRIAGE_FILE), triage.to_json()?)?;
            std::fs::write(path.join(PAGES_FILE), serde_json::to_vec(pages)?)?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = std::fs::remove_dir_all(&path);
            return Err(e);
        }

        tracing::info!(temp_key = %temp_key, content_hash = %meta.content_hash, "staged for review");
        Ok(temp_key)
    }

    /// Load one entry. A missing or unreadable triage snapshot degrades to
    /// a default triage; a missing metadata snapshot is an error.
    pub fn get(&self, temp_key: &str) -> Result<StagedEntry> {
        let path = self.entry_dir(temp_key)?;
        if !path.is_dir() {
            return Err(VaultError::EntryNotFound(temp_key.to_string()));
        }
        self.load(temp_key.to_string(), path)
    }

    fn load(&self, temp_key: String, path: PathBuf) -> Result<StagedEntry> {
        let meta_path = path.join(META_FILE);
        let raw = std::fs::read_to_string(&meta_path).map_err(|e| VaultError::CorruptEntry {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;
        let meta = DocumentMeta::from_json(&raw).map_err(|e| VaultError::CorruptEntry {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;

        let triage = match std::fs::read_to_string(path.join(TRIAGE_FILE)) {
            Ok(raw) => TriageResult::from_json(&raw).unwrap_or_else(|e| {
                tracing::warn!(temp_key = %temp_key, error = %e, "unreadable triage snapshot");
                TriageResult::default()
            }),
            Err(_) => TriageResult::default(),
        };

        let staged_at = std::fs::metadata(&meta_path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(StagedEntry {
            temp_key,
            meta,
            triage,
            staged_at: DateTime::<Utc>::from(staged_at),
            path,
        })
    }

    /// Every staged entry, newest first. Unreadable entries are skipped
    /// with a warning.
    pub fn list(&self) -> Result<Vec<StagedEntry>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_dir() {
                continue;
            }
            let temp_key = dirent.file_name().to_string_lossy().into_owned();
            match self.load(temp_key, dirent.path()) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = %dirent.path().display(), error = %e, "skipping staging entry")
                }
            }
        }
        entries.sort_by(|a, b| {
            b.staged_at
                .cmp(&a.staged_at)
                .then_with(|| a.temp_key.cmp(&b.temp_key))
        });
        Ok(entries)
    }

    pub fn read_source(&self, temp_key: &str) -> Result<Vec<u8>> {
        let path = self.entry_dir(temp_key)?.join(SOURCE_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::MissingSource(temp_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Extracted pages, or `None` for entries staged without them.
    pub fn read_pages(&self, temp_key: &str) -> Result<Option<Vec<String>>> {
        let path = self.entry_dir(temp_key)?.join(PAGES_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                VaultError::CorruptEntry {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a staging directory. Returns whether anything was removed;
    /// an already-removed entry is not an error.
    pub fn remove(&self, temp_key: &str) -> Result<bool> {
        let path = self.entry_dir(temp_key)?;
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn discard(&self, temp_key: &str) -> Result<bool> {
        let removed = self.remove(temp_key)?;
        if removed {
            tracing::info!(temp_key, "discarded staged entry");
        }
        Ok(removed)
    }
}
