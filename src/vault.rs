//! The vault: one configured store with its catalog, archives, staging
//! area and collaborators.
//!
//! Everything hangs off an explicit [`Config`], so several vaults can be
//! open in one process. Ingest lives in [`crate::ingest`], promotion in
//! [`crate::promote`]; both finish through [`Vault::commit`].

use std::fs::File;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tome_core::chunk::chunk_pages;
use tome_core::models::DocumentMeta;
use tome_core::slug::{disambiguate_key, validate_key};
use tome_core::ContentHash;

use crate::archive;
use crate::catalog::{Catalog, CatalogEntry, TitleSource};
use crate::config::Config;
use crate::error::{Result, VaultError};
use crate::extract::PdfExtractor;
use crate::layout::Layout;
use crate::purgatory::Purgatory;
use crate::scanner::PhraseScanner;
use crate::traits::{ContentScanner, Extractor, ReferenceResolver};

/// One step of committing a document to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    CopySource,
    WriteArchive,
    UpsertCatalog,
    RetireOldKey,
    RemoveStaging,
}

pub struct Vault {
    config: Config,
    layout: Layout,
    catalog: Catalog,
    purgatory: Purgatory,
    pub(crate) extractor: Box<dyn Extractor>,
    pub(crate) resolver: Option<Box<dyn ReferenceResolver>>,
    pub(crate) scanner: Option<Box<dyn ContentScanner>>,
}

impl Vault {
    /// Open the vault described by `config`, creating directories and the
    /// catalog as needed. Uses the default extractor and scanner and no
    /// reference resolver.
    pub async fn open(config: Config) -> Result<Self> {
        let layout = Layout::new(&config.vault.root);
        layout.ensure_dirs()?;
        let catalog = Catalog::open(&config.vault.catalog_path()).await?;
        let purgatory = Purgatory::new(config.vault.purgatory_dir());
        let scanner: Option<Box<dyn ContentScanner>> = if config.scanner.enabled {
            Some(Box::new(PhraseScanner::new()))
        } else {
            None
        };
        Ok(Self {
            config,
            layout,
            catalog,
            purgatory,
            extractor: Box::new(PdfExtractor::new()),
            resolver: None,
            scanner,
        })
    }

    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_resolver(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_scanner(mut self, scanner: impl ContentScanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn purgatory(&self) -> &Purgatory {
        &self.purgatory
    }

    pub async fn close(&self) {
        self.catalog.close().await;
    }

    /// `key`, or the first free `key` + `a`..`z` not held by another
    /// document in the catalog or on disk.
    pub(crate) async fn free_key(&self, key: &str, hash: &ContentHash) -> Result<String> {
        let taken = self.catalog.keys_taken(key, hash).await?;
        Ok(disambiguate_key(key, |k| {
            taken.contains(k) || !matches!(self.owner_on_disk(k, hash), Ok(None))
        })?)
    }

    /// Accept `key` exactly as given, failing with
    /// [`VaultError::DuplicateKey`] when another document holds it.
    pub(crate) async fn claim_key(&self, key: &str, hash: &ContentHash) -> Result<()> {
        validate_key(key)?;
        let owner = match self.catalog.key_owner(key).await?.filter(|h| h != hash) {
            Some(owner) => Some(owner),
            None => self.owner_on_disk(key, hash)?,
        };
        match owner {
            Some(owner) => Err(VaultError::DuplicateKey {
                key: key.to_string(),
                existing_hash: owner.as_str().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Hash of a document other than `hash` whose archive or source file
    /// sits under `key`. Archives are the ground truth even when the
    /// catalog has lost their row. A corrupt archive holds nothing.
    fn owner_on_disk(&self, key: &str, hash: &ContentHash) -> Result<Option<ContentHash>> {
        let archived = match archive::read_meta(&self.layout.archive_path(key)) {
            Ok(existing) => Some(existing.content_hash),
            Err(VaultError::ArchiveNotFound(_)) => None,
            Err(e) if e.is_corrupt() => None,
            Err(e) => return Err(e),
        };
        let source = file_hash(&self.layout.source_path(key));
        Ok([archived, source].into_iter().flatten().find(|owner| owner != hash))
    }

    /// Copy bytes, write the archive and upsert the catalog for `meta`.
    ///
    /// Every step first checks whether its effect is already in place and
    /// skips if so, so re-running after a crash converges. Files under
    /// `meta.key` that belong to another document are never overwritten.
    /// Returns the steps actually performed.
    pub(crate) async fn commit(
        &self,
        meta: &mut DocumentMeta,
        bytes: &[u8],
        pages: &[String],
    ) -> Result<Vec<CommitStep>> {
        let mut performed = Vec::new();
        let key = meta.key.clone();
        if meta.ingested_at.is_none() {
            meta.ingested_at = Some(Utc::now());
        }

        if let Some(owner) = self.owner_on_disk(&key, &meta.content_hash)? {
            return Err(VaultError::DuplicateKey {
                key,
                existing_hash: owner.as_str().to_string(),
            });
        }

        let chunks = if self.config.chunking.enabled {
            meta.chunk_params = tome_core::chunk::chunk_params(self.config.chunking.max_tokens);
            Some(chunk_pages(pages, self.config.chunking.max_tokens))
        } else {
            meta.chunk_params.clear();
            None
        };

        let source = self.layout.source_path(&key);
        if file_hash(&source).as_ref() != Some(&meta.content_hash) {
            write_atomic(&source, bytes)?;
            performed.push(CommitStep::CopySource);
        }

        let archive_path = self.layout.archive_path(&key);
        let archived = match archive::read_meta(&archive_path) {
            Ok(existing) => same_document(&existing, meta),
            Err(VaultError::ArchiveNotFound(_)) => false,
            Err(e) if e.is_corrupt() => {
                tracing::warn!(path = %archive_path.display(), error = %e, "overwriting corrupt archive");
                false
            }
            Err(e) => return Err(e),
        };
        if !archived {
            archive::write(&archive_path, meta, pages, chunks.as_ref())?;
            performed.push(CommitStep::WriteArchive);
        }

        let previous = self.catalog.get(&meta.content_hash).await?;
        let current = match &previous {
            Some(row) => {
                row == &CatalogEntry::from_meta(meta)
                    && same_title_sources(
                        &self.catalog.title_sources(&meta.content_hash).await?,
                        meta,
                    )
            }
            None => false,
        };
        if !current {
            self.catalog.upsert(meta).await?;
            performed.push(CommitStep::UpsertCatalog);
        }

        if let Some(old) = previous.filter(|row| row.key != key) {
            self.retire_key(&old.key)?;
            performed.push(CommitStep::RetireOldKey);
        }

        Ok(performed)
    }

    /// Remove the files left under a key the document no longer uses.
    fn retire_key(&self, old_key: &str) -> Result<()> {
        for path in [self.layout.archive_path(old_key), self.layout.source_path(old_key)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(old_key, "retired previous key");
        Ok(())
    }
}

/// Hash of the file at `path`, or `None` when it cannot be read.
fn file_hash(path: &Path) -> Option<ContentHash> {
    File::open(path).and_then(ContentHash::of_reader).ok()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Equal apart from timestamps, which differ between retries.
fn same_document(a: &DocumentMeta, b: &DocumentMeta) -> bool {
    let strip = |m: &DocumentMeta| {
        let mut m = m.clone();
        m.ingested_at = None;
        m.verified_at = None;
        m
    };
    strip(a) == strip(b)
}

fn same_title_sources(stored: &[TitleSource], meta: &DocumentMeta) -> bool {
    stored.len() == meta.title_sources.len()
        && stored
            .iter()
            .all(|s| meta.title_sources.get(&s.source) == Some(&s.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tome_core::models::Status;

    async fn open_temp() -> (TempDir, Vault) {
        let dir = TempDir::new().unwrap();
        let vault = Vault::open(Config::for_root(dir.path())).await.unwrap();
        (dir, vault)
    }

    fn meta(bytes: &[u8], key: &str) -> DocumentMeta {
        let mut m = DocumentMeta::new(ContentHash::of_bytes(bytes), key);
        m.title = "Spin waves".into();
        m.first_author = "Smith".into();
        m.status = Status::Verified;
        m
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let (_dir, vault) = open_temp().await;
        let bytes = b"%PDF-1.4 body";
        let pages = vec!["Spin waves in magnets.".to_string()];
        let mut m = meta(bytes, "smith2024spin");

        let first = vault.commit(&mut m, bytes, &pages).await.unwrap();
        assert_eq!(
            first,
            vec![CommitStep::CopySource, CommitStep::WriteArchive, CommitStep::UpsertCatalog]
        );
        assert!(vault.commit(&mut m, bytes, &pages).await.unwrap().is_empty());

        // Lose the catalog row only: just that step reruns.
        vault.catalog().delete(&m.content_hash).await.unwrap();
        assert_eq!(
            vault.commit(&mut m, bytes, &pages).await.unwrap(),
            vec![CommitStep::UpsertCatalog]
        );
        let stored = archive::read_meta(&vault.layout().archive_path("smith2024spin")).unwrap();
        assert!(!stored.chunk_params.is_empty());
    }

    #[tokio::test]
    async fn test_commit_under_new_key_retires_old_files() {
        let (_dir, vault) = open_temp().await;
        let bytes = b"%PDF-1.4 body";
        let mut m = meta(bytes, "old2024key");
        vault.commit(&mut m, bytes, &[]).await.unwrap();

        m.key = "new2024key".into();
        let steps = vault.commit(&mut m, bytes, &[]).await.unwrap();
        assert!(steps.contains(&CommitStep::RetireOldKey));
        assert!(!vault.layout().archive_path("old2024key").exists());
        assert!(!vault.layout().source_path("old2024key").exists());
        assert!(vault.layout().archive_path("new2024key").exists());
    }

    #[tokio::test]
    async fn test_commit_refreshes_row_on_any_change() {
        let (_dir, vault) = open_temp().await;
        let bytes = b"%PDF-1.4 body";
        let mut m = meta(bytes, "smith2024spin");
        vault.commit(&mut m, bytes, &[]).await.unwrap();

        m.verified_at = Some(chrono::Utc::now());
        assert_eq!(
            vault.commit(&mut m, bytes, &[]).await.unwrap(),
            vec![CommitStep::UpsertCatalog]
        );
        let row = vault.catalog().get(&m.content_hash).await.unwrap().unwrap();
        assert!(row.verified_at.is_some());

        m.title_sources.insert("manual".into(), "Spin waves".into());
        let steps = vault.commit(&mut m, bytes, &[]).await.unwrap();
        assert!(steps.contains(&CommitStep::UpsertCatalog));
        let sources = vault.catalog().title_sources(&m.content_hash).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(vault.commit(&mut m, bytes, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_never_overwrites_another_documents_files() {
        let (_dir, vault) = open_temp().await;
        let mut a = meta(b"a", "smith2024spin");
        vault.commit(&mut a, b"a", &[]).await.unwrap();
        vault.catalog().delete(&a.content_hash).await.unwrap();

        let mut b = meta(b"b", "smith2024spin");
        match vault.commit(&mut b, b"b", &[]).await {
            Err(VaultError::DuplicateKey { existing_hash, .. }) => {
                assert_eq!(existing_hash, a.content_hash.as_str())
            }
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
        let kept = archive::read_meta(&vault.layout().archive_path("smith2024spin")).unwrap();
        assert_eq!(kept.content_hash, a.content_hash);
        assert_eq!(std::fs::read(vault.layout().source_path("smith2024spin")).unwrap(), b"a");

        assert_eq!(
            vault.free_key("smith2024spin", &b.content_hash).await.unwrap(),
            "smith2024spina"
        );
        assert!(matches!(
            vault.claim_key("smith2024spin", &b.content_hash).await,
            Err(VaultError::DuplicateKey { .. })
        ));
        assert!(vault.claim_key("smith2024spin", &a.content_hash).await.is_ok());
    }

    #[tokio::test]
    async fn test_free_key_skips_other_documents() {
        let (_dir, vault) = open_temp().await;
        let mut a = meta(b"a", "smith2024spin");
        vault.commit(&mut a, b"a", &[]).await.unwrap();

        let b_hash = ContentHash::of_bytes(b"b");
        assert_eq!(vault.free_key("smith2024spin", &b_hash).await.unwrap(), "smith2024spina");
        assert_eq!(
            vault.free_key("smith2024spin", &a.content_hash).await.unwrap(),
            "smith2024spin"
        );
    }
}
