//! SQLite catalog: a queryable projection of every archive.
//!
//! Rows are keyed by content hash, with unique secondary lookups by key and
//! (nullable) DOI. Archives are the ground truth; the catalog can always be
//! thrown away and rebuilt from them with [`Catalog::rebuild`].

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tome_core::fuzzy::token_set_ratio;
use tome_core::models::{DocType, DocumentMeta, Status};
use tome_core::ContentHash;

use crate::archive;
use crate::db;
use crate::error::{Result, VaultError};
use crate::layout::Layout;
use crate::migrate;

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub content_hash: String,
    pub key: String,
    pub doi: Option<String>,
    pub external_id: Option<String>,
    pub external_id_type: Option<String>,
    pub title: String,
    pub first_author: String,
    pub year: Option<i64>,
    pub journal: Option<String>,
    pub entry_type: String,
    pub status: String,
    pub doi_verified: bool,
    pub title_match_score: Option<f64>,
    pub page_count: i64,
    pub word_count: i64,
    pub ref_count: i64,
    pub figure_count: i64,
    pub table_count: i64,
    pub language: String,
    pub text_quality: Option<f64>,
    pub has_abstract: bool,
    pub doc_type: String,
    pub parent_hash: Option<String>,
    pub supplement_index: Option<i64>,
    pub vault_path: Option<String>,
    pub ingested_at: Option<String>,
    pub verified_at: Option<String>,
}

impl CatalogEntry {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            content_hash: row.get("content_hash"),
            key: row.get("key"),
            doi: row.get("doi"),
            external_id: row.get("external_id"),
            external_id_type: row.get("external_id_type"),
            title: row.get("title"),
            first_author: row.get("first_author"),
            year: row.get("year"),
            journal: row.get("journal"),
            entry_type: row.get("entry_type"),
            status: row.get("status"),
            doi_verified: row.get("doi_verified"),
            title_match_score: row.get("title_match_score"),
            page_count: row.get("page_count"),
            word_count: row.get("word_count"),
            ref_count: row.get("ref_count"),
            figure_count: row.get("figure_count"),
            table_count: row.get("table_count"),
            language: row.get("language"),
            text_quality: row.get("text_quality"),
            has_abstract: row.get("has_abstract"),
            doc_type: row.get("paper_type"),
            parent_hash: row.get("parent_hash"),
            supplement_index: row.get("supplement_index"),
            vault_path: row.get("vault_path"),
            ingested_at: row.get("ingested_at"),
            verified_at: row.get("verified_at"),
        }
    }
}

impl CatalogEntry {
    /// The row [`Catalog::upsert`] writes for `meta`.
    pub fn from_meta(meta: &DocumentMeta) -> Self {
        Self {
            content_hash: meta.content_hash.as_str().to_string(),
            key: meta.key.clone(),
            doi: meta.doi.clone(),
            external_id: meta.external_id.clone(),
            external_id_type: meta.external_id_type.clone(),
            title: meta.title.clone(),
            first_author: meta.first_author.clone(),
            year: meta.year.map(i64::from),
            journal: meta.journal.clone(),
            entry_type: meta.entry_type.clone(),
            status: meta.status.as_str().to_string(),
            doi_verified: meta.doi_verified,
            title_match_score: meta.title_match_score,
            page_count: i64::from(meta.page_count),
            word_count: i64::from(meta.word_count),
            ref_count: i64::from(meta.ref_count),
            figure_count: i64::from(meta.figure_count),
            table_count: i64::from(meta.table_count),
            language: meta.language.clone(),
            text_quality: Some(meta.text_quality),
            has_abstract: meta.has_abstract,
            doc_type: meta.doc_type.as_str().to_string(),
            parent_hash: meta.parent_hash.as_ref().map(|h| h.as_str().to_string()),
            supplement_index: meta.supplement_index.map(i64::from),
            vault_path: Some(Layout::relative_archive_path(&meta.key)),
            ingested_at: meta.ingested_at.map(|t| t.to_rfc3339()),
            verified_at: meta.verified_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleSource {
    pub source: String,
    pub title: String,
    /// Agreement of this source's title with the catalog title.
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectLink {
    pub project_id: String,
    pub content_hash: String,
    pub key: String,
    pub local_key: String,
    pub added_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: i64,
    pub verified: i64,
    pub manual: i64,
    pub review: i64,
    pub with_doi: i64,
    pub by_type: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<Status>,
    pub doc_type: Option<DocType>,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO papers (
        content_hash, key, doi, external_id, external_id_type,
        title, first_author, year, journal, entry_type,
        status, doi_verified, title_match_score,
        page_count, word_count, ref_count, figure_count, table_count,
        language, text_quality, has_abstract, paper_type,
        parent_hash, supplement_index, vault_path, ingested_at, verified_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(content_hash) DO UPDATE SET
        key = excluded.key,
        doi = excluded.doi,
        external_id = excluded.external_id,
        external_id_type = excluded.external_id_type,
        title = excluded.title,
        first_author = excluded.first_author,
        year = excluded.year,
        journal = excluded.journal,
        entry_type = excluded.entry_type,
        status = excluded.status,
        doi_verified = excluded.doi_verified,
        title_match_score = excluded.title_match_score,
        page_count = excluded.page_count,
        word_count = excluded.word_count,
        ref_count = excluded.ref_count,
        figure_count = excluded.figure_count,
        table_count = excluded.table_count,
        language = excluded.language,
        text_quality = excluded.text_quality,
        has_abstract = excluded.has_abstract,
        paper_type = excluded.paper_type,
        parent_hash = excluded.parent_hash,
        supplement_index = excluded.supplement_index,
        vault_path = excluded.vault_path,
        ingested_at = excluded.ingested_at,
        verified_at = excluded.verified_at
"#;

#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if needed) and migrate the catalog at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert or fully replace the row for `meta.content_hash`.
    ///
    /// Fails with [`VaultError::DuplicateKey`] or [`VaultError::DuplicateDoi`]
    /// when the key or DOI already belongs to another content hash. The
    /// row's title sources are replaced wholesale.
    pub async fn upsert(&self, meta: &DocumentMeta) -> Result<()> {
        let hash = meta.content_hash.as_str();
        let mut tx = self.pool.begin().await?;

        let key_owner: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM papers WHERE key = ? AND content_hash != ?")
                .bind(&meta.key)
                .bind(hash)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(existing_hash) = key_owner {
            return Err(VaultError::DuplicateKey {
                key: meta.key.clone(),
                existing_hash,
            });
        }

        if let Some(doi) = &meta.doi {
            let doi_owner: Option<String> =
                sqlx::query_scalar("SELECT key FROM papers WHERE doi = ? AND content_hash != ?")
                    .bind(doi)
                    .bind(hash)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(existing_key) = doi_owner {
                return Err(VaultError::DuplicateDoi {
                    doi: doi.clone(),
                    existing_key,
                });
            }
        }

        let ingested_at = meta.ingested_at.unwrap_or_else(Utc::now).to_rfc3339();
        sqlx::query(UPSERT_SQL)
            .bind(hash)
            .bind(&meta.key)
            .bind(&meta.doi)
            .bind(&meta.external_id)
            .bind(&meta.external_id_type)
            .bind(&meta.title)
            .bind(&meta.first_author)
            .bind(meta.year)
            .bind(&meta.journal)
            .bind(&meta.entry_type)
            .bind(meta.status.as_str())
            .bind(meta.doi_verified)
            .bind(meta.title_match_score)
            .bind(meta.page_count as i64)
            .bind(meta.word_count as i64)
            .bind(meta.ref_count as i64)
            .bind(meta.figure_count as i64)
            .bind(meta.table_count as i64)
            .bind(&meta.language)
            .bind(meta.text_quality)
            .bind(meta.has_abstract)
            .bind(meta.doc_type.as_str())
            .bind(meta.parent_hash.as_ref().map(ContentHash::as_str))
            .bind(meta.supplement_index.map(i64::from))
            .bind(Layout::relative_archive_path(&meta.key))
            .bind(ingested_at)
            .bind(meta.verified_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .map_err(|e| constraint_error(e, meta))?;

        sqlx::query("DELETE FROM title_sources WHERE content_hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        for (source, title) in &meta.title_sources {
            let confidence = (!meta.title.is_empty()).then(|| token_set_ratio(title, &meta.title));
            sqlx::query(
                "INSERT INTO title_sources (content_hash, source, title, confidence) VALUES (?, ?, ?, ?)",
            )
            .bind(hash)
            .bind(source)
            .bind(title)
            .bind(confidence)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, hash: &ContentHash) -> Result<Option<CatalogEntry>> {
        self.get_where("content_hash", hash.as_str()).await
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<CatalogEntry>> {
        self.get_where("key", key).await
    }

    pub async fn get_by_doi(&self, doi: &str) -> Result<Option<CatalogEntry>> {
        self.get_where("doi", doi).await
    }

    async fn get_where(&self, column: &str, value: &str) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT * FROM papers WHERE {} = ?", column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(CatalogEntry::from_row))
    }

    /// Content hash currently holding `key`, if any.
    pub async fn key_owner(&self, key: &str) -> Result<Option<ContentHash>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT content_hash FROM papers WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(ContentHash::from_hex))
    }

    /// Keys beginning with `prefix` that belong to documents other than
    /// `excluding`. Feeds key disambiguation.
    pub async fn keys_taken(&self, prefix: &str, excluding: &ContentHash) -> Result<HashSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM papers WHERE substr(key, 1, length(?1)) = ?1 AND content_hash != ?2",
        )
        .bind(prefix)
        .bind(excluding.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(keys.into_iter().collect())
    }

    /// Rows matching the filter, ordered by key.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM papers
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR paper_type = ?2)
            ORDER BY key
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.doc_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(CatalogEntry::from_row).collect())
    }

    /// `(key, title)` for every row, used for near-duplicate detection.
    pub async fn titles(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, title FROM papers ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("key"), r.get("title")))
            .collect())
    }

    pub async fn title_sources(&self, hash: &ContentHash) -> Result<Vec<TitleSource>> {
        let rows = sqlx::query(
            "SELECT source, title, confidence FROM title_sources WHERE content_hash = ? ORDER BY source",
        )
        .bind(hash.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| TitleSource {
                source: r.get("source"),
                title: r.get("title"),
                confidence: r.get("confidence"),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(status = 'verified'), 0) AS verified,
                COALESCE(SUM(status = 'manual'), 0) AS manual,
                COALESCE(SUM(status = 'review'), 0) AS review,
                COALESCE(SUM(doi IS NOT NULL), 0) AS with_doi
            FROM papers
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_type = sqlx::query(
            "SELECT paper_type, COUNT(*) AS n FROM papers GROUP BY paper_type ORDER BY n DESC, paper_type",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| (r.get("paper_type"), r.get("n")))
        .collect();

        Ok(CatalogStats {
            total: row.get("total"),
            verified: row.get("verified"),
            manual: row.get("manual"),
            review: row.get("review"),
            with_doi: row.get("with_doi"),
            by_type,
        })
    }

    /// Remove a row; title sources and project links go with it.
    pub async fn delete(&self, hash: &ContentHash) -> Result<bool> {
        let result = sqlx::query("DELETE FROM papers WHERE content_hash = ?")
            .bind(hash.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Link a cataloged document into a project, replacing any prior link.
    pub async fn link(&self, project_id: &str, hash: &ContentHash, local_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO project_papers (project_id, content_hash, local_key, added_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(project_id)
        .bind(hash.as_str())
        .bind(local_key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unlink(&self, project_id: &str, hash: &ContentHash) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM project_papers WHERE project_id = ? AND content_hash = ?")
                .bind(project_id)
                .bind(hash.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn project_papers(&self, project_id: &str) -> Result<Vec<ProjectLink>> {
        let rows = sqlx::query(
            r#"
            SELECT pp.project_id, pp.content_hash, p.key, pp.local_key, pp.added_at
            FROM project_papers pp
            JOIN papers p ON p.content_hash = pp.content_hash
            WHERE pp.project_id = ?
            ORDER BY pp.local_key
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| ProjectLink {
                project_id: r.get("project_id"),
                content_hash: r.get("content_hash"),
                key: r.get("key"),
                local_key: r.get("local_key"),
                added_at: r.get("added_at"),
            })
            .collect())
    }

    /// Drop the catalog and re-index every archive under `layout`.
    ///
    /// Archives that are corrupt, written by a newer format, or collide on
    /// key/DOI with an earlier archive are skipped with a warning. Project
    /// links survive for documents that are re-indexed. Returns the number
    /// of archives indexed.
    pub async fn rebuild(&self, layout: &Layout) -> Result<usize> {
        let links = sqlx::query("SELECT project_id, content_hash, local_key, added_at FROM project_papers")
            .fetch_all(&self.pool)
            .await?;
        let links: Vec<(String, String, String, String)> = links
            .iter()
            .map(|r| {
                (
                    r.get("project_id"),
                    r.get("content_hash"),
                    r.get("local_key"),
                    r.get("added_at"),
                )
            })
            .collect();

        migrate::reset(&self.pool).await?;

        let mut count = 0;
        for path in layout.iter_archives()? {
            let meta = match archive::read_meta(&path) {
                Ok(meta) => meta,
                Err(e @ (VaultError::CorruptArchive { .. } | VaultError::UnsupportedSchema(_))) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable archive");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.upsert(&meta).await {
                Ok(()) => count += 1,
                Err(e @ (VaultError::DuplicateKey { .. } | VaultError::DuplicateDoi { .. })) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping colliding archive");
                }
                Err(e) => return Err(e),
            }
        }

        for (project_id, hash, local_key, added_at) in links {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO project_papers (project_id, content_hash, local_key, added_at)
                SELECT ?, content_hash, ?, ? FROM papers WHERE content_hash = ?
                "#,
            )
            .bind(project_id)
            .bind(local_key)
            .bind(added_at)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(count, "catalog rebuilt");
        Ok(count)
    }
}

/// Map a unique-constraint race past the preflight checks to the same
/// errors the preflight would have produced.
fn constraint_error(err: sqlx::Error, meta: &DocumentMeta) -> VaultError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("papers.key") {
                return VaultError::DuplicateKey {
                    key: meta.key.clone(),
                    existing_hash: String::new(),
                };
            }
            if message.contains("papers.doi") {
                return VaultError::DuplicateDoi {
                    doi: meta.doi.clone().unwrap_or_default(),
                    existing_key: String::new(),
                };
            }
        }
    }
    VaultError::Sqlx(err)
}
