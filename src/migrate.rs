use sqlx::SqlitePool;

use crate::error::Result;

/// Catalog schema, one statement per entry. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS papers (
        content_hash      TEXT PRIMARY KEY,
        key               TEXT NOT NULL,
        doi               TEXT,
        external_id       TEXT,
        external_id_type  TEXT,
        title             TEXT NOT NULL,
        first_author      TEXT NOT NULL DEFAULT '',
        year              INTEGER,
        journal           TEXT,
        entry_type        TEXT NOT NULL DEFAULT 'article',
        status            TEXT NOT NULL DEFAULT 'review',
        doi_verified      INTEGER NOT NULL DEFAULT 0,
        title_match_score REAL,
        page_count        INTEGER NOT NULL DEFAULT 0,
        word_count        INTEGER NOT NULL DEFAULT 0,
        ref_count         INTEGER NOT NULL DEFAULT 0,
        figure_count      INTEGER NOT NULL DEFAULT 0,
        table_count       INTEGER NOT NULL DEFAULT 0,
        language          TEXT NOT NULL DEFAULT 'en',
        text_quality      REAL,
        has_abstract      INTEGER NOT NULL DEFAULT 0,
        paper_type        TEXT NOT NULL DEFAULT 'article',
        parent_hash       TEXT,
        supplement_index  INTEGER,
        vault_path        TEXT,
        ingested_at       TEXT,
        verified_at       TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_papers_key ON papers(key)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_papers_doi ON papers(doi) WHERE doi IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_papers_status ON papers(status)",
    "CREATE INDEX IF NOT EXISTS idx_papers_type ON papers(paper_type)",
    "CREATE INDEX IF NOT EXISTS idx_papers_parent ON papers(parent_hash)",
    r#"
    CREATE TABLE IF NOT EXISTS title_sources (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        content_hash  TEXT NOT NULL REFERENCES papers(content_hash) ON DELETE CASCADE,
        source        TEXT NOT NULL,
        title         TEXT NOT NULL,
        confidence    REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_title_sources_hash ON title_sources(content_hash)",
    r#"
    CREATE TABLE IF NOT EXISTS project_papers (
        project_id    TEXT NOT NULL,
        content_hash  TEXT NOT NULL REFERENCES papers(content_hash) ON DELETE CASCADE,
        local_key     TEXT NOT NULL,
        added_at      TEXT NOT NULL,
        PRIMARY KEY (project_id, content_hash)
    )
    "#,
];

/// Child tables first so foreign keys never dangle mid-drop.
const DROP: &[&str] = &[
    "DROP TABLE IF EXISTS project_papers",
    "DROP TABLE IF EXISTS title_sources",
    "DROP TABLE IF EXISTS papers",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Drop every catalog table and recreate the empty schema.
pub async fn reset(pool: &SqlitePool) -> Result<()> {
    for statement in DROP {
        sqlx::query(statement).execute(pool).await?;
    }
    run_migrations(pool).await
}
