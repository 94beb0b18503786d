//! The `.tome` archive codec.
//!
//! One archive per accepted document. The container is a ZIP file with
//! these entries:
//!
//! | Entry | Contents |
//! |-------|----------|
//! | `manifest.json` | format tag, format version, page and chunk counts |
//! | `meta.json` | [`DocumentMeta`] in its versioned envelope |
//! | `pages.json` | ordered page texts, page 1 first |
//! | `chunks/index.json` | chunk texts plus page and char-offset side arrays (optional) |
//! | `chunks/embeddings.f32` | `[N × D]` little-endian f32 matrix (optional) |
//!
//! Each section is its own entry, so [`read_meta`] decompresses only the
//! metadata. Writes build the whole container in a sibling temp file and
//! rename it over the destination; there is no append mode.
//!
//! A file that exists but whose required sections cannot be parsed raises
//! [`VaultError::CorruptArchive`] carrying the path, never a bare I/O or
//! JSON error. A reader that races a rewrite may see this and should treat
//! it as recoverable.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tome_core::chunk::ChunkSet;
use tome_core::embedding::EmbeddingMatrix;
use tome_core::models::DocumentMeta;
use tome_core::CoreError;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, VaultError};

pub const ARCHIVE_EXTENSION: &str = "tome";
pub const FORMAT_TAG: &str = "tome-archive";
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_ENTRY: &str = "manifest.json";
const META_ENTRY: &str = "meta.json";
const PAGES_ENTRY: &str = "pages.json";
const CHUNK_INDEX_ENTRY: &str = "chunks/index.json";
const EMBEDDINGS_ENTRY: &str = "chunks/embeddings.f32";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    pub format_version: u32,
    pub page_count: usize,
    #[serde(default)]
    pub chunk_count: Option<usize>,
    #[serde(default)]
    pub embedding_dims: Option<usize>,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkIndex {
    texts: Vec<String>,
    pages: Vec<u32>,
    char_starts: Vec<u32>,
    char_ends: Vec<u32>,
}

/// Write a complete archive, replacing any existing file at `path`.
pub fn write(
    path: &Path,
    meta: &DocumentMeta,
    pages: &[String],
    chunks: Option<&ChunkSet>,
) -> Result<()> {
    if let Some(chunks) = chunks {
        chunks.check_shape()?;
    }
    let dir = path
        .parent()
        .ok_or_else(|| VaultError::corrupt(path, "archive path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let tmp = temp_sibling(path);
    let written = write_container(&tmp, meta, pages, chunks);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

fn write_container(
    tmp: &Path,
    meta: &DocumentMeta,
    pages: &[String],
    chunks: Option<&ChunkSet>,
) -> Result<()> {
    let file = File::create(tmp)?;
    let mut zip = ZipWriter::new(file);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let manifest = Manifest {
        format: FORMAT_TAG.to_string(),
        format_version: FORMAT_VERSION,
        page_count: pages.len(),
        chunk_count: chunks.map(ChunkSet::len),
        embedding_dims: chunks
            .and_then(|c| c.embeddings.as_ref())
            .map(EmbeddingMatrix::dims),
        written_at: Utc::now(),
    };

    zip.start_file(MANIFEST_ENTRY, deflated)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    zip.start_file(META_ENTRY, deflated)?;
    zip.write_all(meta.to_json()?.as_bytes())?;

    zip.start_file(PAGES_ENTRY, deflated)?;
    zip.write_all(&serde_json::to_vec(pages)?)?;

    if let Some(chunks) = chunks {
        let index = ChunkIndex {
            texts: chunks.texts.clone(),
            pages: chunks.pages.clone(),
            char_starts: chunks.char_starts.clone(),
            char_ends: chunks.char_ends.clone(),
        };
        zip.start_file(CHUNK_INDEX_ENTRY, deflated)?;
        zip.write_all(&serde_json::to_vec(&index)?)?;

        if let Some(matrix) = &chunks.embeddings {
            zip.start_file(EMBEDDINGS_ENTRY, stored)?;
            zip.write_all(&matrix.to_blob())?;
        }
    }

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultError::ArchiveNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    ZipArchive::new(file).map_err(|e| VaultError::corrupt(path, format!("not a tome container: {}", e)))
}

/// Raw bytes of one entry; `None` when the entry is absent.
fn read_entry(zip: &mut ZipArchive<File>, path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(VaultError::corrupt(path, format!("{}: {}", name, e))),
    };
    // The header's size is untrusted; let the buffer grow with the data.
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| VaultError::corrupt(path, format!("{}: {}", name, e)))?;
    Ok(Some(buf))
}

fn require_entry(zip: &mut ZipArchive<File>, path: &Path, name: &str) -> Result<Vec<u8>> {
    read_entry(zip, path, name)?
        .ok_or_else(|| VaultError::corrupt(path, format!("missing section {}", name)))
}

fn parse_json<T: DeserializeOwned>(path: &Path, name: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::corrupt(path, format!("{}: {}", name, e)))
}

fn check_manifest(zip: &mut ZipArchive<File>, path: &Path) -> Result<Manifest> {
    let bytes = require_entry(zip, path, MANIFEST_ENTRY)?;
    let manifest: Manifest = parse_json(path, MANIFEST_ENTRY, &bytes)?;
    if manifest.format != FORMAT_TAG {
        return Err(VaultError::corrupt(
            path,
            format!("unexpected format tag '{}'", manifest.format),
        ));
    }
    if manifest.format_version > FORMAT_VERSION {
        return Err(VaultError::UnsupportedSchema(manifest.format_version));
    }
    Ok(manifest)
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let mut zip = open(path)?;
    check_manifest(&mut zip, path)
}

/// Metadata only; pages and chunks are never decompressed.
pub fn read_meta(path: &Path) -> Result<DocumentMeta> {
    let mut zip = open(path)?;
    check_manifest(&mut zip, path)?;
    let bytes = require_entry(&mut zip, path, META_ENTRY)?;
    let raw = std::str::from_utf8(&bytes)
        .map_err(|e| VaultError::corrupt(path, format!("{}: {}", META_ENTRY, e)))?;
    DocumentMeta::from_json(raw).map_err(|e| match e {
        CoreError::UnsupportedSchema { found, .. } => VaultError::UnsupportedSchema(found),
        other => VaultError::corrupt(path, format!("{}: {}", META_ENTRY, other)),
    })
}

pub fn read_pages(path: &Path) -> Result<Vec<String>> {
    let mut zip = open(path)?;
    let manifest = check_manifest(&mut zip, path)?;
    let bytes = require_entry(&mut zip, path, PAGES_ENTRY)?;
    let pages: Vec<String> = parse_json(path, PAGES_ENTRY, &bytes)?;
    if pages.len() != manifest.page_count {
        return Err(VaultError::corrupt(
            path,
            format!(
                "manifest lists {} pages, found {}",
                manifest.page_count,
                pages.len()
            ),
        ));
    }
    Ok(pages)
}

/// Chunk section, or `None` for archives written without one.
pub fn read_chunks(path: &Path) -> Result<Option<ChunkSet>> {
    let mut zip = open(path)?;
    let manifest = check_manifest(&mut zip, path)?;
    let Some(bytes) = read_entry(&mut zip, path, CHUNK_INDEX_ENTRY)? else {
        return Ok(None);
    };
    let index: ChunkIndex = parse_json(path, CHUNK_INDEX_ENTRY, &bytes)?;

    let embeddings = match (read_entry(&mut zip, path, EMBEDDINGS_ENTRY)?, manifest.embedding_dims) {
        (Some(blob), Some(dims)) => Some(
            EmbeddingMatrix::from_blob(&blob, index.texts.len(), dims)
                .map_err(|e| VaultError::corrupt(path, e))?,
        ),
        (Some(_), None) => {
            return Err(VaultError::corrupt(path, "embeddings present without dims"))
        }
        (None, _) => None,
    };

    let set = ChunkSet {
        texts: index.texts,
        pages: index.pages,
        char_starts: index.char_starts,
        char_ends: index.char_ends,
        embeddings,
    };
    set.check_shape().map_err(|e| VaultError::corrupt(path, e))?;
    Ok(Some(set))
}
