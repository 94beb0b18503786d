//! On-disk layout of a vault root.
//!
//! ```text
//! <root>/
//!   catalog.db
//!   pdf/<shard>/<key>.pdf       source bytes
//!   tome/<shard>/<key>.tome     archives
//!   purgatory/<temp_key>/       staged documents
//! ```
//!
//! `<shard>` is the lowercased first alphanumeric char of the key, so no
//! single directory grows unbounded.

use std::path::{Path, PathBuf};

use tome_core::slug::{sanitize_key, shard};
use walkdir::WalkDir;

use crate::archive::ARCHIVE_EXTENSION;
use crate::error::Result;

pub const PDF_DIR: &str = "pdf";
pub const TOME_DIR: &str = "tome";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.root.join(PDF_DIR))?;
        std::fs::create_dir_all(self.root.join(TOME_DIR))?;
        Ok(())
    }

    /// Root-relative archive path, as stored in the catalog's `vault_path`.
    pub fn relative_archive_path(key: &str) -> String {
        let key = sanitize_key(key);
        format!("{}/{}/{}.{}", TOME_DIR, shard(&key), key, ARCHIVE_EXTENSION)
    }

    pub fn archive_path(&self, key: &str) -> PathBuf {
        self.root.join(Self::relative_archive_path(key))
    }

    pub fn source_path(&self, key: &str) -> PathBuf {
        let key = sanitize_key(key);
        self.root
            .join(PDF_DIR)
            .join(shard(&key))
            .join(format!("{}.pdf", key))
    }

    /// Path relative to the root with `/` separators, or the full path when
    /// it lies outside the root.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Every archive under `tome/`, sorted by path.
    pub fn iter_archives(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(TOME_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut archives = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_archive = entry
                .path()
                .extension()
                .map(|ext| ext == ARCHIVE_EXTENSION)
                .unwrap_or(false);
            if is_archive {
                archives.push(entry.into_path());
            }
        }
        Ok(archives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sharded_paths() {
        let layout = Layout::new("/vault");
        assert_eq!(
            layout.archive_path("Smith2024dna"),
            PathBuf::from("/vault/tome/s/Smith2024dna.tome")
        );
        assert_eq!(
            layout.source_path("smith2024dna"),
            PathBuf::from("/vault/pdf/s/smith2024dna.pdf")
        );
        assert_eq!(
            Layout::relative_archive_path("42answer"),
            "tome/4/42answer.tome"
        );
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let layout = Layout::new("/vault");
        let path = layout.archive_path("../../etc/passwd");
        assert!(path.starts_with("/vault/tome"));
    }

    #[test]
    fn test_iter_archives_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure_dirs().unwrap();
        for key in ["zeta2020", "alpha2021", "beta2019"] {
            let path = layout.archive_path(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
        }
        std::fs::write(dir.path().join("tome").join("notes.txt"), b"x").unwrap();

        let found: Vec<String> = layout
            .iter_archives()
            .unwrap()
            .iter()
            .map(|p| layout.relative(p))
            .collect();
        assert_eq!(
            found,
            vec!["tome/a/alpha2021.tome", "tome/b/beta2019.tome", "tome/z/zeta2020.tome"]
        );
    }

    #[test]
    fn test_missing_tome_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(Layout::new(dir.path()).iter_archives().unwrap().is_empty());
    }
}
