use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tome_core::models::DocType;

/// Everything a [`crate::vault::Vault`] needs. Passed in explicitly so
/// several independent vaults can live in one process.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub purgatory: Option<PathBuf>,
}

impl VaultConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| self.root.join("catalog.db"))
    }

    pub fn purgatory_dir(&self) -> PathBuf {
        self.purgatory
            .clone()
            .unwrap_or_else(|| self.root.join("purgatory"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_title_match_threshold")]
    pub title_match_threshold: f64,
    #[serde(default = "default_title_dedup_threshold")]
    pub title_dedup_threshold: f64,
    #[serde(default = "default_author_match_threshold")]
    pub author_match_threshold: f64,
    #[serde(default = "default_min_first_page_chars")]
    pub min_first_page_chars: usize,
    #[serde(default = "default_min_text_quality")]
    pub min_text_quality: f64,
    #[serde(default = "default_max_pages_searched")]
    pub max_pages_searched: usize,
    #[serde(default = "DocType::default_doi_exempt")]
    pub doi_exempt_types: Vec<DocType>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            title_match_threshold: default_title_match_threshold(),
            title_dedup_threshold: default_title_dedup_threshold(),
            author_match_threshold: default_author_match_threshold(),
            min_first_page_chars: default_min_first_page_chars(),
            min_text_quality: default_min_text_quality(),
            max_pages_searched: default_max_pages_searched(),
            doi_exempt_types: DocType::default_doi_exempt(),
        }
    }
}

fn default_title_match_threshold() -> f64 {
    0.6
}
fn default_title_dedup_threshold() -> f64 {
    0.9
}
fn default_author_match_threshold() -> f64 {
    0.6
}
fn default_min_first_page_chars() -> usize {
    50
}
fn default_min_text_quality() -> f64 {
    0.5
}
fn default_max_pages_searched() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            enabled: true,
        }
    }
}

fn default_max_tokens() -> usize {
    200
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scanner_threshold")]
    pub threshold: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_scanner_threshold(),
        }
    }
}

fn default_scanner_threshold() -> f64 {
    0.5
}

impl Config {
    /// Default configuration rooted at `root`, without a config file.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            vault: VaultConfig {
                root: root.into(),
                catalog: None,
                purgatory: None,
            },
            validation: ValidationConfig::default(),
            chunking: ChunkingConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            anyhow::bail!("chunking.max_tokens must be > 0");
        }

        let v = &self.validation;
        for (name, value) in [
            ("validation.title_match_threshold", v.title_match_threshold),
            ("validation.title_dedup_threshold", v.title_dedup_threshold),
            ("validation.author_match_threshold", v.author_match_threshold),
            ("validation.min_text_quality", v.min_text_quality),
            ("scanner.threshold", self.scanner.threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be in [0.0, 1.0]", name);
            }
        }

        if v.max_pages_searched == 0 {
            anyhow::bail!("validation.max_pages_searched must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
