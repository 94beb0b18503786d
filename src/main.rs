//! # Tome CLI (`tome`)
//!
//! Thin command-line surface over the [`tome_vault`] library: ingest
//! documents, review what landed in purgatory, promote or discard it, and
//! inspect the catalog.
//!
//! ## Usage
//!
//! ```bash
//! tome --config ./tome.toml <command>
//! tome --root ~/vault <command>        # default configuration
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tome init` | Create the vault directories and catalog |
//! | `tome ingest <file>` | Hash, validate, and accept or stage a document |
//! | `tome purgatory` | List documents awaiting review |
//! | `tome promote <temp_key>` | Accept a staged document, with corrections |
//! | `tome discard <temp_key>` | Drop a staged document |
//! | `tome list` | List cataloged documents |
//! | `tome show <key>` | Show one document (key, DOI or content hash) |
//! | `tome stats` | Catalog summary |
//! | `tome rebuild` | Rebuild the catalog from archives |
//! | `tome link` / `unlink` / `project` | Manage project links |
//!
//! Logging goes to stderr and is controlled by `TOME_LOG` (default `warn`).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tome_core::models::{DocType, Status};
use tome_core::ContentHash;
use tracing_subscriber::EnvFilter;

use tome_vault::config::{self, Config};
use tome_vault::{list, show, stats};
use tome_vault::{IngestHints, IngestStatus, PromoteOverrides, Vault};

const DEFAULT_CONFIG: &str = "./tome.toml";

/// Tome: a deduplicated, content-addressed document vault.
///
/// Every command needs a vault: either `--config` pointing at a TOML file
/// or `--root` for a default configuration rooted at a directory.
#[derive(Parser)]
#[command(
    name = "tome",
    about = "Tome: a deduplicated, content-addressed document vault with a review queue",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./tome.toml` when
    /// neither `--config` nor `--root` is given.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vault root directory. Overrides `[vault].root` from the config file.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault directories and catalog.
    ///
    /// Idempotent: running it on an existing vault changes nothing.
    Init,

    /// Ingest one document.
    ///
    /// Accepted documents go straight into the vault; anything the gates
    /// cannot vouch for is staged in purgatory for review.
    Ingest {
        /// Path to the document (PDF).
        file: PathBuf,

        /// DOI, overriding any found in the text.
        #[arg(long)]
        doi: Option<String>,

        /// Title, used when no resolved title is available.
        #[arg(long)]
        title: Option<String>,

        /// Author; repeat for several ("Surname, Given" or "Given Surname").
        #[arg(long = "author")]
        authors: Vec<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        journal: Option<String>,

        /// Resolved reference title (e.g. from CrossRef), enabling the
        /// title cross-check without a network resolver.
        #[arg(long)]
        resolved_title: Option<String>,

        /// Explicit vault key instead of the generated one.
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        doc_type: Option<DocType>,

        #[arg(long)]
        entry_type: Option<String>,
    },

    /// List documents waiting in purgatory, newest first.
    Purgatory,

    /// Promote a staged document into the vault.
    Promote {
        temp_key: String,

        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Authors joined by " and ".
        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        journal: Option<String>,

        /// DOI; pass an empty string to clear it.
        #[arg(long)]
        doi: Option<String>,

        #[arg(long)]
        entry_type: Option<String>,
    },

    /// Discard a staged document. Safe to repeat.
    Discard { temp_key: String },

    /// List cataloged documents.
    List {
        #[arg(long)]
        status: Option<Status>,

        #[arg(long)]
        doc_type: Option<DocType>,
    },

    /// Show one document by key, DOI or content hash.
    Show { id: String },

    /// Print catalog statistics.
    Stats,

    /// Drop the catalog and re-index every archive.
    Rebuild,

    /// Link a document into a project.
    Link {
        project: String,
        key: String,

        /// Key the project uses for the document; defaults to the vault key.
        #[arg(long)]
        local_key: Option<String>,
    },

    /// Remove a document from a project.
    Unlink { project: String, key: String },

    /// List the documents linked into a project.
    Project { project: String },
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match (&cli.config, &cli.root) {
        (Some(path), _) => config::load_config(path)?,
        (None, Some(root)) => Config::for_root(root),
        (None, None) => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if !default.exists() {
                bail!("no vault configured: pass --config <file> or --root <dir>");
            }
            config::load_config(&default)?
        }
    };
    if let Some(root) = &cli.root {
        cfg.vault.root = root.clone();
    }
    Ok(cfg)
}

async fn hash_for_key(vault: &Vault, key: &str) -> Result<ContentHash> {
    let entry = vault
        .catalog()
        .get_by_key(key)
        .await?
        .with_context(|| format!("no document with key '{}'", key))?;
    Ok(ContentHash::from_hex(entry.content_hash))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TOME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    let json = cli.json;
    let vault = Vault::open(cfg).await?;

    match cli.command {
        Commands::Init => {
            println!("Vault initialized at {}.", vault.layout().root().display());
        }
        Commands::Ingest {
            file,
            doi,
            title,
            authors,
            year,
            journal,
            resolved_title,
            key,
            doc_type,
            entry_type,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let reference = resolved_title.map(|t| tome_vault::traits::ResolvedReference {
                source: "cli".to_string(),
                title: Some(t),
                ..Default::default()
            });
            let hints = IngestHints {
                key,
                title,
                authors,
                doi,
                year,
                journal,
                entry_type,
                doc_type,
                reference,
                ..Default::default()
            };
            let outcome = vault.ingest(&bytes, hints).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("ingest {}", file.display());
                println!("  status:       {}", outcome.status.as_str());
                println!("  key:          {}", outcome.key);
                println!("  content_hash: {}", outcome.content_hash);
                println!("  gates:        {}", outcome.report.summary());
                println!("  {}", outcome.message);
                if outcome.status == IngestStatus::Staged {
                    println!("  review with: tome promote {}", outcome.key);
                }
                println!("ok");
            }
        }
        Commands::Purgatory => {
            list::run_purgatory(&vault, json)?;
        }
        Commands::Promote {
            temp_key,
            key,
            title,
            author,
            year,
            journal,
            doi,
            entry_type,
        } => {
            let overrides = PromoteOverrides {
                key,
                title,
                author,
                year,
                journal,
                doi,
                entry_type,
            };
            let outcome = vault.promote(&temp_key, overrides).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("promote {}", temp_key);
                println!("  key:    {}", outcome.key);
                println!("  status: {}", outcome.status);
                println!("  steps:  {}", outcome.performed.len());
                println!("ok");
            }
        }
        Commands::Discard { temp_key } => {
            if vault.discard(&temp_key)? {
                println!("discarded {}", temp_key);
            } else {
                println!("nothing staged as {}", temp_key);
            }
        }
        Commands::List { status, doc_type } => {
            list::run_list(&vault, status, doc_type, json).await?;
        }
        Commands::Show { id } => {
            show::run_show(&vault, &id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&vault).await?;
        }
        Commands::Rebuild => {
            let count = vault.catalog().rebuild(vault.layout()).await?;
            println!("rebuild");
            println!("  archives indexed: {}", count);
            println!("ok");
        }
        Commands::Link {
            project,
            key,
            local_key,
        } => {
            let hash = hash_for_key(&vault, &key).await?;
            let local_key = local_key.unwrap_or_else(|| key.clone());
            vault.catalog().link(&project, &hash, &local_key).await?;
            println!("linked {} into {} as {}", key, project, local_key);
        }
        Commands::Unlink { project, key } => {
            let hash = hash_for_key(&vault, &key).await?;
            if vault.catalog().unlink(&project, &hash).await? {
                println!("unlinked {} from {}", key, project);
            } else {
                println!("{} was not linked into {}", key, project);
            }
        }
        Commands::Project { project } => {
            list::run_project(&vault, &project, json).await?;
        }
    }

    vault.close().await;
    Ok(())
}
