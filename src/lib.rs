//! # Tome Vault
//!
//! A content-addressed document vault with a validating ingest pipeline.
//!
//! Every incoming document is hashed, extracted, and run through a suite of
//! validation gates. Documents that pass are written to a durable `.tome`
//! archive and indexed in a SQLite catalog; the rest wait in purgatory
//! until a reviewer promotes or discards them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   accept   ┌──────────┐
//! │  bytes   │──▶│ Extractor │──▶│ Gate suite   │──────────▶│ Archive  │
//! │ (hashed) │   │ Resolver  │   │ (tome-core)  │           │ + Catalog│
//! └──────────┘   └───────────┘   └──────┬───────┘           └────▲─────┘
//!                                       │ stage                   │ promote
//!                                       ▼                         │
//!                                 ┌───────────┐                   │
//!                                 │ Purgatory │───────────────────┘
//!                                 └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tome --root ~/vault init
//! tome --root ~/vault ingest paper.pdf --doi 10.1038/nature12373
//! tome --root ~/vault purgatory
//! tome --root ~/vault promote smith2024spin --year 2024
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Infrastructure error taxonomy |
//! | [`archive`] | `.tome` archive codec |
//! | [`catalog`] | SQLite catalog index |
//! | [`layout`] | On-disk paths under the vault root |
//! | [`purgatory`] | Staging store for documents awaiting review |
//! | [`validate`] | Validation gate suite |
//! | [`traits`] | Extractor / resolver / scanner collaborator traits |
//! | [`ingest`] | Ingest orchestration |
//! | [`promote`] | Promotion out of purgatory |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod archive;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod layout;
pub mod list;
pub mod migrate;
pub mod promote;
pub mod purgatory;
pub mod scanner;
pub mod show;
pub mod stats;
pub mod traits;
pub mod validate;
pub mod vault;

pub use error::{Result, VaultError};
pub use ingest::{IngestHints, IngestOutcome, IngestStatus};
pub use promote::{PromoteOutcome, PromoteOverrides};
pub use vault::Vault;
