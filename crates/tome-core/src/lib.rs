//! # Tome Core
//!
//! Pure logic for the Tome document vault: content hashing, fuzzy
//! matching, document and triage models with versioned schemas, gate
//! results and the auto-accept rule, key helpers, text metrics, and
//! page-aware chunking.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Everything that
//! touches disk or the catalog lives in the `tome-vault` crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fuzzy;
pub mod gate;
pub mod hash;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod slug;

pub use error::{CoreError, Result};
pub use hash::ContentHash;
