//! Versioned JSON envelopes for persisted records.
//!
//! Every snapshot written to disk (archive metadata, purgatory metadata and
//! triage) is wrapped as `{"schema_version": N, "document": {...}}`. On read,
//! older versions are upgraded one step at a time through
//! [`Versioned::upgrade`] before deserializing into the current type, which
//! rejects unknown fields instead of silently dropping them.
//!
//! A bare JSON object without an envelope is treated as version 0.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// A record with an explicit schema version and migration chain.
pub trait Versioned: Serialize + DeserializeOwned {
    /// Version written by [`Versioned::to_versioned_json`].
    const SCHEMA_VERSION: u32;

    /// Upgrade a document from `from` to `from + 1`.
    fn upgrade(from: u32, document: Value) -> Result<Value>;

    fn to_versioned_json(&self) -> Result<String> {
        let mut envelope = Map::new();
        envelope.insert("schema_version".into(), Value::from(Self::SCHEMA_VERSION));
        envelope.insert("document".into(), serde_json::to_value(self)?);
        Ok(serde_json::to_string_pretty(&Value::Object(envelope))?)
    }

    fn from_versioned_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let (mut version, mut document) = split_envelope(value)?;

        if version > Self::SCHEMA_VERSION {
            return Err(CoreError::UnsupportedSchema {
                found: version,
                supported: Self::SCHEMA_VERSION,
            });
        }
        while version < Self::SCHEMA_VERSION {
            document = Self::upgrade(version, document)?;
            version += 1;
        }
        Ok(serde_json::from_value(document)?)
    }
}

fn split_envelope(value: Value) -> Result<(u32, Value)> {
    let Value::Object(mut map) = value else {
        return Err(CoreError::Malformed("expected a JSON object".into()));
    };
    if !map.contains_key("schema_version") {
        return Ok((0, Value::Object(map)));
    }
    let version = map
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| CoreError::Malformed("schema_version is not an integer".into()))?;
    let document = map
        .remove("document")
        .ok_or_else(|| CoreError::Malformed("envelope has no document".into()))?;
    let version = u32::try_from(version)
        .map_err(|_| CoreError::Malformed(format!("schema_version {} out of range", version)))?;
    Ok((version, document))
}

/// Rename `from` to `to` in a JSON object unless `to` is already present.
/// The old field is removed either way.
pub(crate) fn rename_field(doc: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = doc.remove(from) {
        doc.entry(to.to_string()).or_insert(v);
    }
}
