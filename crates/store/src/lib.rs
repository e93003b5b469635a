//! Persistent rule and tag tables.
//!
//! Both tables are JSON arrays at the project root, held fully in memory in
//! insertion order and rewritten atomically (temp file + rename) on every
//! mutation. Identity fields (`index` for rules, `ID` for tags) are immutable
//! once assigned: a write whose identity is duplicate, absent, or disagrees
//! with the separately supplied identity argument is rejected, never merged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RULE_TABLE_FILE: &str = "ruleTable.json";
pub const TAG_TABLE_FILE: &str = "tagTable.json";

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid table JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Duplicate, absent, or mismatched identity. For `add_new` this means
    /// "already exists"; for `update_existing` it means "not found".
    #[error("identity conflict for {kind} '{identity}'")]
    IdentityConflict {
        kind: &'static str,
        identity: String,
    },
}

/// A record stored in an ordered JSON table.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Human-readable record kind for logs and errors.
    const KIND: &'static str;

    /// The immutable identity field, if present in the payload.
    fn identity(&self) -> Option<&str>;
}

/// A design rule is an open JSON object; the only field the store interprets
/// is its `index` identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DesignRule(pub Value);

impl Record for DesignRule {
    const KIND: &'static str = "rule";

    fn identity(&self) -> Option<&str> {
        self.0.get("index").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "tagName")]
    pub tag_name: String,
    pub detail: String,
}

impl Record for Tag {
    const KIND: &'static str = "tag";

    fn identity(&self) -> Option<&str> {
        Some(&self.id)
    }
}

/// One ordered, JSON-backed table. Insertion order is display order.
pub struct JsonTable<T> {
    path: PathBuf,
    records: Vec<T>,
}

impl<T: Record> JsonTable<T> {
    /// Parse the backing file. An absent file is created empty, and a file
    /// that fails to parse is logged and treated as empty rather than
    /// aborting startup; the corrupt file stays on disk untouched until the
    /// next successful persist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let table = Self {
                path: path.to_path_buf(),
                records: Vec::new(),
            };
            table.persist()?;
            return Ok(table);
        }

        let raw = std::fs::read_to_string(path)?;
        let records = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                log::error!("invalid {} table in {}: {err}", T::KIND, path.display());
                Vec::new()
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialized snapshot of the whole table for the peer.
    pub fn snapshot_for_client(&self) -> String {
        serde_json::to_string(&self.records).unwrap_or_else(|_| "[]".to_string())
    }

    /// Append a record. Rejected when the identity argument disagrees with
    /// the identity inside the payload, or an entry with that identity
    /// already exists — both are treated as "exists" to be conservative.
    pub fn add_new(&mut self, identity: &str, record: T) -> Result<()> {
        if record.identity() != Some(identity) || self.position_of(identity).is_some() {
            return Err(StoreError::IdentityConflict {
                kind: T::KIND,
                identity: identity.to_string(),
            });
        }
        self.records.push(record);
        self.persist_logged();
        Ok(())
    }

    /// Replace the record with the given identity in place. Rejected when no
    /// such entry exists or the payload identity disagrees.
    pub fn update_existing(&mut self, identity: &str, record: T) -> Result<()> {
        if record.identity() != Some(identity) {
            return Err(StoreError::IdentityConflict {
                kind: T::KIND,
                identity: identity.to_string(),
            });
        }
        let Some(pos) = self.position_of(identity) else {
            return Err(StoreError::IdentityConflict {
                kind: T::KIND,
                identity: identity.to_string(),
            });
        };
        self.records[pos] = record;
        self.persist_logged();
        Ok(())
    }

    fn position_of(&self, identity: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.identity() == Some(identity))
    }

    /// Atomic whole-file rewrite of the backing table.
    pub fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.records).map_err(|source| {
            StoreError::Parse {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    /// Persistence failures are logged, not propagated: the in-memory table
    /// is not rolled back, so a later persist may still succeed.
    fn persist_logged(&self) {
        if let Err(err) = self.persist() {
            log::error!("failed to persist {} table: {err}", T::KIND);
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = parent.unwrap_or(Path::new(".")).join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("table"),
        std::process::id()
    ));

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
