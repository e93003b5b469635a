//! Wire protocol shared by the docsync server and its documentation peer.
//!
//! Every message in either direction is one JSON envelope:
//!
//! ```json
//! { "command": "<tag>", "data": <payload> }
//! ```
//!
//! The envelope is the only framing; command tags decide routing. Payload
//! shapes are defined here as typed structs so subsystems never hand-roll
//! JSON field names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod commands;

/// Inbound text that was not a valid command envelope.
///
/// Decode failures are logged and dropped by the dispatcher; they must never
/// tear down the peer channel.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub command: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(command: &str, data: Value) -> Self {
        Self {
            command: command.to_string(),
            data,
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> String {
        // Envelope is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Outbound half of the peer channel.
///
/// Sends are fire-and-forget: an implementation must skip (with a warning)
/// when no peer is connected, never queue or retry.
pub trait Outbound: Send + Sync {
    fn send(&self, command: &str, data: Value);
}

/// Normalize path separators to forward slashes for every outbound payload,
/// regardless of host OS.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// A file's current converted representation. An empty `repr` tells the peer
/// to evict its mirror entry for the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReprPayload {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub repr: String,
}

/// `EDIT_FIX`: the peer asks for the current content of the file it wants to
/// propose a fix against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditFixRequest {
    #[serde(rename = "filePathOfSuggestedFix")]
    pub file_path: String,
}

/// `CONTENT_FOR_EDIT_FIX`: current on-disk content of the fix target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentPayload {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub content: String,
}

/// `LLM_MODIFIED_FILE_CONTENT`: a proposed replacement for a located
/// substring, plus a human-readable rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedContentPayload {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "violatedCode")]
    pub violated_code: String,
    #[serde(rename = "modifiedFileContent")]
    pub modified_file_content: String,
    #[serde(default)]
    pub explanation: String,
}

/// `ACCEPT_EDIT_FIX`: optional edited buffer; absent means "accept the
/// proposed content as computed".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AcceptFixPayload {
    #[serde(default)]
    pub content: Option<String>,
}

/// Rule table mutations carry the identity separately from the record so the
/// store can reject mismatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleChangePayload {
    #[serde(rename = "ruleID")]
    pub rule_id: String,
    #[serde(rename = "ruleInfo")]
    pub rule_info: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagChangePayload {
    #[serde(rename = "tagID")]
    pub tag_id: String,
    #[serde(rename = "tagInfo")]
    pub tag_info: Value,
}

/// `EXPR_STMT`: ad-hoc snippet conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetRequest {
    #[serde(rename = "codeText")]
    pub code_text: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetReply {
    #[serde(rename = "reprText")]
    pub repr_text: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
}

/// `MINE_DESIGN_RULES`: run the external mining tool over the learning
/// drop directory. `element` is echoed into the DOI element log when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineRequest {
    pub algorithm: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub element: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinedRulesReply {
    pub algorithm: String,
    #[serde(rename = "minedFrequentItemSets")]
    pub mined_frequent_item_sets: std::collections::BTreeMap<String, String>,
}
