//! Per-project state shared by the websocket session, the dispatcher and the
//! change watcher.

use anyhow::{Context, Result};
use docsync_convert::ExternalConverter;
use docsync_mirror::{DoiLog, ReprCache};
use docsync_patch::FixSession;
use docsync_protocol::{Envelope, Outbound};
use docsync_store::{DesignRule, JsonTable, Tag, RULE_TABLE_FILE, TAG_TABLE_FILE};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

/// Handle to the single connected documentation peer.
///
/// Sends are fire-and-forget: with no peer attached the message is dropped
/// with a warning, never queued. Attaching a new peer replaces the previous
/// sender, so a stale session that lost the race simply stops delivering.
#[derive(Clone, Default)]
pub struct PeerLink {
    inner: Arc<StdMutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl PeerLink {
    /// Register a fresh session and return its outbound queue.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(tx);
        }
        rx
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = None;
        }
    }
}

impl Outbound for PeerLink {
    fn send(&self, command: &str, data: Value) {
        let text = Envelope::new(command, data).encode();
        let Ok(slot) = self.inner.lock() else { return };
        match slot.as_ref() {
            Some(tx) => {
                if tx.send(text).is_err() {
                    log::warn!("peer channel closed; dropping {command}");
                }
            }
            None => log::warn!("no peer connected; dropping {command}"),
        }
    }
}

/// Everything the server knows about one project root. Constructed once at
/// startup and shared by reference; there are no globals.
pub struct ProjectHost {
    pub root: PathBuf,
    pub extension: String,
    pub converter: Arc<ExternalConverter>,
    pub cache: Arc<StdMutex<ReprCache>>,
    pub doi: Arc<StdMutex<DoiLog>>,
    pub rules: Mutex<JsonTable<DesignRule>>,
    pub tags: Mutex<JsonTable<Tag>>,
    pub fixes: Mutex<FixSession>,
    pub peer: PeerLink,
}

impl ProjectHost {
    pub fn open(root: PathBuf, converter_program: &str, extension: &str) -> Result<Self> {
        let rules = JsonTable::load(&root.join(RULE_TABLE_FILE))
            .with_context(|| format!("loading {RULE_TABLE_FILE}"))?;
        let tags = JsonTable::load(&root.join(TAG_TABLE_FILE))
            .with_context(|| format!("loading {TAG_TABLE_FILE}"))?;
        let converter = Arc::new(ExternalConverter::new(converter_program, extension, &root));

        Ok(Self {
            root,
            extension: extension.trim_start_matches('.').to_string(),
            converter,
            cache: Arc::new(StdMutex::new(ReprCache::new())),
            doi: Arc::new(StdMutex::new(DoiLog::new())),
            rules: Mutex::new(rules),
            tags: Mutex::new(tags),
            fixes: Mutex::new(FixSession::new()),
            peer: PeerLink::default(),
        })
    }

    pub fn outbound(&self) -> Arc<dyn Outbound> {
        Arc::new(self.peer.clone())
    }
}
