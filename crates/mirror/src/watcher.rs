use crate::{build_hierarchy, DoiLog, ReprCache, Result};
use docsync_convert::Convert;
use docsync_protocol::{commands, Outbound, ReprPayload};
use notify::event::{ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// File lifecycle events the watcher reacts to, already classified from the
/// raw notify stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Changed(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Quiet period before a burst of content changes is converted.
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
        }
    }
}

/// Watches the project root and keeps the representation cache and the peer
/// in sync. Owns the notify subscription for its whole lifetime; dropping
/// the watcher unsubscribes and stops the event loop.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ChangeWatcher {
    pub fn spawn(
        root: &Path,
        converter: Arc<dyn Convert>,
        cache: Arc<Mutex<ReprCache>>,
        doi: Arc<Mutex<DoiLog>>,
        outbound: Arc<dyn Outbound>,
        config: WatcherConfig,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(1024);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in classify(&event) {
                        let _ = tx.blocking_send(file_event);
                    }
                }
                Err(err) => log::warn!("watcher error: {err}"),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let deps = WatcherDeps {
            root: root.to_path_buf(),
            converter,
            cache,
            doi,
            outbound,
        };
        let task = tokio::spawn(run_event_loop(rx, deps, config.debounce));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Map a raw notify event onto file lifecycle events. Rename halves that
/// arrive separately degrade to delete-of-old plus create-of-new, which is
/// exactly how renames are treated anyway.
fn classify(event: &Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(FileEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(FileEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![FileEvent::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(FileEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(FileEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event.paths.iter().cloned().map(FileEvent::Changed).collect(),
        _ => Vec::new(),
    }
}

struct WatcherDeps {
    root: PathBuf,
    converter: Arc<dyn Convert>,
    cache: Arc<Mutex<ReprCache>>,
    doi: Arc<Mutex<DoiLog>>,
    outbound: Arc<dyn Outbound>,
}

impl WatcherDeps {
    fn send_repr(&self, path: &Path, repr: &str) {
        let key = ReprCache::key_for(path);
        let payload = ReprPayload {
            file_path: key.clone(),
            repr: repr.to_string(),
        };
        self.outbound.send(commands::SEND_UPDATE_REPR, json!(payload));
        self.outbound
            .send(commands::SEND_CHECK_RULES_FOR_FILE, json!(key));
    }

    fn broadcast_hierarchy(&self) {
        match build_hierarchy(&self.root) {
            Ok(tree) => self
                .outbound
                .send(commands::SEND_PROJECT_HIERARCHY, json!(tree)),
            Err(err) => log::error!("failed to build project hierarchy: {err}"),
        }
    }

    /// Leading edge of a change burst: tell the peer the file is being
    /// edited and record the visit in the DOI log.
    fn note_change(&self, path: &Path) {
        let key = ReprCache::key_for(path);
        self.outbound.send(commands::SEND_FILE_CHANGE, json!(key));
        if let Ok(mut doi) = self.doi.lock() {
            doi.record_visit(&key);
        }
    }

    async fn handle_created(&self, path: &Path) {
        if !self.converter.matches(path) {
            return;
        }
        match self.converter.convert(path).await {
            Ok(repr) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.upsert(path, repr.clone());
                }
                self.send_repr(path, &repr);
                self.broadcast_hierarchy();
            }
            Err(err) => log::error!("conversion failed for new file {}: {err}", path.display()),
        }
    }

    async fn handle_deleted(&self, path: &Path) {
        if !self.converter.matches(path) {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(path);
        }
        // Empty representation tells the peer to evict its own mirror.
        self.send_repr(path, "");
        self.broadcast_hierarchy();
    }

    async fn handle_renamed(&self, from: &Path, to: &Path) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(from);
        }
        if !self.converter.matches(to) {
            if self.converter.matches(from) {
                self.send_repr(from, "");
                self.broadcast_hierarchy();
            }
            return;
        }
        match self.converter.convert(to).await {
            Ok(repr) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.upsert(to, repr.clone());
                }
                self.send_repr(to, &repr);
                self.broadcast_hierarchy();
            }
            Err(err) => log::error!(
                "conversion failed for renamed file {}: {err}",
                to.display()
            ),
        }
    }

    /// Fired once per burst after the quiet period. Conversion failure keeps
    /// the last good cache entry; it never drops to empty.
    async fn handle_changed(&self, path: &Path) {
        match self.converter.convert(path).await {
            Ok(repr) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.upsert(path, repr.clone());
                }
                self.send_repr(path, &repr);
            }
            Err(err) => log::error!("conversion failed for {}: {err}", path.display()),
        }
    }
}

/// Event loop: debounces content changes per file (trailing edge, latest
/// arrival wins, at most one pending deadline per path) and handles
/// create/delete/rename immediately, in arrival order.
async fn run_event_loop(
    mut rx: mpsc::Receiver<FileEvent>,
    deps: WatcherDeps,
    debounce: Duration,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_deadline = pending.values().min().copied();

        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                match event {
                    FileEvent::Changed(path) => {
                        if !deps.converter.matches(&path) {
                            continue;
                        }
                        if !pending.contains_key(&path) {
                            deps.note_change(&path);
                        }
                        pending.insert(path, Instant::now() + debounce);
                    }
                    FileEvent::Created(path) => deps.handle_created(&path).await,
                    FileEvent::Deleted(path) => deps.handle_deleted(&path).await,
                    FileEvent::Renamed { from, to } => deps.handle_renamed(&from, &to).await,
                }
            }
            () = async {
                if let Some(deadline) = next_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if next_deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    deps.handle_changed(&path).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docsync_convert::ConvertError;
    use serde_json::Value;
    use tempfile::TempDir;

    struct MockConverter {
        calls: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl MockConverter {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Convert for MockConverter {
        fn matches(&self, path: &Path) -> bool {
            path.extension().and_then(|e| e.to_str()) == Some("java")
        }

        async fn convert(&self, path: &Path) -> docsync_convert::Result<String> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            if self.fail {
                return Err(ConvertError::Failed {
                    path: path.display().to_string(),
                    status: "exit status: 1".to_string(),
                    diagnostic: "boom".to_string(),
                });
            }
            Ok(std::fs::read_to_string(path)?)
        }
    }

    #[derive(Default)]
    struct RecordingOutbound {
        messages: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingOutbound {
        fn with_command(&self, command: &str) -> Vec<Value> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == command)
                .map(|(_, d)| d.clone())
                .collect()
        }
    }

    impl Outbound for RecordingOutbound {
        fn send(&self, command: &str, data: Value) {
            self.messages
                .lock()
                .unwrap()
                .push((command.to_string(), data));
        }
    }

    struct Fixture {
        temp: TempDir,
        converter: Arc<MockConverter>,
        cache: Arc<Mutex<ReprCache>>,
        outbound: Arc<RecordingOutbound>,
        tx: mpsc::Sender<FileEvent>,
        task: JoinHandle<()>,
    }

    impl Fixture {
        fn start(fail: bool, debounce_ms: u64) -> Self {
            let temp = TempDir::new().unwrap();
            let converter = MockConverter::new(fail);
            let cache = Arc::new(Mutex::new(ReprCache::new()));
            let outbound = Arc::new(RecordingOutbound::default());
            let (tx, rx) = mpsc::channel(64);
            let deps = WatcherDeps {
                root: temp.path().to_path_buf(),
                converter: converter.clone(),
                cache: cache.clone(),
                doi: Arc::new(Mutex::new(DoiLog::new())),
                outbound: outbound.clone(),
            };
            let task = tokio::spawn(run_event_loop(
                rx,
                deps,
                Duration::from_millis(debounce_ms),
            ));
            Self {
                temp,
                converter,
                cache,
                outbound,
                tx,
                task,
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn burst_of_changes_converts_once_with_latest_content() {
        let fx = Fixture::start(false, 150);
        let file = fx.temp.path().join("A.java");

        for content in ["v1", "v2", "v3"] {
            tokio::fs::write(&file, content).await.unwrap();
            fx.tx.send(FileEvent::Changed(file.clone())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(fx.converter.call_count(), 1);
        let updates = fx.outbound.with_command(commands::SEND_UPDATE_REPR);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["repr"], "v3");
        // File-change notification fires once, at the leading edge.
        assert_eq!(fx.outbound.with_command(commands::SEND_FILE_CHANGE).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_then_delete_leaves_no_entry_and_broadcasts_empty() {
        let fx = Fixture::start(false, 50);
        let file = fx.temp.path().join("A.java");
        tokio::fs::write(&file, "class A {}").await.unwrap();

        fx.tx.send(FileEvent::Created(file.clone())).await.unwrap();
        fx.tx.send(FileEvent::Deleted(file.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(fx.cache.lock().unwrap().is_empty());
        let updates = fx.outbound.with_command(commands::SEND_UPDATE_REPR);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1]["repr"], "");
        // Hierarchy rebroadcast on create and on delete.
        assert_eq!(
            fx.outbound
                .with_command(commands::SEND_PROJECT_HIERARCHY)
                .len(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn conversion_failure_keeps_last_good_cache_entry() {
        let fx = Fixture::start(true, 50);
        let file = fx.temp.path().join("A.java");
        tokio::fs::write(&file, "broken").await.unwrap();
        fx.cache
            .lock()
            .unwrap()
            .upsert(&file, "last-good".to_string());

        fx.tx.send(FileEvent::Changed(file.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fx.converter.call_count(), 1);
        assert_eq!(fx.cache.lock().unwrap().get(&file), Some("last-good"));
        assert!(fx.outbound.with_command(commands::SEND_UPDATE_REPR).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rename_drops_the_old_identity_and_converts_the_new() {
        let fx = Fixture::start(false, 50);
        let old = fx.temp.path().join("Old.java");
        let new = fx.temp.path().join("New.java");
        tokio::fs::write(&new, "class New {}").await.unwrap();
        fx.cache.lock().unwrap().upsert(&old, "stale".to_string());

        fx.tx
            .send(FileEvent::Renamed {
                from: old.clone(),
                to: new.clone(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let cache = fx.cache.lock().unwrap();
        assert!(cache.get(&old).is_none());
        assert_eq!(cache.get(&new), Some("class New {}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn events_for_unrecognized_extensions_are_ignored() {
        let fx = Fixture::start(false, 50);
        let file = fx.temp.path().join("notes.txt");
        tokio::fs::write(&file, "plain").await.unwrap();

        fx.tx.send(FileEvent::Changed(file.clone())).await.unwrap();
        fx.tx.send(FileEvent::Created(file.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fx.converter.call_count(), 0);
        assert!(fx.outbound.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn classify_maps_notify_kinds_onto_lifecycle_events() {
        use notify::event::{CreateKind, DataChange, RemoveKind};

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/p/A.java"));
        assert_eq!(
            classify(&create),
            vec![FileEvent::Created(PathBuf::from("/p/A.java"))]
        );

        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/p/A.java"));
        assert_eq!(
            classify(&modify),
            vec![FileEvent::Changed(PathBuf::from("/p/A.java"))]
        );

        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/p/A.java"));
        assert_eq!(
            classify(&remove),
            vec![FileEvent::Deleted(PathBuf::from("/p/A.java"))]
        );

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/Old.java"))
            .add_path(PathBuf::from("/p/New.java"));
        assert_eq!(
            classify(&rename),
            vec![FileEvent::Renamed {
                from: PathBuf::from("/p/Old.java"),
                to: PathBuf::from("/p/New.java"),
            }]
        );
    }
}
