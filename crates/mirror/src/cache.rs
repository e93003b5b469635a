use docsync_protocol::normalize_path;
use std::collections::BTreeMap;
use std::path::Path;

/// Last-known representation text per file path.
///
/// Keys are normalized (forward-slash) path strings; at most one entry per
/// path. Iteration order is deterministic so the bulk handshake sends files
/// in a stable order.
#[derive(Debug, Default)]
pub struct ReprCache {
    entries: BTreeMap<String, String>,
}

impl ReprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for(path: &Path) -> String {
        normalize_path(&path.display().to_string())
    }

    pub fn upsert(&mut self, path: &Path, repr: String) {
        self.entries.insert(Self::key_for(path), repr);
    }

    /// Remove the entry for a path; returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.entries.remove(&Self::key_for(path)).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(&Self::key_for(path)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the whole cache contents (bulk handshake re-population).
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        self.entries = entries.into_iter().collect();
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(path, repr)| (path.clone(), repr.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_entry_per_path() {
        let mut cache = ReprCache::new();
        cache.upsert(Path::new("/p/A.java"), "v1".into());
        cache.upsert(Path::new("/p/A.java"), "v2".into());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(Path::new("/p/A.java")), Some("v2"));
    }

    #[test]
    fn remove_reports_presence() {
        let mut cache = ReprCache::new();
        cache.upsert(Path::new("/p/A.java"), "v".into());
        assert!(cache.remove(Path::new("/p/A.java")));
        assert!(!cache.remove(Path::new("/p/A.java")));
        assert!(cache.is_empty());
    }

    #[test]
    fn rebuild_replaces_prior_contents() {
        let mut cache = ReprCache::new();
        cache.upsert(Path::new("/p/Old.java"), "old".into());
        cache.rebuild(vec![("/p/New.java".to_string(), "new".to_string())]);
        assert_eq!(cache.snapshot(), vec![("/p/New.java".to_string(), "new".to_string())]);
    }

    #[test]
    fn snapshot_order_is_deterministic() {
        let mut cache = ReprCache::new();
        cache.upsert(Path::new("/p/b.java"), "2".into());
        cache.upsert(Path::new("/p/a.java"), "1".into());
        let paths: Vec<String> = cache.snapshot().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/p/a.java", "/p/b.java"]);
    }
}
