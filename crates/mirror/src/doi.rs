use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Two visits to the same log within this window count as one.
const COALESCE_WINDOW_MS: u64 = 1_000;

/// Element/caret log bound; oldest entries age out first.
const MAX_ELEMENT_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VisitedFile {
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

/// Degree-of-interest log: timestamped file visits (coalesced when two
/// events land within one second) plus a bounded log of visited elements.
#[derive(Debug, Default)]
pub struct DoiLog {
    visited: Vec<VisitedFile>,
    elements: VecDeque<Value>,
}

impl DoiLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_visit(&mut self, file_path: &str) {
        self.record_visit_at(file_path, now_ms());
    }

    fn record_visit_at(&mut self, file_path: &str, now: u64) {
        if let Some(last) = self.visited.last() {
            let last_ms: u64 = last.time_stamp.parse().unwrap_or(0);
            if now.saturating_sub(last_ms) < COALESCE_WINDOW_MS {
                self.visited.pop();
            }
        }
        self.visited.push(VisitedFile {
            time_stamp: now.to_string(),
            file_path: file_path.to_string(),
        });
    }

    pub fn record_element(&mut self, element: Value) {
        self.elements.push_back(element);
        if self.elements.len() > MAX_ELEMENT_ENTRIES {
            self.elements.pop_front();
        }
    }

    pub fn visited_files(&self) -> &[VisitedFile] {
        &self.visited
    }

    /// Snapshot for the `DOI_INFORMATION` message.
    pub fn snapshot(&self) -> Value {
        json!({
            "recentVisitedFiles": self.visited,
            "recentVisitedElements": self.elements,
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rapid_visits_coalesce_to_the_latest() {
        let mut log = DoiLog::new();
        log.record_visit_at("/p/A.java", 10_000);
        log.record_visit_at("/p/B.java", 10_400);
        assert_eq!(log.visited_files().len(), 1);
        assert_eq!(log.visited_files()[0].file_path, "/p/B.java");

        log.record_visit_at("/p/C.java", 12_000);
        assert_eq!(log.visited_files().len(), 2);
    }

    #[test]
    fn element_log_is_bounded_with_oldest_aging_out() {
        let mut log = DoiLog::new();
        for i in 0..150 {
            log.record_element(serde_json::json!({"n": i}));
        }
        let snapshot = log.snapshot();
        let elements = snapshot["recentVisitedElements"].as_array().unwrap();
        assert_eq!(elements.len(), 100);
        assert_eq!(elements[0]["n"], 50);
        assert_eq!(elements[99]["n"], 149);
    }
}
