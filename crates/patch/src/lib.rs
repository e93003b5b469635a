//! Character-level diff/patch engine.
//!
//! An inbound proposed fix names a file, the exact substring believed to be
//! in violation, a replacement, and a rationale. The engine locates the
//! substring literally (regex-escaped, so multi-line spans work), computes
//! the replaced content, diffs original against proposed at character
//! granularity, and records one [`DiffChunk`] per contiguous added span.
//!
//! The whole batch shares one `full_original_content` snapshot, so `reject`
//! always restores the file byte-identically no matter how many chunks exist
//! or how the proposed buffer was edited. Accept/reject trust the retained
//! in-memory snapshots: a concurrent external edit to the same file between
//! proposal and accept/reject is silently overwritten (known gap).

use docsync_protocol::normalize_path;
use regex::Regex;
use serde::Serialize;
use similar::{DiffOp, TextDiff};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatchError>;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no outstanding fix batch")]
    NoBatch,
}

/// Byte offsets into the proposed content.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Span {
    #[serde(rename = "startOffset")]
    pub start_offset: usize,
    #[serde(rename = "endOffset")]
    pub end_offset: usize,
}

/// One contiguous added span between the original file and the proposed
/// replacement, plus enough context to fully revert the owning file.
#[derive(Debug, Clone, Serialize)]
pub struct DiffChunk {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub range: Span,
    #[serde(rename = "newText")]
    pub new_text: String,
    #[serde(rename = "originalText")]
    pub original_text: String,
    /// Shared snapshot of the whole original file; not sent on the wire
    /// (the batch already carries it once).
    #[serde(skip)]
    pub full_original_content: Arc<str>,
}

/// A reviewable batch: both versions side by side plus the chunk list.
#[derive(Debug, Clone, Serialize)]
pub struct ProposedFix {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "original")]
    pub full_original_content: Arc<str>,
    pub proposed: String,
    pub chunks: Vec<DiffChunk>,
}

/// Render the rationale as a delimited comment block above the replacement
/// so it stays inspectable in the merged view. An empty rationale yields the
/// replacement verbatim.
fn annotate(replacement: &str, rationale: &str) -> String {
    if rationale.trim().is_empty() {
        return replacement.to_string();
    }
    let body = rationale.trim().replace('\n', "\n * ");
    format!("/*\n * {body}\n */\n{replacement}")
}

/// Compute a proposed fix against already-read original content.
///
/// The violation substring is matched literally across the full content; if
/// it occurs more than once, every occurrence is replaced (inherited from
/// the original design, which does not disambiguate occurrences). A
/// substring that is not found degrades to "no changes to review": the
/// proposed content equals the original and the chunk list is empty.
pub fn compute_fix(
    file_path: &str,
    original: &str,
    violated: &str,
    replacement: &str,
    rationale: &str,
) -> ProposedFix {
    let effective = annotate(replacement, rationale);
    // Escaped literal pattern; escaping keeps embedded newlines literal too.
    let proposed = match Regex::new(&regex::escape(violated)) {
        Ok(re) => re
            .replace_all(original, regex::NoExpand(&effective))
            .into_owned(),
        Err(err) => {
            log::error!("violation pattern failed to compile: {err}");
            original.to_string()
        }
    };

    let full_original: Arc<str> = Arc::from(original);
    let file_path = normalize_path(file_path);
    let chunks = added_chunks(&file_path, &full_original, &proposed);

    ProposedFix {
        file_path,
        full_original_content: full_original,
        proposed,
        chunks,
    }
}

/// One chunk per contiguous added span in the char-level diff. Removed spans
/// are not surfaced separately; they are implied by the side-by-side view.
fn added_chunks(file_path: &str, original: &Arc<str>, proposed: &str) -> Vec<DiffChunk> {
    let diff = TextDiff::from_chars(original.as_ref(), proposed);

    // DiffOp indices count chars; translate to byte offsets.
    let old_offsets = char_byte_offsets(original);
    let new_offsets = char_byte_offsets(proposed);

    let mut chunks = Vec::new();
    for op in diff.ops() {
        let (old_range, new_range) = match *op {
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => (old_index..old_index, new_index..new_index + new_len),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => (old_index..old_index + old_len, new_index..new_index + new_len),
            DiffOp::Equal { .. } | DiffOp::Delete { .. } => continue,
        };

        let start = new_offsets[new_range.start];
        let end = new_offsets[new_range.end];
        let old_start = old_offsets[old_range.start];
        let old_end = old_offsets[old_range.end];

        chunks.push(DiffChunk {
            file_path: file_path.to_string(),
            range: Span {
                start_offset: start,
                end_offset: end,
            },
            new_text: proposed[start..end].to_string(),
            original_text: original[old_start..old_end].to_string(),
            full_original_content: Arc::clone(original),
        });
    }
    chunks
}

fn char_byte_offsets(text: &str) -> Vec<usize> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    offsets
}

/// Holds the single outstanding reviewable batch for a project.
///
/// Installing a new batch clears the previous one: only one batch exists at
/// a time. `accept` keeps the batch so a later `reject` can still revert.
#[derive(Default)]
pub struct FixSession {
    current: Option<ProposedFix>,
}

impl FixSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ProposedFix> {
        self.current.as_ref()
    }

    /// Read the target file and install a fresh batch. A read failure fails
    /// the whole operation; nothing is installed or applied.
    pub async fn propose(
        &mut self,
        path: &Path,
        violated: &str,
        replacement: &str,
        rationale: &str,
    ) -> Result<&ProposedFix> {
        let original =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| PatchError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
        let fix = compute_fix(
            &path.display().to_string(),
            &original,
            violated,
            replacement,
            rationale,
        );
        self.current = Some(fix);
        Ok(self.current.as_ref().expect("just installed"))
    }

    /// Write the currently-displayed proposed content verbatim to the target
    /// file. `edited` overrides the computed buffer when the peer edited the
    /// proposed view. The batch survives so a later reject can still revert.
    pub async fn accept(&self, edited: Option<&str>) -> Result<()> {
        let fix = self.current.as_ref().ok_or(PatchError::NoBatch)?;
        let content = edited.unwrap_or(&fix.proposed);
        write_target(&fix.file_path, content).await
    }

    /// Restore the retained original content and discard the whole batch.
    /// The batch is cleared even if the restoring write fails.
    pub async fn reject(&mut self) -> Result<()> {
        let fix = self.current.take().ok_or(PatchError::NoBatch)?;
        write_target(&fix.file_path, &fix.full_original_content).await
    }
}

async fn write_target(path: &str, content: &str) -> Result<()> {
    tokio::fs::write(PathBuf::from(path), content)
        .await
        .map_err(|source| PatchError::Write {
            path: path.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn single_replaced_digit_yields_exactly_one_chunk() {
        let fix = compute_fix("a.java", "foo(1);", "foo(1)", "foo(2)", "");
        assert_eq!(fix.proposed, "foo(2);");
        assert_eq!(fix.chunks.len(), 1);

        let chunk = &fix.chunks[0];
        assert_eq!(chunk.new_text, "2");
        assert_eq!(chunk.original_text, "1");
        assert_eq!(chunk.range, Span { start_offset: 4, end_offset: 5 });
        assert_eq!(&*chunk.full_original_content, "foo(1);");
    }

    #[test]
    fn violation_not_found_degrades_to_no_changes() {
        let fix = compute_fix("a.java", "foo(1);", "bar(9)", "bar(8)", "");
        assert_eq!(fix.proposed, "foo(1);");
        assert!(fix.chunks.is_empty());
    }

    #[test]
    fn multi_line_violations_match_literally() {
        let original = "a();\nb(1,\n  2);\nc();\n";
        let fix = compute_fix("a.java", original, "b(1,\n  2);", "b(3);", "");
        assert_eq!(fix.proposed, "a();\nb(3);\nc();\n");
        assert!(!fix.chunks.is_empty());
    }

    #[test]
    fn every_occurrence_of_the_violation_is_replaced() {
        let fix = compute_fix("a.java", "x(0); x(0);", "x(0)", "x(1)", "");
        assert_eq!(fix.proposed, "x(1); x(1);");
        assert_eq!(fix.chunks.len(), 2);
    }

    #[test]
    fn regex_metacharacters_in_violation_text_are_literal() {
        let fix = compute_fix("a.java", "a[0].b(*p); done", "a[0].b(*p)", "a[1].c()", "");
        assert_eq!(fix.proposed, "a[1].c(); done");
    }

    #[test]
    fn replacement_metacharacters_are_not_expanded() {
        let fix = compute_fix("a.java", "cost", "cost", "$total", "");
        assert_eq!(fix.proposed, "$total");
    }

    #[test]
    fn rationale_becomes_a_delimited_annotation() {
        let fix = compute_fix("a.java", "foo(1);", "foo(1)", "foo(2)", "off by one\nuse upper bound");
        assert_eq!(fix.proposed, "/*\n * off by one\n * use upper bound\n */\nfoo(2);");
    }

    #[test]
    fn empty_rationale_keeps_the_replacement_verbatim() {
        let fix = compute_fix("a.java", "foo(1);", "foo(1)", "foo(2)", "  ");
        assert_eq!(fix.proposed, "foo(2);");
    }

    #[tokio::test]
    async fn propose_fails_whole_operation_when_read_fails() {
        let mut session = FixSession::new();
        let err = session
            .propose(Path::new("/definitely/gone.java"), "a", "b", "")
            .await
            .unwrap_err();
        assert!(matches!(err, PatchError::Read { .. }));
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn reject_restores_byte_identical_content_and_clears_the_batch() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("A.java");
        tokio::fs::write(&file, "foo(1);").await.unwrap();

        let mut session = FixSession::new();
        session.propose(&file, "foo(1)", "foo(2)", "").await.unwrap();

        // Accept first (writes proposed), then reject: still reverts fully.
        session.accept(None).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "foo(2);");

        session.reject().await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "foo(1);");
        assert!(session.current().is_none());

        let err = session.reject().await.unwrap_err();
        assert!(matches!(err, PatchError::NoBatch));
    }

    #[tokio::test]
    async fn accept_writes_the_edited_buffer_when_provided() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("A.java");
        tokio::fs::write(&file, "foo(1);").await.unwrap();

        let mut session = FixSession::new();
        session.propose(&file, "foo(1)", "foo(2)", "").await.unwrap();
        session.accept(Some("foo(3); // tweaked")).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&file).await.unwrap(),
            "foo(3); // tweaked"
        );
    }

    #[tokio::test]
    async fn installing_a_new_batch_replaces_the_previous_one() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("A.java");
        tokio::fs::write(&file, "foo(1); bar(7);").await.unwrap();

        let mut session = FixSession::new();
        session.propose(&file, "foo(1)", "foo(2)", "").await.unwrap();
        session.propose(&file, "bar(7)", "bar(8)", "").await.unwrap();

        let fix = session.current().unwrap();
        assert_eq!(fix.proposed, "foo(1); bar(8);");
        assert_eq!(fix.chunks.len(), 1);
    }
}
