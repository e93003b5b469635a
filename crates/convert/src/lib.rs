//! Converter gateway.
//!
//! Wraps the external source-to-representation converter as a pure function
//! from file path to representation text. The tool is a black box: we invoke
//! `<converter> "<path>"`, and a run counts as successful only when it exits
//! zero *and* writes nothing to stderr. There is no retry here; callers
//! decide whether to skip the file or surface the failure.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to spawn converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter failed for {path} ({status}): {diagnostic}")]
    Failed {
        path: String,
        status: String,
        diagnostic: String,
    },

    #[error("converter produced non-UTF-8 output for {path}")]
    NonUtf8 { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The conversion seam. The production implementation shells out to the
/// external tool; tests substitute a recording double.
#[async_trait]
pub trait Convert: Send + Sync {
    /// Whether this path is a recognized source file for the converter.
    fn matches(&self, path: &Path) -> bool;

    async fn convert(&self, path: &Path) -> Result<String>;
}

/// Invokes the external converter binary on single files.
pub struct ExternalConverter {
    program: String,
    extension: String,
    root: PathBuf,
}

impl ExternalConverter {
    pub fn new(program: &str, extension: &str, root: &Path) -> Self {
        Self {
            program: program.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            root: root.to_path_buf(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Convert an ad-hoc snippet by writing it to the fixed temp source file
    /// at the project root and running the converter over that file.
    pub async fn convert_snippet(&self, code: &str) -> Result<String> {
        let temp_path = self.root.join(format!("tempSnippetFile.{}", self.extension));
        tokio::fs::write(&temp_path, code).await?;
        let result = self.convert(&temp_path).await;
        if let Err(err) = tokio::fs::remove_file(&temp_path).await {
            log::warn!("failed to remove {}: {err}", temp_path.display());
        }
        result
    }
}

#[async_trait]
impl Convert for ExternalConverter {
    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    async fn convert(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .await
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(ConvertError::Failed {
                path: path.display().to_string(),
                status: output.status.to_string(),
                diagnostic: stderr.trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ConvertError::NonUtf8 {
            path: path.display().to_string(),
        })
    }
}
