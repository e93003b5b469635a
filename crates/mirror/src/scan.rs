use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Collect all recognized source files under the project root
/// (.gitignore aware), sorted so the bulk handshake order is stable.
pub fn scan_project(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);

    for result in builder.build() {
        match result {
            Ok(entry) => {
                let Some(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_file() {
                    continue;
                }
                let path = entry.path();
                if path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == extension)
                {
                    files.push(path.to_path_buf());
                }
            }
            Err(err) => log::warn!("failed to read entry: {err}"),
        }
    }

    files.sort();
    log::info!("found {} source files under {}", files.len(), root.display());
    files
}
