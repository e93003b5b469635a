use docsync_protocol::normalize_path;
use serde::Serialize;
use std::path::Path;

/// One node of the project file-hierarchy snapshot pushed to the peer on
/// handshake and after every create/delete/rename.
#[derive(Debug, Serialize)]
pub struct HierarchyNode {
    pub properties: FileProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<HierarchyNode>>,
}

#[derive(Debug, Serialize)]
pub struct FileProperties {
    #[serde(rename = "canonicalPath")]
    pub canonical_path: String,
    pub parent: String,
    pub name: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
    #[serde(rename = "fileType", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// Build the hierarchy snapshot rooted at the project directory.
///
/// Hidden entries are skipped (`.git` alone can dwarf the real tree) and
/// children are sorted by name so consecutive snapshots are comparable.
pub fn build_hierarchy(root: &Path) -> std::io::Result<HierarchyNode> {
    build_dir_node(root)
}

fn build_dir_node(dir: &Path) -> std::io::Result<HierarchyNode> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut children = Vec::new();
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            children.push(build_dir_node(&path)?);
        } else {
            children.push(HierarchyNode {
                properties: properties_for(&path, false, Some("File".to_string())),
                children: None,
            });
        }
    }

    Ok(HierarchyNode {
        properties: properties_for(dir, true, None),
        children: Some(children),
    })
}

fn properties_for(path: &Path, is_directory: bool, file_type: Option<String>) -> FileProperties {
    let canonical = normalize_path(&path.display().to_string());
    let parent = path
        .parent()
        .map(|p| normalize_path(&p.display().to_string()))
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileProperties {
        canonical_path: canonical,
        parent,
        name,
        is_directory,
        file_type,
    }
}
