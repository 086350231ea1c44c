//! Wire DTOs shared across REST handlers.

use crate::db::models::{FileEntry, Visibility};
use crate::tree::Node;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TreeNodeDto {
    pub path: String,
    pub path_id: String,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub hash: Option<String>,
    pub version: i64,
    pub visibility: Visibility,
    pub modified_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNodeDto>,
}

impl TreeNodeDto {
    pub fn from_node(node: &Node, recursive: bool) -> Self {
        let FileEntry {
            path,
            path_id,
            name,
            is_dir,
            size_bytes,
            content_hash,
            version,
            visibility,
            modified_at,
            ..
        } = &node.entry;

        Self {
            path: path.clone(),
            path_id: path_id.clone(),
            name: name.clone(),
            is_dir: *is_dir,
            size: *size_bytes,
            hash: content_hash.clone(),
            version: *version,
            visibility: *visibility,
            modified_at: *modified_at,
            children: if recursive {
                node.children.iter().map(|c| TreeNodeDto::from_node(c, true)).collect()
            } else {
                node.children.iter().map(|c| TreeNodeDto::from_node(c, false)).collect()
            },
        }
    }
}
