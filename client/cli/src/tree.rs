//! In-memory snapshot of the server's metadata tree.
//!
//! Mirrors the server's `tree::TreeCache` shape (an `Arc<Node>` swapped under
//! a reader/writer lock so readers never see a half-built tree) on the
//! client side, built instead from the `TreeNodeDto` the server hands back
//! from `GET /api/v1/tree`.

use crate::api::TreeNodeDto;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Node {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub hash: Option<String>,
    pub version: i64,
    pub modified_at: chrono::DateTime<chrono::Utc>,
    pub children: Vec<Arc<Node>>,
}

impl Node {
    fn from_dto(dto: &TreeNodeDto) -> Arc<Node> {
        Arc::new(Node {
            path: dto.path.clone(),
            name: dto.name.clone(),
            is_dir: dto.is_dir,
            size: dto.size,
            hash: dto.hash.clone(),
            version: dto.version,
            modified_at: dto.modified_at,
            children: dto.children.iter().map(Node::from_dto).collect(),
        })
    }
}

pub struct Tree {
    root: RwLock<Arc<Node>>,
}

impl Tree {
    pub fn new(dto: TreeNodeDto) -> Self {
        Self { root: RwLock::new(Node::from_dto(&dto)) }
    }

    pub async fn replace(&self, dto: TreeNodeDto) {
        *self.root.write().await = Node::from_dto(&dto);
    }

    pub async fn get(&self, path: &str) -> Option<Arc<Node>> {
        fn find<'a>(node: &'a Arc<Node>, segments: &[&str]) -> Option<&'a Arc<Node>> {
            match segments.split_first() {
                None => Some(node),
                Some((head, rest)) => node.children.iter().find(|c| c.name == *head).and_then(|c| find(c, rest)),
            }
        }

        let root = self.root.read().await;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        find(&root, &segments).cloned()
    }

    pub async fn root(&self) -> Arc<Node> {
        self.root.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(path: &str, name: &str, is_dir: bool, children: Vec<TreeNodeDto>) -> TreeNodeDto {
        TreeNodeDto {
            path: path.to_string(),
            path_id: "deadbeef".to_string(),
            name: name.to_string(),
            is_dir,
            size: 0,
            hash: None,
            version: 1,
            visibility: "private".to_string(),
            modified_at: chrono::Utc::now(),
            children,
        }
    }

    #[tokio::test]
    async fn finds_nested_node_by_path() {
        let tree = Tree::new(dto(
            "/",
            "",
            true,
            vec![dto("/dir", "dir", true, vec![dto("/dir/a.txt", "a.txt", false, vec![])])],
        ));

        let node = tree.get("/dir/a.txt").await.unwrap();
        assert_eq!(node.path, "/dir/a.txt");
        assert!(!node.is_dir);
    }

    #[tokio::test]
    async fn missing_path_returns_none() {
        let tree = Tree::new(dto("/", "", true, vec![]));
        assert!(tree.get("/nope").await.is_none());
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_snapshot() {
        let tree = Tree::new(dto("/", "", true, vec![]));
        tree.replace(dto("/", "", true, vec![dto("/new.txt", "new.txt", false, vec![])])).await;
        assert!(tree.get("/new.txt").await.is_some());
    }
}
