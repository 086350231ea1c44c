//! In-memory snapshot of the live metadata tree, rooted at `/`.
//!
//! Readers always see a complete, consistent tree: rebuilds construct a fresh
//! tree off to the side and swap a single `Arc` pointer in, so a reader never
//! observes a half-built structure. Structural mutations come exclusively
//! through the ContentPipeline, which schedules a rebuild via [`TreeCache::request_rebuild`].

use crate::db::{self, models::FileEntry, DbPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Node {
    pub entry: FileEntry,
    pub children: Vec<Arc<Node>>,
}

impl Node {
    fn synthetic_root() -> FileEntry {
        FileEntry {
            id: uuid::Uuid::nil(),
            path: "/".to_string(),
            path_id: db::files::compute_path_id("/"),
            name: String::new(),
            parent_path: String::new(),
            is_dir: true,
            size_bytes: 0,
            content_hash: None,
            object_key: None,
            storage_location_id: None,
            version: 1,
            owner_id: None,
            visibility: db::models::Visibility::Public,
            group_id: None,
            deleted_at: None,
            deleted_by: None,
            original_path: None,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        }
    }
}

/// Build a tree from a flat, path-ordered list of active entries. O(N): one pass
/// to build a path -> entry map, one pass to attach children to parents.
fn build_tree(entries: Vec<FileEntry>) -> Arc<Node> {
    let mut by_path: HashMap<String, FileEntry> = HashMap::new();
    let mut children_of: HashMap<String, Vec<String>> = HashMap::new();

    let has_root = entries.iter().any(|e| e.path == "/");

    for entry in entries {
        children_of.entry(entry.parent_path.clone()).or_default().push(entry.path.clone());
        by_path.insert(entry.path.clone(), entry);
    }

    if !has_root {
        by_path.insert("/".to_string(), Node::synthetic_root());
    }

    fn attach(path: &str, by_path: &HashMap<String, FileEntry>, children_of: &HashMap<String, Vec<String>>) -> Arc<Node> {
        let entry = by_path.get(path).cloned().unwrap_or_else(|| {
            let mut synthetic = Node::synthetic_root();
            synthetic.path = path.to_string();
            synthetic
        });
        let mut children: Vec<Arc<Node>> = children_of
            .get(path)
            .map(|paths| paths.iter().map(|p| attach(p, by_path, children_of)).collect())
            .unwrap_or_default();
        children.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
        Arc::new(Node { entry, children })
    }

    attach("/", &by_path, &children_of)
}

pub struct TreeCache {
    root: RwLock<Arc<Node>>,
    rebuild_tx: mpsc::Sender<()>,
}

impl TreeCache {
    /// Perform the initial synchronous build and spawn the debounced rebuild actor.
    pub async fn new(pool: DbPool) -> anyhow::Result<Arc<Self>> {
        let entries = db::files::list_all_active(&pool).await?;
        let root = RwLock::new(build_tree(entries));

        let (rebuild_tx, rebuild_rx) = mpsc::channel(1);
        let cache = Arc::new(Self { root, rebuild_tx });

        let worker_cache = cache.clone();
        tokio::spawn(async move {
            worker_cache.run_rebuild_actor(pool, rebuild_rx).await;
        });

        Ok(cache)
    }

    /// Debounced rebuild loop: at most one rebuild in flight at a time, with a
    /// single trailing rebuild queued if a request arrives mid-rebuild. Mirrors
    /// the teacher's debounce idiom in `client/cli/src/watch.rs` (coalesce
    /// bursty notifications, settle before acting), adapted to an async actor
    /// fed by a channel instead of a blocking `mpsc::Receiver::recv_timeout` loop.
    async fn run_rebuild_actor(self: Arc<Self>, pool: DbPool, mut rx: mpsc::Receiver<()>) {
        const DEBOUNCE: Duration = Duration::from_millis(150);

        while rx.recv().await.is_some() {
            let mut deadline = Instant::now() + DEBOUNCE;
            while let Ok(Some(())) = tokio::time::timeout_at(deadline, rx.recv()).await {
                deadline = Instant::now() + DEBOUNCE;
            }

            match db::files::list_all_active(&pool).await {
                Ok(entries) => {
                    let new_root = build_tree(entries);
                    *self.root.write().await = new_root;
                    tracing::debug!("tree cache rebuilt");
                }
                Err(err) => {
                    tracing::error!(error = %err, "tree cache rebuild failed, keeping stale snapshot");
                }
            }
        }
    }

    /// Ask for a rebuild. Non-blocking: if one is already queued this is a no-op,
    /// relying on the actor's trailing-rebuild behavior to pick up the latest state.
    pub fn request_rebuild(&self) {
        let _ = self.rebuild_tx.try_send(());
    }

    /// Rebuild inline and swap the new snapshot in before returning. Used by
    /// callers that must guarantee read-your-writes (a tree fetch right after
    /// an upload has to see the new entry), where the debounced actor's up to
    /// 150ms lag is not acceptable.
    pub async fn rebuild_now(&self, pool: &DbPool) -> anyhow::Result<()> {
        let entries = db::files::list_all_active(pool).await?;
        let new_root = build_tree(entries);
        *self.root.write().await = new_root;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Option<Arc<Node>> {
        fn find<'a>(node: &'a Arc<Node>, segments: &[&str]) -> Option<&'a Arc<Node>> {
            match segments.split_first() {
                None => Some(node),
                Some((head, rest)) => node
                    .children
                    .iter()
                    .find(|c| c.entry.name == *head)
                    .and_then(|c| find(c, rest)),
            }
        }

        let root = self.root.read().await;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        find(&root, &segments).cloned()
    }

    pub async fn subtree(&self, path: &str) -> Option<Arc<Node>> {
        self.get(path).await
    }

    pub async fn count(&self) -> usize {
        fn count_node(node: &Node) -> usize {
            1 + node.children.iter().map(|c| count_node(c)).sum::<usize>()
        }
        count_node(&self.root.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::Visibility;

    fn entry(path: &str, parent: &str, is_dir: bool) -> FileEntry {
        let (_, name) = db::files::split_path(path);
        FileEntry {
            id: uuid::Uuid::new_v4(),
            path: path.to_string(),
            path_id: db::files::compute_path_id(path),
            name,
            parent_path: parent.to_string(),
            is_dir,
            size_bytes: 0,
            content_hash: None,
            object_key: None,
            storage_location_id: None,
            version: 1,
            owner_id: None,
            visibility: Visibility::Private,
            group_id: None,
            deleted_at: None,
            deleted_by: None,
            original_path: None,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn builds_tree_with_synthetic_root() {
        let entries = vec![
            entry("/dir", "/", true),
            entry("/dir/a.txt", "/dir", false),
            entry("/b.txt", "/", false),
        ];
        let root = build_tree(entries);
        assert_eq!(root.entry.path, "/");
        assert_eq!(root.children.len(), 2);
        // sorted by name: "b.txt" < "dir"
        assert_eq!(root.children[0].entry.name, "b.txt");
        assert_eq!(root.children[1].entry.name, "dir");
        assert_eq!(root.children[1].children.len(), 1);
    }

    #[test]
    fn orphans_without_explicit_root_row_attach_to_synthetic_root() {
        let entries = vec![entry("/only.txt", "/", false)];
        let root = build_tree(entries);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].entry.name, "only.txt");
    }
}
