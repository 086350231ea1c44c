//! `ClientCore`: the shared state behind the mount, the cache CLI, and the
//! background loops in `sync.rs`.
//!
//! Holds the pulled tree under a reader/writer lock, an HTTP client carrying
//! a bearer token, and the local content cache, per spec §4.7.

use crate::api::{ApiError, ApiClient};
use crate::cache::Cache;
use crate::tree::Tree;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use tracing::{info, warn};

pub struct ClientCore {
    api: ApiClient,
    token: StdRwLock<String>,
    tree: Tree,
    cache: Cache,
    cache_budget: Option<u64>,
    offline: AtomicBool,
    /// Set once the server rejects the current token as invalid/revoked.
    /// Per spec §7, a `401` clears the stored token and forces re-login;
    /// `ClientCore` itself holds no config, so it only raises the flag —
    /// the CLI layer (`main.rs`) clears the on-disk token when it sees it.
    unauthorized: AtomicBool,
}

impl ClientCore {
    /// Log in, fetch the initial tree, and open the local cache.
    pub async fn connect(
        server_url: &str,
        token: String,
        cache_dir: PathBuf,
        cache_budget: Option<u64>,
    ) -> anyhow::Result<Arc<Self>> {
        let api = ApiClient::new(server_url);
        let root_dto = api.get_tree(&token).await?;
        let tree = Tree::new(root_dto);
        let cache = Cache::open(&cache_dir)?;

        Ok(Arc::new(Self {
            api,
            token: StdRwLock::new(token),
            tree,
            cache,
            cache_budget,
            offline: AtomicBool::new(false),
            unauthorized: AtomicBool::new(false),
        }))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn token(&self) -> String {
        self.token.read().unwrap().clone()
    }

    pub fn set_token(&self, token: String) {
        *self.token.write().unwrap() = token;
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn cache_budget(&self) -> Option<u64> {
        self.cache_budget
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    /// Flip the offline flag, logging on state transitions. Used by `sync.rs`'s
    /// health-check loop and by a failed refresh.
    pub(crate) fn set_offline(&self, offline: bool) {
        let was_offline = self.offline.swap(offline, Ordering::Relaxed);
        if was_offline && !offline {
            info!("server back online");
        } else if !was_offline && offline {
            warn!("server marked offline");
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_unauthorized(&self) {
        self.unauthorized.store(true, Ordering::Relaxed);
    }

    /// Re-fetch the full tree and atomically swap it in. Used by `sync.rs`'s
    /// refresh loop, SSE-watch loop, and the offline -> online transition.
    pub(crate) async fn refresh_tree(&self) {
        match self.api.get_tree(&self.token()).await {
            Ok(dto) => {
                self.tree.replace(dto).await;
                self.set_offline(false);
            }
            Err(ApiError::Unauthorized) => {
                warn!("token rejected by server; re-login required");
                self.mark_unauthorized();
            }
            Err(e) => {
                tracing::error!(error = %e, "tree refresh failed");
            }
        }
    }
}
