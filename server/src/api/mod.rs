pub mod rest;

use crate::config::Config;
use crate::db::DbPool;
use crate::events::EventBus;
use crate::pipeline::ContentPipeline;
use crate::storage::StorageRouter;
use crate::tree::TreeCache;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub router: Arc<StorageRouter>,
    pub tree: Arc<TreeCache>,
    pub events: Arc<EventBus>,
    pub pipeline: Arc<ContentPipeline>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: Config,
        router: Arc<StorageRouter>,
        tree: Arc<TreeCache>,
        events: Arc<EventBus>,
        pipeline: Arc<ContentPipeline>,
    ) -> Self {
        Self {
            db,
            config,
            router,
            tree,
            events,
            pipeline,
        }
    }
}
