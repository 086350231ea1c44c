//! Background loops that keep a [`ClientCore`] fresh: periodic tree refresh,
//! SSE-driven refresh, and a health check that flips the offline flag.
//!
//! Generalized from the teacher's `sync.rs`/`watch.rs` (which polled
//! `get_changes` and watched the local filesystem for a two-way push-sync
//! daemon) into three independent `tokio::spawn`ed tasks for a read-through
//! cache: there is no local directory to watch or push from anymore, only a
//! remote tree to keep mirrored and a connectivity flag to keep honest. The
//! three loops share only the tree and an `AtomicBool` offline flag, so any
//! one of them can be stopped without touching the others.

use crate::api::ApiError;
use crate::core::ClientCore;
use crate::sse::SseStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handles for the three background loops, so callers can stop what they started.
#[derive(Default)]
pub struct BackgroundLoops {
    refresh: Option<JoinHandle<()>>,
    sse_watch: Option<JoinHandle<()>>,
    health_check: Option<JoinHandle<()>>,
}

impl BackgroundLoops {
    pub fn stop_all(&mut self) {
        if let Some(h) = self.refresh.take() {
            h.abort();
        }
        if let Some(h) = self.sse_watch.take() {
            h.abort();
        }
        if let Some(h) = self.health_check.take() {
            h.abort();
        }
    }
}

impl Drop for BackgroundLoops {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Re-fetch the full tree and atomically swap it in, on a fixed interval.
pub fn start_refresh_loop(core: Arc<ClientCore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            core.refresh_tree().await;
        }
    })
}

/// Consume `/api/v1/events`; any event (the payload is never interpreted,
/// only its arrival matters) triggers a full refresh. Reconnects with a
/// short backoff whenever the stream ends or errors.
pub fn start_sse_watch_loop(core: Arc<ClientCore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if core.is_unauthorized() {
                warn!("sse loop stopping: token rejected, re-login required");
                return;
            }

            let token = core.token();
            match core.api().open_events(&token).await {
                Ok(resp) => {
                    let mut stream = SseStream::new(resp);
                    loop {
                        match stream.next_event().await {
                            Ok(Some(_event)) => core.refresh_tree().await,
                            Ok(None) => break,
                            Err(e) => {
                                warn!(error = %e, "sse stream error");
                                break;
                            }
                        }
                    }
                }
                Err(ApiError::Unauthorized) => {
                    warn!("token rejected by server; re-login required");
                    core.mark_unauthorized();
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "could not open event stream");
                }
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    })
}

/// Ping `/health` on an interval; flips the offline flag on failure/recovery
/// and triggers a refresh on the offline -> online transition.
pub fn start_health_check_loop(core: Arc<ClientCore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let healthy = core.api().health().await.unwrap_or(false);
            let was_offline = core.is_offline();
            core.set_offline(!healthy);
            if was_offline && healthy {
                core.refresh_tree().await;
            }
        }
    })
}

/// Start all three loops with the spec's suggested cadences.
pub fn start_all(core: &Arc<ClientCore>) -> BackgroundLoops {
    BackgroundLoops {
        refresh: Some(start_refresh_loop(core.clone(), Duration::from_secs(60))),
        sse_watch: Some(start_sse_watch_loop(core.clone())),
        health_check: Some(start_health_check_loop(core.clone(), Duration::from_secs(15))),
    }
}
