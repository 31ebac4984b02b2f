use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use pixelwar_shared::store::StorePath;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use crate::config::sse_broadcast_buffer;
use crate::tree::StoreTree;

/// Paths removed when a client session's last stream closes.
#[derive(Debug, Default)]
pub struct SessionEntry {
    pub open_streams: usize,
    pub on_disconnect: Vec<StorePath>,
}

#[derive(Clone)]
pub struct AppState {
    pub tree: Arc<RwLock<StoreTree>>,
    /// Each message is the path a write touched.
    pub change_tx: broadcast::Sender<Arc<StorePath>>,
    pub sessions: Arc<DashMap<String, SessionEntry>>,
    pub subscribers: Arc<AtomicUsize>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(sse_broadcast_buffer());
        Self {
            tree: Arc::new(RwLock::new(StoreTree::new())),
            change_tx,
            sessions: Arc::new(DashMap::new()),
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn read(&self, path: &StorePath) -> Value {
        self.tree.read().await.get(path)
    }

    pub async fn write(&self, path: &StorePath, value: Value) -> bool {
        let changed = {
            let mut tree = self.tree.write().await;
            tree.set(path, value, Utc::now().timestamp_millis())
        };
        if changed {
            self.notify(path);
        }
        changed
    }

    pub async fn remove(&self, path: &StorePath) -> bool {
        let removed = self.tree.write().await.remove(path);
        if removed {
            self.notify(path);
        }
        removed
    }

    fn notify(&self, path: &StorePath) {
        // No receivers just means nobody is subscribed.
        let _ = self.change_tx.send(Arc::new(path.clone()));
    }

    /// Queue `path` for removal when `session` closes. Refused (false) unless
    /// the session has a stream open, since nothing would ever run it.
    pub fn register_on_disconnect(&self, session: &str, path: StorePath) -> bool {
        let Some(mut entry) = self.sessions.get_mut(session) else {
            return false;
        };
        if entry.open_streams == 0 {
            return false;
        }
        if !entry.on_disconnect.contains(&path) {
            entry.on_disconnect.push(path);
        }
        true
    }

    /// Count one open stream for `session` until the guard drops.
    pub fn attach_session(&self, session: &str) -> SessionGuard {
        self.sessions
            .entry(session.to_string())
            .or_default()
            .open_streams += 1;
        SessionGuard {
            state: self.clone(),
            session: session.to_string(),
        }
    }

    /// Remove the session and return its pending paths if no stream is left.
    fn detach_session(&self, session: &str) -> Option<Vec<StorePath>> {
        {
            let mut entry = self.sessions.get_mut(session)?;
            entry.open_streams = entry.open_streams.saturating_sub(1);
            if entry.open_streams > 0 {
                return None;
            }
        }
        self.sessions
            .remove_if(session, |_, entry| entry.open_streams == 0)
            .map(|(_, entry)| entry.on_disconnect)
    }

    pub fn subscriber_guard(&self) -> SubscriberGuard {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        SubscriberGuard {
            subscribers: self.subscribers.clone(),
        }
    }
}

pub struct SessionGuard {
    state: AppState,
    session: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(paths) = self.state.detach_session(&self.session) else {
            return;
        };
        if paths.is_empty() {
            debug!(session = %self.session, "session closed");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let session = std::mem::take(&mut self.session);
        runtime.spawn(async move {
            for path in &paths {
                state.remove(path).await;
            }
            info!(%session, removed = paths.len(), "ran on-disconnect removals");
        });
    }
}

pub struct SubscriberGuard {
    subscribers: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}
