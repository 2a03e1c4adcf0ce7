use crate::index::EphemeralIndex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

type Slot = Arc<OnceCell<Arc<EphemeralIndex>>>;

/// Content-hash keyed index cache. Concurrent requests for the same key share a
/// single build; a failed build leaves the key empty for the next caller.
#[derive(Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build<F, Fut, E>(&self, key: &str, build: F) -> Result<Arc<EphemeralIndex>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EphemeralIndex, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(key.to_string()).or_default())
        };

        let index = slot
            .get_or_try_init(move || async move { build().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(index))
    }

    pub async fn evict(&self, key: &str) {
        if self.entries.lock().await.remove(key).is_some() {
            debug!(key, "evicted cached index");
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        if !entries.is_empty() {
            debug!(count = entries.len(), "cleared cached indexes");
        }
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}
