use crate::pipeline::dataset::LayerName;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-identifier async locks.
///
/// Uploads and deletions of the same layer run one after another; different
/// layers never wait on each other. Entries nobody holds or waits for are
/// pruned on the next acquisition.
#[derive(Clone, Default)]
pub struct LayerLocks {
    table: Arc<Mutex<HashMap<LayerName, Arc<Mutex<()>>>>>,
}

impl LayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, layer: &LayerName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            table.entry(layer.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.table.lock().await.len()
    }
}
