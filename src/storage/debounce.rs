//! Per-key write coalescing.
//!
//! Rapid successive saves of the same key collapse into one backend write
//! issued once the window elapses. The value written is always the most
//! recently scheduled one.

use super::backend::KeyValueBackend;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

/// Default coalescing window for scheduled writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A queued value and the schedule call that queued it. Only the timer
/// started by that call may write it.
#[derive(Debug)]
struct Pending {
    raw: String,
    generation: u64,
}

pub struct Debouncer {
    backend: Arc<dyn KeyValueBackend>,
    window: Duration,
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new(backend: Arc<dyn KeyValueBackend>, window: Duration) -> Self {
        Self {
            backend,
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Queues `raw` for `key` and restarts the key's window. Timers started
    /// by earlier schedules of the key expire without writing.
    pub async fn schedule(&self, key: &str, raw: String) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = self
            .pending
            .lock()
            .await
            .insert(key.to_string(), Pending { raw, generation })
            .is_some();
        if replaced {
            trace!("Coalesced pending write for '{}'", key);
        }

        let pending = Arc::clone(&self.pending);
        let backend = Arc::clone(&self.backend);
        let key = key.to_string();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Held across the write so readers never miss the value between
            // the queue and the backend.
            let mut queue = pending.lock().await;
            let Some(entry) = queue.get(&key) else { return };
            if entry.generation != generation {
                return;
            }
            match backend.set_raw(&key, &entry.raw).await {
                Ok(()) => debug!("Debounced write of '{}' flushed", key),
                Err(e) => error!("Debounced write of '{}' failed: {}", key, e),
            }
            queue.remove(&key);
        });
    }

    /// The queued, not yet written, value for `key`.
    pub async fn pending_value(&self, key: &str) -> Option<String> {
        self.pending.lock().await.get(key).map(|p| p.raw.clone())
    }

    /// Drops the queued value for `key`, if any. Its timer then expires
    /// without writing.
    pub async fn cancel(&self, key: &str) -> bool {
        self.pending.lock().await.remove(key).is_some()
    }

    /// Writes every queued value now. Returns how many keys were written.
    pub async fn flush(&self) -> usize {
        let mut queue = self.pending.lock().await;
        let mut written = 0;
        for (key, entry) in queue.drain() {
            match self.backend.set_raw(&key, &entry.raw).await {
                Ok(()) => written += 1,
                Err(e) => error!("Flushing '{}' failed: {}", key, e),
            }
        }
        written
    }
}
