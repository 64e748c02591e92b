//! Time-bounded record of recently completed sectors.

use crate::types::SectorId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sectors completed within the last `ttl`
///
/// Presence means "completed recently, do not process again". Absence proves
/// nothing beyond the window: the agent keeps no durable record. Entries are
/// keyed by the sector ID's string form and expire lazily on lookup as well as
/// during periodic sweeps.
#[derive(Clone, Debug)]
pub struct RecentWorkCache {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl RecentWorkCache {
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record `id` as completed now
    pub fn insert(&self, id: SectorId) {
        let expires_at = Instant::now() + self.ttl;
        self.lock().insert(id.to_string(), expires_at);
    }

    /// Whether `id` completed within the window
    pub fn contains(&self, id: SectorId) -> bool {
        let key = id.to_string();
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of entries, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sweep every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Recent-work sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = cache.len(), "Swept expired recent-work entries");
                        }
                    }
                }
            }
        })
    }
}
