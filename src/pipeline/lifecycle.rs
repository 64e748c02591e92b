//! Startup and shutdown coordination.

use super::SectorPipeline;
use crate::error::{Error, Result};
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Upper bound on waiting for active sectors during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Polling interval while waiting for active sectors
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl SectorPipeline {
    /// Start processing
    ///
    /// Spawns the processor loop and the recent-work sweeper. Items submitted
    /// before this call stay queued until it runs.
    ///
    /// # Errors
    ///
    /// Fails if the pipeline was already started.
    pub fn start(&self) -> Result<()> {
        let work_rx = self
            .queue_state
            .work_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| Error::Other("sector pipeline already started".to_string()))?;

        let processor = self.spawn_processor(work_rx);
        let sweeper = self
            .recent
            .spawn_sweeper(self.config.dedup.sweep_interval, self.cancel.child_token());

        self.queue_state
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend([processor, sweeper]);

        tracing::info!(
            max_downloader = self.config.transfer.max_downloader,
            max_download_retry = self.config.transfer.max_download_retry,
            "Sector pipeline started"
        );
        Ok(())
    }

    /// Whether new sectors are admitted
    pub fn is_accepting(&self) -> bool {
        self.queue_state.accepting_new.load(Ordering::SeqCst)
    }

    /// Gracefully shut the pipeline down
    ///
    /// 1. Stops admitting new sectors
    /// 2. Cancels the pipeline token; transfers and part workers observe it
    /// 3. Waits for active sectors to wind down (bounded by 30 seconds)
    /// 4. Joins the background tasks and emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_sectors()).await {
            Ok(()) => tracing::info!("All active sectors stopped"),
            Err(_) => tracing::warn!(
                active = self.active_count(),
                "Timeout waiting for active sectors, proceeding with shutdown"
            ),
        }

        let background: Vec<_> = self
            .queue_state
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in background {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_sectors(&self) {
        loop {
            let active = self.active_count();
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for active sectors to stop");
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }
}
