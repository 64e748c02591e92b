//! Work queue consumer: one task per sector, bounded by the concurrency limit.

use super::SectorPipeline;
use crate::types::SectorWorkItem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Counts a running sector task for as long as it lives
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SectorPipeline {
    /// Spawn the processor loop over `work_rx`
    ///
    /// The loop:
    /// 1. Waits for the next work item
    /// 2. Acquires a permit from the concurrency limiter (`max_downloader`)
    /// 3. Spawns the sector's state machine, which holds the permit until it ends
    /// 4. Repeats until the pipeline is cancelled
    ///
    /// Items still queued at shutdown release their in-flight marks.
    pub(crate) fn spawn_processor(
        &self,
        mut work_rx: mpsc::Receiver<SectorWorkItem>,
    ) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();

        tokio::spawn(async move {
            let concurrent_limit = Arc::clone(&pipeline.queue_state.concurrent_limit);

            loop {
                let item = tokio::select! {
                    biased;
                    _ = pipeline.cancel.cancelled() => break,
                    item = work_rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };

                let permit = tokio::select! {
                    biased;
                    _ = pipeline.cancel.cancelled() => {
                        pipeline.in_flight.remove(item.id);
                        break;
                    }
                    permit = Arc::clone(&concurrent_limit).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            pipeline.in_flight.remove(item.id);
                            break;
                        }
                    },
                };

                let guard = ActiveGuard::new(&pipeline.queue_state.active);
                let task_pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    task_pipeline.run_sector(item).await;
                });
            }

            work_rx.close();
            while let Ok(item) = work_rx.try_recv() {
                pipeline.in_flight.remove(item.id);
            }
            tracing::debug!("Sector processor stopped");
        })
    }
}
