//! Periodic sector discovery and liveness reporting
//!
//! [`SectorPoller`] drives two independent loops on top of a [`WorkSource`]:
//! discovery feeds every reported sector into [`SectorPipeline::submit`], and
//! the heartbeat tells the platform how many sectors were discovered so far.
//! Both loops log failures and carry on at the next tick; only the
//! cancellation token stops them.

use crate::clients::WorkSource;
use crate::error::Result;
use crate::pipeline::{Admission, SectorPipeline};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one discovery round produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Sector IDs reported by the work source
    pub discovered: usize,
    /// How many of them were admitted to the pipeline
    pub accepted: usize,
}

/// Discovery and heartbeat loops feeding a [`SectorPipeline`]
#[derive(Clone)]
pub struct SectorPoller {
    pipeline: SectorPipeline,
    source: Arc<dyn WorkSource>,
    check_interval: Duration,
    heartbeat_interval: Duration,
    discovered: Arc<AtomicU64>,
}

impl SectorPoller {
    /// Poll `source` at the intervals configured for `pipeline`
    pub fn new(pipeline: SectorPipeline, source: Arc<dyn WorkSource>) -> Self {
        let platform = &pipeline.config().platform;
        let check_interval = platform.check_interval;
        let heartbeat_interval = platform.heartbeat_interval;
        Self {
            pipeline,
            source,
            check_interval,
            heartbeat_interval,
            discovered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total sector IDs discovered since this poller was created
    pub fn discovered_total(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    /// Run one discovery round
    ///
    /// Submitting waits while the work queue is full, so a round can take as
    /// long as it takes the pipeline to make room.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let ids = self.source.discover().await?;
        self.discovered
            .fetch_add(ids.len() as u64, Ordering::Relaxed);

        let mut summary = PollSummary {
            discovered: ids.len(),
            accepted: 0,
        };
        for id in ids {
            match self.pipeline.submit_sector(id).await {
                Admission::Accepted => summary.accepted += 1,
                Admission::AlreadyInFlight | Admission::RecentlyCompleted => {}
                Admission::ShuttingDown => break,
            }
        }

        debug!(
            discovered = summary.discovered,
            accepted = summary.accepted,
            "Discovery round finished"
        );
        Ok(summary)
    }

    /// Send one heartbeat carrying the discovered total
    pub async fn heartbeat_once(&self) -> Result<()> {
        self.source.heartbeat(self.discovered_total()).await
    }

    /// Spawn both loops, stopped by the pipeline's cancellation token
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let cancel = self.pipeline.cancellation_token();
        vec![
            self.spawn_discovery(cancel.child_token()),
            self.spawn_heartbeat(cancel.child_token()),
        ]
    }

    /// Spawn the discovery loop
    pub fn spawn_discovery(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            info!(interval_secs = poller.check_interval.as_secs(), "Sector discovery started");
            let mut ticker = tokio::time::interval(poller.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = poller.poll_once() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Sector discovery failed, retrying next interval");
                        }
                    }
                }
            }
            info!("Sector discovery stopped");
        })
    }

    /// Spawn the heartbeat loop
    pub fn spawn_heartbeat(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = poller.heartbeat_once().await {
                    warn!(error = %e, "Heartbeat failed");
                }
            }
            debug!("Heartbeat stopped");
        })
    }
}
