//! Sector pipeline: intake, dedup and the per-sector state machine
//!
//! The `SectorPipeline` struct and its methods are organized by concern:
//! - [`intake`] - Admission control and requeueing
//! - [`processor`] - Work queue consumption under the concurrency limit
//! - [`sector_task`] - The resumable per-sector step sequence
//! - [`lifecycle`] - Startup and shutdown coordination

mod intake;
mod lifecycle;
mod processor;
mod sector_task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use intake::Admission;

use crate::clients::{OutcomeReporter, PlatformClient, SectorDeclarer, StorageRpcClient};
use crate::config::Config;
use crate::dedup::{InFlightSet, RecentWorkCache};
use crate::error::Result;
use crate::layout::SectorLayout;
use crate::transfer::ChunkFetcher;
use crate::types::{Event, SectorId, SectorWorkItem};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Work queue and concurrency state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Bounded intake channel (capacity `max_downloader`)
    pub(crate) work_tx: mpsc::Sender<SectorWorkItem>,
    /// Receiving end, taken once by `start()`
    pub(crate) work_rx: Arc<Mutex<Option<mpsc::Receiver<SectorWorkItem>>>>,
    /// Limits concurrently executing sectors to `max_downloader`
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Sector tasks currently executing
    pub(crate) active: Arc<AtomicUsize>,
    /// Cleared when shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Background tasks spawned by `start()`
    pub(crate) background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// Services the state machine calls out to
#[derive(Clone)]
pub(crate) struct Collaborators {
    /// HTTP transfers for both payloads
    pub(crate) fetcher: ChunkFetcher,
    /// Storage-service declarations
    pub(crate) declarer: Arc<dyn SectorDeclarer>,
    /// Platform outcome reports
    pub(crate) reporter: Arc<dyn OutcomeReporter>,
}

/// The sector transfer pipeline (cloneable - all state is shared)
///
/// One instance owns the in-flight set and the recent-work cache for its
/// whole lifetime. Hand out clones to anything that needs to submit work or
/// query sector status.
#[derive(Clone)]
pub struct SectorPipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) layout: Arc<SectorLayout>,
    pub(crate) in_flight: InFlightSet,
    pub(crate) recent: RecentWorkCache,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) queue_state: QueueState,
    pub(crate) collaborators: Collaborators,
    /// Process-scoped cancellation; every transfer runs on a child of it
    pub(crate) cancel: CancellationToken,
}

impl SectorPipeline {
    /// Build a pipeline talking to the configured platform and storage service
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = ChunkFetcher::new(&config)?;
        let declarer = Arc::new(StorageRpcClient::new(&config.miner)?);
        let reporter = Arc::new(PlatformClient::new(&config)?);
        Self::with_collaborators(config, fetcher, declarer, reporter)
    }

    /// Build a pipeline around caller-supplied collaborators
    pub fn with_collaborators(
        config: Config,
        fetcher: ChunkFetcher,
        declarer: Arc<dyn SectorDeclarer>,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (work_tx, work_rx) = mpsc::channel(config.transfer.max_downloader);

        let queue_state = QueueState {
            work_tx,
            work_rx: Arc::new(Mutex::new(Some(work_rx))),
            concurrent_limit: Arc::new(Semaphore::new(config.transfer.max_downloader)),
            active: Arc::new(AtomicUsize::new(0)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            background: Arc::new(Mutex::new(Vec::new())),
        };

        Ok(Self {
            layout: Arc::new(SectorLayout::from_config(&config)),
            recent: RecentWorkCache::new(config.dedup.ttl),
            in_flight: InFlightSet::new(),
            config: Arc::new(config),
            event_tx,
            queue_state,
            collaborators: Collaborators {
                fetcher,
                declarer,
                reporter,
            },
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Events emitted while nobody listens are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers without blocking
    pub(crate) fn emit_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Configuration the pipeline runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names, paths and URLs of this miner's sectors
    pub fn layout(&self) -> &SectorLayout {
        &self.layout
    }

    /// Token cancelled when the pipeline shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether an attempt for `id` is queued or running
    pub fn is_in_flight(&self, id: SectorId) -> bool {
        self.in_flight.contains(id)
    }

    /// Whether `id` completed within the dedup window
    pub fn is_recently_completed(&self, id: SectorId) -> bool {
        self.recent.contains(id)
    }

    /// Sectors queued or running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Sectors currently executing their steps
    pub fn active_count(&self) -> usize {
        self.queue_state.active.load(Ordering::SeqCst)
    }

    /// Items waiting in the work queue
    pub fn queued_len(&self) -> usize {
        self.queue_state.work_tx.max_capacity() - self.queue_state.work_tx.capacity()
    }
}
