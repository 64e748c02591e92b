//! Admission control for discovered sectors.

use super::SectorPipeline;
use crate::types::{Event, SectorId, SectorWorkItem, SkipReason};
use std::sync::atomic::Ordering;

/// Outcome of [`SectorPipeline::submit`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Marked in flight and queued
    Accepted,
    /// Another attempt for the sector is queued or running
    AlreadyInFlight,
    /// The sector completed within the dedup window
    RecentlyCompleted,
    /// The pipeline is shutting down
    ShuttingDown,
}

impl SectorPipeline {
    /// Offer a work item to the pipeline
    ///
    /// Sectors already in flight or completed within the dedup window are
    /// dropped. An accepted item is marked in flight before it is queued;
    /// when the queue is full this waits, which is what bounds intake.
    pub async fn submit(&self, item: SectorWorkItem) -> Admission {
        let id = item.id;

        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Admission::ShuttingDown;
        }

        if self.in_flight.contains(id) {
            return self.skip(id, SkipReason::InFlight);
        }

        if self.recent.contains(id) {
            return self.skip(id, SkipReason::RecentlyCompleted);
        }

        // Lost a race against a concurrent submit of the same sector
        if !self.in_flight.try_insert(id) {
            return self.skip(id, SkipReason::InFlight);
        }

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.queue_state.work_tx.send(item) => sent.is_ok(),
        };
        if !sent {
            self.in_flight.remove(id);
            return Admission::ShuttingDown;
        }

        tracing::info!(sector_id = %id, required = %item.required, "Sector accepted");
        self.emit_event(Event::SectorAccepted { id });
        Admission::Accepted
    }

    /// Offer a freshly discovered sector (every step required)
    pub async fn submit_sector(&self, id: SectorId) -> Admission {
        self.submit(SectorWorkItem::fresh(id)).await
    }

    fn skip(&self, id: SectorId, reason: SkipReason) -> Admission {
        tracing::debug!(sector_id = %id, ?reason, "Sector skipped");
        self.emit_event(Event::SectorSkipped { id, reason });
        match reason {
            SkipReason::InFlight => Admission::AlreadyInFlight,
            SkipReason::RecentlyCompleted => Admission::RecentlyCompleted,
        }
    }

    /// Put a failed item back on the work queue
    ///
    /// The sector keeps its in-flight mark across the requeue, so the item
    /// bypasses the dedup checks that would otherwise reject it. The send
    /// happens on its own task so the failing worker is never blocked; if
    /// shutdown wins the race the mark is released instead.
    pub(crate) fn requeue(&self, item: SectorWorkItem) {
        self.emit_event(Event::SectorRequeued {
            id: item.id,
            attempt: item.attempt,
            required: item.required.bits(),
        });

        let work_tx = self.queue_state.work_tx.clone();
        let in_flight = self.in_flight.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = work_tx.send(item) => sent.is_ok(),
            };
            if !sent {
                in_flight.remove(item.id);
                tracing::debug!(sector_id = %item.id, "Requeue dropped during shutdown");
            }
        });
    }
}
