//! The resumable per-sector state machine.

use super::SectorPipeline;
use crate::clients::{OutcomeAction, OutcomeReport};
use crate::error::{Error, Result};
use crate::transfer::DownloadTask;
use crate::types::{Event, SectorFileKind, SectorId, SectorWorkItem, Step};

/// Error message the platform receives for an abandoned sector
const RETRY_EXCEEDED_MESSAGE: &str = "retry exceed";

impl SectorPipeline {
    /// Run one attempt of `item`
    ///
    /// Steps run strictly in pipeline order. The first failing step requeues
    /// the item narrowed to that step and everything after it; steps that
    /// already succeeded are not redone. Once the retry ceiling is passed the
    /// sector is reported as failed and dropped without entering the
    /// recent-work cache.
    pub(crate) async fn run_sector(&self, mut item: SectorWorkItem) {
        item.attempt += 1;
        let id = item.id;

        if item.attempt > self.config.transfer.max_download_retry {
            self.abandon(item).await;
            return;
        }

        tracing::info!(
            sector_id = %id,
            attempt = item.attempt,
            required = %item.required,
            "Processing sector"
        );

        for step in item.required.iter() {
            self.emit_event(Event::StepStarted {
                id,
                step,
                attempt: item.attempt,
            });
            tracing::debug!(sector_id = %id, step = %step, attempt = item.attempt, "Step started");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                result = self.run_step(id, step) => result,
            };

            let Err(e) = result else {
                continue;
            };

            if matches!(e, Error::Cancelled) || self.cancel.is_cancelled() {
                self.in_flight.remove(id);
                tracing::info!(sector_id = %id, step = %step, "Sector interrupted by shutdown");
                return;
            }

            tracing::warn!(
                sector_id = %id,
                step = %step,
                attempt = item.attempt,
                code = e.error_code(),
                error = %e,
                "Step failed, requeueing sector"
            );
            self.emit_event(Event::StepFailed {
                id,
                step,
                attempt: item.attempt,
                code: e.error_code().to_string(),
                error: e.to_string(),
            });

            if step == Step::Declare {
                let report = OutcomeReport::failure(
                    OutcomeAction::Declare,
                    id,
                    self.layout.miner_id(),
                    e.to_string(),
                );
                self.report_best_effort(&report).await;
            }

            self.requeue(item.retry_from(step));
            return;
        }

        // Commit before releasing so a rediscovery never slips between the two
        self.recent.insert(id);
        self.in_flight.remove(id);

        tracing::info!(sector_id = %id, attempts = item.attempt, "Sector completed");
        self.emit_event(Event::SectorCompleted {
            id,
            attempts: item.attempt,
        });
    }

    async fn run_step(&self, id: SectorId, step: Step) -> Result<()> {
        let layout = &self.layout;
        let collaborators = &self.collaborators;

        match step {
            Step::DownloadSealed => {
                let task = DownloadTask::whole(layout.sealed_url(id), layout.sealed_target(id));
                collaborators.fetcher.fetch(&task, &self.cancel).await?;
            }
            Step::DownloadCache => {
                let transfer = &self.config.transfer;
                let task = DownloadTask::ranged(
                    layout.cache_url(id),
                    layout.cache_archive(id),
                    transfer.part_size,
                    transfer.workers_per_download,
                )
                .unpack_into(layout.cache_root(), layout.cache_target(id));
                collaborators.fetcher.fetch(&task, &self.cancel).await?;
            }
            Step::Declare => {
                for kind in [SectorFileKind::Sealed, SectorFileKind::Cache] {
                    collaborators.declarer.declare(id, kind).await?;
                }
            }
            Step::Callback => {
                let report =
                    OutcomeReport::success(OutcomeAction::Download, id, layout.miner_id());
                collaborators.reporter.report(&report).await?;
            }
        }

        Ok(())
    }

    /// Terminal failure: report once, release the sector, remember nothing
    async fn abandon(&self, item: SectorWorkItem) {
        let id = item.id;
        tracing::error!(
            sector_id = %id,
            attempts = item.attempt,
            max_download_retry = self.config.transfer.max_download_retry,
            "Retry limit exceeded, abandoning sector"
        );

        let report = OutcomeReport::failure(
            OutcomeAction::Download,
            id,
            self.layout.miner_id(),
            RETRY_EXCEEDED_MESSAGE,
        );
        self.report_best_effort(&report).await;

        self.in_flight.remove(id);
        self.emit_event(Event::SectorAbandoned {
            id,
            attempts: item.attempt,
        });
    }

    async fn report_best_effort(&self, report: &OutcomeReport) {
        if let Err(e) = self.collaborators.reporter.report(report).await {
            tracing::error!(
                sector_id = %report.sector_id,
                action = ?report.action,
                error = %e,
                "Failed to deliver outcome report"
            );
        }
    }
}
