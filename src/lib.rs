//! # sector-sync
//!
//! Storage-miner agent library that pulls sealed sectors and their cache trees
//! from a platform and registers them with the local storage service.
//!
//! ## How a sector moves through the agent
//!
//! - A [`SectorPoller`] asks the platform which sectors are pending and offers
//!   each one to the [`SectorPipeline`].
//! - Intake drops sectors that are already in flight or were completed within
//!   the dedup window, and queues the rest (the queue is bounded, so a busy
//!   pipeline slows discovery down).
//! - Each sector runs four resumable steps: download the sealed file, download
//!   and unpack the cache archive, declare both files, report the outcome. A
//!   failure requeues the sector from the failing step onward until the retry
//!   ceiling is hit.
//!
//! Large files are fetched by the [`transfer::ChunkFetcher`] as concurrent
//! byte-range parts written straight to their offsets in a pre-sized file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sector_sync::{Config, PlatformClient, SectorPipeline, SectorPoller, run_with_shutdown};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::from_json_file(Path::new("sector-sync.json"))?;
//!     config.apply_env_fallbacks();
//!
//!     let pipeline = SectorPipeline::new(config.clone())?;
//!     pipeline.start()?;
//!
//!     let poller = SectorPoller::new(pipeline.clone(), Arc::new(PlatformClient::new(&config)?));
//!     poller.spawn();
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(pipeline).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Storage-service and platform clients
pub mod clients;
/// Configuration types
pub mod config;
/// In-flight and recently-completed sector tracking
pub mod dedup;
/// Error types
pub mod error;
/// Cache archive unpacking
pub mod extraction;
/// Sector file names, paths and URLs
pub mod layout;
/// Intake queue and per-sector state machine
pub mod pipeline;
/// Periodic discovery and heartbeat
pub mod poller;
/// Retry logic with exponential backoff
pub mod retry;
/// Ranged and whole-file HTTP transfers
pub mod transfer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use clients::{
    OutcomeAction, OutcomeReport, OutcomeReporter, OutcomeStatus, PlatformClient, SectorDeclarer,
    StorageRpcClient, WorkSource,
};
pub use config::{Config, DedupConfig, MinerConfig, PlatformConfig, RetryConfig, TransferConfig};
pub use error::{Error, Result, TransferError};
pub use layout::SectorLayout;
pub use pipeline::{Admission, SectorPipeline};
pub use poller::{PollSummary, SectorPoller};
pub use transfer::{ChunkFetcher, DownloadTask, FetchMode};
pub use types::{Event, RequiredSteps, SectorFileKind, SectorId, SectorWorkItem, SkipReason, Step};

/// Helper function to run the pipeline with graceful signal handling.
///
/// Waits for a termination signal and then calls the pipeline's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(pipeline: SectorPipeline) -> Result<()> {
    wait_for_signal().await;
    pipeline.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
