//! Waiting on pipeline events in end-to-end tests

use sector_sync::{Event, SectorId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// How a sector ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Completed after this many attempts
    Completed(u32),
    /// Abandoned after this many attempts
    Abandoned(u32),
}

/// Wait until every sector in `ids` reached a terminal event
///
/// Panics when `timeout` elapses first.
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    ids: &[SectorId],
    timeout: Duration,
) -> HashMap<SectorId, Terminal> {
    let mut outcomes = HashMap::new();
    tokio::time::timeout(timeout, async {
        while outcomes.len() < ids.len() {
            match events.recv().await {
                Ok(Event::SectorCompleted { id, attempts }) if ids.contains(&id) => {
                    outcomes.insert(id, Terminal::Completed(attempts));
                }
                Ok(Event::SectorAbandoned { id, attempts }) if ids.contains(&id) => {
                    outcomes.insert(id, Terminal::Abandoned(attempts));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out; terminal so far: {:?}", outcomes));
    outcomes
}
