//! Duplicate-work suppression for the sector pipeline
//!
//! - [`in_flight`] - sectors currently being processed (one attempt per sector)
//! - [`recent`] - sectors completed within the dedup window

mod in_flight;
mod recent;

pub use in_flight::InFlightSet;
pub use recent::RecentWorkCache;
