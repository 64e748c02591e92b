//! Core types for sector-sync

use serde::{Deserialize, Serialize};

/// Sector number, unique per miner within this agent's scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorId(pub u64);

impl SectorId {
    /// Get the inner sector number
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SectorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SectorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// One action of the per-sector pipeline, in execution order
///
/// The discriminant is the step's bit in the [`RequiredSteps`] wire mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Fetch the sealed sector file
    DownloadSealed = 1,
    /// Fetch and unpack the cache archive
    DownloadCache = 2,
    /// Register both files with the storage-management service
    Declare = 4,
    /// Report the outcome to the platform
    Callback = 8,
}

impl Step {
    /// All steps in pipeline order
    pub const ALL: [Step; 4] = [
        Step::DownloadSealed,
        Step::DownloadCache,
        Step::Declare,
        Step::Callback,
    ];

    /// Bit of this step in the wire mask
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// Stable lowercase name for logs
    pub fn as_str(self) -> &'static str {
        match self {
            Step::DownloadSealed => "download_sealed",
            Step::DownloadCache => "download_cache",
            Step::Declare => "declare",
            Step::Callback => "callback",
        }
    }

    fn index(self) -> usize {
        match self {
            Step::DownloadSealed => 0,
            Step::DownloadCache => 1,
            Step::Declare => 2,
            Step::Callback => 3,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of steps a work item still has to run
///
/// Steps are only ever cleared front-to-back, so every legal set is a suffix of
/// [`Step::ALL`]: the set is represented by the first pending step and masks
/// such as "callback pending while sealed download also pending, declare done"
/// cannot be built. On the wire and in logs it is still the familiar bitmask
/// (`15`, `14`, `12`, `8`, `0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequiredSteps {
    first: Option<Step>,
}

impl RequiredSteps {
    /// Every step pending (mask `15`), the state of a fresh discovery
    pub const fn all() -> Self {
        Self {
            first: Some(Step::DownloadSealed),
        }
    }

    /// Nothing pending (mask `0`)
    pub const fn none() -> Self {
        Self { first: None }
    }

    /// `step` and every step after it pending
    pub const fn from_step(step: Step) -> Self {
        Self { first: Some(step) }
    }

    /// Decode a wire mask
    ///
    /// Returns `None` for masks that are not a pipeline suffix.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits == 0 {
            return Some(Self::none());
        }
        Step::ALL
            .iter()
            .map(|&step| Self::from_step(step))
            .find(|candidate| candidate.bits() == bits)
    }

    /// Encode as the wire mask
    pub fn bits(&self) -> u8 {
        self.iter().fold(0, |acc, step| acc | step.bit())
    }

    /// Whether `step` still has to run
    pub fn contains(&self, step: Step) -> bool {
        self.first.is_some_and(|first| step >= first)
    }

    /// First pending step, if any
    pub fn first(&self) -> Option<Step> {
        self.first
    }

    /// True when every step has completed
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Pending steps in pipeline order
    pub fn iter(&self) -> impl Iterator<Item = Step> + '_ {
        let start = self.first.map_or(Step::ALL.len(), Step::index);
        Step::ALL[start..].iter().copied()
    }

    /// Narrow the set so that it resumes at `step`
    ///
    /// A step that was already cleared is never set again: asking to resume
    /// at an earlier step than the current first pending step keeps the
    /// current set.
    pub fn resume_at(self, step: Step) -> Self {
        match self.first {
            None => self,
            Some(first) if step < first => self,
            Some(_) => Self::from_step(step),
        }
    }
}

impl Default for RequiredSteps {
    fn default() -> Self {
        Self::all()
    }
}

impl std::fmt::Display for RequiredSteps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04b}", self.bits())
    }
}

/// A unit of sector work flowing through the intake queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorWorkItem {
    /// Sector to process
    pub id: SectorId,
    /// Processing attempts started so far
    pub attempt: u32,
    /// Steps still to run
    pub required: RequiredSteps,
}

impl SectorWorkItem {
    /// A freshly discovered sector: no attempts yet, every step required
    pub fn fresh(id: SectorId) -> Self {
        Self {
            id,
            attempt: 0,
            required: RequiredSteps::all(),
        }
    }

    /// The same item narrowed to resume at `failed`
    pub fn retry_from(self, failed: Step) -> Self {
        Self {
            required: self.required.resume_at(failed),
            ..self
        }
    }
}

/// File types known to the storage-management service
///
/// The codes are the service's own file-type bit values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectorFileKind {
    /// Unsealed sector data
    Unsealed = 1,
    /// Sealed sector file
    Sealed = 2,
    /// Sector cache tree
    Cache = 4,
    /// Snap-deal update file
    Update = 8,
    /// Snap-deal update cache
    UpdateCache = 16,
}

impl SectorFileKind {
    /// Numeric file-type code sent to the storage service
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for SectorFileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SectorFileKind::Unsealed => "unsealed",
            SectorFileKind::Sealed => "sealed",
            SectorFileKind::Cache => "cache",
            SectorFileKind::Update => "update",
            SectorFileKind::UpdateCache => "update-cache",
        })
    }
}

/// Why intake dropped a discovered sector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another attempt for this sector is active
    InFlight,
    /// The sector completed within the dedup window
    RecentlyCompleted,
}

/// Event emitted during the sector lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Intake accepted a sector and queued it
    SectorAccepted {
        /// Sector ID
        id: SectorId,
    },

    /// Intake dropped a sector without queueing it
    SectorSkipped {
        /// Sector ID
        id: SectorId,
        /// Why the sector was dropped
        reason: SkipReason,
    },

    /// A step started
    StepStarted {
        /// Sector ID
        id: SectorId,
        /// The step
        step: Step,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// A step failed; the sector will be requeued
    StepFailed {
        /// Sector ID
        id: SectorId,
        /// The failed step
        step: Step,
        /// Attempt number (1-based)
        attempt: u32,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// A sector was put back on the work queue
    SectorRequeued {
        /// Sector ID
        id: SectorId,
        /// Attempts made so far
        attempt: u32,
        /// Remaining steps as the wire mask
        required: u8,
    },

    /// Every step completed
    SectorCompleted {
        /// Sector ID
        id: SectorId,
        /// Attempts it took
        attempts: u32,
    },

    /// The retry ceiling was exceeded; the sector was dropped
    SectorAbandoned {
        /// Sector ID
        id: SectorId,
        /// Attempts made, including the one that hit the ceiling
        attempts: u32,
    },

    /// Pipeline shutting down
    Shutdown,
}
