use super::test_helpers::*;
use super::*;
use crate::clients::{OutcomeAction, OutcomeStatus};
use crate::types::{Event, SectorFileKind, SectorId, SectorWorkItem, SkipReason, Step};
use std::time::Duration;
