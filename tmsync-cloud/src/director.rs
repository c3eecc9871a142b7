//! Sync direction resolution.
//!
//! Not a merge: whichever side wins overwrites the other whole. The order
//! over (timestamp, record count) keeps a device that was offline, and so
//! holds an old timestamp but more records, from being silently wiped.
//!
//! Known limitation: equal timestamps and equal non-zero counts resolve to
//! `Push` even if the contents differ.

use crate::types::{CloudMetadata, LocalMetadata};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
    Noop,
}

/// The inputs the decision depends on. Nothing else is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideState {
    pub timestamp: i64,
    pub record_count: usize,
}

impl From<&LocalMetadata> for SideState {
    fn from(meta: &LocalMetadata) -> Self {
        Self {
            timestamp: meta.timestamp,
            record_count: meta.record_count,
        }
    }
}

impl From<&CloudMetadata> for SideState {
    fn from(meta: &CloudMetadata) -> Self {
        Self {
            timestamp: meta.timestamp,
            record_count: meta.record_count,
        }
    }
}

/// Decides which way data should flow.
pub fn decide(local: SideState, cloud: Option<SideState>) -> Direction {
    let Some(cloud) = cloud else {
        return Direction::Push;
    };

    if cloud.timestamp > local.timestamp && cloud.record_count > 0 {
        return Direction::Pull;
    }
    if local.timestamp > cloud.timestamp && local.record_count > 0 {
        return Direction::Push;
    }

    if cloud.record_count > local.record_count {
        Direction::Pull
    } else if local.record_count == 0 && cloud.record_count == 0 {
        Direction::Noop
    } else {
        Direction::Push
    }
}

/// Convenience over the metadata types.
pub fn decide_metadata(local: &LocalMetadata, cloud: Option<&CloudMetadata>) -> Direction {
    decide(local.into(), cloud.map(SideState::from))
}
