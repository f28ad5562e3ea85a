use crate::{event::EventId, timestamp::Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque but comparable position in the total order of a scope's log.
///
/// Encodes `(canonicalTruthTime, eventId)` per §4.2. Cursors are values, not
/// held references: the playback engine and output-stream binding pass them
/// across tasks instead of sharing a live iterator, so restart-from-cursor
/// is just "start a fresh range/tail at this value" (§9).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    canonical_truth_time: Timestamp,
    event_id: EventId,
}

impl Cursor {
    pub fn new(canonical_truth_time: Timestamp, event_id: EventId) -> Self {
        Self {
            canonical_truth_time,
            event_id,
        }
    }

    /// A cursor that sorts before every real event; the default LIVE start
    /// when no explicit cursor is given and the scope has no head yet.
    pub fn min() -> Self {
        Self {
            canonical_truth_time: Timestamp::new(0),
            event_id: EventId::new(""),
        }
    }

    pub fn canonical_truth_time(&self) -> Timestamp {
        self.canonical_truth_time
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.canonical_truth_time, self.event_id)
    }
}
