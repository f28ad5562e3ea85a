use serde::{Deserialize, Serialize};
use std::fmt;

/// `source` or `canonical` — which time axis a range/replay request is
/// expressed in (§3, Run).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Timebase {
    Source,
    Canonical,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMode {
    Live,
    Replay,
}

/// REPLAY rate multiplier. `0` means "as fast as possible" (unpaced); any
/// other finite positive value paces wall-clock delivery (§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rate(f64);

impl Rate {
    pub fn new(r: f64) -> Result<Self, crate::error::NovaError> {
        if r.is_sign_negative() || r.is_nan() {
            return Err(crate::error::NovaError::SchemaError {
                message: format!("rate must be >= 0, got {r}"),
            });
        }
        Ok(Self(r))
    }

    pub fn unpaced() -> Self {
        Self(0.0)
    }

    pub fn is_unpaced(self) -> bool {
        self.0 == 0.0
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Overflow policy for a client whose consumption lags the producer queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backpressure {
    CatchUp,
    Disconnect,
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::CatchUp
    }
}

/// A server-minted identifier for one playback session. Chunks are tagged
/// with this id so the Server edge can fence stale deliveries after
/// `cancelStream` or a new `startStream` supersedes the old session (§4.3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackRequestId(String);

impl PlaybackRequestId {
    pub fn mint() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaybackRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
