use crate::{identity::Identity, lane::MessageType, timestamp::Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Idempotency key for `CommandRequest`. A second request carrying the same
/// `requestId` yields the same ACK and appends no new row (§3, I5).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the submitting client was in LIVE or REPLAY mode at submission
/// time; REPLAY submissions are rejected at the Server edge (§4.1, §4.5).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimelineMode {
    Live,
    Replay,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub request_id: RequestId,
    pub identity: Identity,
    pub command_type: MessageType,
    pub payload: serde_json::Value,
    pub timeline_mode: TimelineMode,
    pub effective_time: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandProgress {
    pub request_id: RequestId,
    pub percent: Option<f32>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub request_id: RequestId,
    pub success: bool,
    pub message: Option<String>,
}
