//! The wire vocabulary of the Core↔Server channel (§4.4). These are the
//! logical request/response shapes; `nova-core::ipc` carries them over a
//! pair of in-process queues the way `swarm::event_store_ref` carries its
//! own request enum over `tokio::sync::{oneshot,mpsc}` channels.

use crate::{
    command::{RequestId, TimelineMode},
    cursor::Cursor,
    event::{Event, EventId, IngestRequest},
    filters::EventFilters,
    identity::{Identity, ScopeId},
    lane::{Lane, MessageType},
    playback::{Backpressure, PlaybackRequestId, Rate},
    timestamp::Timestamp,
};
use serde::{Deserialize, Serialize};

/// Per-WebSocket-connection identifier, minted by the Server edge and
/// carried on every streaming IPC call so responses route back correctly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientConnId(String);

impl ClientConnId {
    pub fn mint() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub scope_id: ScopeId,
    pub lanes: Vec<Lane>,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub filters: EventFilters,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartStreamRequest {
    pub client_conn_id: ClientConnId,
    pub scope_id: ScopeId,
    pub lanes: Vec<Lane>,
    pub filters: EventFilters,
    pub mode: crate::playback::PlaybackMode,
    pub timebase: crate::playback::Timebase,
    pub start_time: Option<Timestamp>,
    pub stop_time: Option<Timestamp>,
    pub start_cursor: Option<Cursor>,
    pub rate: Rate,
    pub backpressure: Backpressure,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamStarted {
    pub playback_request_id: PlaybackRequestId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChunk {
    pub playback_request_id: PlaybackRequestId,
    pub events: Vec<Event>,
    pub terminal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitCommandRequest {
    pub request_id: RequestId,
    pub identity: Identity,
    pub command_type: MessageType,
    pub payload: serde_json::Value,
    pub timeline_mode: TimelineMode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request_id: RequestId,
    pub idempotent: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestMetadataRequest {
    pub event: IngestRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestAck {
    pub event_id: EventId,
    pub canonical_truth_time: Timestamp,
    pub duplicate: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportRequest {
    pub scope_id: ScopeId,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub filters: EventFilters,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    pub export_id: String,
    pub download_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamRawRequest {
    pub client_conn_id: ClientConnId,
    pub scope_id: ScopeId,
    pub lane: Lane,
    pub filters: EventFilters,
    /// When set, the feed follows that UI instance's cursor instead of
    /// free-running LIVE (§4.6 timeline binding).
    pub bound_instance_id: Option<ClientConnId>,
}
