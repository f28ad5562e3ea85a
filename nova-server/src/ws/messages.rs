//! The WebSocket wire vocabulary (§4.4, §6): one JSON object per frame,
//! tagged by `type`, dispatched manually rather than through a per-method
//! RPC registry — NOVA's message set is small and fixed, unlike the
//! teacher's `wsrpc`-routed event service.

use nova_types::{
    command::TimelineMode,
    event::Event,
    filters::EventFilters,
    identity::{Identity, ScopeId},
    ipc::ClientConnId,
    lane::{Lane, MessageType},
    playback::{Backpressure, PlaybackMode, PlaybackRequestId, Rate, Timebase},
    presentation::PresentationOverride,
    timestamp::Timestamp,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Query {
        request_id: String,
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        start_time: Timestamp,
        stop_time: Timestamp,
        #[serde(default = "default_timebase")]
        timebase: Timebase,
        #[serde(default)]
        filters: EventFilters,
    },
    StartStream {
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        #[serde(default)]
        filters: EventFilters,
        mode: PlaybackMode,
        #[serde(default = "default_timebase")]
        timebase: Timebase,
        start_time: Option<Timestamp>,
        stop_time: Option<Timestamp>,
        #[serde(default = "Rate::unpaced")]
        rate: Rate,
        #[serde(default)]
        backpressure: Backpressure,
    },
    CancelStream,
    SetRate {
        rate: Rate,
    },
    Command {
        request_id: String,
        scope_id: ScopeId,
        identity: Identity,
        command_type: MessageType,
        payload: serde_json::Value,
        timeline_mode: TimelineMode,
    },
    Chat {
        scope_id: ScopeId,
        text: String,
    },
    Export {
        scope_id: ScopeId,
        start_time: Timestamp,
        stop_time: Timestamp,
        #[serde(default = "default_timebase")]
        timebase: Timebase,
        #[serde(default)]
        filters: EventFilters,
    },
    ListExports,
}

fn default_timebase() -> Timebase {
    Timebase::Canonical
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    AuthResponse {
        username: String,
    },
    QueryResponse {
        request_id: String,
        events: Vec<Event>,
    },
    StreamStarted {
        playback_request_id: PlaybackRequestId,
    },
    StreamChunk {
        playback_request_id: PlaybackRequestId,
        events: Vec<Event>,
        terminal: bool,
    },
    StreamCanceled,
    StreamComplete {
        playback_request_id: PlaybackRequestId,
    },
    CommandResponse {
        request_id: String,
        idempotent: bool,
    },
    ExportResponse {
        export_id: String,
        download_url: String,
    },
    ExportsListResponse {
        exports: Vec<ExportListing>,
    },
    Chat {
        username: String,
        text: String,
    },
    PresentationUpdate {
        unique_id: String,
        #[serde(rename = "override")]
        override_: PresentationOverride,
    },
    Error {
        code: String,
        message: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportListing {
    pub export_id: String,
    pub download_url: String,
}

/// A server-minted id for a single WebSocket upgrade, distinct from
/// `ClientConnId` so the latter stays an IPC-layer concept while this one
/// is purely for edge-local logging.
pub fn mint_conn_id() -> ClientConnId {
    ClientConnId::mint()
}
