//! The Core↔Server channel (§4.4): one request enum dispatched through a
//! clonable handle, the same shape as `swarm::event_store_ref::EventStoreRef`
//! — a request enum carried by an `Arc<dyn Fn>` sender, with streaming
//! replies handed back as channel receivers rather than single values.
//!
//! Both sides of this channel currently live in the same process (Core and
//! Server are library crates composed by `nova-node`, not separate OS
//! processes); the request-enum seam is kept regardless so the boundary in
//! §5's concurrency model is real in the code, not just in prose, and so a
//! future split to two processes only has to replace the dispatcher, not
//! every call site.

use crate::{
    drivers::DriverRegistry,
    ingest::IngestNormalizer,
    playback::{PlaybackEngine, StartStreamParams},
    truth_store::TruthStore,
};
use derive_more::{Display, Error};
use nova_types::{
    command::TimelineMode,
    error::NovaError,
    event::{total_order_cmp, EventId, IngestRequest},
    filters::EventFilters,
    identity::{Identity, ScopeId},
    ipc::{ClientConnId, CommandResponse, IngestAck, QueryResponse, StreamChunk},
    lane::{Lane, MessageType},
    playback::{Backpressure, PlaybackMode, PlaybackRequestId, Rate, Timebase},
    timestamp::Timestamp,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Display, Error)]
pub enum Error {
    #[display(fmt = "core was stopped while a request was queued or running")]
    Aborted,
    #[display(fmt = "core request queue is overloaded")]
    Overload,
    #[display(fmt = "{}", _0)]
    Core(NovaError),
}

impl From<NovaError> for Error {
    fn from(e: NovaError) -> Self {
        Error::Core(e)
    }
}

impl<T> From<mpsc::error::TrySendError<T>> for Error {
    fn from(e: mpsc::error::TrySendError<T>) -> Self {
        match e {
            mpsc::error::TrySendError::Full(_) => Error::Overload,
            mpsc::error::TrySendError::Closed(_) => Error::Aborted,
        }
    }
}

type OneShot<T> = oneshot::Sender<Result<T, Error>>;

pub enum CoreRequest {
    Query {
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        start_time: Timestamp,
        stop_time: Timestamp,
        timebase: Timebase,
        filters: EventFilters,
        reply: OneShot<QueryResponse>,
    },
    StartStream {
        client_conn_id: ClientConnId,
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        filters: EventFilters,
        mode: PlaybackMode,
        timebase: Timebase,
        start_time: Option<Timestamp>,
        stop_time: Option<Timestamp>,
        rate: Rate,
        backpressure: Backpressure,
        reply: OneShot<(PlaybackRequestId, mpsc::Receiver<StreamChunk>)>,
    },
    CancelStream {
        client_conn_id: ClientConnId,
    },
    SetPlaybackRate {
        client_conn_id: ClientConnId,
        rate: Rate,
    },
    SubmitCommand {
        request_id: String,
        scope_id: ScopeId,
        identity: Identity,
        command_type: MessageType,
        payload: serde_json::Value,
        timeline_mode: TimelineMode,
        reply: OneShot<CommandResponse>,
    },
    IngestMetadata {
        request: IngestRequest,
        reply: OneShot<IngestAck>,
    },
}

/// A clonable façade that looks synchronous to callers but dispatches onto
/// the single task that owns the Truth Store and Playback Engine.
#[derive(Clone)]
pub struct CoreHandle {
    tx: Arc<dyn Fn(CoreRequest) -> Result<(), Error> + Send + Sync + 'static>,
}

impl CoreHandle {
    pub fn new(f: impl Fn(CoreRequest) -> Result<(), Error> + Send + Sync + 'static) -> Self {
        Self { tx: Arc::new(f) }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        start_time: Timestamp,
        stop_time: Timestamp,
        timebase: Timebase,
        filters: EventFilters,
    ) -> Result<QueryResponse, Error> {
        let (reply, rx) = oneshot::channel();
        (self.tx)(CoreRequest::Query { scope_id, lanes, start_time, stop_time, timebase, filters, reply })?;
        rx.await.map_err(|_| Error::Aborted)?
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_stream(
        &self,
        client_conn_id: ClientConnId,
        scope_id: ScopeId,
        lanes: Vec<Lane>,
        filters: EventFilters,
        mode: PlaybackMode,
        timebase: Timebase,
        start_time: Option<Timestamp>,
        stop_time: Option<Timestamp>,
        rate: Rate,
        backpressure: Backpressure,
    ) -> Result<(PlaybackRequestId, mpsc::Receiver<StreamChunk>), Error> {
        let (reply, rx) = oneshot::channel();
        (self.tx)(CoreRequest::StartStream {
            client_conn_id,
            scope_id,
            lanes,
            filters,
            mode,
            timebase,
            start_time,
            stop_time,
            rate,
            backpressure,
            reply,
        })?;
        rx.await.map_err(|_| Error::Aborted)?
    }

    pub fn cancel_stream(&self, client_conn_id: ClientConnId) -> Result<(), Error> {
        (self.tx)(CoreRequest::CancelStream { client_conn_id })
    }

    pub fn set_playback_rate(&self, client_conn_id: ClientConnId, rate: Rate) -> Result<(), Error> {
        (self.tx)(CoreRequest::SetPlaybackRate { client_conn_id, rate })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn submit_command(
        &self,
        request_id: String,
        scope_id: ScopeId,
        identity: Identity,
        command_type: MessageType,
        payload: serde_json::Value,
        timeline_mode: TimelineMode,
    ) -> Result<CommandResponse, Error> {
        let (reply, rx) = oneshot::channel();
        (self.tx)(CoreRequest::SubmitCommand {
            request_id,
            scope_id,
            identity,
            command_type,
            payload,
            timeline_mode,
            reply,
        })?;
        rx.await.map_err(|_| Error::Aborted)?
    }

    pub async fn ingest_metadata(&self, request: IngestRequest) -> Result<IngestAck, Error> {
        let (reply, rx) = oneshot::channel();
        (self.tx)(CoreRequest::IngestMetadata { request, reply })?;
        rx.await.map_err(|_| Error::Aborted)?
    }
}

/// Owns the Truth Store and Playback Engine and drives `CoreRequest`s to
/// completion; one of these runs the dispatch loop started by `nova-node`.
pub struct CoreProcessor {
    store: TruthStore,
    normalizer: IngestNormalizer,
    playback: PlaybackEngine,
    /// Routes every freshly-appended event through the same driver
    /// instances and code path the Export Pipeline uses (§4.7), writing
    /// real-time output as events are ingested rather than only on export.
    live_drivers: DriverRegistry,
}

impl CoreProcessor {
    pub fn new(store: TruthStore, output_root: std::path::PathBuf) -> Self {
        Self {
            normalizer: IngestNormalizer::new(store.clone()),
            playback: PlaybackEngine::new(store.clone()),
            live_drivers: DriverRegistry::with_builtins(output_root),
            store,
        }
    }

    pub fn playback_engine(&self) -> PlaybackEngine {
        self.playback.clone()
    }

    pub fn truth_store(&self) -> TruthStore {
        self.store.clone()
    }

    /// Runs until `rx` closes; call this as the body of the task that owns
    /// the Core side of the channel.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CoreRequest>) {
        while let Some(request) = rx.recv().await {
            self.handle(request);
        }
    }

    fn handle(&mut self, request: CoreRequest) {
        match request {
            CoreRequest::Query { scope_id, lanes, start_time, stop_time, timebase, filters, reply } => {
                let result = self
                    .store
                    .range_by(&scope_id, &lanes, start_time, stop_time, timebase, &filters)
                    .map(|mut events| {
                        events.sort_by(total_order_cmp);
                        QueryResponse { events }
                    })
                    .map_err(Error::from);
                let _ = reply.send(result);
            }
            CoreRequest::StartStream {
                client_conn_id,
                scope_id,
                lanes,
                filters,
                mode,
                timebase,
                start_time,
                stop_time,
                rate,
                backpressure,
                reply,
            } => {
                let result = self
                    .playback
                    .start_stream(
                        client_conn_id,
                        StartStreamParams {
                            scope_id,
                            lanes,
                            filters,
                            mode,
                            timebase,
                            start_time,
                            stop_time,
                            start_cursor: None,
                            rate,
                            backpressure,
                        },
                    )
                    .map_err(Error::from);
                let _ = reply.send(result);
            }
            CoreRequest::CancelStream { client_conn_id } => {
                self.playback.cancel_stream(&client_conn_id);
            }
            CoreRequest::SetPlaybackRate { client_conn_id, rate } => {
                self.playback.set_rate(&client_conn_id, rate);
            }
            CoreRequest::SubmitCommand {
                request_id,
                scope_id,
                identity,
                command_type,
                payload,
                timeline_mode,
                reply,
            } => {
                let result = self.submit_command(request_id, scope_id, identity, command_type, payload, timeline_mode);
                let _ = reply.send(result);
            }
            CoreRequest::IngestMetadata { request, reply } => {
                let result = self
                    .normalizer
                    .insert(request)
                    .map(|ack| {
                        self.route_to_live_drivers(&ack);
                        IngestAck {
                            event_id: ack.event_id,
                            canonical_truth_time: ack.canonical_truth_time,
                            duplicate: ack.duplicate,
                        }
                    })
                    .map_err(Error::from);
                let _ = reply.send(result);
            }
        }
    }

    /// Writes a freshly-inserted event through the live Driver Registry, the
    /// same instances and code path `ExportPipeline` uses (§4.7). Duplicate
    /// inserts carry no `event` and write nothing. A write failure is a
    /// transient I/O condition (§7) and is logged, not propagated: it must
    /// never fail the ingest ACK the producer is waiting on.
    fn route_to_live_drivers(&mut self, ack: &crate::ingest::InsertAck) {
        if let Some(event) = &ack.event {
            if let Err(err) = self.live_drivers.write(event, ack.canonical_truth_time) {
                tracing::warn!(event_id = %event.event_id, error = %err, "live driver write failed");
            }
        }
    }

    /// `command` events are recorded before dispatch and keyed by
    /// `requestId` for idempotency (§3, §4.1): a resubmission with the same
    /// `requestId` returns the same ACK without adding a row.
    fn submit_command(
        &mut self,
        request_id: String,
        scope_id: ScopeId,
        identity: Identity,
        command_type: MessageType,
        payload: serde_json::Value,
        _timeline_mode: TimelineMode,
    ) -> Result<CommandResponse, Error> {
        if self.store.find_command_by_request_id(&scope_id, &request_id)?.is_some() {
            return Ok(CommandResponse { request_id, idempotent: true });
        }

        let mut body = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };
        body.insert("requestId".to_owned(), serde_json::Value::String(request_id.clone()));

        let ack = self.normalizer.insert(IngestRequest {
            event_id: Some(EventId::mint()),
            scope_id,
            lane: Lane::Command,
            identity,
            message_type: Some(command_type),
            source_truth_time: None,
            effective_time: None,
            payload: nova_types::event::Payload::Json(serde_json::Value::Object(body)),
            manifest: None,
        })?;
        self.route_to_live_drivers(&ack);

        Ok(CommandResponse { request_id, idempotent: false })
    }
}
