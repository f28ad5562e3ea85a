//! The Playback Engine (§4.3): one interface serving LIVE tails and REPLAY
//! ranges, chunked and rate-paced, with per-connection cancellation.
//!
//! Sessions are actor-style tasks reached only through `PlaybackEngine`'s
//! methods, the same shape as `swarm::event_store_ref::EventStoreHandler`:
//! a small `State` registry of running tasks guarded by a mutex, each task
//! owning its own stream and torn down by dropping its sender.

use crate::truth_store::TruthStore;
use nova_types::{
    cursor::Cursor,
    error::{NovaError, NovaResult},
    event::Event,
    filters::EventFilters,
    ipc::{ClientConnId, StreamChunk},
    lane::Lane,
    playback::{Backpressure, PlaybackMode, PlaybackRequestId, Rate, Timebase},
    timestamp::Timestamp,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

/// At most this many events per chunk...
const MAX_CHUNK_EVENTS: usize = 256;
/// ...or this much wall-clock time has elapsed, whichever comes first (§4.3).
const CHUNK_DEADLINE: Duration = Duration::from_millis(10);
/// Bound on the per-client delivery queue before the backpressure policy kicks in.
const QUEUE_BOUND: usize = 1024;

/// Delivers `StreamChunk`s per the session's configured overflow policy
/// (§4.3, §5's backpressure pair). `Disconnect` ends the session the
/// instant its queue is full. `CatchUp` keeps the session alive by
/// coalescing the latest unsent chunk over whatever was still queued,
/// the way `util::sampled_broadcast` retains only the latest published
/// value rather than piling up a backlog.
enum ChunkSink {
    Disconnect(mpsc::Sender<StreamChunk>),
    CatchUp {
        tx: mpsc::Sender<StreamChunk>,
        pending: std::sync::Mutex<Option<StreamChunk>>,
    },
}

impl ChunkSink {
    fn new(tx: mpsc::Sender<StreamChunk>, backpressure: Backpressure) -> Self {
        match backpressure {
            Backpressure::Disconnect => ChunkSink::Disconnect(tx),
            Backpressure::CatchUp => ChunkSink::CatchUp { tx, pending: std::sync::Mutex::new(None) },
        }
    }

    /// Sends a non-terminal chunk. Returns `false` when the session must
    /// stop: the receiver is gone, or, under `Disconnect`, the queue was full.
    async fn send(&self, chunk: StreamChunk) -> bool {
        match self {
            ChunkSink::Disconnect(tx) => match tx.try_send(chunk) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => false,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            ChunkSink::CatchUp { tx, pending } => {
                if let Some(stale) = pending.lock().unwrap().take() {
                    let _ = tx.try_send(stale);
                }
                match tx.try_send(chunk) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                    Err(mpsc::error::TrySendError::Full(chunk)) => {
                        *pending.lock().unwrap() = Some(chunk);
                        true
                    }
                }
            }
        }
    }

    /// The terminal chunk marks REPLAY completion and is never coalesced
    /// away: it always blocks until delivered or the receiver is gone.
    async fn send_terminal(&self, chunk: StreamChunk) {
        let tx = match self {
            ChunkSink::Disconnect(tx) => tx,
            ChunkSink::CatchUp { tx, .. } => tx,
        };
        let _ = tx.send(chunk).await;
    }
}

pub struct StartStreamParams {
    pub scope_id: nova_types::identity::ScopeId,
    pub lanes: Vec<Lane>,
    pub filters: EventFilters,
    pub mode: PlaybackMode,
    pub timebase: Timebase,
    pub start_time: Option<Timestamp>,
    pub stop_time: Option<Timestamp>,
    pub start_cursor: Option<Cursor>,
    pub rate: Rate,
    pub backpressure: Backpressure,
}

struct Session {
    handle: JoinHandle<()>,
    canceled: Arc<AtomicBool>,
    rate: Arc<AtomicU64>, // rate * 1000, fixed-point, so it's Send+Sync without a mutex
    playback_request_id: PlaybackRequestId,
}

#[derive(Clone)]
pub struct PlaybackEngine {
    store: TruthStore,
    sessions: Arc<parking_lot::Mutex<HashMap<ClientConnId, Session>>>,
}

impl PlaybackEngine {
    pub fn new(store: TruthStore) -> Self {
        Self {
            store,
            sessions: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// `startStream` — supersedes any prior session for this connection;
    /// the old session's chunks become "stale" the instant the new
    /// `playbackRequestId` is minted (fencing happens at the Server edge).
    pub fn start_stream(
        &self,
        client_conn_id: ClientConnId,
        params: StartStreamParams,
    ) -> NovaResult<(PlaybackRequestId, mpsc::Receiver<StreamChunk>)> {
        if let Some(stop) = params.stop_time {
            if let Some(start) = params.start_time {
                if stop < start {
                    return Err(NovaError::schema("stopTime must be >= startTime"));
                }
            }
        }

        self.cancel_stream(&client_conn_id);

        let playback_request_id = PlaybackRequestId::mint();
        let (tx, rx) = mpsc::channel(QUEUE_BOUND);
        let canceled = Arc::new(AtomicBool::new(false));
        let rate_fp = Arc::new(AtomicU64::new((params.rate.value() * 1000.0) as u64));

        let store = self.store.clone();
        let task_canceled = canceled.clone();
        let task_rate = rate_fp.clone();
        let task_playback_id = playback_request_id.clone();
        let sink = ChunkSink::new(tx, params.backpressure);

        let handle = match params.mode {
            PlaybackMode::Live => tokio::spawn(run_live(
                store,
                params.scope_id,
                params.lanes,
                params.filters,
                params.start_cursor,
                task_playback_id,
                sink,
                task_canceled,
            )),
            PlaybackMode::Replay => tokio::spawn(run_replay(
                store,
                params.scope_id,
                params.lanes,
                params.filters,
                params.timebase,
                params.start_time.unwrap_or(Timestamp::new(0)),
                params.stop_time.unwrap_or(Timestamp::new(u64::MAX)),
                task_playback_id,
                sink,
                task_canceled,
                task_rate,
            )),
        };

        self.sessions.lock().insert(
            client_conn_id,
            Session {
                handle,
                canceled,
                rate: rate_fp,
                playback_request_id: playback_request_id.clone(),
            },
        );

        Ok((playback_request_id, rx))
    }

    /// `cancelStream` — fire-and-forget; the task observes `canceled` and
    /// stops within a bounded delay (I4).
    pub fn cancel_stream(&self, client_conn_id: &ClientConnId) {
        if let Some(session) = self.sessions.lock().remove(client_conn_id) {
            session.canceled.store(true, Ordering::SeqCst);
            session.handle.abort();
            debug!(conn = %client_conn_id, playback = %session.playback_request_id, "stream canceled");
        }
    }

    /// `setRate` — only meaningful for an active REPLAY session; a no-op
    /// otherwise since LIVE has no pacing to adjust.
    pub fn set_rate(&self, client_conn_id: &ClientConnId, rate: Rate) {
        if let Some(session) = self.sessions.lock().get(client_conn_id) {
            session.rate.store((rate.value() * 1000.0) as u64, Ordering::SeqCst);
        }
    }

    pub fn active_playback_id(&self, client_conn_id: &ClientConnId) -> Option<PlaybackRequestId> {
        self.sessions.lock().get(client_conn_id).map(|s| s.playback_request_id.clone())
    }
}

async fn run_live(
    store: TruthStore,
    scope_id: nova_types::identity::ScopeId,
    lanes: Vec<Lane>,
    filters: EventFilters,
    start_cursor: Option<Cursor>,
    playback_request_id: PlaybackRequestId,
    sink: ChunkSink,
    canceled: Arc<AtomicBool>,
) {
    let mut changes = store.subscribe_changes();
    let from = start_cursor.unwrap_or_else(|| store.cursor_head(&scope_id).unwrap_or_else(|_| Cursor::min()));

    // Backlog catch-up: anything appended between "head at subscribe time"
    // and "broadcast subscription actually live" is covered because we
    // subscribed to the broadcast channel before reading the backlog.
    if let Ok(backlog) = store.after_cursor(&scope_id, &lanes, &from, &filters) {
        if !send_in_chunks(&sink, &playback_request_id, backlog, &canceled).await {
            return;
        }
    }

    let mut pending = Vec::new();
    let mut deadline = tokio::time::sleep(CHUNK_DEADLINE);
    tokio::pin!(deadline);

    loop {
        if canceled.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            event = changes.recv() => {
                match event {
                    Ok(event) if event.scope_id == scope_id && lanes.contains(&event.lane) => {
                        if filters.matches(&event.identity, event.message_type.as_ref()) {
                            pending.push(event);
                            if pending.len() >= MAX_CHUNK_EVENTS {
                                if !flush(&sink, &playback_request_id, &mut pending, false).await {
                                    return;
                                }
                                deadline.as_mut().reset(tokio::time::Instant::now() + CHUNK_DEADLINE);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        trace!(skipped = n, "live tail lagged, catching up via cursor");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut deadline, if !pending.is_empty() => {
                if !flush(&sink, &playback_request_id, &mut pending, false).await {
                    return;
                }
                deadline.as_mut().reset(tokio::time::Instant::now() + CHUNK_DEADLINE);
            }
        }
    }
    if !pending.is_empty() {
        let _ = flush(&sink, &playback_request_id, &mut pending, false).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_replay(
    store: TruthStore,
    scope_id: nova_types::identity::ScopeId,
    lanes: Vec<Lane>,
    filters: EventFilters,
    timebase: Timebase,
    start_time: Timestamp,
    stop_time: Timestamp,
    playback_request_id: PlaybackRequestId,
    sink: ChunkSink,
    canceled: Arc<AtomicBool>,
    rate_fp: Arc<AtomicU64>,
) {
    let events = match store.range_by(&scope_id, &lanes, start_time, stop_time, timebase, &filters) {
        Ok(events) => events,
        Err(e) => {
            tracing::error!("replay range failed: {}", e);
            sink.send_terminal(StreamChunk {
                playback_request_id,
                events: Vec::new(),
                terminal: true,
            })
            .await;
            return;
        }
    };

    if events.is_empty() {
        sink.send_terminal(StreamChunk {
            playback_request_id,
            events: Vec::new(),
            terminal: true,
        })
        .await;
        return;
    }

    let wall_start = tokio::time::Instant::now();
    let truth_start = events[0].canonical_truth_time;

    let mut pending: Vec<Event> = Vec::new();
    let mut chunk_deadline = tokio::time::Instant::now() + CHUNK_DEADLINE;

    for event in events {
        if canceled.load(Ordering::SeqCst) {
            return;
        }
        let rate = rate_fp.load(Ordering::SeqCst) as f64 / 1000.0;
        if rate > 0.0 {
            let delta_truth_us = event.canonical_truth_time.as_micros().saturating_sub(truth_start.as_micros());
            let target_wall = wall_start + Duration::from_micros((delta_truth_us as f64 / rate) as u64);
            let now = tokio::time::Instant::now();
            if target_wall > now {
                tokio::select! {
                    _ = tokio::time::sleep_until(target_wall) => {}
                    _ = wait_for_cancel(&canceled) => return,
                }
            }
        }
        pending.push(event);
        if pending.len() >= MAX_CHUNK_EVENTS || tokio::time::Instant::now() >= chunk_deadline {
            if !flush(&sink, &playback_request_id, &mut pending, false).await {
                return;
            }
            chunk_deadline = tokio::time::Instant::now() + CHUNK_DEADLINE;
        }
    }
    if !pending.is_empty() {
        if !flush(&sink, &playback_request_id, &mut pending, false).await {
            return;
        }
    }
    sink.send_terminal(StreamChunk {
        playback_request_id,
        events: Vec::new(),
        terminal: true,
    })
    .await;
}

async fn wait_for_cancel(canceled: &AtomicBool) {
    loop {
        if canceled.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn send_in_chunks(
    sink: &ChunkSink,
    playback_request_id: &PlaybackRequestId,
    events: Vec<Event>,
    canceled: &AtomicBool,
) -> bool {
    for chunk in events.chunks(MAX_CHUNK_EVENTS) {
        if canceled.load(Ordering::SeqCst) {
            return false;
        }
        if !sink
            .send(StreamChunk {
                playback_request_id: playback_request_id.clone(),
                events: chunk.to_vec(),
                terminal: false,
            })
            .await
        {
            return false;
        }
    }
    true
}

async fn flush(
    sink: &ChunkSink,
    playback_request_id: &PlaybackRequestId,
    pending: &mut Vec<Event>,
    terminal: bool,
) -> bool {
    if pending.is_empty() && !terminal {
        return true;
    }
    let events = std::mem::take(pending);
    sink.send(StreamChunk {
        playback_request_id: playback_request_id.clone(),
        events,
        terminal,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_types::{
        event::{IngestRequest, Payload},
        identity::{Identity, ScopeId},
    };

    fn scope() -> ScopeId {
        ScopeId::new("s1")
    }

    #[tokio::test]
    async fn replay_of_empty_range_emits_immediate_stream_complete() {
        let store = TruthStore::open_in_memory().unwrap();
        let engine = PlaybackEngine::new(store);
        let (_, mut rx) = engine
            .start_stream(
                ClientConnId::mint(),
                StartStreamParams {
                    scope_id: scope(),
                    lanes: vec![Lane::Raw],
                    filters: EventFilters::default(),
                    mode: PlaybackMode::Replay,
                    timebase: Timebase::Canonical,
                    start_time: Some(Timestamp::new(0)),
                    stop_time: Some(Timestamp::new(100)),
                    start_cursor: None,
                    rate: Rate::unpaced(),
                    backpressure: Backpressure::CatchUp,
                },
            )
            .unwrap();
        let chunk = rx.recv().await.unwrap();
        assert!(chunk.terminal);
        assert!(chunk.events.is_empty());
    }

    #[tokio::test]
    async fn replay_with_stop_before_start_is_rejected() {
        let store = TruthStore::open_in_memory().unwrap();
        let engine = PlaybackEngine::new(store);
        let result = engine.start_stream(
            ClientConnId::mint(),
            StartStreamParams {
                scope_id: scope(),
                lanes: vec![Lane::Raw],
                filters: EventFilters::default(),
                mode: PlaybackMode::Replay,
                timebase: Timebase::Canonical,
                start_time: Some(Timestamp::new(100)),
                stop_time: Some(Timestamp::new(0)),
                start_cursor: None,
                rate: Rate::unpaced(),
                backpressure: Backpressure::CatchUp,
            },
        );
        assert!(matches!(result, Err(NovaError::SchemaError { .. })));
    }

    #[tokio::test]
    async fn live_stream_delivers_events_matching_filter() {
        let store = TruthStore::open_in_memory().unwrap();
        let normalizer = crate::ingest::IngestNormalizer::new(store.clone());
        let engine = PlaybackEngine::new(store);
        let conn = ClientConnId::mint();
        let (_, mut rx) = engine
            .start_stream(
                conn,
                StartStreamParams {
                    scope_id: scope(),
                    lanes: vec![Lane::Raw],
                    filters: EventFilters {
                        unique_id: Some(nova_types::identity::UniqueId::new("Z")),
                        ..Default::default()
                    },
                    mode: PlaybackMode::Live,
                    timebase: Timebase::Canonical,
                    start_time: None,
                    stop_time: None,
                    start_cursor: None,
                    rate: Rate::unpaced(),
                    backpressure: Backpressure::CatchUp,
                },
            )
            .unwrap();

        for t in [1u64, 2, 3] {
            normalizer
                .insert(IngestRequest {
                    event_id: None,
                    scope_id: scope(),
                    lane: Lane::Raw,
                    identity: Identity::new("X", "Y", "Z"),
                    message_type: None,
                    source_truth_time: Some(Timestamp::new(t)),
                    effective_time: None,
                    payload: Payload::Json(serde_json::json!({"t": t})),
                    manifest: None,
                })
                .unwrap();
        }

        let chunk = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(chunk.events.len(), 3);
    }
}
