//! The Output Stream Manager (§4.6): persisted stream definitions plus
//! ephemeral runtime fan-out over TCP, UDP, and WebSocket. Each running
//! stream taps the Playback Engine as an ordinary LIVE client and formats
//! every event once per transport, mirroring the driver registry's
//! write-once-fan-out-many shape.

mod tcp;
mod udp;

use crate::playback::{PlaybackEngine, StartStreamParams};
use nova_types::{
    error::{NovaError, NovaResult},
    event::{Event, Payload},
    filters::EventFilters,
    identity::ScopeId,
    ipc::ClientConnId,
    playback::{Backpressure, PlaybackMode, Rate},
    stream_def::{OutputFormat, Protocol, StreamDefinition},
};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

const WS_BROADCAST_CAPACITY: usize = 256;

struct Runtime {
    task: JoinHandle<()>,
    canceled: Arc<AtomicBool>,
    bound_to: Option<ClientConnId>,
    /// Only populated for `Protocol::Websocket` streams; the Server edge
    /// subscribes to this to relay frames over its own WS upgrade.
    ws_feed: Option<broadcast::Sender<Vec<u8>>>,
}

pub struct OutputStreamManager {
    definitions_path: PathBuf,
    definitions: parking_lot::Mutex<HashMap<String, StreamDefinition>>,
    runtimes: parking_lot::Mutex<HashMap<String, Runtime>>,
}

impl OutputStreamManager {
    pub fn new(data_root: PathBuf) -> NovaResult<Self> {
        let definitions_path = data_root.join("stream_definitions.json");
        let definitions = load_definitions(&definitions_path)?;
        Ok(Self {
            definitions_path,
            definitions: parking_lot::Mutex::new(definitions),
            runtimes: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn list(&self) -> Vec<StreamDefinition> {
        self.definitions.lock().values().cloned().collect()
    }

    pub fn get(&self, stream_id: &str) -> NovaResult<StreamDefinition> {
        self.definitions
            .lock()
            .get(stream_id)
            .cloned()
            .ok_or_else(|| NovaError::NotFound { what: format!("stream {}", stream_id) })
    }

    /// Validates format rules and `(protocol, endpoint)` uniqueness, then
    /// persists. Does not start the stream (§4.6 lifecycle step 1).
    pub fn create(&self, def: StreamDefinition) -> NovaResult<StreamDefinition> {
        def.validate()?;
        let mut definitions = self.definitions.lock();
        self.check_endpoint_free(&definitions, &def, None)?;
        definitions.insert(def.stream_id.clone(), def.clone());
        drop(definitions);
        self.persist()?;
        Ok(def)
    }

    pub fn update(&self, stream_id: &str, def: StreamDefinition) -> NovaResult<StreamDefinition> {
        def.validate()?;
        let mut definitions = self.definitions.lock();
        if !definitions.contains_key(stream_id) {
            return Err(NovaError::NotFound { what: format!("stream {}", stream_id) });
        }
        self.check_endpoint_free(&definitions, &def, Some(stream_id))?;
        definitions.insert(stream_id.to_owned(), def.clone());
        drop(definitions);
        self.persist()?;
        Ok(def)
    }

    pub fn delete(&self, stream_id: &str) -> NovaResult<()> {
        self.stop(stream_id);
        let removed = self.definitions.lock().remove(stream_id).is_some();
        if !removed {
            return Err(NovaError::NotFound { what: format!("stream {}", stream_id) });
        }
        self.persist()
    }

    fn check_endpoint_free(
        &self,
        definitions: &HashMap<String, StreamDefinition>,
        candidate: &StreamDefinition,
        excluding: Option<&str>,
    ) -> NovaResult<()> {
        let key = candidate.uniqueness_key();
        let conflict = definitions.values().any(|existing| {
            Some(existing.stream_id.as_str()) != excluding && existing.uniqueness_key() == key
        });
        if conflict {
            return Err(NovaError::EndpointConflict {
                endpoint: format!("{}:{}", key.0, key.1),
            });
        }
        Ok(())
    }

    fn persist(&self) -> NovaResult<()> {
        let definitions = self.definitions.lock();
        let list: Vec<&StreamDefinition> = definitions.values().collect();
        let body = serde_json::to_string_pretty(&list).expect("stream definitions always serialize");
        if let Some(parent) = self.definitions_path.parent() {
            fs::create_dir_all(parent).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        }
        fs::write(&self.definitions_path, body).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })
    }

    /// Starts the streaming task for `stream_id` against `scope_id`, tapping
    /// the Playback Engine as an ordinary LIVE client (§4.6 lifecycle step 2).
    pub fn start(&self, stream_id: &str, scope_id: ScopeId, engine: PlaybackEngine) -> NovaResult<()> {
        let def = self.get(stream_id)?;
        self.stop(stream_id);

        let conn_id = ClientConnId::mint();
        let (_, rx) = engine.start_stream(
            conn_id.clone(),
            StartStreamParams {
                scope_id,
                lanes: vec![def.lane],
                filters: def.filters.clone(),
                mode: PlaybackMode::Live,
                timebase: nova_types::playback::Timebase::Canonical,
                start_time: None,
                stop_time: None,
                start_cursor: None,
                rate: Rate::unpaced(),
                backpressure: def.backpressure,
            },
        )?;

        let canceled = Arc::new(AtomicBool::new(false));
        let runtime = match def.protocol {
            Protocol::Tcp => {
                let task = tokio::spawn(tcp::run(def.clone(), rx, canceled.clone(), engine.clone(), conn_id.clone()));
                Runtime { task, canceled, bound_to: None, ws_feed: None }
            }
            Protocol::Udp => {
                let task = tokio::spawn(udp::run(def.clone(), rx, canceled.clone(), engine.clone(), conn_id.clone()));
                Runtime { task, canceled, bound_to: None, ws_feed: None }
            }
            Protocol::Websocket => {
                let (ws_tx, _) = broadcast::channel(WS_BROADCAST_CAPACITY);
                let task = tokio::spawn(run_websocket_feed(
                    def.clone(),
                    rx,
                    canceled.clone(),
                    ws_tx.clone(),
                    engine.clone(),
                    conn_id.clone(),
                ));
                Runtime { task, canceled, bound_to: None, ws_feed: Some(ws_tx) }
            }
        };

        self.runtimes.lock().insert(stream_id.to_owned(), runtime);
        info!(stream = stream_id, protocol = %def.protocol, "output stream started");
        Ok(())
    }

    pub fn stop(&self, stream_id: &str) {
        if let Some(runtime) = self.runtimes.lock().remove(stream_id) {
            runtime.canceled.store(true, Ordering::SeqCst);
            runtime.task.abort();
        }
    }

    /// Subscribers of a `websocket` stream's formatted frames; `None` for
    /// any non-websocket stream or one that isn't running.
    pub fn websocket_feed(&self, stream_id: &str) -> Option<broadcast::Receiver<Vec<u8>>> {
        self.runtimes.lock().get(stream_id).and_then(|r| r.ws_feed.as_ref().map(|tx| tx.subscribe()))
    }

    /// Rebinding always cancels and restarts the feed (§4.6, last-binder-wins).
    /// The restarted session begins from the current truth-store head, which
    /// keeps a bound output stream and its UI instance in lockstep going
    /// forward since both are ordinary LIVE subscribers from that point on.
    pub fn bind(&self, stream_id: &str, scope_id: ScopeId, engine: PlaybackEngine, instance: ClientConnId) -> NovaResult<()> {
        self.start(stream_id, scope_id, engine)?;
        if let Some(runtime) = self.runtimes.lock().get_mut(stream_id) {
            runtime.bound_to = Some(instance);
        }
        Ok(())
    }

    pub fn unbind(&self, stream_id: &str, scope_id: ScopeId, engine: PlaybackEngine) -> NovaResult<()> {
        self.start(stream_id, scope_id, engine)
    }

    pub fn bound_instance(&self, stream_id: &str) -> Option<ClientConnId> {
        self.runtimes.lock().get(stream_id).and_then(|r| r.bound_to.clone())
    }
}

fn load_definitions(path: &PathBuf) -> NovaResult<HashMap<String, StreamDefinition>> {
    match fs::read_to_string(path) {
        Ok(body) => {
            let list: Vec<StreamDefinition> =
                serde_json::from_str(&body).map_err(|e| NovaError::SchemaError { message: e.to_string() })?;
            Ok(list.into_iter().map(|d| (d.stream_id.clone(), d)).collect())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(NovaError::StoreUnavailable { message: e.to_string() }),
    }
}

/// Formats one event per `outputFormat` (§4.6): `payloadOnly` emits the raw
/// payload bytes (JSON payloads re-serialized, byte payloads passed through
/// verbatim); `hierarchyPerMessage` emits the full event as one JSON line.
fn format_event(def: &StreamDefinition, event: &Event) -> Vec<u8> {
    match def.output_format {
        OutputFormat::PayloadOnly => match &event.payload {
            Payload::Bytes(b) => b.clone(),
            Payload::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
        },
        OutputFormat::HierarchyPerMessage => {
            let mut line = serde_json::to_vec(event).unwrap_or_default();
            line.push(b'\n');
            line
        }
    }
}

async fn run_websocket_feed(
    def: StreamDefinition,
    mut rx: tokio::sync::mpsc::Receiver<nova_types::ipc::StreamChunk>,
    canceled: Arc<AtomicBool>,
    ws_tx: broadcast::Sender<Vec<u8>>,
    engine: PlaybackEngine,
    conn_id: ClientConnId,
) {
    while !canceled.load(Ordering::SeqCst) {
        match rx.recv().await {
            Some(chunk) => {
                for event in &chunk.events {
                    // A send error here just means no subscribers are
                    // currently attached; the feed keeps running.
                    let _ = ws_tx.send(format_event(&def, event));
                }
            }
            None => break,
        }
    }
    engine.cancel_stream(&conn_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_types::{lane::Lane, playback::Backpressure, stream_def::Visibility};

    fn def(stream_id: &str, endpoint: &str) -> StreamDefinition {
        StreamDefinition {
            stream_id: stream_id.into(),
            name: stream_id.into(),
            protocol: Protocol::Tcp,
            endpoint: endpoint.into(),
            lane: Lane::Raw,
            filters: EventFilters::default(),
            message_type_filter: None,
            output_format: OutputFormat::HierarchyPerMessage,
            backpressure: Backpressure::CatchUp,
            enabled: true,
            visibility: Visibility::Public,
        }
    }

    #[test]
    fn duplicate_endpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OutputStreamManager::new(dir.path().to_path_buf()).unwrap();
        manager.create(def("a", "9000")).unwrap();
        let err = manager.create(def("b", "09000")).unwrap_err();
        assert!(matches!(err, NovaError::EndpointConflict { .. }));
    }

    #[test]
    fn definitions_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = OutputStreamManager::new(dir.path().to_path_buf()).unwrap();
            manager.create(def("a", "9001")).unwrap();
        }
        let reloaded = OutputStreamManager::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.list().len(), 1);
    }
}
