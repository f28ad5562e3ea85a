//! Per-connection dispatch loop: one task per upgraded WebSocket, reading
//! `ClientMessage`s, forwarding each to Core over the IPC handle, and
//! writing `ServerMessage`s back out — plus the playback fencing and
//! REPLAY/permission gates that belong to the edge, not to Core (§4.5).

use crate::{
    auth::Session,
    state::{AppState, ChatMessage},
    ws::messages::{ClientMessage, ExportListing, ServerMessage},
};
use futures::{SinkExt, StreamExt};
use nova_types::{
    command::TimelineMode,
    event::{EventId, IngestRequest, Payload},
    identity::Identity,
    ipc::ClientConnId,
    lane::Lane,
    playback::PlaybackRequestId,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};
use warp::ws::{Message, WebSocket};

pub async fn handle(ws: WebSocket, state: Arc<AppState>, session: Session) {
    let conn_id = ClientConnId::mint();
    info!(target: "SERVER", conn = %conn_id, user = %session.username, "client connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let body = serde_json::to_string(&msg).unwrap_or_default();
            if ws_tx.send(Message::text(body)).await.is_err() {
                break;
            }
        }
    });

    let active_playback_id: Arc<Mutex<Option<PlaybackRequestId>>> = Arc::new(Mutex::new(None));
    let mut chunk_forwarder: Option<tokio::task::JoinHandle<()>> = None;

    let mut chat_rx = state.chat.subscribe();
    let chat_out = out_tx.clone();
    let chat_scope_filter = session.allowed_scopes.clone();
    let chat_task = tokio::spawn(async move {
        while let Ok(msg) = chat_rx.recv().await {
            if !chat_scope_filter.is_empty() && !chat_scope_filter.iter().any(|s| s == msg.scope_id.as_str()) {
                continue;
            }
            let _ = chat_out.send(ServerMessage::Chat { username: msg.username, text: msg.text });
        }
    });

    let mut presentation_rx = state.presentation_updates.subscribe();
    let presentation_out = out_tx.clone();
    let presentation_scope_filter = session.allowed_scopes.clone();
    let presentation_username = session.username.clone();
    let presentation_task = tokio::spawn(async move {
        while let Ok(update) = presentation_rx.recv().await {
            if !presentation_scope_filter.is_empty()
                && !presentation_scope_filter.iter().any(|s| s == update.scope_id.as_str())
            {
                continue;
            }
            if let Some(username) = &update.username {
                if *username != presentation_username {
                    continue;
                }
            }
            let _ = presentation_out.send(ServerMessage::PresentationUpdate {
                unique_id: update.unique_id.as_str().to_owned(),
                override_: update.value,
            });
        }
    });

    let _ = out_tx.send(ServerMessage::AuthResponse { username: session.username.clone() });

    while let Some(Ok(frame)) = ws_rx.next().await {
        if !frame.is_text() {
            continue;
        }
        let text = match frame.to_str() {
            Ok(t) => t,
            Err(_) => continue,
        };
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                let _ = out_tx.send(ServerMessage::Error { code: "ERR_SCHEMA".into(), message: e.to_string() });
                continue;
            }
        };

        if let Err(e) = dispatch(
            message,
            &state,
            &session,
            &conn_id,
            &out_tx,
            &active_playback_id,
            &mut chunk_forwarder,
        )
        .await
        {
            let _ = out_tx.send(ServerMessage::Error { code: e.0, message: e.1 });
        }
    }

    debug!(target: "SERVER", conn = %conn_id, "client disconnected");
    state.core.handle.cancel_stream(conn_id.clone()).ok();
    if let Some(handle) = chunk_forwarder {
        handle.abort();
    }
    chat_task.abort();
    presentation_task.abort();
    writer.abort();
}

/// Relays one output stream's WebSocket feed (§4.6) over this upgrade: the
/// Output Stream Manager formats and broadcasts frames onto a
/// `broadcast::Sender`; this just forwards them verbatim as binary WS
/// messages until the feed or the client closes.
pub async fn relay_output_stream(ws: WebSocket, mut feed: tokio::sync::broadcast::Receiver<Vec<u8>>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let forward = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(frame) => {
                    if ws_tx.send(Message::binary(frame)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    // Drain inbound frames only to detect the client closing; output
    // streams are one-way and never read anything a client sends.
    while ws_rx.next().await.is_some() {}
    forward.abort();
}

type DispatchError = (String, String);

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    message: ClientMessage,
    state: &Arc<AppState>,
    session: &Session,
    conn_id: &ClientConnId,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    active_playback_id: &Arc<Mutex<Option<PlaybackRequestId>>>,
    chunk_forwarder: &mut Option<tokio::task::JoinHandle<()>>,
) -> Result<(), DispatchError> {
    match message {
        ClientMessage::Query { request_id, scope_id, lanes, start_time, stop_time, timebase, filters } => {
            session.require_scope(scope_id.as_str()).map_err(to_wire)?;
            let response = state
                .core
                .handle
                .query(scope_id, lanes, start_time, stop_time, timebase, filters)
                .await
                .map_err(|e| to_wire(e.into()))?;
            let _ = out_tx.send(ServerMessage::QueryResponse { request_id, events: response.events });
        }
        ClientMessage::StartStream { scope_id, lanes, filters, mode, timebase, start_time, stop_time, rate, backpressure } => {
            session.require_scope(scope_id.as_str()).map_err(to_wire)?;
            let (playback_request_id, mut rx) = state
                .core
                .handle
                .start_stream(conn_id.clone(), scope_id, lanes, filters, mode, timebase, start_time, stop_time, rate, backpressure)
                .await
                .map_err(|e| to_wire(e.into()))?;

            *active_playback_id.lock().unwrap() = Some(playback_request_id.clone());
            if let Some(old) = chunk_forwarder.take() {
                old.abort();
            }

            let fenced_id = playback_request_id.clone();
            let fence = active_playback_id.clone();
            let forward_out = out_tx.clone();
            *chunk_forwarder = Some(tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    if fence.lock().unwrap().as_ref() != Some(&chunk.playback_request_id) {
                        // Superseded by a newer startStream; drop silently (§4.5).
                        continue;
                    }
                    if chunk.terminal {
                        let _ = forward_out.send(ServerMessage::StreamComplete { playback_request_id: chunk.playback_request_id });
                        break;
                    }
                    let _ = forward_out.send(ServerMessage::StreamChunk {
                        playback_request_id: chunk.playback_request_id,
                        events: chunk.events,
                        terminal: false,
                    });
                }
                let _ = fenced_id;
            }));

            let _ = out_tx.send(ServerMessage::StreamStarted { playback_request_id });
        }
        ClientMessage::CancelStream => {
            state.core.handle.cancel_stream(conn_id.clone()).map_err(|e| to_wire(e.into()))?;
            *active_playback_id.lock().unwrap() = None;
            if let Some(old) = chunk_forwarder.take() {
                old.abort();
            }
            let _ = out_tx.send(ServerMessage::StreamCanceled);
        }
        ClientMessage::SetRate { rate } => {
            state.core.handle.set_playback_rate(conn_id.clone(), rate).map_err(|e| to_wire(e.into()))?;
        }
        ClientMessage::Command { request_id, scope_id, identity, command_type, payload, timeline_mode } => {
            session.require_scope(scope_id.as_str()).map_err(to_wire)?;
            session.require_command().map_err(to_wire)?;
            if timeline_mode == TimelineMode::Replay {
                return Err(("ERR_REPLAY_NOT_ALLOWED".to_owned(), "commands are not allowed while in REPLAY mode".to_owned()));
            }
            let response = state
                .core
                .handle
                .submit_command(request_id, scope_id, identity, command_type, payload, timeline_mode)
                .await
                .map_err(|e| to_wire(e.into()))?;
            let _ = out_tx.send(ServerMessage::CommandResponse {
                request_id: response.request_id,
                idempotent: response.idempotent,
            });
        }
        ClientMessage::Chat { scope_id, text } => {
            session.require_scope(scope_id.as_str()).map_err(to_wire)?;
            let identity = Identity::new("nova", "chat", session.username.clone());
            let request = IngestRequest {
                event_id: Some(EventId::mint()),
                scope_id: scope_id.clone(),
                lane: Lane::Metadata,
                identity,
                message_type: Some("ChatMessage".into()),
                source_truth_time: None,
                effective_time: None,
                payload: Payload::Json(serde_json::json!({ "username": session.username, "text": text })),
                manifest: None,
            };
            state.core.handle.ingest_metadata(request).await.map_err(|e| to_wire(e.into()))?;
            let _ = state.chat.send(ChatMessage { scope_id, username: session.username.clone(), text });
        }
        ClientMessage::Export { scope_id, start_time, stop_time, timebase, filters } => {
            session.require_scope(scope_id.as_str()).map_err(to_wire)?;
            session.require_command().map_err(to_wire)?;
            let outcome = state
                .core
                .exports
                .export(scope_id, start_time, stop_time, timebase, filters)
                .await
                .map_err(|e| to_wire(e.into()))?;
            let _ = out_tx.send(ServerMessage::ExportResponse {
                export_id: outcome.export_id.clone(),
                download_url: format!("/exports/{}.zip", outcome.export_id),
            });
        }
        ClientMessage::ListExports => {
            let exports = state
                .core
                .exports
                .list_exports()
                .into_iter()
                .map(|id| ExportListing {
                    download_url: format!("/exports/{}.zip", id),
                    export_id: id,
                })
                .collect();
            let _ = out_tx.send(ServerMessage::ExportsListResponse { exports });
        }
    }
    Ok(())
}

fn to_wire(e: crate::error::ApiError) -> DispatchError {
    let resp: crate::error::ApiErrorResponse = e.into();
    (resp.code, resp.message)
}
