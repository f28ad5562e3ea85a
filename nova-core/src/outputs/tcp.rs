use super::{format_event, PlaybackEngine};
use nova_types::{ipc::ClientConnId, ipc::StreamChunk, playback::Backpressure, stream_def::StreamDefinition};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, warn};

const CLIENT_QUEUE_BOUND: usize = 256;

/// A connected client's write queue plus, under `CatchUp`, a single slot
/// for the most recent frame that didn't fit — replaced wholesale on
/// every further overflow rather than ever growing a backlog.
struct ClientSlot {
    tx: mpsc::Sender<Vec<u8>>,
    pending: StdMutex<Option<Vec<u8>>>,
}

/// Delivers `frame` to `client` per `backpressure`. Returns `false` when
/// the client should be dropped: its write task ended (socket closed), or,
/// under `Disconnect`, its queue was full.
fn deliver(client: &ClientSlot, frame: Vec<u8>, backpressure: Backpressure) -> bool {
    if let Some(stale) = client.pending.lock().unwrap().take() {
        let _ = client.tx.try_send(stale);
    }
    match client.tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(frame)) => match backpressure {
            Backpressure::Disconnect => false,
            Backpressure::CatchUp => {
                *client.pending.lock().unwrap() = Some(frame);
                true
            }
        },
    }
}

/// One listener, fan-out to every connected client over its own serialized
/// write queue (§4.6). Under `Disconnect` a client whose queue is full is
/// dropped; under `CatchUp` its queue is coalesced to the latest frame
/// instead, so one slow client never holds back the others or itself falls
/// behind forever.
pub async fn run(
    def: StreamDefinition,
    mut rx: mpsc::Receiver<StreamChunk>,
    canceled: Arc<AtomicBool>,
    engine: PlaybackEngine,
    conn_id: ClientConnId,
) {
    let listener = match TcpListener::bind(format!("0.0.0.0:{}", def.endpoint)).await {
        Ok(l) => l,
        Err(e) => {
            warn!(stream = %def.stream_id, error = %e, "tcp output listener failed to bind");
            return;
        }
    };

    let clients: Arc<Mutex<Vec<ClientSlot>>> = Arc::new(Mutex::new(Vec::new()));
    let accept_canceled = canceled.clone();
    let accept_clients = clients.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            if accept_canceled.load(Ordering::SeqCst) {
                break;
            }
            match listener.accept().await {
                Ok((mut socket, addr)) => {
                    let (tx, mut write_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_BOUND);
                    accept_clients.lock().await.push(ClientSlot { tx, pending: StdMutex::new(None) });
                    tokio::spawn(async move {
                        while let Some(frame) = write_rx.recv().await {
                            if socket.write_all(&frame).await.is_err() {
                                debug!(%addr, "tcp output client disconnected");
                                break;
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "tcp output accept failed");
                    break;
                }
            }
        }
    });

    while !canceled.load(Ordering::SeqCst) {
        match rx.recv().await {
            Some(chunk) => {
                let mut clients_guard = clients.lock().await;
                for event in &chunk.events {
                    let frame = format_event(&def, event);
                    clients_guard.retain(|client| deliver(client, frame.clone(), def.backpressure));
                }
            }
            None => break,
        }
    }

    accept_task.abort();
    engine.cancel_stream(&conn_id);
}
