use super::{format_event, PlaybackEngine};
use nova_types::{ipc::ClientConnId, ipc::StreamChunk, stream_def::StreamDefinition};
use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::warn;

/// UDP output has no listener and no clients to fan out to: it starts
/// sending datagrams to `endpoint` (`host:port`) immediately (§4.6 lifecycle
/// step 2).
pub async fn run(
    def: StreamDefinition,
    mut rx: mpsc::Receiver<StreamChunk>,
    canceled: Arc<AtomicBool>,
    engine: PlaybackEngine,
    conn_id: ClientConnId,
) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            warn!(stream = %def.stream_id, error = %e, "udp output socket failed to bind");
            return;
        }
    };

    while !canceled.load(Ordering::SeqCst) {
        match rx.recv().await {
            Some(chunk) => {
                for event in &chunk.events {
                    let frame = format_event(&def, event);
                    if let Err(e) = socket.send_to(&frame, &def.endpoint).await {
                        warn!(stream = %def.stream_id, error = %e, "udp output send failed");
                    }
                }
            }
            None => break,
        }
    }

    engine.cancel_stream(&conn_id);
}
