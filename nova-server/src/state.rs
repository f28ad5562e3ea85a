//! Shared handles every route and WebSocket connection reaches through: the
//! Core IPC handle, the user/session stores, and the chat fan-out channel
//! (§4.5's last bullet). Mirrors the teacher's pattern of a small `Arc`-wrapped
//! bundle of service handles threaded through `warp::Filter::and`.

use crate::{auth::SessionRegistry, scopes::ScopeStore, users::UserStore};
use nova_core::Core;
use nova_types::{
    identity::{ScopeId, UniqueId},
    manifest::Manifest,
    playback::Timebase,
    presentation::PresentationOverride,
};
use std::{sync::Arc, time::Instant};
use tokio::sync::broadcast;

const CHAT_BROADCAST_CAPACITY: usize = 256;
const PRESENTATION_BROADCAST_CAPACITY: usize = 256;

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub scope_id: ScopeId,
    pub username: String,
    pub text: String,
}

/// A presentation override that just changed (§4.9, §6's `presentationUpdate`
/// wire message). `username: None` means an admin default changed and every
/// session with access to `scope_id` should refetch; `Some(u)` means only
/// `u`'s own sessions are affected.
#[derive(Clone, Debug)]
pub struct PresentationUpdate {
    pub scope_id: ScopeId,
    pub unique_id: UniqueId,
    pub username: Option<String>,
    pub value: PresentationOverride,
}

pub struct ServerConfig {
    pub bind_addr: std::net::SocketAddr,
    pub node_mode: String,
    pub default_timebase: Timebase,
    pub manifests: Vec<Manifest>,
}

pub struct AppState {
    pub core: Arc<Core>,
    pub users: Arc<UserStore>,
    pub scopes: Arc<ScopeStore>,
    pub sessions: Arc<SessionRegistry>,
    pub chat: broadcast::Sender<ChatMessage>,
    pub presentation_updates: broadcast::Sender<PresentationUpdate>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(core: Arc<Core>, users: Arc<UserStore>, scopes: Arc<ScopeStore>, config: ServerConfig) -> Self {
        let (chat, _) = broadcast::channel(CHAT_BROADCAST_CAPACITY);
        let (presentation_updates, _) = broadcast::channel(PRESENTATION_BROADCAST_CAPACITY);
        Self {
            core,
            users,
            scopes,
            sessions: Arc::new(SessionRegistry::new()),
            chat,
            presentation_updates,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_sec(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
