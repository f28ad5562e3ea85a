//! The Server edge (§4.5, §6): a stateless HTTP+WebSocket process in front
//! of one `nova_core::Core`, composed from a WS route and an HTTP route
//! tree under a shared `AppState`, the same two-tree-under-one-bind shape
//! the teacher's `public_api::run` composes `event_service_api` and the
//! IPFS file gateway with.

pub mod auth;
pub mod error;
pub mod http;
pub mod scopes;
pub mod state;
pub mod users;
pub mod ws;

use std::sync::Arc;
use warp::{http::Method, Filter};

pub use state::{AppState, ServerConfig};

/// Binds `state.config.bind_addr` and serves until the process is killed.
/// `nova-node` owns the `Core` and this state; this is the only thing it
/// calls after building both.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr;

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "cookie"])
        .allow_credentials(true)
        .allow_methods(&[Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let routes = ws::route(state.clone())
        .or(http::routes(state))
        .recover(error::handle_rejection)
        .with(cors)
        .with(warp::trace::request());

    tracing::info!(target: "SERVER", %addr, "server edge listening");
    warp::serve(routes).run(addr).await;
    Ok(())
}
