pub mod connection;
pub mod messages;

use crate::{
    auth::{optional_session_token, Session},
    error::ApiError,
    state::AppState,
};
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

/// `GET /ws`, upgraded after validating the session cookie the same way an
/// HTTP route would (§4.5: "Authenticate WebSocket upgrades from an
/// http-only cookie issued at login").
pub fn route(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let control = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(state_filter.clone())
        .and(warp::header::optional::<String>("cookie"))
        .and_then(|ws: warp::ws::Ws, state: Arc<AppState>, cookie: Option<String>| async move {
            let token = optional_session_token(cookie).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))?;
            let session = state.sessions.get(&token).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))?;
            Ok::<_, Rejection>(ws.on_upgrade(move |socket| connection::handle(socket, state, session)))
        });

    let output_feed = warp::path("ws")
        .and(warp::path("streams"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::ws())
        .and(state_filter)
        .and(warp::header::optional::<String>("cookie"))
        .and_then(
            |stream_id: String, ws: warp::ws::Ws, state: Arc<AppState>, cookie: Option<String>| async move {
                let token = optional_session_token(cookie).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))?;
                state.sessions.get(&token).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))?;
                let feed = state.core.outputs.websocket_feed(&stream_id).ok_or_else(|| {
                    warp::reject::custom(ApiError::from(nova_types::error::NovaError::NotFound {
                        what: format!("stream {}", stream_id),
                    }))
                })?;
                Ok::<_, Rejection>(ws.on_upgrade(move |socket| connection::relay_output_stream(socket, feed)))
            },
        );

    control.or(output_feed)
}

pub type ConnSession = Session;
