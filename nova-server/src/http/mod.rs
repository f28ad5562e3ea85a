//! Composes the HTTP surface (§6) out of small per-resource filter chains,
//! the same `warp::path(...).and(...)` shape the teacher's
//! `event_service_api::routes` builds up in.

pub mod handlers;

use crate::{auth, error::ApiError, state::AppState};
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let json_body = warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json());

    let health = warp::path("health")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handlers::health);

    let config = warp::path("config")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handlers::config);

    let base = with_state.clone();
    let session = session_filter(&base);
    let auth_routes = auth_routes(base.clone(), session.clone());

    let streams = warp::path("api").and(warp::path("streams")).and(
        warp::path::end()
            .and(warp::get())
            .and(base.clone())
            .and(session.clone())
            .and_then(handlers::list_streams)
            .or(warp::path::end()
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::create_stream))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::get())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::get_stream))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::put())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::update_stream))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::delete())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::delete_stream))
            .or(warp::path::param()
                .and(warp::path("start"))
                .and(warp::path::end())
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::start_stream))
            .or(warp::path::param()
                .and(warp::path("stop"))
                .and(warp::path::end())
                .and(warp::post())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::stop_stream)),
    );

    let runs = warp::path("api").and(warp::path("runs")).and(
        warp::path::end()
            .and(warp::get())
            .and(base.clone())
            .and(session.clone())
            .and_then(handlers::list_runs)
            .or(warp::path::end()
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::create_run))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::get())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::get_run))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::put())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::update_run))
            .or(warp::path::param()
                .and(warp::path::end())
                .and(warp::delete())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::delete_run))
            .or(warp::path::param()
                .and(warp::path("bundle"))
                .and(warp::path::end())
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::run_bundle)),
    );

    let presentation = warp::path("api").and(warp::path("presentation")).and(
        warp::path::param()
            .and(warp::path::param())
            .and(warp::path::end())
            .and(warp::get())
            .and(base.clone())
            .and(session.clone())
            .and_then(handlers::get_presentation)
            .or(warp::path("admin")
                .and(warp::path::param())
                .and(warp::path::param())
                .and(warp::path::end())
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::set_admin_presentation))
            .or(warp::path("user")
                .and(warp::path::param())
                .and(warp::path::param())
                .and(warp::path::end())
                .and(warp::post())
                .and(json_body.clone())
                .and(base.clone())
                .and(session.clone())
                .and_then(handlers::set_user_presentation)),
    );

    let admin = warp::path!("api" / "admin" / ..).and(
        warp::path("users")
            .and(
                warp::path::end()
                    .and(warp::get())
                    .and(base.clone())
                    .and(session.clone())
                    .and_then(handlers::list_users)
                    .or(warp::path::end()
                        .and(warp::post())
                        .and(json_body.clone())
                        .and(base.clone())
                        .and(session.clone())
                        .and_then(handlers::create_user))
                    .or(warp::path::param()
                        .and(warp::path("scopes"))
                        .and(warp::path::end())
                        .and(warp::put())
                        .and(json_body.clone())
                        .and(base.clone())
                        .and(session.clone())
                        .and_then(handlers::set_user_scopes))
                    .or(warp::path::param()
                        .and(warp::path::end())
                        .and(warp::delete())
                        .and(base.clone())
                        .and(session.clone())
                        .and_then(handlers::delete_user)),
            )
            .or(warp::path("scopes").and(
                warp::path::end()
                    .and(warp::get())
                    .and(base.clone())
                    .and(session.clone())
                    .and_then(handlers::list_scopes)
                    .or(warp::path::end()
                        .and(warp::post())
                        .and(json_body.clone())
                        .and(base.clone())
                        .and(session.clone())
                        .and_then(handlers::create_scope)),
            )),
    );

    let exports = warp::path("exports")
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(base.clone())
        .and(session.clone())
        .and_then(handlers::download_export);

    health
        .or(config)
        .or(auth_routes)
        .or(streams)
        .or(runs)
        .or(presentation)
        .or(admin)
        .or(exports)
}

fn session_filter(
    base: &(impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone + Send + Sync + 'static),
) -> impl Filter<Extract = (crate::auth::Session,), Error = Rejection> + Clone {
    let base = base.clone();
    warp::any()
        .and(base)
        .and(warp::header::optional::<String>("cookie"))
        .and_then(|state: Arc<AppState>, cookie: Option<String>| async move {
            let token = auth::optional_session_token(cookie).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))?;
            state.sessions.get(&token).ok_or_else(|| warp::reject::custom(ApiError::Unauthenticated))
        })
}

fn auth_routes(
    state: impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone + Send + Sync + 'static,
    session: impl Filter<Extract = (crate::auth::Session,), Error = Rejection> + Clone + Send + Sync + 'static,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let json_body = warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json());
    let cookie = warp::header::optional::<String>("cookie");

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body.clone())
        .and(state.clone().map(|s: Arc<AppState>| s.users.clone()))
        .and(state.clone().map(|s: Arc<AppState>| s.sessions.clone()))
        .and_then(auth::handle_login);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(cookie.clone().map(auth::optional_session_token))
        .and(state.clone().map(|s: Arc<AppState>| s.sessions.clone()))
        .and_then(auth::handle_logout);

    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(json_body)
        .and(state.clone().map(|s: Arc<AppState>| s.users.clone()))
        .and_then(auth::handle_register);

    let me = warp::path!("auth" / "me")
        .and(warp::get())
        .and(session)
        .and(state.map(|s: Arc<AppState>| s.users.clone()))
        .and_then(auth::handle_me);

    login.or(logout).or(register).or(me)
}
