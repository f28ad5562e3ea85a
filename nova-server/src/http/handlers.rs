//! HTTP handler functions (§6), one `async fn` per route in the teacher's
//! `event_service_api::http::handlers` style: plain request/response structs
//! in, `impl Reply` or `Rejection` out.

use crate::{
    auth::Session,
    error::ApiError,
    state::AppState,
    users::{PublicUser, Role},
};
use nova_types::{
    identity::{ScopeId, UniqueId},
    presentation::PresentationOverride,
    run::{CreateRun, UpdateRun},
    stream_def::StreamDefinition,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{http::StatusCode, Rejection, Reply};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_sec: u64,
}

pub async fn health(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthResponse { status: "ok", uptime_sec: state.uptime_sec() }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub node_mode: String,
    pub default_timebase: nova_types::playback::Timebase,
    pub manifests: Vec<nova_types::manifest::Manifest>,
}

pub async fn config(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ConfigResponse {
        node_mode: state.config.node_mode.clone(),
        default_timebase: state.config.default_timebase,
        manifests: state.config.manifests.clone(),
    }))
}

// ---- Output streams ----------------------------------------------------

pub async fn list_streams(state: Arc<AppState>, _session: Session) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.core.outputs.list()))
}

pub async fn get_stream(stream_id: String, state: Arc<AppState>, _session: Session) -> Result<impl Reply, Rejection> {
    let def = state.core.outputs.get(&stream_id).map_err(err)?;
    Ok(warp::reply::json(&def))
}

pub async fn create_stream(def: StreamDefinition, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    let created = state.core.outputs.create(def).map_err(err)?;
    Ok(warp::reply::with_status(warp::reply::json(&created), StatusCode::CREATED))
}

pub async fn update_stream(
    stream_id: String,
    def: StreamDefinition,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    let updated = state.core.outputs.update(&stream_id, def).map_err(err)?;
    Ok(warp::reply::json(&updated))
}

pub async fn delete_stream(stream_id: String, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    state.core.outputs.delete(&stream_id).map_err(err)?;
    Ok(warp::reply::with_status(warp::reply::json(&serde_json::json!({ "ok": true })), StatusCode::OK))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamBody {
    pub scope_id: ScopeId,
}

pub async fn start_stream(
    stream_id: String,
    body: StartStreamBody,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    session.require_scope(body.scope_id.as_str()).map_err(custom)?;
    state
        .core
        .outputs
        .start(&stream_id, body.scope_id, state.core.playback.clone())
        .map_err(err)?;
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

pub async fn stop_stream(stream_id: String, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    state.core.outputs.stop(&stream_id);
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

// ---- Runs ---------------------------------------------------------------

pub async fn list_runs(state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    let runs = state.core.runs.list(&session.username).map_err(err)?;
    Ok(warp::reply::json(&runs))
}

pub async fn get_run(run_number: u64, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    let run = state.core.runs.get(&session.username, run_number).map_err(err)?;
    Ok(warp::reply::json(&run))
}

pub async fn create_run(req: CreateRun, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    let run = state.core.runs.create(&session.username, req).map_err(err)?;
    Ok(warp::reply::with_status(warp::reply::json(&run), StatusCode::CREATED))
}

pub async fn update_run(
    run_number: u64,
    patch: UpdateRun,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    let run = state.core.runs.update(&session.username, run_number, patch).map_err(err)?;
    Ok(warp::reply::json(&run))
}

pub async fn delete_run(run_number: u64, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    state.core.runs.delete(&session.username, run_number).map_err(err)?;
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleBody {
    pub scope_id: ScopeId,
}

pub async fn run_bundle(
    run_number: u64,
    body: BundleBody,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_command().map_err(custom)?;
    session.require_scope(body.scope_id.as_str()).map_err(custom)?;
    let path = state
        .core
        .runs
        .create_bundle(&session.username, run_number, body.scope_id, &state.core.exports)
        .await
        .map_err(err)?;
    serve_file(path).await
}

// ---- Presentation ---------------------------------------------------------

pub async fn get_presentation(
    scope_id: String,
    unique_id: String,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    let resolved = state
        .core
        .presentation
        .resolve(&session.username, &ScopeId::new(scope_id), &UniqueId::from(unique_id))
        .map_err(err)?;
    Ok(warp::reply::json(&resolved))
}

pub async fn set_admin_presentation(
    scope_id: String,
    unique_id: String,
    value: PresentationOverride,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    let scope = ScopeId::new(scope_id);
    let unique = UniqueId::from(unique_id);
    state.core.presentation.set_admin_default(&scope, &unique, value.clone()).map_err(err)?;
    let _ = state.presentation_updates.send(crate::state::PresentationUpdate {
        scope_id: scope,
        unique_id: unique,
        username: None,
        value,
    });
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

pub async fn set_user_presentation(
    scope_id: String,
    unique_id: String,
    value: PresentationOverride,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    let scope = ScopeId::new(scope_id);
    let unique = UniqueId::from(unique_id);
    state
        .core
        .presentation
        .set_user_override(&session.username, &scope, &unique, value.clone())
        .map_err(err)?;
    let _ = state.presentation_updates.send(crate::state::PresentationUpdate {
        scope_id: scope,
        unique_id: unique,
        username: Some(session.username.clone()),
        value,
    });
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

// ---- Admin: users / scopes ------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
}

pub async fn list_users(state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    let users: Vec<PublicUser> = state.users.list().iter().map(PublicUser::from).collect();
    Ok(warp::reply::json(&users))
}

pub async fn create_user(req: CreateUserRequest, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    let record = state
        .users
        .register(&req.username, &req.password, req.role, req.allowed_scopes)
        .map_err(err)?;
    Ok(warp::reply::with_status(warp::reply::json(&PublicUser::from(&record)), StatusCode::CREATED))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScopesRequest {
    pub allowed_scopes: Vec<String>,
}

pub async fn set_user_scopes(
    username: String,
    req: SetScopesRequest,
    state: Arc<AppState>,
    session: Session,
) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    let record = state.users.set_allowed_scopes(&username, req.allowed_scopes).map_err(err)?;
    Ok(warp::reply::json(&PublicUser::from(&record)))
}

pub async fn delete_user(username: String, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    state.users.delete(&username).map_err(err)?;
    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}

pub async fn list_scopes(state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    Ok(warp::reply::json(&state.scopes.list()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScopeRequest {
    pub scope_id: String,
}

pub async fn create_scope(req: CreateScopeRequest, state: Arc<AppState>, session: Session) -> Result<impl Reply, Rejection> {
    session.require_admin().map_err(custom)?;
    state.scopes.create(req.scope_id).map_err(err)?;
    Ok(warp::reply::with_status(warp::reply::json(&serde_json::json!({ "ok": true })), StatusCode::CREATED))
}

// ---- Exports --------------------------------------------------------------

pub async fn download_export(export_id: String, state: Arc<AppState>, _session: Session) -> Result<impl Reply, Rejection> {
    let path = state.core.exports.download_path(&export_id);
    serve_file(path).await
}

async fn serve_file(path: std::path::PathBuf) -> Result<Box<dyn Reply>, Rejection> {
    let body = tokio::fs::read(&path)
        .await
        .map_err(|_| warp::reject::custom(ApiError::Core(nova_types::error::NovaError::NotFound {
            what: "export archive".to_owned(),
        })))?;
    Ok(Box::new(warp::reply::with_header(body, "content-type", "application/zip")))
}

fn err(e: nova_types::error::NovaError) -> Rejection {
    warp::reject::custom(ApiError::from(e))
}

fn custom(e: ApiError) -> Rejection {
    warp::reject::custom(e)
}
