//! Maps `NovaError` and the Server edge's own auth/permission failures onto
//! HTTP status codes and wire error codes, the same split the teacher keeps
//! between `NovaError`-the-domain-type and `ApiError`-the-wire-type in
//! `api::rejections`.

use derive_more::Display;
use nova_types::error::NovaError;
use serde::Serialize;
use tracing::warn;
use warp::{http::StatusCode, reject::Reject, Rejection, Reply};

#[derive(Debug, Clone, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Core(NovaError),

    #[display(fmt = "invalid username or password")]
    InvalidCredentials,

    #[display(fmt = "username already registered")]
    UsernameTaken,

    #[display(fmt = "authentication required")]
    Unauthenticated,

    #[display(fmt = "permission denied: requires '{}'", capability)]
    PermissionDenied { capability: String },

    #[display(fmt = "commands are not allowed while the client is in REPLAY mode")]
    ReplayNotAllowed,

    #[display(fmt = "invalid request: {}", cause)]
    BadRequest { cause: String },
}

impl Reject for ApiError {}
impl std::error::Error for ApiError {}

impl From<NovaError> for ApiError {
    fn from(e: NovaError) -> Self {
        ApiError::Core(e)
    }
}

impl From<nova_core::ipc::Error> for ApiError {
    fn from(e: nova_core::ipc::Error) -> Self {
        match e {
            nova_core::ipc::Error::Core(inner) => ApiError::Core(inner),
            other => ApiError::Core(NovaError::StoreUnavailable { message: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl From<ApiError> for ApiErrorResponse {
    fn from(e: ApiError) -> Self {
        let (status, code) = match &e {
            ApiError::Core(inner) => core_status_code(inner),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "ERR_INVALID_CREDENTIALS"),
            ApiError::UsernameTaken => (StatusCode::CONFLICT, "ERR_USERNAME_TAKEN"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "ERR_UNAUTHENTICATED"),
            ApiError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "ERR_PERMISSION_DENIED"),
            ApiError::ReplayNotAllowed => (StatusCode::BAD_REQUEST, "ERR_REPLAY_NOT_ALLOWED"),
            ApiError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST"),
        };
        ApiErrorResponse {
            status,
            code: code.to_owned(),
            message: e.to_string(),
        }
    }
}

fn core_status_code(e: &NovaError) -> (StatusCode, &'static str) {
    match e {
        NovaError::SchemaError { .. } => (StatusCode::BAD_REQUEST, "ERR_SCHEMA"),
        NovaError::UnknownManifest { .. } => (StatusCode::BAD_REQUEST, "ERR_UNKNOWN_MANIFEST"),
        NovaError::DuplicateEvent => (StatusCode::CONFLICT, "ERR_DUPLICATE_EVENT"),
        NovaError::ReplayNotAllowed => (StatusCode::BAD_REQUEST, "ERR_REPLAY_NOT_ALLOWED"),
        NovaError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "ERR_PERMISSION_DENIED"),
        NovaError::ScopeRequired => (StatusCode::BAD_REQUEST, "ERR_SCOPE_REQUIRED"),
        NovaError::ScopeForbidden { .. } => (StatusCode::FORBIDDEN, "ERR_SCOPE_FORBIDDEN"),
        NovaError::EndpointConflict { .. } => (StatusCode::CONFLICT, "ERR_ENDPOINT_CONFLICT"),
        NovaError::NotFound { .. } => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
        NovaError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "ERR_TIMEOUT"),
        NovaError::StoreUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "ERR_STORE_UNAVAILABLE"),
    }
}

pub async fn handle_rejection(r: Rejection) -> Result<impl Reply, Rejection> {
    let api_err = if r.is_not_found() {
        ApiError::Core(NovaError::NotFound { what: "route".to_owned() })
    } else if let Some(e) = r.find::<ApiError>() {
        e.clone()
    } else if let Some(e) = r.find::<warp::filters::body::BodyDeserializeError>() {
        use std::error::Error;
        ApiError::BadRequest {
            cause: e.source().map_or_else(|| "unknown".to_owned(), |e| e.to_string()),
        }
    } else if r.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::BadRequest { cause: "method not allowed".to_owned() }
    } else {
        warn!("unhandled rejection: {:?}", r);
        ApiError::Core(NovaError::StoreUnavailable { message: "internal error".to_owned() })
    };

    let resp: ApiErrorResponse = api_err.into();
    let json = warp::reply::json(&resp);
    Ok(warp::reply::with_status(json, resp.status))
}
