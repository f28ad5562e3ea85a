//! Cookie-gated sessions for the Server edge (§4.5). The edge is otherwise
//! stateless; the only state kept here is an in-memory `token -> Session`
//! table that does not survive a restart, the in-process analogue of the
//! teacher's `NodeInfo`-scoped `KeyStore` in `api::auth` — a live table of
//! credentials a request is checked against, just holding a random opaque
//! token instead of a signed manifest.

use crate::{
    error::ApiError,
    users::{PublicUser, Role, UserStore},
};
use rand::Rng;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use warp::{http::header, Rejection, Reply};

pub const COOKIE_NAME: &str = "nova_session";

#[derive(Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub allowed_scopes: Vec<String>,
}

impl Session {
    pub fn require_command(&self) -> Result<(), ApiError> {
        if self.role.can_command() {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied { capability: "command".to_owned() })
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.can_admin() {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied { capability: "admin".to_owned() })
        }
    }

    pub fn require_scope(&self, scope_id: &str) -> Result<(), ApiError> {
        if self.allowed_scopes.is_empty() || self.allowed_scopes.iter().any(|s| s == scope_id) {
            Ok(())
        } else {
            Err(nova_types::error::NovaError::ScopeForbidden { scope_id: scope_id.to_owned() }.into())
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: parking_lot::Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&self, user: &crate::users::UserRecord) -> String {
        let token: String = {
            let mut rng = rand::thread_rng();
            (0..32).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
        };
        self.sessions.lock().insert(
            token.clone(),
            Session {
                username: user.username.clone(),
                role: user.role,
                allowed_scopes: user.allowed_scopes.clone(),
            },
        );
        token
    }

    fn revoke(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().get(token).map(|s| Session {
            username: s.username.clone(),
            role: s.role,
            allowed_scopes: s.allowed_scopes.clone(),
        })
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

fn cookie_header(token: &str) -> String {
    format!("{}={}; HttpOnly; SameSite=Strict; Path=/", COOKIE_NAME, token)
}

fn clear_cookie_header() -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", COOKIE_NAME)
}

pub async fn handle_login(
    req: LoginRequest,
    users: Arc<UserStore>,
    sessions: Arc<SessionRegistry>,
) -> Result<impl Reply, Rejection> {
    let user = users
        .authenticate(&req.username, &req.password)
        .ok_or(ApiError::InvalidCredentials)?;
    let token = sessions.issue(&user);
    let reply = warp::reply::json(&PublicUser::from(&user));
    Ok(warp::reply::with_header(reply, header::SET_COOKIE, cookie_header(&token)))
}

pub async fn handle_logout(token: Option<String>, sessions: Arc<SessionRegistry>) -> Result<impl Reply, Rejection> {
    if let Some(token) = token {
        sessions.revoke(&token);
    }
    let reply = warp::reply::json(&serde_json::json!({ "ok": true }));
    Ok(warp::reply::with_header(reply, header::SET_COOKIE, clear_cookie_header()))
}

pub async fn handle_register(req: RegisterRequest, users: Arc<UserStore>) -> Result<impl Reply, Rejection> {
    let record = users
        .register(&req.username, &req.password, Role::Viewer, Vec::new())
        .map_err(|e| match e {
            nova_types::error::NovaError::SchemaError { .. } => ApiError::UsernameTaken,
            other => other.into(),
        })?;
    Ok(warp::reply::with_status(
        warp::reply::json(&PublicUser::from(&record)),
        warp::http::StatusCode::CREATED,
    ))
}

pub async fn handle_me(session: Session, users: Arc<UserStore>) -> Result<impl Reply, Rejection> {
    let record = users.get(&session.username).ok_or(ApiError::Unauthenticated)?;
    Ok(warp::reply::json(&PublicUser::from(&record)))
}

fn session_token_from_cookie(cookie_header: Option<String>) -> Option<String> {
    let header = cookie_header?;
    header.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix(&format!("{}=", COOKIE_NAME)).map(|v| v.to_owned())
    })
}

pub fn optional_session_token(cookie: Option<String>) -> Option<String> {
    session_token_from_cookie(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_token_extraction_ignores_other_cookies() {
        let header = "foo=bar; nova_session=abc123; baz=qux".to_owned();
        assert_eq!(session_token_from_cookie(Some(header)).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_is_none() {
        assert_eq!(session_token_from_cookie(None), None);
        assert_eq!(session_token_from_cookie(Some("foo=bar".to_owned())), None);
    }
}
