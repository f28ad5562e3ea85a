//! Sanitized, JSON-file-backed user records (§6 "Persisted state": `data/users.json`),
//! the same flat-file persistence style the teacher's node storage uses for
//! its own settings, with passwords hashed via `bcrypt` and never returned
//! in a response (§4.5, §6).

use nova_types::error::{NovaError, NovaResult};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};

/// What a session may do (§4.5): `read` is implied by holding any role;
/// `command` gates `submitCommand`/`export`; `admin` gates user/scope CRUD.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn can_command(self) -> bool {
        matches!(self, Role::Operator | Role::Admin)
    }

    pub fn can_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub allowed_scopes: Vec<String>,
}

/// `UserRecord` with the hash stripped, the shape returned from any HTTP
/// response (§6's "no password hash in responses").
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub role: Role,
    pub allowed_scopes: Vec<String>,
}

impl From<&UserRecord> for PublicUser {
    fn from(u: &UserRecord) -> Self {
        PublicUser {
            username: u.username.clone(),
            role: u.role,
            allowed_scopes: u.allowed_scopes.clone(),
        }
    }
}

pub struct UserStore {
    path: PathBuf,
    users: parking_lot::Mutex<HashMap<String, UserRecord>>,
}

impl UserStore {
    pub fn new(data_root: PathBuf) -> NovaResult<Self> {
        let path = data_root.join("users.json");
        let users = load(&path)?;
        Ok(Self { path, users: parking_lot::Mutex::new(users) })
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<UserRecord> {
        let users = self.users.lock();
        let record = users.get(username)?;
        if bcrypt::verify(password, &record.password_hash).unwrap_or(false) {
            Some(record.clone())
        } else {
            None
        }
    }

    pub fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.lock().get(username).cloned()
    }

    pub fn list(&self) -> Vec<UserRecord> {
        self.users.lock().values().cloned().collect()
    }

    pub fn register(&self, username: &str, password: &str, role: Role, allowed_scopes: Vec<String>) -> NovaResult<UserRecord> {
        let mut users = self.users.lock();
        if users.contains_key(username) {
            return Err(NovaError::schema(format!("username {} already registered", username)));
        }
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let record = UserRecord {
            username: username.to_owned(),
            password_hash,
            role,
            allowed_scopes,
        };
        users.insert(username.to_owned(), record.clone());
        drop(users);
        self.persist()?;
        Ok(record)
    }

    pub fn set_allowed_scopes(&self, username: &str, scopes: Vec<String>) -> NovaResult<UserRecord> {
        let mut users = self.users.lock();
        let record = users
            .get_mut(username)
            .ok_or_else(|| NovaError::NotFound { what: format!("user {}", username) })?;
        record.allowed_scopes = scopes;
        let record = record.clone();
        drop(users);
        self.persist()?;
        Ok(record)
    }

    pub fn delete(&self, username: &str) -> NovaResult<()> {
        let removed = self.users.lock().remove(username).is_some();
        if !removed {
            return Err(NovaError::NotFound { what: format!("user {}", username) });
        }
        self.persist()
    }

    fn persist(&self) -> NovaResult<()> {
        let users = self.users.lock();
        let list: Vec<&UserRecord> = users.values().collect();
        let body = serde_json::to_string_pretty(&list).expect("users always serialize");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        }
        fs::write(&self.path, body).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })
    }
}

fn load(path: &PathBuf) -> NovaResult<HashMap<String, UserRecord>> {
    match fs::read_to_string(path) {
        Ok(body) => {
            let list: Vec<UserRecord> =
                serde_json::from_str(&body).map_err(|e| NovaError::SchemaError { message: e.to_string() })?;
            Ok(list.into_iter().map(|u| (u.username.clone(), u)).collect())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(NovaError::StoreUnavailable { message: e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_rejects_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().to_path_buf()).unwrap();
        store.register("alice", "hunter2", Role::Operator, vec!["scope-a".into()]).unwrap();
        assert!(store.authenticate("alice", "wrong").is_none());
        assert!(store.authenticate("alice", "hunter2").is_some());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().to_path_buf()).unwrap();
        store.register("alice", "pw", Role::Viewer, vec![]).unwrap();
        let err = store.register("alice", "pw2", Role::Viewer, vec![]).unwrap_err();
        assert!(matches!(err, NovaError::SchemaError { .. }));
    }

    #[test]
    fn users_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UserStore::new(dir.path().to_path_buf()).unwrap();
            store.register("alice", "pw", Role::Admin, vec![]).unwrap();
        }
        let reloaded = UserStore::new(dir.path().to_path_buf()).unwrap();
        assert!(reloaded.get("alice").is_some());
    }
}
