//! The admin-managed scope catalog (§6's `/api/admin/scopes`). Scopes
//! themselves are just tenant names truth events carry; this store is pure
//! bookkeeping for the admin UI, not referenced by the Core at all — a
//! small JSON file in the same style as `OutputStreamManager`'s definitions.

use nova_types::error::{NovaError, NovaResult};
use std::{collections::BTreeSet, fs, path::PathBuf};

pub struct ScopeStore {
    path: PathBuf,
    scopes: parking_lot::Mutex<BTreeSet<String>>,
}

impl ScopeStore {
    pub fn new(data_root: PathBuf) -> NovaResult<Self> {
        let path = data_root.join("scopes.json");
        let scopes = load(&path)?;
        Ok(Self { path, scopes: parking_lot::Mutex::new(scopes) })
    }

    pub fn list(&self) -> Vec<String> {
        self.scopes.lock().iter().cloned().collect()
    }

    pub fn create(&self, scope_id: String) -> NovaResult<()> {
        let mut scopes = self.scopes.lock();
        if !scopes.insert(scope_id) {
            return Err(NovaError::schema("scope already registered"));
        }
        drop(scopes);
        self.persist()
    }

    fn persist(&self) -> NovaResult<()> {
        let scopes = self.scopes.lock();
        let list: Vec<&String> = scopes.iter().collect();
        let body = serde_json::to_string_pretty(&list).expect("scopes always serialize");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        }
        fs::write(&self.path, body).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })
    }
}

fn load(path: &PathBuf) -> NovaResult<BTreeSet<String>> {
    match fs::read_to_string(path) {
        Ok(body) => serde_json::from_str(&body).map_err(|e| NovaError::SchemaError { message: e.to_string() }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(NovaError::StoreUnavailable { message: e.to_string() }),
    }
}
