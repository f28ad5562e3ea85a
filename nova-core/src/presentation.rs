//! The Presentation Store (§4.9): three-layer override resolution
//! (factory default < admin default < user override) for each
//! `(scopeId, uniqueId)`, persisted as small JSON files rather than truth
//! events since presentation is mutable operator state, not a fact stream.

use nova_types::{
    error::{NovaError, NovaResult},
    identity::{ScopeId, UniqueId},
    presentation::PresentationOverride,
};
use std::{collections::HashMap, fs, path::PathBuf};

pub struct PresentationStore {
    data_root: PathBuf,
}

impl PresentationStore {
    pub fn new(data_root: PathBuf) -> Self {
        Self { data_root }
    }

    fn admin_path(&self, scope_id: &ScopeId, unique_id: &UniqueId) -> PathBuf {
        self.data_root
            .join("presentation")
            .join("admin")
            .join(scope_id.as_str())
            .join(format!("{}.json", unique_id.as_str()))
    }

    fn user_path(&self, username: &str, scope_id: &ScopeId, unique_id: &UniqueId) -> PathBuf {
        self.data_root
            .join("presentation")
            .join("users")
            .join(username)
            .join(scope_id.as_str())
            .join(format!("{}.json", unique_id.as_str()))
    }

    fn read(path: &PathBuf) -> NovaResult<PresentationOverride> {
        match fs::read_to_string(path) {
            Ok(body) => serde_json::from_str(&body).map_err(|e| NovaError::SchemaError { message: e.to_string() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PresentationOverride::default()),
            Err(e) => Err(NovaError::StoreUnavailable { message: e.to_string() }),
        }
    }

    fn write(path: &PathBuf, value: &PresentationOverride) -> NovaResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        }
        let body = serde_json::to_string_pretty(value).expect("PresentationOverride always serializes");
        fs::write(path, body).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })
    }

    /// Factory default is the code-level zero value; callers that need a
    /// richer default should layer their own `PresentationOverride` under
    /// this store's `resolve` result rather than here.
    pub fn resolve(&self, username: &str, scope_id: &ScopeId, unique_id: &UniqueId) -> NovaResult<PresentationOverride> {
        let factory = PresentationOverride::default();
        let admin = Self::read(&self.admin_path(scope_id, unique_id))?;
        let user = Self::read(&self.user_path(username, scope_id, unique_id))?;
        Ok(factory.merged_under(&admin).merged_under(&user))
    }

    /// Resolves every `uniqueId` known under a scope in one pass, for the
    /// initial presentation payload a client loads before subscribing.
    pub fn resolve_all(
        &self,
        username: &str,
        scope_id: &ScopeId,
        unique_ids: &[UniqueId],
    ) -> NovaResult<HashMap<UniqueId, PresentationOverride>> {
        let mut out = HashMap::new();
        for unique_id in unique_ids {
            out.insert(unique_id.clone(), self.resolve(username, scope_id, unique_id)?);
        }
        Ok(out)
    }

    pub fn set_admin_default(
        &self,
        scope_id: &ScopeId,
        unique_id: &UniqueId,
        value: PresentationOverride,
    ) -> NovaResult<()> {
        Self::write(&self.admin_path(scope_id, unique_id), &sanitize(value))
    }

    pub fn set_user_override(
        &self,
        username: &str,
        scope_id: &ScopeId,
        unique_id: &UniqueId,
        value: PresentationOverride,
    ) -> NovaResult<()> {
        Self::write(&self.user_path(username, scope_id, unique_id), &sanitize(value))
    }
}

/// Drops only the keys that fail validation (§4.9, B4): an out-of-range
/// `scale` is cleared, every other key in the same write is kept. There is
/// never a reason to reject the whole call over one bad key.
fn sanitize(mut value: PresentationOverride) -> PresentationOverride {
    if let Some(scale) = value.scale {
        if !PresentationOverride::is_valid_scale(scale) {
            value.scale = None;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_override_wins_over_admin_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresentationStore::new(dir.path().to_path_buf());
        let scope = ScopeId::new("s1");
        let uid = UniqueId::from("u1");

        store
            .set_admin_default(
                &scope,
                &uid,
                PresentationOverride {
                    display_name: Some("Admin Name".into()),
                    color: Some([1, 2, 3]),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set_user_override(
                "alice",
                &scope,
                &uid,
                PresentationOverride {
                    display_name: Some("Alice's Name".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let resolved = store.resolve("alice", &scope, &uid).unwrap();
        assert_eq!(resolved.display_name.as_deref(), Some("Alice's Name"));
        assert_eq!(resolved.color, Some([1, 2, 3]));
    }

    #[test]
    fn unset_keys_fall_through_to_factory_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresentationStore::new(dir.path().to_path_buf());
        let resolved = store.resolve("bob", &ScopeId::new("s1"), &UniqueId::from("nonexistent")).unwrap();
        assert_eq!(resolved, PresentationOverride::default());
    }

    #[test]
    fn out_of_range_scale_is_dropped_but_other_keys_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresentationStore::new(dir.path().to_path_buf());
        let scope = ScopeId::new("s1");
        let uid = UniqueId::from("u1");

        store
            .set_admin_default(
                &scope,
                &uid,
                PresentationOverride {
                    display_name: Some("Admin Name".into()),
                    scale: Some(99.0),
                    ..Default::default()
                },
            )
            .unwrap();

        let resolved = store.resolve("bob", &scope, &uid).unwrap();
        assert_eq!(resolved.display_name.as_deref(), Some("Admin Name"));
        assert_eq!(resolved.scale, None);
    }
}
