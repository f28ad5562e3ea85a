use serde::{Deserialize, Serialize};

/// The error taxonomy of §7, propagated as typed kinds rather than stack
/// traces so the Server edge and IPC layer can map each one to a stable
/// wire representation without string-sniffing.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "camelCase")]
pub enum NovaError {
    #[display(fmt = "schema error: {}", message)]
    SchemaError { message: String },

    #[display(fmt = "unknown manifest {}/{}", manifest_id, version)]
    UnknownManifest { manifest_id: String, version: u32 },

    #[display(fmt = "duplicate event")]
    DuplicateEvent,

    #[display(fmt = "commands are not allowed while the client is in REPLAY mode")]
    ReplayNotAllowed,

    #[display(fmt = "permission denied: requires '{}'", capability)]
    PermissionDenied { capability: String },

    #[display(fmt = "a scope must be specified; the user has access to more than one")]
    ScopeRequired,

    #[display(fmt = "scope '{}' is outside the user's allowed scopes", scope_id)]
    ScopeForbidden { scope_id: String },

    #[display(fmt = "stream definition already exists for {}", endpoint)]
    EndpointConflict { endpoint: String },

    #[display(fmt = "not found: {}", what)]
    NotFound { what: String },

    #[display(fmt = "operation timed out after {}ms", millis)]
    Timeout { millis: u64 },

    #[display(fmt = "store unavailable: {}", message)]
    StoreUnavailable { message: String },
}

impl NovaError {
    pub fn schema(message: impl Into<String>) -> Self {
        NovaError::SchemaError { message: message.into() }
    }

    /// Whether a caller may reasonably retry this failure (§7: only
    /// `StoreUnavailable` is retryable by policy, everything else is a
    /// contract violation that will fail again unchanged).
    pub fn is_retryable(&self) -> bool {
        matches!(self, NovaError::StoreUnavailable { .. })
    }
}

pub type NovaResult<T> = Result<T, NovaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tag() {
        let e = NovaError::NotFound { what: "run 7".into() };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["error"], "notFound");
    }
}
