use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestId(String);

impl ManifestId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestVersion(pub u32);

impl fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A NOVA-owned schema for a `viewId`: the set of keys a `ui` event's data
/// is allowed to carry. Newer versions of a manifest are additive only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub manifest_id: ManifestId,
    pub version: ManifestVersion,
    pub view_id: String,
    pub allowed_keys: BTreeSet<String>,
}

/// The metadata-lane truth event emitted when a manifest is published,
/// giving UI schema a time-versioned history (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestPublished {
    pub manifest: Manifest,
}
