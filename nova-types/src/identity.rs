use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_scalar {
    ($name:ident) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_scalar!(SystemId);
string_scalar!(ContainerId);
string_scalar!(UniqueId);
string_scalar!(ScopeId);

/// The ordered triple that names an entity: `(systemId, containerId, uniqueId)`.
///
/// Ordering is lexicographic on the triple, which is what the presentation
/// store and driver output layout (`{systemId}/{containerId}/{uniqueId}/...`)
/// rely on for directory grouping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub system_id: SystemId,
    pub container_id: ContainerId,
    pub unique_id: UniqueId,
}

impl Identity {
    pub fn new(system_id: impl Into<SystemId>, container_id: impl Into<ContainerId>, unique_id: impl Into<UniqueId>) -> Self {
        Self {
            system_id: system_id.into(),
            container_id: container_id.into(),
            unique_id: unique_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.system_id, self.container_id, self.unique_id)
    }
}
