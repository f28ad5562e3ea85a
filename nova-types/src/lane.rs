use serde::{Deserialize, Serialize};
use std::fmt;

/// The six parallel streams every truth event is filed under (§3).
///
/// `stream` is synthetic: no event is ever ingested with this lane, it
/// exists only as the Output Stream Manager's fan-out tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lane {
    Raw,
    Parsed,
    Metadata,
    Ui,
    Command,
    Stream,
}

impl Lane {
    pub const ALL: [Lane; 6] = [Lane::Raw, Lane::Parsed, Lane::Metadata, Lane::Ui, Lane::Command, Lane::Stream];

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Raw => "raw",
            Lane::Parsed => "parsed",
            Lane::Metadata => "metadata",
            Lane::Ui => "ui",
            Lane::Command => "command",
            Lane::Stream => "stream",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A producer-assigned message type within the `parsed`, `metadata`, `ui`,
/// or `command` lanes (e.g. `"Position"`, `"ManifestPublished"`, `"ChatMessage"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
impl From<String> for MessageType {
    fn from(s: String) -> Self {
        Self(s)
    }
}
