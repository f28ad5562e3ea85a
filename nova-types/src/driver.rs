use crate::lane::{Lane, MessageType};
use serde::{Deserialize, Serialize};

/// Identifies a registered driver, deterministically selected by
/// `(lane, messageType)` precedence (§4.7).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverDescriptor {
    pub driver_id: DriverId,
    pub version: u32,
    pub lane: Lane,
    pub message_type: Option<MessageType>,
    pub output_filename: String,
}
