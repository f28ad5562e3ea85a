use crate::{
    identity::{ContainerId, SystemId, UniqueId},
    lane::MessageType,
};
use serde::{Deserialize, Serialize};

/// All optional, ANDed, identity/message-type filters a range scan or tail
/// subscription can carry (§4.2). Lane selection is always explicit and
/// lives alongside this struct at the call site, never inside it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<UniqueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl EventFilters {
    pub fn matches(&self, identity: &crate::identity::Identity, message_type: Option<&MessageType>) -> bool {
        if let Some(s) = &self.system_id {
            if s != &identity.system_id {
                return false;
            }
        }
        if let Some(c) = &self.container_id {
            if c != &identity.container_id {
                return false;
            }
        }
        if let Some(u) = &self.unique_id {
            if u != &identity.unique_id {
                return false;
            }
        }
        if let Some(mt) = &self.message_type {
            if Some(mt) != message_type {
                return false;
            }
        }
        true
    }

    /// `payloadOnly` output format requires all three identity filters set
    /// so it resolves to exactly one identity (§4.6, B3).
    pub fn resolves_single_identity(&self) -> bool {
        self.system_id.is_some() && self.container_id.is_some() && self.unique_id.is_some()
    }
}
