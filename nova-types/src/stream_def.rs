use crate::{filters::EventFilters, lane::MessageType, playback::Backpressure};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Websocket,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "tcp",
            Protocol::Websocket => "websocket",
            Protocol::Udp => "udp",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    PayloadOnly,
    HierarchyPerMessage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// An output stream's persisted configuration (§4.6). Runtime sessions are
/// ephemeral and live only in the Output Stream Manager's in-memory table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDefinition {
    pub stream_id: String,
    pub name: String,
    pub protocol: Protocol,
    /// TCP: a port. UDP: `host:port`. WebSocket: a URL path segment.
    pub endpoint: String,
    pub lane: crate::lane::Lane,
    pub filters: EventFilters,
    pub message_type_filter: Option<MessageType>,
    pub output_format: OutputFormat,
    pub backpressure: Backpressure,
    pub enabled: bool,
    pub visibility: Visibility,
}

impl StreamDefinition {
    /// Normalizes `(protocol, endpoint)` for the uniqueness check (§9 open
    /// question): TCP ports are compared numerically, not as raw strings,
    /// so `"8080"` and `"08080"` collide.
    pub fn uniqueness_key(&self) -> (Protocol, String) {
        let endpoint = match self.protocol {
            Protocol::Tcp => self
                .endpoint
                .parse::<u16>()
                .map(|p| p.to_string())
                .unwrap_or_else(|_| self.endpoint.clone()),
            Protocol::Udp => self.endpoint.to_ascii_lowercase(),
            Protocol::Websocket => self.endpoint.clone(),
        };
        (self.protocol, endpoint)
    }

    pub fn validate(&self) -> Result<(), crate::error::NovaError> {
        if self.output_format == OutputFormat::PayloadOnly && !self.filters.resolves_single_identity() {
            return Err(crate::error::NovaError::schema(
                "payloadOnly output format requires systemId, containerId and uniqueId filters",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::Lane;

    fn base() -> StreamDefinition {
        StreamDefinition {
            stream_id: "s1".into(),
            name: "test".into(),
            protocol: Protocol::Tcp,
            endpoint: "8080".into(),
            lane: Lane::Raw,
            filters: EventFilters::default(),
            message_type_filter: None,
            output_format: OutputFormat::HierarchyPerMessage,
            backpressure: Backpressure::CatchUp,
            enabled: true,
            visibility: Visibility::Public,
        }
    }

    #[test]
    fn tcp_ports_normalize_numerically() {
        let mut a = base();
        a.endpoint = "8080".into();
        let mut b = base();
        b.endpoint = "08080".into();
        assert_eq!(a.uniqueness_key(), b.uniqueness_key());
    }

    #[test]
    fn payload_only_requires_full_identity_filter() {
        let mut d = base();
        d.output_format = OutputFormat::PayloadOnly;
        assert!(d.validate().is_err());
    }
}
