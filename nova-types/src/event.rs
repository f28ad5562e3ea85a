use crate::{
    identity::{Identity, ScopeId},
    lane::{Lane, MessageType},
    manifest::{ManifestId, ManifestVersion},
    timestamp::Timestamp,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};
use uuid::Uuid;

/// Globally unique, producer-issued (or Normalizer-minted) event identifier.
///
/// Minted ids are UUIDv7 so that, absent an explicit id, lexicographic order
/// on `eventId` roughly tracks insertion order — useful only as a tie-break,
/// never relied on for the total order itself.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn mint() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The event payload: either an opaque byte frame (`raw` lane) or a
/// structured JSON value (every other lane).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Bytes(#[serde(with = "bytes_as_base64")] Vec<u8>),
    Json(serde_json::Value),
}

mod bytes_as_base64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64_decode(&s).map_err(D::Error::custom)
    }

    // Minimal, dependency-free base64 so `Payload::Bytes` round-trips through JSON
    // without pulling in a codec crate solely for this.
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub fn base64_encode(data: &[u8]) -> String {
        let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32);
            out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
            out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
            out.push(if chunk.len() > 1 { ALPHABET[(n >> 6 & 0x3f) as usize] as char } else { '=' });
            out.push(if chunk.len() > 2 { ALPHABET[(n & 0x3f) as usize] as char } else { '=' });
        }
        out
    }

    pub fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
        fn val(c: u8) -> Result<u32, String> {
            match c {
                b'A'..=b'Z' => Ok((c - b'A') as u32),
                b'a'..=b'z' => Ok((c - b'a' + 26) as u32),
                b'0'..=b'9' => Ok((c - b'0' + 52) as u32),
                b'+' => Ok(62),
                b'/' => Ok(63),
                _ => Err(format!("invalid base64 byte: {}", c)),
            }
        }
        let s = s.trim_end_matches('=');
        let bytes = s.as_bytes();
        let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
        for chunk in bytes.chunks(4) {
            let mut n = 0u32;
            for (i, &c) in chunk.iter().enumerate() {
                n |= val(c)? << (18 - 6 * i);
            }
            out.push((n >> 16 & 0xff) as u8);
            if chunk.len() > 2 {
                out.push((n >> 8 & 0xff) as u8);
            }
            if chunk.len() > 3 {
                out.push((n & 0xff) as u8);
            }
        }
        Ok(out)
    }
}

/// A fully materialized truth row, as stored and as returned from range/tail
/// queries. `canonicalTruthTime` is assigned by the Ingest Normalizer and is
/// never rewritten once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: EventId,
    pub scope_id: ScopeId,
    pub lane: Lane,
    pub identity: Identity,
    pub message_type: Option<MessageType>,
    pub source_truth_time: Option<Timestamp>,
    pub canonical_truth_time: Timestamp,
    pub effective_time: Option<Timestamp>,
    pub payload: Payload,
    /// Populated only for `ui` events: the manifest this presentation intent conforms to.
    pub manifest: Option<(ManifestId, ManifestVersion)>,
}

impl Event {
    /// `(canonicalTruthTime, eventId)` — the store's total order (§3).
    pub fn sort_key(&self) -> (Timestamp, &EventId) {
        (self.canonical_truth_time, &self.event_id)
    }
}

/// An unpersisted event as accepted from a producer, prior to normalization.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub event_id: Option<EventId>,
    pub scope_id: ScopeId,
    pub lane: Lane,
    pub identity: Identity,
    pub message_type: Option<MessageType>,
    pub source_truth_time: Option<Timestamp>,
    pub effective_time: Option<Timestamp>,
    pub payload: Payload,
    pub manifest: Option<(ManifestId, ManifestVersion)>,
}

/// Ordering helper used by the Truth Store's index and by range-scan merges.
pub fn total_order_cmp(a: &Event, b: &Event) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let data = b"hello nova \x00\x01\xff".to_vec();
        let encoded = bytes_as_base64::base64_encode(&data);
        let decoded = bytes_as_base64::base64_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn payload_json_round_trips_through_serde() {
        let p = Payload::Bytes(vec![1, 2, 3, 4]);
        let s = serde_json::to_string(&p).unwrap();
        let back: Payload = serde_json::from_str(&s).unwrap();
        assert_eq!(p, back);
    }
}
