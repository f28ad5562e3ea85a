//! The Ingest Normalizer (§4.1): assigns `eventId`/`canonicalTruthTime`,
//! enforces monotonicity within `(scope, lane)`, and rejects malformed or
//! manifest-unknown events before they ever reach the Truth Store.

use crate::truth_store::TruthStore;
use nova_types::{
    error::{NovaError, NovaResult},
    event::{Event, EventId, IngestRequest},
    lane::Lane,
    timestamp::Timestamp,
};

#[derive(Debug, Clone)]
pub struct InsertAck {
    pub event_id: EventId,
    pub canonical_truth_time: Timestamp,
    pub duplicate: bool,
    /// The row as appended, present only when this call actually inserted
    /// it — callers route this through the Driver Registry for real-time
    /// output (§4.7); a duplicate re-delivers nothing new to write.
    pub event: Option<Event>,
}

#[derive(Clone)]
pub struct IngestNormalizer {
    store: TruthStore,
}

impl IngestNormalizer {
    pub fn new(store: TruthStore) -> Self {
        Self { store }
    }

    /// `insert(event) -> {eventId, canonicalTruthTime, duplicate?}` —
    /// idempotent on `eventId` (§4.1).
    pub fn insert(&self, request: IngestRequest) -> NovaResult<InsertAck> {
        self.validate(&request)?;

        let event_id = request.event_id.clone().unwrap_or_else(EventId::mint);

        if self.store.exists(&request.scope_id, &event_id)? {
            // Re-fetch the prior canonical time so the ACK matches the
            // first insert exactly, as §7's DuplicateEvent contract requires.
            let prior = self
                .store
                .range(
                    &request.scope_id,
                    &[request.lane],
                    Timestamp::new(0),
                    Timestamp::new(u64::MAX),
                    &Default::default(),
                )?
                .into_iter()
                .find(|e| e.event_id == event_id)
                .ok_or_else(|| NovaError::StoreUnavailable {
                    message: "duplicate detected but row vanished".into(),
                })?;
            return Ok(InsertAck {
                event_id,
                canonical_truth_time: prior.canonical_truth_time,
                duplicate: true,
                event: None,
            });
        }

        let canonical_truth_time = self.assign_canonical_time(&request)?;

        let event = Event {
            event_id: event_id.clone(),
            scope_id: request.scope_id.clone(),
            lane: request.lane,
            identity: request.identity,
            message_type: request.message_type,
            source_truth_time: request.source_truth_time,
            canonical_truth_time,
            effective_time: request.effective_time,
            payload: request.payload,
            manifest: request.manifest,
        };

        self.store.append(&event)?;

        Ok(InsertAck {
            event_id,
            canonical_truth_time,
            duplicate: false,
            event: Some(event),
        })
    }

    fn validate(&self, request: &IngestRequest) -> NovaResult<()> {
        if request.identity.system_id.as_str().is_empty()
            || request.identity.container_id.as_str().is_empty()
            || request.identity.unique_id.as_str().is_empty()
        {
            return Err(NovaError::schema("identity triple must be fully populated"));
        }
        if request.lane == Lane::Stream {
            return Err(NovaError::schema("`stream` is a synthetic lane; it cannot be ingested"));
        }
        if request.lane == Lane::Ui {
            let (manifest_id, version) = request
                .manifest
                .as_ref()
                .ok_or_else(|| NovaError::schema("ui events must reference a manifestId/version"))?;
            if !self.store.has_manifest(&request.scope_id, manifest_id.as_str(), version.0)? {
                return Err(NovaError::UnknownManifest {
                    manifest_id: manifest_id.as_str().to_owned(),
                    version: version.0,
                });
            }
        }
        Ok(())
    }

    /// `canonicalTruthTime` is `max(prev + epsilon, now_or_source)` so it
    /// never decreases within `(scope, lane)` (I3).
    fn assign_canonical_time(&self, request: &IngestRequest) -> NovaResult<Timestamp> {
        let proposed = request.source_truth_time.unwrap_or_else(Timestamp::now);
        let prev = self.store.max_canonical_time(&request.scope_id, request.lane)?;
        Ok(match prev {
            Some(prev) if proposed <= prev => prev.saturating_add(Timestamp::EPSILON),
            _ => proposed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_types::{
        event::Payload,
        identity::{Identity, ScopeId},
    };

    fn req(source_time: u64) -> IngestRequest {
        IngestRequest {
            event_id: None,
            scope_id: ScopeId::new("s1"),
            lane: Lane::Raw,
            identity: Identity::new("sys", "cont", "uid"),
            message_type: None,
            source_truth_time: Some(Timestamp::new(source_time)),
            effective_time: None,
            payload: Payload::Json(serde_json::json!({})),
            manifest: None,
        }
    }

    #[test]
    fn assigns_monotonic_canonical_time_even_when_source_time_regresses() {
        let store = TruthStore::open_in_memory().unwrap();
        let normalizer = IngestNormalizer::new(store);

        let first = normalizer.insert(req(1000)).unwrap();
        let second = normalizer.insert(req(500)).unwrap();

        assert!(second.canonical_truth_time > first.canonical_truth_time);
    }

    #[test]
    fn reinsert_of_same_event_id_is_a_no_op() {
        let store = TruthStore::open_in_memory().unwrap();
        let normalizer = IngestNormalizer::new(store);

        let mut request = req(1000);
        request.event_id = Some(EventId::new("fixed"));
        let first = normalizer.insert(request.clone()).unwrap();
        assert!(!first.duplicate);
        let second = normalizer.insert(request).unwrap();
        assert!(second.duplicate);
        assert_eq!(second.canonical_truth_time, first.canonical_truth_time);
    }

    #[test]
    fn ui_event_without_known_manifest_is_rejected() {
        let store = TruthStore::open_in_memory().unwrap();
        let normalizer = IngestNormalizer::new(store);
        let mut request = req(1000);
        request.lane = Lane::Ui;
        request.manifest = Some((nova_types::manifest::ManifestId::new("m1"), nova_types::manifest::ManifestVersion(1)));
        let err = normalizer.insert(request).unwrap_err();
        assert!(matches!(err, NovaError::UnknownManifest { .. }));
    }
}
