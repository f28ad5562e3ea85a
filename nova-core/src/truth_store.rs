//! The append-only, indexed truth log (§4.2). Backed by `rusqlite`: one
//! table per instance, indexed on `(scope, lane, canonical_truth_time,
//! event_id)`. A `tokio::sync::broadcast` channel fans out freshly
//! appended events to `tail` subscribers without the store having to track
//! subscriber state itself, the way `util::sampled_broadcast` decouples
//! the teacher's producer side from slow consumers — except here we keep
//! full delivery (via `recv` backlog semantics) rather than latest-only,
//! since truth events must not be silently dropped mid-tail.

use nova_types::{
    cursor::Cursor,
    error::{NovaError, NovaResult},
    event::{total_order_cmp, Event, EventId, Payload},
    filters::EventFilters,
    identity::{Identity, ScopeId},
    lane::Lane,
    playback::Timebase,
    timestamp::Timestamp,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::{path::Path, sync::Arc};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct TruthStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Event>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    scope_id TEXT NOT NULL,
    lane TEXT NOT NULL,
    canonical_truth_time INTEGER NOT NULL,
    event_id TEXT NOT NULL,
    system_id TEXT NOT NULL,
    container_id TEXT NOT NULL,
    unique_id TEXT NOT NULL,
    message_type TEXT,
    body TEXT NOT NULL,
    PRIMARY KEY (scope_id, event_id)
);
CREATE INDEX IF NOT EXISTS events_order ON events (scope_id, lane, canonical_truth_time, event_id);
CREATE INDEX IF NOT EXISTS events_request_id ON events (scope_id, json_extract(body, '$.payload.requestId'));
";

impl TruthStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        let (changes, _) = broadcast::channel(4096);
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                changes,
            }),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        let (changes, _) = broadcast::channel(4096);
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                changes,
            }),
        })
    }

    /// Atomic append with dedupe on `eventId` (I1). Returns `true` if the
    /// row was newly inserted, `false` if it was already present.
    pub fn append(&self, event: &Event) -> NovaResult<bool> {
        let conn = self.inner.conn.lock();
        let body = serde_json::to_string(event).expect("Event always serializes");
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO events
                 (scope_id, lane, canonical_truth_time, event_id, system_id, container_id, unique_id, message_type, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.scope_id.as_str(),
                    event.lane.as_str(),
                    event.canonical_truth_time.as_micros() as i64,
                    event.event_id.as_str(),
                    event.identity.system_id.as_str(),
                    event.identity.container_id.as_str(),
                    event.identity.unique_id.as_str(),
                    event.message_type.as_ref().map(|m| m.as_str()),
                    body,
                ],
            )
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        drop(conn);
        if inserted == 1 {
            // Subscribers lagging or absent simply miss this send; `tail`
            // always re-reads the backlog from its cursor before trusting
            // the broadcast, so no event is lost that way.
            let _ = self.inner.changes.send(event.clone());
        }
        Ok(inserted == 1)
    }

    /// The highest `canonicalTruthTime` currently recorded for `(scope,
    /// lane)`, used by the Ingest Normalizer to enforce monotonicity (I3).
    pub fn max_canonical_time(&self, scope_id: &ScopeId, lane: Lane) -> NovaResult<Option<Timestamp>> {
        let conn = self.inner.conn.lock();
        let t: Option<i64> = conn
            .query_row(
                "SELECT MAX(canonical_truth_time) FROM events WHERE scope_id = ?1 AND lane = ?2",
                params![scope_id.as_str(), lane.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?
            .flatten();
        Ok(t.map(|v| Timestamp::new(v as u64)))
    }

    pub fn exists(&self, scope_id: &ScopeId, event_id: &EventId) -> NovaResult<bool> {
        let conn = self.inner.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE scope_id = ?1 AND event_id = ?2",
                params![scope_id.as_str(), event_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(n > 0)
    }

    /// `manifestId`/`version` existence check used by the Ingest Normalizer
    /// to reject `ui` events referencing an unpublished manifest.
    pub fn has_manifest(&self, scope_id: &ScopeId, manifest_id: &str, version: u32) -> NovaResult<bool> {
        let conn = self.inner.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events
                 WHERE scope_id = ?1 AND lane = 'metadata' AND message_type = 'ManifestPublished'
                   AND json_extract(body, '$.payload.manifest.manifestId') = ?2
                   AND json_extract(body, '$.payload.manifest.version') = ?3",
                params![scope_id.as_str(), manifest_id, version],
                |row| row.get(0),
            )
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(n > 0)
    }

    /// The existing `CommandResponse`-producing row for a `requestId`, if
    /// one was already recorded (I5 idempotency).
    pub fn find_command_by_request_id(&self, scope_id: &ScopeId, request_id: &str) -> NovaResult<Option<Event>> {
        let conn = self.inner.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM events
                 WHERE scope_id = ?1 AND lane = 'command'
                   AND json_extract(body, '$.payload.requestId') = ?2
                 LIMIT 1",
                params![scope_id.as_str(), request_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(body.map(|b| serde_json::from_str(&b).expect("stored events always deserialize")))
    }

    /// `range(scope, lanes, startTime, stopTime, filters)` — I2: every
    /// matching event in `[startTime, stopTime]`, in total order, and no
    /// others. Compares against `canonicalTruthTime` (§3, Run).
    pub fn range(
        &self,
        scope_id: &ScopeId,
        lanes: &[Lane],
        start_time: Timestamp,
        stop_time: Timestamp,
        filters: &EventFilters,
    ) -> NovaResult<Vec<Event>> {
        self.range_by(scope_id, lanes, start_time, stop_time, Timebase::Canonical, filters)
    }

    /// `range` with the comparison axis made explicit (§3, §4.4, §4.7): a
    /// `Source`-timebase range compares against each event's
    /// `sourceTruthTime` instead of `canonicalTruthTime`. The table is only
    /// indexed on `canonicalTruthTime`, so a `Source` range scans every
    /// event for the scope/lanes and filters in memory; events carrying no
    /// `sourceTruthTime` have nothing to compare against and are excluded.
    pub fn range_by(
        &self,
        scope_id: &ScopeId,
        lanes: &[Lane],
        start_time: Timestamp,
        stop_time: Timestamp,
        timebase: Timebase,
        filters: &EventFilters,
    ) -> NovaResult<Vec<Event>> {
        if stop_time < start_time {
            return Err(NovaError::schema("stopTime must be >= startTime"));
        }
        let conn = self.inner.conn.lock();
        let lane_list: Vec<&str> = lanes.iter().map(|l| l.as_str()).collect();
        let placeholders = lane_list.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = match timebase {
            Timebase::Canonical => format!(
                "SELECT body FROM events
                 WHERE scope_id = ? AND canonical_truth_time BETWEEN ? AND ?
                   AND lane IN ({placeholders})
                 ORDER BY canonical_truth_time ASC, event_id ASC"
            ),
            // Source-timebase bounds apply to sourceTruthTime, which isn't an
            // indexed column; fetch the scope/lane set unfiltered by time and
            // apply the bound below.
            Timebase::Source => format!(
                "SELECT body FROM events
                 WHERE scope_id = ?
                   AND lane IN ({placeholders})
                 ORDER BY canonical_truth_time ASC, event_id ASC"
            ),
        };
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let scope_key = scope_id.as_str().to_owned();
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(scope_key)];
        if let Timebase::Canonical = timebase {
            bound.push(Box::new(start_micros(start_time)));
            bound.push(Box::new(stop_micros(stop_time)));
        }
        for l in &lane_list {
            bound.push(Box::new(l.to_string()));
        }
        let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(bound_refs.as_slice(), |row| row.get::<_, String>(0))
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let mut events = Vec::new();
        for row in rows {
            let body = row.map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
            let event: Event = serde_json::from_str(&body).expect("stored events always deserialize");
            if !filters.matches(&event.identity, event.message_type.as_ref()) {
                continue;
            }
            match timebase {
                Timebase::Canonical => events.push(event),
                Timebase::Source => {
                    if let Some(source_time) = event.source_truth_time {
                        if source_time >= start_time && source_time <= stop_time {
                            events.push(event);
                        }
                    }
                }
            }
        }
        events.sort_by(total_order_cmp);
        Ok(events)
    }

    /// Cursor of the current log head for a scope (`getCursorHead`),
    /// independent of lane.
    pub fn cursor_head(&self, scope_id: &ScopeId) -> NovaResult<Cursor> {
        let conn = self.inner.conn.lock();
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT canonical_truth_time, event_id FROM events
                 WHERE scope_id = ?1
                 ORDER BY canonical_truth_time DESC, event_id DESC LIMIT 1",
                params![scope_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(match row {
            Some((t, id)) => Cursor::new(Timestamp::new(t as u64), EventId::new(id)),
            None => Cursor::min(),
        })
    }

    /// Everything strictly after `cursor`, in total order, for `tail`'s
    /// initial backlog catch-up.
    pub fn after_cursor(
        &self,
        scope_id: &ScopeId,
        lanes: &[Lane],
        cursor: &Cursor,
        filters: &EventFilters,
    ) -> NovaResult<Vec<Event>> {
        let head = self.cursor_head(scope_id)?;
        if head == Cursor::min() {
            return Ok(Vec::new());
        }
        let all = self.range(scope_id, lanes, cursor.canonical_truth_time(), Timestamp::new(u64::MAX), filters)?;
        Ok(all
            .into_iter()
            .filter(|e| &Cursor::new(e.canonical_truth_time, e.event_id.clone()) > cursor)
            .collect())
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<Event> {
        self.inner.changes.subscribe()
    }

    pub fn identity_known_payload(&self, identity: &Identity) -> bool {
        // Existence is inferred from any prior row for this identity; used
        // only for diagnostics, never to gate ingest.
        let conn = self.inner.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE system_id = ?1 AND container_id = ?2 AND unique_id = ?3 LIMIT 1",
                params![identity.system_id.as_str(), identity.container_id.as_str(), identity.unique_id.as_str()],
                |row| row.get(0),
            )
            .unwrap_or(0);
        n > 0
    }
}

fn start_micros(t: Timestamp) -> i64 {
    t.as_micros() as i64
}
fn stop_micros(t: Timestamp) -> i64 {
    t.as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(scope: &str, time: u64, id: &str, lane: Lane) -> Event {
        Event {
            event_id: EventId::new(id),
            scope_id: ScopeId::new(scope),
            lane,
            identity: Identity::new("sys", "cont", "uid"),
            message_type: None,
            source_truth_time: None,
            canonical_truth_time: Timestamp::new(time),
            effective_time: None,
            payload: Payload::Json(serde_json::json!({})),
            manifest: None,
        }
    }

    #[test]
    fn append_is_idempotent_on_event_id() {
        let store = TruthStore::open_in_memory().unwrap();
        let e = ev("s1", 100, "e1", Lane::Raw);
        assert!(store.append(&e).unwrap());
        assert!(!store.append(&e).unwrap());
        let events = store
            .range(&ScopeId::new("s1"), &[Lane::Raw], Timestamp::new(0), Timestamp::new(1000), &EventFilters::default())
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn range_respects_total_order_and_bounds() {
        let store = TruthStore::open_in_memory().unwrap();
        store.append(&ev("s1", 300, "c", Lane::Raw)).unwrap();
        store.append(&ev("s1", 100, "a", Lane::Raw)).unwrap();
        store.append(&ev("s1", 200, "b", Lane::Raw)).unwrap();
        let events = store
            .range(&ScopeId::new("s1"), &[Lane::Raw], Timestamp::new(100), Timestamp::new(200), &EventFilters::default())
            .unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.event_id.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
