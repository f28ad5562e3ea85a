use super::Driver;
use nova_types::{
    event::Event,
    lane::{Lane, MessageType},
    timestamp::Timestamp,
};
use std::{collections::HashMap, path::PathBuf};

/// Holds drivers keyed by `(lane, messageType)`, selecting deterministically
/// per §4.7:
/// 1. exact `(lane, messageType)` match,
/// 2. lane-wide match (`messageType = None`),
/// 3. no driver — the event is not persisted to files (stream-only).
pub struct DriverRegistry {
    exact: HashMap<(Lane, MessageType), Box<dyn Driver>>,
    lane_wide: HashMap<Lane, Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            lane_wide: HashMap::new(),
        }
    }

    /// Registers the built-in raw-bytes and positions-CSV drivers rooted at
    /// `output_root`.
    pub fn with_builtins(output_root: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::RawBytesDriver::new(output_root.clone())));
        registry.register(Box::new(super::PositionsCsvDriver::new(output_root)));
        registry
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        let descriptor = driver.descriptor().clone();
        match descriptor.message_type {
            Some(mt) => {
                self.exact.insert((descriptor.lane, mt), driver);
            }
            None => {
                self.lane_wide.insert(descriptor.lane, driver);
            }
        }
    }

    fn select(&mut self, lane: Lane, message_type: Option<&MessageType>) -> Option<&mut Box<dyn Driver>> {
        if let Some(mt) = message_type {
            if self.exact.contains_key(&(lane, mt.clone())) {
                return self.exact.get_mut(&(lane, mt.clone()));
            }
        }
        self.lane_wide.get_mut(&lane)
    }

    /// Routes `event` through its selected driver, if any. Returns `None`
    /// when no driver matches (stream-only event).
    pub fn write(&mut self, event: &Event, canonical_truth_time: Timestamp) -> anyhow::Result<Option<PathBuf>> {
        match self.select(event.lane, event.message_type.as_ref()) {
            Some(driver) => driver.write(event, canonical_truth_time),
            None => Ok(None),
        }
    }

    pub fn finalize(&mut self) -> anyhow::Result<()> {
        for driver in self.exact.values_mut() {
            driver.finalize()?;
        }
        for driver in self.lane_wide.values_mut() {
            driver.finalize()?;
        }
        Ok(())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_types::{event::Payload, identity::Identity, identity::ScopeId};

    fn position_event() -> Event {
        Event {
            event_id: nova_types::event::EventId::new("e1"),
            scope_id: ScopeId::new("s1"),
            lane: Lane::Parsed,
            identity: Identity::new("sys", "cont", "uid"),
            message_type: Some("Position".into()),
            source_truth_time: None,
            canonical_truth_time: Timestamp::new(1000),
            effective_time: None,
            payload: Payload::Json(serde_json::json!({"lat": 1.0, "lon": 2.0, "alt": 3.0})),
            manifest: None,
        }
    }

    #[test]
    fn exact_match_wins_over_lane_wide() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DriverRegistry::with_builtins(dir.path().to_path_buf());
        let path = registry.write(&position_event(), Timestamp::new(1000)).unwrap();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("positions.csv"));
    }

    #[test]
    fn unmatched_lane_message_type_is_stream_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DriverRegistry::with_builtins(dir.path().to_path_buf());
        let mut event = position_event();
        event.lane = Lane::Metadata;
        event.message_type = Some("ChatMessage".into());
        let path = registry.write(&event, Timestamp::new(1000)).unwrap();
        assert!(path.is_none());
    }
}
