use chrono::{DateTime, TimeZone, Utc};
use derive_more::{Add, From, Into, Sub};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// Microseconds since the UNIX epoch, without leap seconds, in UTC.
///
/// This is both `sourceTruthTime`/`canonicalTruthTime`/`effectiveTime` and
/// the unit used for REPLAY pacing math in the playback engine.
#[derive(Copy, Clone, Debug, Default, From, Into, Add, Sub, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(micros: u64) -> Self {
        Self(micros)
    }

    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch");
        Self(since_epoch.as_micros() as u64)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// The minimum representable time increment, used when the Ingest
    /// Normalizer must nudge a `canonicalTruthTime` strictly forward.
    pub const EPSILON: Timestamp = Timestamp(1);

    pub fn saturating_add(self, rhs: Timestamp) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(t: Timestamp) -> Self {
        Utc.timestamp_opt((t.0 / 1_000_000) as i64, (t.0 % 1_000_000) as u32 * 1000)
            .single()
            .expect("timestamp out of range")
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self((dt.timestamp_micros()).max(0) as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_numeric() {
        assert!(Timestamp::new(5) < Timestamp::new(6));
        assert_eq!(Timestamp::new(5).saturating_add(Timestamp::EPSILON), Timestamp::new(6));
    }

    #[test]
    fn round_trips_through_chrono() {
        let t = Timestamp::new(1_700_000_000_123_456);
        let dt: DateTime<Utc> = t.into();
        assert_eq!(Timestamp::from(dt), t);
    }
}
