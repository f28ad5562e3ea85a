//! Deterministic event-to-file transforms (§4.7). Real-time writing and
//! export both run every event through the same `Driver` instances, so
//! `write`/`finalize` are the only operations either path needs.

mod positions_csv;
mod raw;
mod registry;

pub use positions_csv::PositionsCsvDriver;
pub use raw::RawBytesDriver;
pub use registry::DriverRegistry;

use nova_types::{event::Event, timestamp::Timestamp};
use std::path::PathBuf;

pub trait Driver: Send {
    fn descriptor(&self) -> &nova_types::driver::DriverDescriptor;

    /// Appends to `{root}/{YYYY-MM-DD}/{systemId}/{containerId}/{uniqueId}/{filename}`,
    /// opening files lazily and reusing handles. Returns the path written to.
    fn write(&mut self, event: &Event, canonical_truth_time: Timestamp) -> anyhow::Result<Option<PathBuf>>;

    /// Closes all open handles. Called when the registry shuts down or at
    /// the end of an export.
    fn finalize(&mut self) -> anyhow::Result<()>;
}

/// Builds the output directory for an event per §4.7/§6's layout.
pub fn output_dir(root: &std::path::Path, event: &Event, canonical_truth_time: Timestamp) -> PathBuf {
    let date: chrono::DateTime<chrono::Utc> = canonical_truth_time.into();
    root.join(date.format("%Y-%m-%d").to_string())
        .join(event.identity.system_id.as_str())
        .join(event.identity.container_id.as_str())
        .join(event.identity.unique_id.as_str())
}
