//! Shared vocabulary for NOVA: the event model, identity, lanes, manifests,
//! commands, cursors, stream/driver/run/presentation definitions, the
//! Core↔Server IPC messages, and the §7 error taxonomy. No I/O lives here;
//! everything is a plain, serde-friendly value type, matching the role the
//! teacher's `actyx_sdk` crate plays for the rest of its workspace.

pub mod command;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod event;
pub mod filters;
pub mod identity;
pub mod ipc;
pub mod lane;
pub mod manifest;
pub mod playback;
pub mod presentation;
pub mod run;
pub mod stream_def;
pub mod timestamp;

pub use command::{CommandProgress, CommandRequest, CommandResult, RequestId, TimelineMode};
pub use cursor::Cursor;
pub use driver::{DriverDescriptor, DriverId};
pub use error::{NovaError, NovaResult};
pub use event::{Event, EventId, IngestRequest, Payload};
pub use filters::EventFilters;
pub use identity::{ContainerId, Identity, ScopeId, SystemId, UniqueId};
pub use lane::{Lane, MessageType};
pub use manifest::{Manifest, ManifestId, ManifestPublished, ManifestVersion};
pub use playback::{Backpressure, PlaybackMode, PlaybackRequestId, Rate, Timebase};
pub use presentation::PresentationOverride;
pub use run::Run;
pub use stream_def::StreamDefinition;
pub use timestamp::Timestamp;
