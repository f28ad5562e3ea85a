use super::{output_dir, Driver};
use nova_types::{
    driver::{DriverDescriptor, DriverId},
    event::{Event, Payload},
    lane::Lane,
    timestamp::Timestamp,
};
use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// `lane=raw`: writes binary frames preserving byte boundaries, one file
/// per `(date, identity)` directory, appending exact payload bytes with no
/// framing of its own.
pub struct RawBytesDriver {
    root: PathBuf,
    descriptor: DriverDescriptor,
    handles: HashMap<PathBuf, File>,
}

impl RawBytesDriver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            descriptor: DriverDescriptor {
                driver_id: DriverId::new("raw-bytes"),
                version: 1,
                lane: Lane::Raw,
                message_type: None,
                output_filename: "raw.bin".into(),
            },
            handles: HashMap::new(),
        }
    }
}

impl Driver for RawBytesDriver {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn write(&mut self, event: &Event, canonical_truth_time: Timestamp) -> anyhow::Result<Option<PathBuf>> {
        let bytes = match &event.payload {
            Payload::Bytes(b) => b,
            Payload::Json(_) => anyhow::bail!("raw-bytes driver received a non-binary payload"),
        };
        let dir = output_dir(&self.root, event, canonical_truth_time);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(&self.descriptor.output_filename);
        let file = match self.handles.get_mut(&path) {
            Some(f) => f,
            None => {
                let f = OpenOptions::new().create(true).append(true).open(&path)?;
                self.handles.entry(path.clone()).or_insert(f)
            }
        };
        file.write_all(bytes)?;
        Ok(Some(path))
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        for (_, mut file) in self.handles.drain() {
            file.flush()?;
        }
        Ok(())
    }
}
