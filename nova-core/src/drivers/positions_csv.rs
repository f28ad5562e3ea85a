use super::{output_dir, Driver};
use nova_types::{
    driver::{DriverDescriptor, DriverId},
    event::{Event, Payload},
    lane::Lane,
    timestamp::Timestamp,
};
use std::{collections::HashMap, fs::File, path::PathBuf};

/// `lane=parsed`, `messageType=Position`: fixed-column CSV, header written
/// once per file on first write, handle reused for the file's lifetime.
pub struct PositionsCsvDriver {
    root: PathBuf,
    descriptor: DriverDescriptor,
    writers: HashMap<PathBuf, csv::Writer<File>>,
}

const HEADER: &[&str] = &["canonicalTruthTime", "systemId", "containerId", "uniqueId", "lat", "lon", "alt"];

impl PositionsCsvDriver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            descriptor: DriverDescriptor {
                driver_id: DriverId::new("positions-csv"),
                version: 1,
                lane: Lane::Parsed,
                message_type: Some("Position".into()),
                output_filename: "positions.csv".into(),
            },
            writers: HashMap::new(),
        }
    }
}

impl Driver for PositionsCsvDriver {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn write(&mut self, event: &Event, canonical_truth_time: Timestamp) -> anyhow::Result<Option<PathBuf>> {
        let payload = match &event.payload {
            Payload::Json(v) => v,
            Payload::Bytes(_) => anyhow::bail!("positions-csv driver received a binary payload"),
        };
        let dir = output_dir(&self.root, event, canonical_truth_time);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(&self.descriptor.output_filename);

        if !self.writers.contains_key(&path) {
            let write_header = !path.exists();
            let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            if write_header {
                writer.write_record(HEADER)?;
                writer.flush()?;
            }
            self.writers.insert(path.clone(), writer);
        }
        let writer = self.writers.get_mut(&path).expect("just inserted");

        writer.write_record(&[
            canonical_truth_time.as_micros().to_string(),
            event.identity.system_id.to_string(),
            event.identity.container_id.to_string(),
            event.identity.unique_id.to_string(),
            payload.get("lat").map(|v| v.to_string()).unwrap_or_default(),
            payload.get("lon").map(|v| v.to_string()).unwrap_or_default(),
            payload.get("alt").map(|v| v.to_string()).unwrap_or_default(),
        ])?;
        writer.flush()?;
        Ok(Some(path))
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        for (_, mut writer) in self.writers.drain() {
            writer.flush()?;
        }
        Ok(())
    }
}
