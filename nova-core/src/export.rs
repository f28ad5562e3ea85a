//! The Export Pipeline (§4.7): walks a Truth Store range through the
//! Driver Registry, then zips the resulting file tree. Shares the exact
//! registry/driver code path the real-time writer uses, so parity between
//! live output and export is structural rather than tested-for.

use crate::{drivers::DriverRegistry, truth_store::TruthStore};
use nova_types::{error::NovaError, filters::EventFilters, identity::ScopeId, playback::Timebase, timestamp::Timestamp};
use std::path::{Path, PathBuf};

pub struct ExportPipeline {
    store: TruthStore,
    exports_root: PathBuf,
}

pub struct ExportOutcome {
    pub export_id: String,
    pub zip_path: PathBuf,
}

impl ExportPipeline {
    pub fn new(store: TruthStore, exports_root: PathBuf) -> Self {
        Self { store, exports_root }
    }

    /// Given `(startTime, stopTime, timebase, filters)`, iterates the range
    /// in order, routes each event through the registry, finalizes all
    /// drivers, and zips the tree into `{exportId}.zip` (§4.7).
    pub async fn export(
        &self,
        scope_id: ScopeId,
        start_time: Timestamp,
        stop_time: Timestamp,
        timebase: Timebase,
        filters: EventFilters,
    ) -> Result<ExportOutcome, NovaError> {
        let export_id = uuid::Uuid::now_v7().to_string();
        let work_dir = self.exports_root.join(format!("{export_id}.tree"));
        std::fs::create_dir_all(&work_dir).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;

        let events = self.store.range_by(
            &scope_id,
            &nova_types::lane::Lane::ALL,
            start_time,
            stop_time,
            timebase,
            &filters,
        )?;

        let mut registry = DriverRegistry::with_builtins(work_dir.clone());
        for event in &events {
            registry
                .write(event, event.canonical_truth_time)
                .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        }
        registry
            .finalize()
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;

        let zip_path = self.exports_root.join(format!("{export_id}.zip"));
        zip_directory(&work_dir, &zip_path, None).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let _ = std::fs::remove_dir_all(&work_dir);

        Ok(ExportOutcome { export_id, zip_path })
    }

    pub fn download_path(&self, export_id: &str) -> PathBuf {
        self.exports_root.join(format!("{export_id}.zip"))
    }

    pub fn list_exports(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.exports_root) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(id) = name.strip_suffix(".zip") {
                        ids.push(id.to_owned());
                    }
                }
            }
        }
        ids
    }
}

/// Zips every file under `root` into `zip_path`, optionally injecting one
/// extra in-memory file (used by the Run Store to embed `run.json`).
pub fn zip_directory(root: &Path, zip_path: &Path, extra_file: Option<(&str, &[u8])>) -> anyhow::Result<()> {
    let file = std::fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let name = relative.to_string_lossy().replace('\\', "/");
        writer.start_file(name, options)?;
        let mut f = std::fs::File::open(entry.path())?;
        std::io::copy(&mut f, &mut writer)?;
    }

    if let Some((name, bytes)) = extra_file {
        writer.start_file(name, options)?;
        std::io::Write::write_all(&mut writer, bytes)?;
    }

    writer.finish()?;
    Ok(())
}
