//! The Run Store (§4.8): per-user run definitions and bundle export,
//! layered over truth without mutating it. Storage layout:
//! `data/users/{username}/runs/{runNumber}. {sanitizedRunName}/run.json`
//! plus an optional `bundle.zip`, mirroring the teacher's JSON-file
//! persistence style for operational (non-truth) state.

use crate::export::{zip_directory, ExportPipeline};
use nova_types::{
    error::{NovaError, NovaResult},
    filters::EventFilters,
    identity::ScopeId,
    run::{sanitize_run_name, CreateRun, Run, UpdateRun},
    timestamp::Timestamp,
};
use std::{fs, path::PathBuf};

pub struct RunStore {
    data_root: PathBuf,
    default_timebase: nova_types::playback::Timebase,
}

impl RunStore {
    pub fn new(data_root: PathBuf, default_timebase: nova_types::playback::Timebase) -> Self {
        Self {
            data_root,
            default_timebase,
        }
    }

    fn user_runs_dir(&self, username: &str) -> PathBuf {
        self.data_root.join("users").join(username).join("runs")
    }

    fn run_dir(&self, username: &str, run_number: u64, run_name: &str) -> PathBuf {
        self.user_runs_dir(username).join(format!("{}. {}", run_number, sanitize_run_name(run_name)))
    }

    pub fn list(&self, username: &str) -> NovaResult<Vec<Run>> {
        let dir = self.user_runs_dir(username);
        let mut runs = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NovaError::StoreUnavailable { message: e.to_string() }),
        };
        for entry in entries.flatten() {
            let run_json = entry.path().join("run.json");
            if let Ok(body) = fs::read_to_string(&run_json) {
                if let Ok(run) = serde_json::from_str::<Run>(&body) {
                    runs.push(run);
                }
            }
        }
        runs.sort_by_key(|r| r.run_number);
        Ok(runs)
    }

    pub fn get(&self, username: &str, run_number: u64) -> NovaResult<Run> {
        self.list(username)?
            .into_iter()
            .find(|r| r.run_number == run_number)
            .ok_or_else(|| NovaError::NotFound {
                what: format!("run {}", run_number),
            })
    }

    /// Create assigns `runNumber` on conflict (next free number) and sets
    /// `timebase` from node mode, never from the client.
    pub fn create(&self, username: &str, request: CreateRun) -> NovaResult<Run> {
        let existing = self.list(username)?;
        let run_number = existing.iter().map(|r| r.run_number).max().unwrap_or(0) + 1;
        let run = Run {
            run_number,
            run_name: request.run_name,
            run_type: request.run_type,
            timebase: self.default_timebase,
            start_time_sec: request.start_time_sec,
            stop_time_sec: request.stop_time_sec,
            analyst_notes: request.analyst_notes,
            extra: request.extra,
            has_bundle: false,
        };
        self.write_run(username, &run)?;
        Ok(run)
    }

    /// Update merges fields; if `runName` changes, the folder is
    /// deleted and recreated under the new sanitized name.
    pub fn update(&self, username: &str, run_number: u64, patch: UpdateRun) -> NovaResult<Run> {
        let mut run = self.get(username, run_number)?;
        let old_dir = self.run_dir(username, run.run_number, &run.run_name);

        if let Some(name) = patch.run_name {
            if name != run.run_name {
                run.run_name = name;
                let new_dir = self.run_dir(username, run.run_number, &run.run_name);
                if old_dir.exists() {
                    fs::rename(&old_dir, &new_dir).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
                }
            }
        }
        if let Some(v) = patch.run_type {
            run.run_type = v;
        }
        if let Some(v) = patch.start_time_sec {
            run.start_time_sec = v;
        }
        if let Some(v) = patch.stop_time_sec {
            run.stop_time_sec = v;
        }
        if let Some(v) = patch.analyst_notes {
            run.analyst_notes = v;
        }
        if let Some(v) = patch.extra {
            run.extra = v;
        }

        self.write_run(username, &run)?;
        Ok(run)
    }

    pub fn delete(&self, username: &str, run_number: u64) -> NovaResult<()> {
        let run = self.get(username, run_number)?;
        let dir = self.run_dir(username, run.run_number, &run.run_name);
        fs::remove_dir_all(&dir).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(())
    }

    fn write_run(&self, username: &str, run: &Run) -> NovaResult<()> {
        let dir = self.run_dir(username, run.run_number, &run.run_name);
        fs::create_dir_all(&dir).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let body = serde_json::to_string_pretty(run).expect("Run always serializes");
        fs::write(dir.join("run.json"), body).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        Ok(())
    }

    /// Bundle export always regenerates (§4.8, I6): converts the run's
    /// `startTimeSec/stopTimeSec` to microseconds, runs the export
    /// pipeline against the run's own `timebase` axis, copies the zip into
    /// the run folder as `bundle.zip`, and injects `run.json` before
    /// returning the path.
    pub async fn create_bundle(
        &self,
        username: &str,
        run_number: u64,
        scope_id: ScopeId,
        pipeline: &ExportPipeline,
    ) -> NovaResult<PathBuf> {
        let mut run = self.get(username, run_number)?;
        let start_time = Timestamp::new((run.start_time_sec * 1_000_000.0) as u64);
        let stop_time = Timestamp::new((run.stop_time_sec * 1_000_000.0) as u64);

        let outcome = pipeline.export(scope_id, start_time, stop_time, run.timebase, EventFilters::default()).await?;

        let dir = self.run_dir(username, run.run_number, &run.run_name);
        let bundle_path = dir.join("bundle.zip");
        let run_json = serde_json::to_vec_pretty(&run).expect("Run always serializes");

        // Re-zip the export's working contents plus run.json rather than
        // appending to the already-closed export archive.
        let extracted = dir.join(".bundle_scratch");
        let _ = fs::remove_dir_all(&extracted);
        fs::create_dir_all(&extracted).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        unzip_into(&outcome.zip_path, &extracted).map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        zip_directory(&extracted, &bundle_path, Some(("run.json", &run_json)))
            .map_err(|e| NovaError::StoreUnavailable { message: e.to_string() })?;
        let _ = fs::remove_dir_all(&extracted);
        let _ = fs::remove_file(&outcome.zip_path);

        run.has_bundle = true;
        self.write_run(username, &run)?;

        Ok(bundle_path)
    }
}

fn unzip_into(zip_path: &std::path::Path, dest: &std::path::Path) -> anyhow::Result<()> {
    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let out_path = dest.join(entry.name());
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_types::playback::Timebase;

    #[test]
    fn create_assigns_sequential_run_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().to_path_buf(), Timebase::Source);
        let r1 = store
            .create(
                "alice",
                CreateRun {
                    run_name: "first".into(),
                    run_type: "generic".into(),
                    start_time_sec: 0.0,
                    stop_time_sec: 10.0,
                    analyst_notes: "".into(),
                    extra: Default::default(),
                },
            )
            .unwrap();
        let r2 = store
            .create(
                "alice",
                CreateRun {
                    run_name: "second".into(),
                    run_type: "generic".into(),
                    start_time_sec: 0.0,
                    stop_time_sec: 10.0,
                    analyst_notes: "".into(),
                    extra: Default::default(),
                },
            )
            .unwrap();
        assert_eq!(r1.run_number, 1);
        assert_eq!(r2.run_number, 2);
    }

    #[test]
    fn delete_then_delete_again_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().to_path_buf(), Timebase::Source);
        let run = store
            .create(
                "alice",
                CreateRun {
                    run_name: "x".into(),
                    run_type: "generic".into(),
                    start_time_sec: 0.0,
                    stop_time_sec: 1.0,
                    analyst_notes: "".into(),
                    extra: Default::default(),
                },
            )
            .unwrap();
        store.delete("alice", run.run_number).unwrap();
        let err = store.delete("alice", run.run_number).unwrap_err();
        assert!(matches!(err, NovaError::NotFound { .. }));
    }
}
