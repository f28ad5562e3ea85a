//! Wires the Core's subsystems together and starts the dispatch task that
//! owns the Truth Store and Playback Engine (§2, §5). `nova-node` builds one
//! `Core` per process and hands its `CoreHandle` to `nova-server`.

use crate::{
    export::ExportPipeline,
    ipc::{CoreHandle, CoreProcessor},
    outputs::OutputStreamManager,
    playback::PlaybackEngine,
    presentation::PresentationStore,
    runs::RunStore,
    truth_store::TruthStore,
};
use nova_types::{error::NovaResult, playback::Timebase};
use std::path::PathBuf;
use tokio::sync::mpsc;

const CORE_QUEUE_BOUND: usize = 4096;

pub struct Core {
    pub handle: CoreHandle,
    pub playback: PlaybackEngine,
    pub runs: RunStore,
    pub presentation: PresentationStore,
    pub outputs: OutputStreamManager,
    pub exports: ExportPipeline,
    pub truth_store: TruthStore,
}

pub struct CoreConfig {
    pub sqlite_path: PathBuf,
    pub data_root: PathBuf,
    pub exports_root: PathBuf,
    pub default_timebase: Timebase,
}

impl Core {
    /// Opens the Truth Store, spawns the single dispatch task that owns it
    /// and the Playback Engine, and assembles the side stores that don't
    /// need actor wrapping because they already guard their own state
    /// (`RunStore`/`PresentationStore` over the filesystem, `OutputStreamManager`
    /// over its own mutexed tables).
    pub fn start(config: CoreConfig) -> NovaResult<Self> {
        let store = TruthStore::open(&config.sqlite_path)
            .map_err(|e| nova_types::error::NovaError::StoreUnavailable { message: e.to_string() })?;

        let processor = CoreProcessor::new(store.clone(), config.data_root.join("output"));
        let playback = processor.playback_engine();

        let (tx, rx) = mpsc::channel(CORE_QUEUE_BOUND);
        tokio::spawn(processor.run(rx));

        let handle = CoreHandle::new(move |request| tx.try_send(request).map_err(Into::into));

        let outputs = OutputStreamManager::new(config.data_root.clone())?;

        Ok(Self {
            handle,
            playback,
            runs: RunStore::new(config.data_root.clone(), config.default_timebase),
            presentation: PresentationStore::new(config.data_root.clone()),
            outputs,
            exports: ExportPipeline::new(store.clone(), config.exports_root),
            truth_store: store,
        })
    }
}
