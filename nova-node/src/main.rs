//! Process entry point (§2, §B): parses CLI flags, loads the config file,
//! opens the Core, builds the Server edge's `AppState`, and runs both
//! against the same IPC channel, mirroring the teacher's
//! `node::bin::node::main` → `ApplicationState::spawn` shape but without
//! the supervised component-restart machinery NOVA doesn't need.

mod config;
mod logging;

use anyhow::{Context, Result};
use nova_core::{Core, CoreConfig};
use nova_server::{state::ServerConfig, AppState};
use std::sync::Arc;
use structopt::StructOpt;

fn main() -> Result<()> {
    let opts = config::Opts::from_args();
    logging::init(opts.log_json);

    let file_config = config::resolve(&opts)?;
    let data_root = file_config.data_dir.clone();
    std::fs::create_dir_all(&data_root)
        .with_context(|| format!("creating data directory {}", data_root.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run(file_config, data_root))
}

async fn run(file_config: config::FileConfig, data_root: std::path::PathBuf) -> Result<()> {
    let default_timebase = file_config.default_timebase();

    let core = Core::start(CoreConfig {
        sqlite_path: data_root.join("truth.sqlite"),
        data_root: data_root.clone(),
        exports_root: data_root.join("exports"),
        default_timebase,
    })
    .context("starting Core")?;

    let users = Arc::new(nova_server::users::UserStore::new(data_root.clone()).context("opening user store")?);
    let scopes = Arc::new(nova_server::scopes::ScopeStore::new(data_root.clone()).context("opening scope store")?);

    let server_config = ServerConfig {
        bind_addr: file_config.bind,
        node_mode: file_config.node_mode,
        default_timebase,
        manifests: file_config.manifests,
    };

    let state = Arc::new(AppState::new(Arc::new(core), users, scopes, server_config));

    tracing::info!(target: "NODE", "nova-node starting");
    nova_server::run(state).await
}
