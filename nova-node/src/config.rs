//! Node configuration (§6 `/config`, §2): a TOML file on disk layered with
//! CLI overrides, the same two-layer shape as the teacher's
//! `node_settings`/`Opts` split — a persisted settings tree plus a handful
//! of flags a node operator reaches for on every invocation.

use anyhow::{Context, Result};
use nova_types::{manifest::Manifest, playback::Timebase};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "nova-node", rename_all = "kebab-case")]
pub struct Opts {
    /// Path to the node's TOML config file.
    #[structopt(long, env = "NOVA_CONFIG", default_value = "nova.toml")]
    pub config: PathBuf,

    /// Root directory for persisted operational state (runs, users,
    /// presentation, stream definitions) and the truth store database.
    #[structopt(long, env = "NOVA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Address the Server edge's HTTP/WS listener binds to.
    #[structopt(long, env = "NOVA_BIND")]
    pub bind: Option<SocketAddr>,

    /// Output logs as JSON objects (one per line), matching the teacher's
    /// `--log-json` node flag.
    #[structopt(long, env = "NOVA_LOG_JSON")]
    pub log_json: bool,
}

/// The persisted, file-backed half of node configuration (§6, §B). CLI
/// flags in `Opts` take precedence over any value present here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// `live` nodes default `Run.timebase` to `canonical`; `lab` nodes
    /// default it to `source` (§4.8's "timebase set from node mode").
    #[serde(default = "default_node_mode")]
    pub node_mode: String,
    #[serde(default)]
    pub manifests: Vec<Manifest>,
}

fn default_bind() -> SocketAddr {
    "127.0.0.1:4242".parse().unwrap()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("nova-data")
}

fn default_node_mode() -> String {
    "live".to_owned()
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(body) => toml::from_str(&body).with_context(|| format!("parsing config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default_for_missing_file()),
            Err(e) => Err(e).with_context(|| format!("reading config at {}", path.display())),
        }
    }

    fn default_for_missing_file() -> Self {
        FileConfig {
            bind: default_bind(),
            data_dir: default_data_dir(),
            node_mode: default_node_mode(),
            manifests: Vec::new(),
        }
    }

    pub fn default_timebase(&self) -> Timebase {
        if self.node_mode == "lab" {
            Timebase::Source
        } else {
            Timebase::Canonical
        }
    }
}

/// Merges CLI overrides over the file config, the same precedence the
/// teacher's `Opts`-over-`node_settings` split uses.
pub fn resolve(opts: &Opts) -> Result<FileConfig> {
    let mut file = FileConfig::load(&opts.config)?;
    if let Some(bind) = opts.bind {
        file.bind = bind;
    }
    if let Some(data_dir) = &opts.data_dir {
        file.data_dir = data_dir.clone();
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = FileConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.node_mode, "live");
    }

    #[test]
    fn lab_mode_defaults_to_source_timebase() {
        let mut cfg = FileConfig::default_for_missing_file();
        cfg.node_mode = "lab".to_owned();
        assert_eq!(cfg.default_timebase(), Timebase::Source);
    }
}
