//! Logging init (§B): `tracing-subscriber` with an env-filter and an
//! optional JSON formatter, mirroring the teacher's `node::log_tracer`
//! initialization (env-driven level, switchable JSON output for ingestion
//! by a log pipeline).

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "nova_node=info,nova_server=info,nova_core=info,warp=info";

pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        fmt().with_env_filter(filter).json().with_target(true).init();
    } else {
        fmt().with_env_filter(filter).with_target(true).init();
    }
}
