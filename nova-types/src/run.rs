use crate::playback::Timebase;
use serde::{Deserialize, Serialize};

/// A per-user named export window; not truth (§3, §4.8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_number: u64,
    pub run_name: String,
    pub run_type: String,
    pub timebase: Timebase,
    pub start_time_sec: f64,
    pub stop_time_sec: f64,
    pub analyst_notes: String,
    /// Free-form `runType`-specific fields, validated by convention rather
    /// than a closed schema — the run store does not interpret them.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub has_bundle: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRun {
    pub run_name: String,
    pub run_type: String,
    pub start_time_sec: f64,
    pub stop_time_sec: f64,
    pub analyst_notes: String,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRun {
    pub run_name: Option<String>,
    pub run_type: Option<String>,
    pub start_time_sec: Option<f64>,
    pub stop_time_sec: Option<f64>,
    pub analyst_notes: Option<String>,
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Turn a run name into a filesystem-safe path component; empty becomes
/// `Untitled` (§4.8).
pub fn sanitize_run_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "Untitled".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_run_name("a/b:c*d"), "a_b_c_d");
    }

    #[test]
    fn empty_becomes_untitled() {
        assert_eq!(sanitize_run_name(""), "Untitled");
        assert_eq!(sanitize_run_name("   "), "Untitled");
    }
}
