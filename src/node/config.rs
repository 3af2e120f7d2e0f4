use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;

/// File in the data directory holding daemon settings.
pub const CONFIG_FILE: &str = "config.json";

const ENABLE_P2P: &str = "EnableP2P";
const ENABLE_P2P_HYBRID_MODE: &str = "EnableP2PHybridMode";

/// The daemon settings this tool manages. Each flag is tri-state: absent,
/// `Some(true)` or `Some(false)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(rename = "EnableP2P", default, skip_serializing_if = "Option::is_none")]
    pub enable_p2p: Option<bool>,

    #[serde(
        rename = "EnableP2PHybridMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_p2p_hybrid_mode: Option<bool>,
}

fn override_field(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, Some(v)) => Some(v),
        (Some(x), Some(v)) if x != v => Some(v),
        _ => a,
    }
}

impl DaemonConfig {
    /// `other` overrides `self` field by field wherever it is present.
    pub fn merge(&self, other: &DaemonConfig) -> DaemonConfig {
        DaemonConfig {
            enable_p2p: override_field(self.enable_p2p, other.enable_p2p),
            enable_p2p_hybrid_mode: override_field(
                self.enable_p2p_hybrid_mode,
                other.enable_p2p_hybrid_mode,
            ),
        }
    }

    pub fn is_hybrid(&self) -> bool {
        self.enable_p2p_hybrid_mode == Some(true)
    }
}

fn read_object(data_dir: &Path) -> Result<Map<String, Value>> {
    let path = data_dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

/// Reads `<data_dir>/config.json`; a missing file is the empty config.
pub fn load_daemon_config(data_dir: &Path) -> Result<DaemonConfig> {
    let object = read_object(data_dir)?;
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Writes the managed flags, keeping every other key already in the file.
pub fn write_daemon_config(data_dir: &Path, config: &DaemonConfig) -> Result<()> {
    let mut object = read_object(data_dir)?;
    for (key, value) in [
        (ENABLE_P2P, config.enable_p2p),
        (ENABLE_P2P_HYBRID_MODE, config.enable_p2p_hybrid_mode),
    ] {
        match value {
            Some(v) => {
                object.insert(key.to_string(), Value::Bool(v));
            }
            None => {
                object.remove(key);
            }
        }
    }

    let path = data_dir.join(CONFIG_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&Value::Object(object))?)?;
    debug!(path = %path.display(), ?config, "Wrote daemon config");
    Ok(())
}

/// Loads, merges `overrides` on top, and writes back if anything changed.
pub fn update_daemon_config(data_dir: &Path, overrides: &DaemonConfig) -> Result<DaemonConfig> {
    let current = load_daemon_config(data_dir)?;
    let merged = current.merge(overrides);
    if merged != current {
        write_daemon_config(data_dir, &merged)?;
    }
    Ok(merged)
}
