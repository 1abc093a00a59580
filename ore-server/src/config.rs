//! Server configuration from the environment

use anyhow::{Context, Result};
use ore_core::EngineConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:9200";
pub const DEFAULT_FLUSH_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `ORE_BIND`
    pub bind: SocketAddr,
    /// `ORE_DATA_DIR`: where the combination tables live
    pub data_dir: PathBuf,
    /// `ORE_RECORDING`: play this recording instead of the demo race
    pub recording: Option<PathBuf>,
    /// `ORE_RANKINGS`: JSON list of ranked profiles
    pub rankings: Option<PathBuf>,
    /// `ORE_FLUSH_SECS`
    pub flush_interval: Duration,
    /// `ORE_ENGINE_CONFIG`: JSON file of engine knobs, missing keys take defaults
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset and empty variables take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind = var("ORE_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("ORE_BIND must be a socket address such as 127.0.0.1:9200")?;

        let data_dir = var("ORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let flush_secs = match var("ORE_FLUSH_SECS") {
            Some(v) => v
                .parse::<u64>()
                .context("ORE_FLUSH_SECS must be a whole number of seconds")?,
            None => DEFAULT_FLUSH_SECS,
        };

        let engine = match var("ORE_ENGINE_CONFIG") {
            Some(path) => load_engine_config(Path::new(&path))?,
            None => EngineConfig::default(),
        };

        Ok(Self {
            bind,
            data_dir,
            recording: var("ORE_RECORDING").map(PathBuf::from),
            rankings: var("ORE_RANKINGS").map(PathBuf::from),
            flush_interval: Duration::from_secs(flush_secs.max(1)),
            engine,
        })
    }
}

fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let json = std::fs::read(path)
        .with_context(|| format!("reading engine config {}", path.display()))?;
    serde_json::from_slice(&json)
        .with_context(|| format!("parsing engine config {}", path.display()))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("openraceevents")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND.parse().unwrap());
        assert!(config.data_dir.ends_with("openraceevents"));
        assert_eq!(config.flush_interval, Duration::from_secs(DEFAULT_FLUSH_SECS));
        assert!(config.recording.is_none());
        assert!(config.rankings.is_none());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ORE_BIND", "127.0.0.1:9999"),
            ("ORE_DATA_DIR", "/tmp/ore"),
            ("ORE_RECORDING", "race.ndjson.zst"),
            ("ORE_FLUSH_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 9999);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ore"));
        assert_eq!(config.recording, Some(PathBuf::from("race.ndjson.zst")));
        assert_eq!(config.flush_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_engine_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"position_jump_tolerance": 0.05, "sample_capacity": 8}"#,
        )
        .unwrap();

        let loaded = config(&[("ORE_ENGINE_CONFIG", path.to_str().unwrap())]).unwrap();
        assert_eq!(loaded.engine.position_jump_tolerance, 0.05);
        assert_eq!(loaded.engine.sample_capacity, 8);
        assert_eq!(
            loaded.engine.line_crossing_window,
            EngineConfig::default().line_crossing_window
        );

        std::fs::write(&path, b"{not json").unwrap();
        assert!(config(&[("ORE_ENGINE_CONFIG", path.to_str().unwrap())]).is_err());
        let missing = dir.path().join("missing.json");
        assert!(config(&[("ORE_ENGINE_CONFIG", missing.to_str().unwrap())]).is_err());
    }

    #[test]
    fn test_empty_value_uses_default() {
        let config = config(&[("ORE_BIND", "  ")]).unwrap();
        assert_eq!(config.bind.port(), 9200);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config(&[("ORE_BIND", "not-an-address")]).is_err());
        assert!(config(&[("ORE_FLUSH_SECS", "soon")]).is_err());
    }
}
