//! Reads and writes `~/.vigil/config.toml`.
//!
//! Every section and field is optional; missing values take their defaults.
//!
//! ```toml
//! [transport]
//! endpoints = ["tcp://10.0.0.5:5555"]
//! max_reconnect_attempts = 10
//!
//! [signals.cardiac]
//! tachycardia = 110.0
//!
//! [bridge]
//! port = 9870
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vigil_middleware::TransportConfig;
use vigil_perception::DecoderConfig;
use vigil_runtime::PipelineConfig;
use vigil_signals::SignalsConfig;

/// `[bridge]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 9870,
        }
    }
}

/// `[state]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Defaults to `~/.vigil/state`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub max_backups: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_backups: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub decoder: DecoderConfig,
    pub signals: SignalsConfig,
    pub bridge: BridgeConfig,
    pub state: StateConfig,
}

impl Config {
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            transport: self.transport.clone(),
            decoder: self.decoder.clone(),
            signals: self.signals.clone(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state
            .dir
            .clone()
            .unwrap_or_else(|| vigil_home(&home_dir()).join("state"))
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn vigil_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vigil")
}

pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    vigil_home(home).join("config.toml")
}

/// `Ok(None)` when no config file exists yet.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {e}"))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VIGIL_*` environment overrides.
///
/// | Variable | Field |
/// |---|---|
/// | `VIGIL_ENDPOINTS` | `transport.endpoints` (comma separated) |
/// | `VIGIL_MAX_RECONNECTS` | `transport.max_reconnect_attempts` |
/// | `VIGIL_BRIDGE_PORT` | `bridge.port` |
/// | `VIGIL_STATE_DIR` | `state.dir` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VIGIL_ENDPOINTS") {
        let endpoints: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !endpoints.is_empty() {
            cfg.transport.endpoints = endpoints;
        }
    }
    if let Ok(v) = std::env::var("VIGIL_MAX_RECONNECTS")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.transport.max_reconnect_attempts = n;
    }
    if let Ok(v) = std::env::var("VIGIL_BRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.bridge.port = port;
    }
    if let Ok(v) = std::env::var("VIGIL_STATE_DIR")
        && !v.is_empty()
    {
        cfg.state.dir = Some(PathBuf::from(v));
    }
}

pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Write `cfg`, creating the parent directory.  Owner-only permissions on
/// Unix (0700 directory, 0600 file).
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {e}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.bridge.port, 9870);
        assert_eq!(loaded.transport.max_reconnect_attempts, 5);
        assert_eq!(loaded.signals.buffer_capacity, 1000);
        assert_eq!(loaded.decoder, DecoderConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[transport]\nendpoints = [\"tcp://10.0.0.5:5555\"]\n\n[signals.cardiac]\ntachycardia = 110.0\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.transport.endpoints, vec!["tcp://10.0.0.5:5555".to_string()]);
        assert_eq!(cfg.transport.message_timeout_ms, 5_000);
        assert_eq!(cfg.signals.cardiac.tachycardia, 110.0);
        assert_eq!(cfg.signals.cardiac.bradycardia, 60.0);
        assert!(cfg.bridge.enabled);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[transport\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let parent = path.parent().expect("parent");
        let dir_mode = fs::metadata(parent).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn state_dir_override_wins() {
        let cfg = Config {
            state: StateConfig {
                dir: Some(PathBuf::from("/var/lib/vigil")),
                ..StateConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(cfg.state_dir(), PathBuf::from("/var/lib/vigil"));
        assert!(Config::default().state_dir().ends_with(".vigil/state"));
    }

    // All env-var cases live in one test so they cannot race each other.
    #[test]
    fn env_overrides() {
        // SAFETY: the only test touching VIGIL_* variables.
        unsafe {
            std::env::set_var("VIGIL_ENDPOINTS", "tcp://a:1, tcp://b:2");
            std::env::set_var("VIGIL_MAX_RECONNECTS", "9");
            std::env::set_var("VIGIL_BRIDGE_PORT", "not-a-port");
            std::env::set_var("VIGIL_STATE_DIR", "/tmp/vigil-state");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.transport.endpoints, vec!["tcp://a:1".to_string(), "tcp://b:2".to_string()]);
        assert_eq!(cfg.transport.max_reconnect_attempts, 9);
        assert_eq!(cfg.bridge.port, 9870);
        assert_eq!(cfg.state.dir, Some(PathBuf::from("/tmp/vigil-state")));

        unsafe { std::env::set_var("VIGIL_BRIDGE_PORT", "9999") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge.port, 9999);

        unsafe {
            for var in ["VIGIL_ENDPOINTS", "VIGIL_MAX_RECONNECTS", "VIGIL_BRIDGE_PORT", "VIGIL_STATE_DIR"] {
                std::env::remove_var(var);
            }
        }
    }
}
