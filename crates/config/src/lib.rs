//! Configuration for the IMS client.
//!
//! Discovery order: an explicit path, `./ims.toml`, then `ims.toml` in the
//! platform config directory. A missing file yields defaults; a file that
//! exists but cannot be parsed is an error.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

pub const CONFIG_FILE_NAME: &str = "ims.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which cooperative lock arbitrates the push connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Shared by tabs inside one process. A profile used by several processes
    /// then gets one push connection per process.
    Local,
    /// A lock file and a fan-out log in the data dir, shared by every
    /// process of the profile.
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub lock_backend: LockBackend,
    /// Pause between push sessions, whatever ended the previous one.
    pub cooldown_secs: u64,
    /// Initial reconnect delay of the event source; the server may change it.
    pub reconnect_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            lock_backend: LockBackend::File,
            cooldown_secs: 10,
            reconnect_ms: 3000,
        }
    }
}

impl LiveConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh the bearer token this long before it expires.
    pub refresh_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImsConfig {
    pub server_url: String,
    /// Where profile storage and lock files live.
    pub data_dir: Option<PathBuf>,
    pub live: LiveConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

impl Default for ImsConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            data_dir: None,
            live: LiveConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ImsConfig {
    /// Configured data dir, or the platform default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }
}

/// Platform data directory, falling back to `./.ims`.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "rangers", "ims")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ims"))
}

fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "rangers", "ims")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Parse a configuration file.
pub fn load(path: &Path) -> Result<ImsConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Candidate config paths, in discovery order.
pub fn candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
        return paths;
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(dir) = config_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Load the first config file that exists, or defaults when none does.
///
/// An explicit path must exist.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<ImsConfig, ConfigError> {
    if let Some(path) = explicit {
        return load(path);
    }
    for path in candidates(None) {
        if path.is_file() {
            return load(&path);
        }
        debug!(path = %path.display(), "config file not found");
    }
    info!("no config file found, using defaults");
    Ok(ImsConfig::default())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn defaults() {
        let config = ImsConfig::default();
        assert_eq!(config.live.cooldown(), Duration::from_secs(10));
        assert_eq!(config.live.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.live.lock_backend, LockBackend::File);
        assert_eq!(config.auth.refresh_margin_secs, 60);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ims.toml");
        std::fs::write(
            &path,
            r#"
server_url = "https://ims.example.org"
data_dir = "/var/lib/ims"

[live]
lock_backend = "local"
"#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.server_url, "https://ims.example.org");
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/ims"));
        assert_eq!(config.live.lock_backend, LockBackend::Local);
        assert_eq!(config.live.cooldown_secs, 10);
        assert!(!config.log.json);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = discover_and_load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ims.toml");
        std::fs::write(&path, "server_url = [").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn explicit_path_is_the_only_candidate() {
        let paths = candidates(Some(Path::new("/etc/ims.toml")));
        assert_eq!(paths, vec![PathBuf::from("/etc/ims.toml")]);
    }
}
