use anyhow::{Context, Result};
use parlor_client::{DEFAULT_SERVER_URL, ReconnectPolicy, SessionConfig};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Upper bound on dial plus websocket upgrade. Zero disables it.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ReconnectConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectConfig {
    /// `None` when reconnecting is switched off.
    pub(crate) fn policy(&self) -> Option<ReconnectPolicy> {
        self.enabled.then(|| {
            ReconnectPolicy::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.max_attempts,
            )
        })
    }
}

fn default_url() -> String {
    DEFAULT_SERVER_URL.to_owned()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

impl Config {
    /// Load config from a TOML file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub(crate) fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// The explicit path if given, else the first default location that
    /// exists, else `parlor.toml` in the working directory.
    pub(crate) fn find_config_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }
        config_candidates(std::env::var_os("XDG_CONFIG_HOME"), std::env::var_os("HOME"))
            .into_iter()
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG))
    }

    /// Session settings for `identity`, with `server` taking precedence over
    /// the file's URL.
    pub(crate) fn session_config(&self, server: Option<&str>, identity: &str) -> SessionConfig {
        let url = server.unwrap_or(self.server.url.as_str());
        let mut session = SessionConfig::new(url, identity);
        if self.server.connect_timeout_secs > 0 {
            session =
                session.with_connect_timeout(Duration::from_secs(self.server.connect_timeout_secs));
        }
        if let Some(policy) = self.reconnect.policy() {
            session = session.with_reconnect(policy);
        }
        session
    }
}

const LOCAL_CONFIG: &str = "parlor.toml";

/// Default config locations, most specific first.
fn config_candidates(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(dir) = xdg_config_home {
        candidates.push(PathBuf::from(dir).join("parlor").join(LOCAL_CONFIG));
    }
    if let Some(dir) = home {
        candidates.push(PathBuf::from(dir).join(".config/parlor").join(LOCAL_CONFIG));
    }
    candidates
}
