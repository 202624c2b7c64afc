//! Gateway configuration: TOML file + defaults.

use hubcast_core::{HubError, HubResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the config file, checked when no explicit
/// path is given.
pub const CONFIG_ENV_VAR: &str = "HUBCAST_CONFIG";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// `[hub]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct HubSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

/// `[timeouts]` section of the config TOML. All values in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_call_secs")]
    pub call_secs: u64,
    /// Deadline over a whole fan-out; 0 disables it.
    #[serde(default)]
    pub fanout_deadline_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            call_secs: default_call_secs(),
            fanout_deadline_secs: 0,
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8888/hub/rpc/api".to_string()
}
fn default_connect_secs() -> u64 {
    10
}
fn default_call_secs() -> u64 {
    10
}

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API URL of the hub endpoint.
    pub hub_api_url: String,
    /// Connection establishment timeout; passed through to the caller's
    /// transport, not used by the gateway itself.
    pub connect_timeout: Duration,
    /// Independent timeout for each remote call.
    pub call_timeout: Duration,
    /// Optional deadline bounding a whole fan-out.
    pub fanout_deadline: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl GatewayConfig {
    /// Load config from a TOML file.
    ///
    /// With no explicit path, falls back to the `HUBCAST_CONFIG` env var;
    /// with neither, or when the named file does not exist, defaults apply.
    pub fn load(config_path: Option<&Path>) -> HubResult<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        let file_config = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(&path)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| HubError::Config(format!("config parse error: {e}")))?
            }
            Some(path) => {
                info!(path = %path.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
            None => ConfigFile::default(),
        };

        Ok(Self::from_file(file_config))
    }

    fn from_file(file: ConfigFile) -> Self {
        let deadline = match file.timeouts.fanout_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            hub_api_url: file.hub.api_url,
            connect_timeout: Duration::from_secs(file.timeouts.connect_secs),
            call_timeout: Duration::from_secs(file.timeouts.call_secs),
            fanout_deadline: deadline,
        }
    }
}
