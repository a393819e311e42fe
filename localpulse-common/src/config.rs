use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{EndpointConfig, PulseError, Result};

/// File name of the per-user config, placed directly under `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".localpulse.json";

pub const DEFAULT_PORTS: [u16; 9] = [3000, 3001, 8080, 8000, 5000, 9000, 4000, 4200, 5173];
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_LOAD_TEST_RPS: u32 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 30;

/// Persisted LocalPulse settings.
///
/// Unknown or missing fields fall back to their defaults on load; see
/// [`PulseConfig::load_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub default_ports: Vec<u16>,
    #[serde(rename = "check_interval_seconds", deserialize_with = "non_positive_as_zero")]
    pub check_interval_secs: u64,
    #[serde(deserialize_with = "non_positive_as_zero")]
    pub load_test_rps: u32,
    #[serde(rename = "timeout_seconds", deserialize_with = "non_positive_as_zero")]
    pub timeout_secs: u64,
    #[serde(deserialize_with = "non_positive_as_zero")]
    pub max_concurrency: usize,
    #[serde(rename = "window_seconds", deserialize_with = "non_positive_as_zero")]
    pub window_secs: u64,
}

/// Read a signed integer; zero and negative values become 0 so that
/// `fill_defaults` replaces them.
fn non_positive_as_zero<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + Default,
{
    let value = i64::deserialize(deserializer)?;
    if value <= 0 {
        return Ok(T::default());
    }
    T::try_from(value).map_err(|_| D::Error::custom(format!("{value} is out of range")))
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            default_ports: DEFAULT_PORTS.to_vec(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            load_test_rps: DEFAULT_LOAD_TEST_RPS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl PulseConfig {
    /// `$HOME/.localpulse.json`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(|h| PathBuf::from(h).join(CONFIG_FILE_NAME))
    }

    /// Load the config at `path`.
    ///
    /// A missing file is not an error and yields [`PulseConfig::default`].
    /// Zero-valued tunables and an empty port list are replaced by defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(PulseError::Config(format!("cannot read {}: {e}", path.display())))
            }
        };

        let mut config: PulseConfig = serde_json::from_str(&data)
            .map_err(|e| PulseError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.fill_defaults();
        Ok(config)
    }

    /// Write the config as pretty-printed JSON, readable only by the owner on unix.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| PulseError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, data)
            .map_err(|e| PulseError::Config(format!("cannot write {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| PulseError::Config(format!("cannot chmod {}: {e}", path.display())))?;
        }
        Ok(())
    }

    /// Append an endpoint unless one with the same URL is already present.
    /// Returns whether it was added.
    pub fn add_endpoint(&mut self, url: &str, name: Option<&str>) -> bool {
        if self.endpoints.iter().any(|ep| ep.url == url) {
            return false;
        }
        self.endpoints.push(EndpointConfig {
            url: url.to_string(),
            name: name.map(str::to_string),
        });
        true
    }

    /// Remove the endpoint with `url`; returns whether anything was removed.
    pub fn remove_endpoint(&mut self, url: &str) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|ep| ep.url != url);
        self.endpoints.len() != before
    }

    fn fill_defaults(&mut self) {
        if self.default_ports.is_empty() {
            self.default_ports = DEFAULT_PORTS.to_vec();
        }
        if self.check_interval_secs == 0 {
            self.check_interval_secs = DEFAULT_CHECK_INTERVAL_SECS;
        }
        if self.load_test_rps == 0 {
            self.load_test_rps = DEFAULT_LOAD_TEST_RPS;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.max_concurrency == 0 {
            self.max_concurrency = DEFAULT_MAX_CONCURRENCY;
        }
        if self.window_secs == 0 {
            self.window_secs = DEFAULT_WINDOW_SECS;
        }
    }
}
