use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration loaded from `~/.config/csn/config.toml`.
///
/// Covers the storage root and origin-probe tuning; seeding-pipeline and
/// peer-serving knobs live with their own processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsnConfig {
    /// Root directory for task artifacts. Defaults to the XDG data dir.
    pub storage_root: Option<PathBuf>,
    /// Connect timeout for origin probes, in seconds.
    pub probe_connect_timeout_secs: u64,
    /// Total timeout for origin probes, in seconds.
    pub probe_timeout_secs: u64,
    /// Redirect limit for origin probes; must match the fetcher's policy so
    /// cache identity and fetch identity agree.
    pub probe_max_redirects: u32,
}

impl Default for CsnConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            probe_connect_timeout_secs: 15,
            probe_timeout_secs: 30,
            probe_max_redirects: 10,
        }
    }
}

impl CsnConfig {
    pub fn probe_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Resolve the storage root: configured path, or `$XDG_DATA_HOME/csn/tasks`.
    pub fn storage_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.storage_root {
            return Ok(root.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("csn")?;
        Ok(xdg_dirs.get_data_home().join("tasks"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("csn")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CsnConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CsnConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: CsnConfig = toml::from_str(&data)?;
    Ok(cfg)
}
