use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    domain::{Account, Settings},
    registry::AccountRegistry,
};

const STORAGE_DIR_NAME: &str = ".gitify";
const CONFIG_FILE: &str = "config.json";
const HOME_OVERRIDE_ENV: &str = "GITIFY_HOME";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Serialize, Deserialize, Clone)]
pub struct StoredConfig {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            settings: Settings::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl StoredConfig {
    fn upsert(&mut self, account: &Account) {
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|entry| entry.hostname == account.hostname)
        {
            *existing = account.clone();
        } else {
            self.accounts.push(account.clone());
        }
    }

    fn remove(&mut self, hostname: &str) {
        self.accounts.retain(|entry| entry.hostname != hostname);
    }
}

/// Everything the poller needs to run, resolved from the config file.
pub struct LoadedConfig {
    pub registry: AccountRegistry,
    pub settings: Settings,
    pub poll_interval: Duration,
}

pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Uses `$GITIFY_HOME` when set, `~/.gitify` otherwise.
    pub fn initialize() -> Result<Self, ConfigError> {
        let dir = match env::var_os(HOME_OVERRIDE_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = env::var("HOME").map_err(|_| ConfigError::HomeDirMissing)?;
                PathBuf::from(home).join(STORAGE_DIR_NAME)
            }
        };
        Self::at(dir)
    }

    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            config_path: dir.join(CONFIG_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config = self.read_config()?;
        if config.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        debug!(
            path = %self.config_path.display(),
            accounts = config.accounts.len(),
            "loaded configuration"
        );
        Ok(LoadedConfig {
            registry: AccountRegistry::new(config.accounts),
            settings: config.settings,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        })
    }

    pub fn persist_account(&self, account: &Account) -> Result<(), ConfigError> {
        let mut config = self.read_config()?;
        config.upsert(account);
        self.write_config(&config)
    }

    pub fn forget(&self, hostname: &str) -> Result<(), ConfigError> {
        let mut config = self.read_config()?;
        config.remove(hostname);
        self.write_config(&config)
    }

    fn read_config(&self) -> Result<StoredConfig, ConfigError> {
        match fs::read_to_string(&self.config_path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StoredConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_config(&self, config: &StoredConfig) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, data)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME environment variable is not set; set GITIFY_HOME to choose a config directory")]
    HomeDirMissing,
    #[error("poll_interval_secs must be greater than zero")]
    InvalidInterval,
    #[error("I/O error while handling the config file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse the config file: {0}")]
    Serialization(#[from] serde_json::Error),
}
