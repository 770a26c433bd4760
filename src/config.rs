use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

pub const DEFAULT_BASE_URL: &str = "https://api.smartable.ai/coronavirus/stats";
pub const DEFAULT_REQUEST_DELAY_SECS: u64 = 30;
pub const API_KEY_ENV: &str = "EPISTATS_API_KEY";

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub data_folder: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_delay_secs: Option<u64>,
    #[serde(default)]
    pub destinations: Vec<DestinationEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DestinationEntry {
    Shorthand(String),
    Detailed(DestinationEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DestinationEntryObject {
    pub name: String,
    pub path: String,
}

/// Connection descriptor for one destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationHandle {
    pub name: String,
    pub path: Utf8PathBuf,
}

/// Immutable run configuration, built once at startup and handed to the
/// catalog, fetcher and loader.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_folder: Utf8PathBuf,
    pub api_key: String,
    pub base_url: String,
    pub request_delay: Duration,
    pub destinations: Vec<DestinationHandle>,
}

impl ResolvedConfig {
    /// The first configured destination, which also serves the area catalog.
    pub fn primary_destination(&self) -> Option<&DestinationHandle> {
        self.destinations.first()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, StatsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => default_settings_path().ok_or(StatsError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| StatsError::ConfigRead(config_path.clone()))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|err| StatsError::ConfigParse(err.to_string()))?;

        let env_key = std::env::var(API_KEY_ENV).ok();
        Self::resolve_settings(settings, env_key)
    }

    pub fn resolve_settings(
        settings: Settings,
        env_api_key: Option<String>,
    ) -> Result<ResolvedConfig, StatsError> {
        let data_folder = Utf8PathBuf::from(settings.data_folder.trim());
        if !data_folder.as_std_path().is_dir() {
            return Err(StatsError::InvalidConfig(format!(
                "data folder {data_folder} does not exist"
            )));
        }

        let api_key = settings
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .or_else(|| {
                env_api_key
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
            })
            .ok_or_else(|| {
                StatsError::InvalidConfig(format!(
                    "api_key missing (set it in settings or {API_KEY_ENV})"
                ))
            })?;

        let base_url = settings
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let destinations = settings
            .destinations
            .into_iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                DestinationEntry::Shorthand(path) => DestinationHandle {
                    name: format!("destination-{}", index + 1),
                    path: Utf8PathBuf::from(path),
                },
                DestinationEntry::Detailed(obj) => DestinationHandle {
                    name: obj.name,
                    path: Utf8PathBuf::from(obj.path),
                },
            })
            .collect::<Vec<_>>();

        if destinations.is_empty() {
            return Err(StatsError::InvalidConfig(
                "at least one destination is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for handle in &destinations {
            if !seen.insert(handle.name.as_str()) {
                return Err(StatsError::InvalidConfig(format!(
                    "duplicate destination name: {}",
                    handle.name
                )));
            }
        }

        Ok(ResolvedConfig {
            data_folder,
            api_key,
            base_url,
            request_delay: Duration::from_secs(
                settings
                    .request_delay_secs
                    .unwrap_or(DEFAULT_REQUEST_DELAY_SECS),
            ),
            destinations,
        })
    }
}

fn default_settings_path() -> Option<PathBuf> {
    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return Some(local);
    }
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("epistats").join(SETTINGS_FILE))
        .filter(|path| path.exists())
}
