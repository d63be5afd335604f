use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_CADENCE_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed folder mapping line: {0:?}")]
    MalformedMapping(String),
    #[error("no base folders configured")]
    NoBaseFolders,
}

/// Startup configuration, read once. The base-folder map is immutable for
/// the life of the process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub base_folders: BTreeMap<PathBuf, String>,
    pub cadence: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("DRIVESYNC_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR));
        let cadence = std::env::var("DRIVESYNC_CADENCE_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CADENCE_SECS));
        Self::load(config_dir, cadence)
    }

    pub fn load(config_dir: PathBuf, cadence: Duration) -> Result<Self, ConfigError> {
        let mapping = read_file(&config_dir.join("folder-ids.txt"))?;
        let base_folders = parse_folder_ids(&mapping)?;
        if base_folders.is_empty() {
            return Err(ConfigError::NoBaseFolders);
        }
        Ok(Self {
            config_dir,
            base_folders,
            cadence,
        })
    }

    pub fn service_account_path(&self) -> PathBuf {
        self.config_dir.join("service-account.json")
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        let raw = read_file(&self.config_dir.join("api-key.txt"))?;
        Ok(raw.trim_end().to_string())
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One `localFolderName=remoteFolderId` per line, split on the first `=`.
fn parse_folder_ids(contents: &str) -> Result<BTreeMap<PathBuf, String>, ConfigError> {
    let mut mapping = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (folder, id) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedMapping(line.to_string()))?;
        mapping.insert(PathBuf::from(folder), id.to_string());
    }
    Ok(mapping)
}
