use directories::ProjectDirs;
use doc_model::{parse_strategy_list, ViewerSettings};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: u32 = 1;

pub const ENV_DATA_DIR: &str = "PDFSHELF_DATA_DIR";
pub const ENV_BACKEND_URL: &str = "PDFSHELF_BACKEND_URL";
pub const ENV_TIMEOUT_MS: &str = "PDFSHELF_TIMEOUT_MS";
pub const ENV_MAX_ATTEMPTS: &str = "PDFSHELF_MAX_ATTEMPTS";
pub const ENV_STRATEGIES: &str = "PDFSHELF_STRATEGIES";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("settings file has unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: ViewerSettings,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("dev", "PdfShelf", "PdfShelf").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    /// `PDFSHELF_DATA_DIR` when set, the platform data directory otherwise.
    pub fn from_env_or_default() -> Result<Self, StorageError> {
        match std::env::var_os(ENV_DATA_DIR) {
            Some(dir) if !dir.is_empty() => Ok(Self::with_root(dir)),
            _ => Self::from_default_project(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn load_settings(&self) -> Result<ViewerSettings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(ViewerSettings::default());
        }

        let bytes = fs::read(&path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != SETTINGS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version));
        }

        debug!("loaded settings from {}", path.display());
        Ok(envelope.settings)
    }

    /// Stored settings with `PDFSHELF_*` environment overrides applied.
    pub fn load_effective_settings(&self) -> Result<ViewerSettings, StorageError> {
        let mut settings = self.load_settings()?;
        apply_env_overrides(&mut settings)?;
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &ViewerSettings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.settings_path(), bytes)?;
        Ok(())
    }

    /// Removes the stored settings so defaults apply again.
    pub fn reset_settings(&self) -> Result<(), StorageError> {
        match fs::remove_file(self.settings_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn apply_env_overrides(settings: &mut ViewerSettings) -> Result<(), StorageError> {
    apply_overrides(settings, |key| std::env::var(key).ok())
}

fn apply_overrides(
    settings: &mut ViewerSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), StorageError> {
    let overrides = [
        (ENV_BACKEND_URL, "backend_url"),
        (ENV_TIMEOUT_MS, "timeout_per_attempt_ms"),
        (ENV_MAX_ATTEMPTS, "max_attempts"),
        (ENV_STRATEGIES, "strategies"),
    ];

    for (env_key, setting) in overrides {
        if let Some(value) = lookup(env_key) {
            set_setting(settings, setting, &value).map_err(|err| match err {
                StorageError::InvalidValue { reason, .. } => {
                    StorageError::InvalidValue { key: env_key.to_owned(), reason }
                }
                other => other,
            })?;
        }
    }

    Ok(())
}

/// Sets one setting from its textual form, as typed on the command line.
pub fn set_setting(
    settings: &mut ViewerSettings,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    let invalid = |reason: String| StorageError::InvalidValue { key: key.to_owned(), reason };
    let value = value.trim();

    match key {
        "backend_url" => {
            if value.is_empty() {
                return Err(invalid("must not be empty".to_owned()));
            }
            settings.backend_url = value.to_owned();
        }
        "timeout_per_attempt_ms" => {
            let ms = value.parse::<u64>().map_err(|e| invalid(e.to_string()))?;
            if ms == 0 {
                return Err(invalid("must be greater than zero".to_owned()));
            }
            settings.timeout_per_attempt_ms = ms;
        }
        "max_attempts" => {
            settings.max_attempts = value.parse::<u32>().map_err(|e| invalid(e.to_string()))?;
        }
        "strategies" => {
            let strategies = parse_strategy_list(value).map_err(|e| invalid(e.to_string()))?;
            if strategies.is_empty() {
                return Err(invalid("at least one strategy is required".to_owned()));
            }
            settings.strategies = strategies;
        }
        other => return Err(StorageError::UnknownKey(other.to_owned())),
    }

    Ok(())
}
