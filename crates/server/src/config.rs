use std::{env, fs, path::PathBuf, time::Duration};

use phonix_core::Numerals;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "PHONIX_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "phonix.toml";
/// Published sheet the shop keeps its customer records in.
pub const DEFAULT_SHEET_ID: &str = "1hfYLHn6peQLywoNpzVUbgrhI5w-y1xuckuGcbt2a0Ew";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Where the record table is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The spreadsheet's query endpoint, unwrapped locally.
    #[default]
    Upstream,
    /// A proxy that already serves the unwrapped JSON.
    Proxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub port: u16,
    pub sheet_id: String,
    pub sheet_name: Option<String>,
    pub source: SourceKind,
    pub proxy_url: String,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub database: PathBuf,
    pub numerals: Numerals,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            sheet_id: DEFAULT_SHEET_ID.to_string(),
            sheet_name: None,
            source: SourceKind::Upstream,
            proxy_url: "http://127.0.0.1:3000/api/google-sheets".to_string(),
            refresh_interval_secs: 80,
            fetch_timeout_secs: 15,
            database: PathBuf::from("phonix.db"),
            numerals: Numerals::Arabic,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads the TOML file named by `PHONIX_CONFIG` (or `phonix.toml`) and
    /// applies environment overrides. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = match fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overrides from `PORT`, `PHONIX_SHEET_ID` and `PHONIX_DATABASE`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORT") {
            self.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "PORT", value })?;
        }
        if let Some(value) = lookup("PHONIX_SHEET_ID").filter(|v| !v.trim().is_empty()) {
            self.sheet_id = value.trim().to_string();
        }
        if let Some(value) = lookup("PHONIX_DATABASE").filter(|v| !v.trim().is_empty()) {
            self.database = PathBuf::from(value.trim());
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
