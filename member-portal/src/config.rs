// Portal configuration
//
// Defaults, then the optional TOML file, then MEMBER_PORTAL__* environment
// variables (`MEMBER_PORTAL__UPLOAD__MAX_FILES=3`).

use config::{Config, Environment, File, FileFormat};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::widgets::upload::{UploadConfig, DEFAULT_MAX_SIZE_BYTES};

pub const ENV_PREFIX: &str = "MEMBER_PORTAL";
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid api_base_url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },
    #[error("upload.allowed_types must list at least one MIME type")]
    NoAllowedTypes,
    #[error("could not write {path}: {message}")]
    Write { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    pub max_files: usize,
    pub max_size_bytes: u64,
    pub allowed_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub upload: UploadSettings,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let upload = UploadConfig::default();
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            log_level: "info".to_string(),
            upload: UploadSettings {
                max_files: upload.max_files,
                max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
                allowed_types: upload.allowed_types,
            },
        }
    }
}

impl PortalConfig {
    /// Load from the resolved config path and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = crate::utils::path_resolver::resolve_config_path();
        Self::load_from(path.as_deref(), None)
    }

    /// `env` replaces the process environment when given; tests use it.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("api_base_url", defaults.api_base_url.clone())?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("log_level", defaults.log_level.clone())?
            .set_default("upload.max_files", defaults.upload.max_files as u64)?
            .set_default("upload.max_size_bytes", defaults.upload.max_size_bytes)?
            .set_default("upload.allowed_types", defaults.upload.allowed_types.clone())?;

        if let Some(path) = path {
            if path.exists() {
                info!(
                    "[PHASE: config] [STEP: load] Reading config file {}",
                    path.display()
                );
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("upload.allowed_types")
                .source(env),
        );

        let cfg: PortalConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.api_base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.api_base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.api_base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::NotPositive {
                key: "request_timeout_secs",
            });
        }
        if self.upload.max_files == 0 {
            return Err(ConfigError::NotPositive {
                key: "upload.max_files",
            });
        }
        if self.upload.max_size_bytes == 0 {
            return Err(ConfigError::NotPositive {
                key: "upload.max_size_bytes",
            });
        }
        if self.upload.allowed_types.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoAllowedTypes);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.log_level.parse() {
            Ok(level) => level,
            Err(_) => {
                warn!(
                    "[PHASE: config] [STEP: log_level] Unknown log level '{}', using info",
                    self.log_level
                );
                log::LevelFilter::Info
            }
        }
    }

    pub fn to_upload_config(&self) -> UploadConfig {
        UploadConfig {
            max_files: self.upload.max_files,
            allowed_types: self
                .upload
                .allowed_types
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            max_size_bytes: self.upload.max_size_bytes,
        }
    }

    /// Write the defaults as TOML. Refuses to overwrite an existing file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.display().to_string(),
            message,
        };
        if path.exists() {
            return Err(write_err("file already exists".to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let body = toml::to_string_pretty(&Self::default()).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, body).map_err(|e| write_err(e.to_string()))?;
        info!(
            "[PHASE: config] [STEP: init] Wrote default config to {}",
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let cfg = PortalConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(cfg, PortalConfig::default());
        assert_eq!(cfg.to_upload_config(), UploadConfig::default());
    }

    #[test]
    fn file_overrides_defaults_and_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "api_base_url = \"https://portal.example.org/api/\"\n\
             request_timeout_secs = 10\n\
             [upload]\n\
             max_files = 3\n",
        )
        .unwrap();

        let cfg = PortalConfig::load_from(Some(&path), env(&[])).unwrap();
        assert_eq!(cfg.api_base_url, "https://portal.example.org/api/");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.upload.max_files, 3);
        assert_eq!(cfg.upload.max_size_bytes, DEFAULT_MAX_SIZE_BYTES);

        let cfg = PortalConfig::load_from(
            Some(&path),
            env(&[
                ("MEMBER_PORTAL__UPLOAD__MAX_FILES", "2"),
                ("MEMBER_PORTAL__UPLOAD__ALLOWED_TYPES", "application/pdf,image/png"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.upload.max_files, 2);
        assert_eq!(
            cfg.to_upload_config().allowed_types,
            vec!["application/pdf".to_string(), "image/png".to_string()]
        );
    }

    #[test]
    fn missing_file_is_fine() {
        let dir = tempdir().unwrap();
        let cfg = PortalConfig::load_from(Some(&dir.path().join("absent.toml")), env(&[])).unwrap();
        assert_eq!(cfg.request_timeout_secs, 30);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PortalConfig::load_from(
            None,
            env(&[("MEMBER_PORTAL__API_BASE_URL", "not a url")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = PortalConfig::load_from(
            None,
            env(&[("MEMBER_PORTAL__UPLOAD__MAX_FILES", "0")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive {
                key: "upload.max_files"
            }
        ));
    }

    #[test]
    fn write_default_round_trips_and_never_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("member-portal").join("config.toml");
        PortalConfig::write_default(&path).unwrap();

        let cfg = PortalConfig::load_from(Some(&path), env(&[])).unwrap();
        assert_eq!(cfg, PortalConfig::default());
        assert!(matches!(
            PortalConfig::write_default(&path),
            Err(ConfigError::Write { .. })
        ));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let cfg = PortalConfig {
            log_level: "chatty".to_string(),
            ..PortalConfig::default()
        };
        assert_eq!(cfg.log_level_filter(), log::LevelFilter::Info);
    }
}
