use crate::snapshot::SnapshotOptions;
use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_root_path")]
    pub root_path: String,
    #[serde(default = "default_window")]
    pub observation_window: String,
    #[serde(default = "default_window")]
    pub cpu_window: String,
    #[serde(default = "default_overlap_windows")]
    pub overlap_windows: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Option<String>,
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root_path: default_root_path(),
            observation_window: default_window(),
            cpu_window: default_window(),
            overlap_windows: default_overlap_windows(),
            request_timeout: default_request_timeout(),
            cors_allow_origin: default_cors_allow_origin(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.root_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле root_path не должно быть пустым".to_string(),
            ));
        }
        if !Path::new(&self.root_path).is_absolute() {
            return Err(ConfigError::Validation(format!(
                "root_path '{}' должен быть абсолютным путём",
                self.root_path
            )));
        }

        parse_window("observation_window", &self.observation_window)?;
        parse_window("cpu_window", &self.cpu_window)?;
        if let Some(timeout) = &self.request_timeout {
            parse_window("request_timeout", timeout)?;
        }

        if HeaderValue::from_str(&self.cors_allow_origin).is_err()
            || self.cors_allow_origin.trim().is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "cors_allow_origin '{}' не является допустимым значением заголовка",
                self.cors_allow_origin
            )));
        }

        Ok(())
    }

    pub fn snapshot_options(&self) -> Result<SnapshotOptions, ConfigError> {
        let deadline = match &self.request_timeout {
            Some(timeout) => Some(parse_window("request_timeout", timeout)?),
            None => None,
        };
        Ok(SnapshotOptions {
            root_path: PathBuf::from(&self.root_path),
            observation_window: parse_window("observation_window", &self.observation_window)?,
            cpu_window: parse_window("cpu_window", &self.cpu_window)?,
            overlap_windows: self.overlap_windows,
            deadline,
        })
    }

    pub fn cors_origin(&self) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(&self.cors_allow_origin).map_err(|err| {
            ConfigError::Validation(format!("cors_allow_origin: {err}"))
        })
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn parse_window(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let value = humantime::parse_duration(raw.trim()).map_err(|err| {
        ConfigError::Validation(format!("{field}: '{raw}' не является длительностью: {err}"))
    })?;
    if value.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{field} должно быть > 0"
        )));
    }
    Ok(value)
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_root_path() -> String {
    "/".to_string()
}

fn default_window() -> String {
    "1s".to_string()
}

const fn default_overlap_windows() -> bool {
    true
}

fn default_request_timeout() -> Option<String> {
    Some("30s".to_string())
}

fn default_cors_allow_origin() -> String {
    "*".to_string()
}
