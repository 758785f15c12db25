//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables.
//!
//! Resolution goes through a lookup function rather than `std::env` directly, so binaries pass
//! [`env_lookup`] and tests pass a map.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_MODEL, DEFAULT_MODEL_BASE_URL, DEFAULT_MODEL_TIMEOUT_SECS,
    DEFAULT_OUTPUT_DIR, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL_SECS, DEFAULT_TEMPLATE_DIR,
    MODEL_TEMPERATURE,
};
use crate::error::ConfigError;
use crate::locale::Locale;
use crate::session::SessionLimits;
use intake_types::NonEmptyText;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Reads a setting from the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Value of `name`, treating blank values as unset.
fn lookup_trimmed(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parses `name` with [`FromStr`], falling back to `default` when unset.
pub fn parse_setting<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup_trimmed(lookup, name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// A setting without which the process must not start.
pub fn required_setting(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<NonEmptyText, ConfigError> {
    lookup_trimmed(lookup, name)
        .and_then(|value| NonEmptyText::new(value).ok())
        .ok_or(ConfigError::Missing(name))
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    locale: Locale,
    template_path: PathBuf,
    output_dir: PathBuf,
    data_dir: PathBuf,
    session_limits: SessionLimits,
}

impl CoreConfig {
    pub fn new(
        locale: Locale,
        template_path: PathBuf,
        output_dir: PathBuf,
        data_dir: PathBuf,
        session_limits: SessionLimits,
    ) -> Result<Self, ConfigError> {
        if session_limits.capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "INTAKE_SESSION_CAPACITY",
                reason: "must be greater than zero".into(),
            });
        }
        if session_limits.ttl.is_zero() {
            return Err(ConfigError::Invalid {
                name: "INTAKE_SESSION_TTL_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            locale,
            template_path,
            output_dir,
            data_dir,
            session_limits,
        })
    }

    /// Resolves every `INTAKE_*` setting, applying defaults for the unset ones.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let locale: Locale = parse_setting(lookup, "INTAKE_LOCALE", Locale::default())?;
        let template_path = lookup_trimmed(lookup, "INTAKE_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(DEFAULT_TEMPLATE_DIR).join(locale.template_file_name()));
        let output_dir = lookup_trimmed(lookup, "INTAKE_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let data_dir = lookup_trimmed(lookup, "INTAKE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let ttl_secs: u64 =
            parse_setting(lookup, "INTAKE_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?;
        let capacity: usize =
            parse_setting(lookup, "INTAKE_SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY)?;

        Self::new(
            locale,
            template_path,
            output_dir,
            data_dir,
            SessionLimits {
                ttl: Duration::from_secs(ttl_secs),
                capacity,
            },
        )
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn session_limits(&self) -> SessionLimits {
        self.session_limits
    }
}

/// Settings of the hosted chat model.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: NonEmptyText,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.masked())
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ModelConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = required_setting(lookup, "OPENAI_API_KEY")?;
        let model = parse_setting(lookup, "OPENAI_MODEL", DEFAULT_MODEL.to_owned())?;
        let base_url = parse_setting(lookup, "OPENAI_BASE_URL", DEFAULT_MODEL_BASE_URL.to_owned())?;
        let timeout_secs: u64 =
            parse_setting(lookup, "OPENAI_TIMEOUT_SECS", DEFAULT_MODEL_TIMEOUT_SECS)?;

        Ok(Self {
            api_key,
            model,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            temperature: MODEL_TEMPERATURE,
        })
    }
}
