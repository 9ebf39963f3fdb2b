//! Configuration layer: typed settings with layered precedence (file → explicit file → env).

use std::{path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "isorender";
const ENV_PREFIX: &str = "ISORENDER";
pub(crate) const DEFAULT_MOUNT_SURFACE_ID: &str = "__isorender__";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub logging: LoggingSettings,
}

/// Where the renderer is running. Supplied by the host, never sniffed from
/// the process environment at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeTarget {
    /// Long-running service process; defaults to full markup.
    #[default]
    Service,
    /// Client runtime with live surfaces; defaults to `dom`.
    Presentation,
}

impl FromStr for RuntimeTarget {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "service" | "server" => Ok(Self::Service),
            "presentation" | "browser" => Ok(Self::Presentation),
            other => Err(format!("unknown runtime target `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub target: RuntimeTarget,
    /// Id of the surface `dom` renders mount onto when no target is given.
    pub mount_surface_id: String,
    /// Produce static markup for `markup` mode as well.
    pub markup_uses_static: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            target: RuntimeTarget::default(),
            mount_surface_id: DEFAULT_MOUNT_SURFACE_ID.to_string(),
            markup_uses_static: false,
        }
    }
}

impl RuntimeSettings {
    pub fn for_target(target: RuntimeTarget) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence. An explicit `config_file`
/// must exist; the default files are optional.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    runtime: RawRuntimeSettings,
    logging: RawLoggingSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { runtime, logging } = raw;

        Ok(Self {
            runtime: build_runtime_settings(runtime)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_runtime_settings(runtime: RawRuntimeSettings) -> Result<RuntimeSettings, LoadError> {
    let target = match runtime.target {
        Some(target) => RuntimeTarget::from_str(&target)
            .map_err(|reason| LoadError::invalid("runtime.target", reason))?,
        None => RuntimeTarget::default(),
    };

    let mount_surface_id = match runtime.mount_surface_id {
        Some(id) => {
            let trimmed = id.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "runtime.mount_surface_id",
                    "must not be empty",
                ));
            }
            trimmed.to_string()
        }
        None => DEFAULT_MOUNT_SURFACE_ID.to_string(),
    };

    Ok(RuntimeSettings {
        target,
        mount_surface_id,
        markup_uses_static: runtime.markup_uses_static.unwrap_or(false),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRuntimeSettings {
    target: Option<String>,
    mount_surface_id: Option<String>,
    markup_uses_static: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests;
