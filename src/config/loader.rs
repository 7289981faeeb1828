use crate::config::schema::{Config, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the project root by [`discover`].
pub const CONFIG_FILE: &str = "span-patcher.toml";

pub const PORT_ENV: &str = "SPAN_PATCHER_PORT";
pub const ROOT_ENV: &str = "SPAN_PATCHER_ROOT";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Env {
        var: &'static str,
        value: String,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
            ConfigError::Env { var, value } => {
                write!(f, "invalid value `{value}` in environment variable {var}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Env { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Config, ConfigError> {
    let config: Config = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load `span-patcher.toml` from `root` if present, defaults otherwise.
///
/// A relative `server.root` in the file is taken relative to `root`.
pub fn discover(root: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let root = root.as_ref();
    let path = root.join(CONFIG_FILE);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let mut config = Config::default();
        config.server.root = root.to_path_buf();
        return Ok(config);
    }

    let mut config = load_from_path(&path)?;
    if config.server.root.is_relative() {
        config.server.root = root.join(&config.server.root);
    }
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Apply `SPAN_PATCHER_PORT` and `SPAN_PATCHER_ROOT` from the process environment.
pub fn apply_env(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_with(config, |var| std::env::var(var).ok())
}

pub(crate) fn apply_env_with(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(PORT_ENV) {
        config.server.port = value.trim().parse().map_err(|_| ConfigError::Env {
            var: PORT_ENV,
            value: value.clone(),
        })?;
    }
    if let Some(value) = lookup(ROOT_ENV).filter(|v| !v.is_empty()) {
        config.server.root = PathBuf::from(value);
    }
    Ok(())
}
