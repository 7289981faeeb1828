use crate::tagger::{BuildMode, TagStyle, DEFAULT_WRAPPER};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1234;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Project root that patch targets are resolved against
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root: default_root(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Chat-completions URL; no backend when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the backend credential
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl TransformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The credential, read from the process environment.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TaggerConfig {
    /// `development` or `production`; falls back to `NODE_ENV`
    #[serde(default)]
    pub mode: Option<String>,
    /// `attribute` or `wrapper`
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_wrapper")]
    pub wrapper_component: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            mode: None,
            style: default_style(),
            wrapper_component: default_wrapper(),
        }
    }
}

impl TaggerConfig {
    pub fn build_mode(&self) -> BuildMode {
        self.mode
            .as_deref()
            .and_then(BuildMode::parse)
            .unwrap_or_else(BuildMode::from_env)
    }

    pub fn tag_style(&self) -> TagStyle {
        match self.style.as_str() {
            "wrapper" => TagStyle::Wrapper {
                component: self.wrapper_component.clone(),
            },
            _ => TagStyle::Attribute,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_style() -> String {
    "attribute".to_string()
}

fn default_wrapper() -> String {
    DEFAULT_WRAPPER.to_string()
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.server.host.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "server.host",
            });
        }

        if let Some(endpoint) = &self.transform.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                issues.push(ValidationIssue::InvalidValue {
                    field: "transform.endpoint",
                    message: format!("`{endpoint}` must be an http:// or https:// URL"),
                });
            }
        }
        if self.transform.timeout_secs == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "transform.timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.transform.model.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "transform.model",
            });
        }

        if let Some(mode) = &self.tagger.mode {
            if BuildMode::parse(mode).is_none() {
                issues.push(ValidationIssue::InvalidValue {
                    field: "tagger.mode",
                    message: format!("unknown mode `{mode}`"),
                });
            }
        }
        if !matches!(self.tagger.style.as_str(), "attribute" | "wrapper") {
            issues.push(ValidationIssue::InvalidValue {
                field: "tagger.style",
                message: format!("unknown style `{}`", self.tagger.style),
            });
        }
        if !self
            .tagger
            .wrapper_component
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
        {
            issues.push(ValidationIssue::InvalidValue {
                field: "tagger.wrapper_component",
                message: "must be a capitalized component name".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid value for '{field}': {message}")
            }
        }
    }
}
