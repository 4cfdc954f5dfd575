use std::env;
use std::time::Duration;

use reqwest::header::HeaderValue;
use thiserror::Error;

use crate::normalize::CropPolicy;

pub const DEFAULT_PROMPT: &str = "set in an ugly christmas sweater competition";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Deployment settings, built once at startup and handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint_url: String,
    pub token: String,
    pub num_images: usize,
    pub crop_policy: CropPolicy,
    pub default_prompt: String,
    pub custom_prompt: bool,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub host: String,
    pub port: u16,
    pub log_json: bool,
}

impl Config {
    pub fn new(endpoint_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            token: token.into(),
            num_images: 4,
            crop_policy: CropPolicy::PortraitLandscape,
            default_prompt: DEFAULT_PROMPT.to_string(),
            custom_prompt: false,
            poll_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(60),
            max_upload_bytes: 20 * 1024 * 1024,
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_json: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup` so tests don't have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let endpoint_url = required("OCTOSHOP_ENDPOINT_URL")?
            .trim_end_matches('/')
            .to_string();
        let token = required("OCTOAI_TOKEN")?;
        bearer_header(&token)?;
        let mut config = Config::new(endpoint_url, token);

        if let Some(n) = parse(&lookup, "OCTOSHOP_NUM_IMAGES")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    name: "OCTOSHOP_NUM_IMAGES",
                    value: "0".to_string(),
                });
            }
            config.num_images = n;
        }
        if let Some(policy) = parse(&lookup, "OCTOSHOP_CROP_POLICY")? {
            config.crop_policy = policy;
        }
        if let Some(prompt) = lookup("OCTOSHOP_PROMPT").filter(|p| !p.trim().is_empty()) {
            config.default_prompt = prompt;
        }
        if let Some(custom) = parse(&lookup, "OCTOSHOP_CUSTOM_PROMPT")? {
            config.custom_prompt = custom;
        }
        if let Some(ms) = parse(&lookup, "OCTOSHOP_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse(&lookup, "OCTOSHOP_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(mb) = parse::<usize, _>(&lookup, "OCTOSHOP_MAX_UPLOAD_MB")? {
            config.max_upload_bytes =
                mb.checked_mul(1024 * 1024).ok_or_else(|| ConfigError::Invalid {
                    name: "OCTOSHOP_MAX_UPLOAD_MB",
                    value: mb.to_string(),
                })?;
        }
        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(json) = parse(&lookup, "OCTOSHOP_LOG_JSON")? {
            config.log_json = json;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The prompt to send: the user's text when custom prompts are enabled, else the default.
    pub fn resolve_prompt(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(p) if self.custom_prompt && !p.is_empty() => p.to_string(),
            _ => self.default_prompt.clone(),
        }
    }
}

/// `Authorization` value for `token`. A rejected token is not echoed back.
pub fn bearer_header(token: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ConfigError::Invalid {
        name: "OCTOAI_TOKEN",
        value: "<redacted>".to_string(),
    })
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
