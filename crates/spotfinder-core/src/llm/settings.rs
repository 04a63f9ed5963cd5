use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Configuration for the text-generation provider used by the query synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
    pub api_version: Option<String>,
}

/// Optional `[llm]` table of the config file; any field set here wins over the
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LlmOverrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub api_version: Option<String>,
}

impl LlmSettings {
    pub(crate) const PROVIDER_ENV: &'static str = "SPOTFINDER_LLM_PROVIDER";
    pub(crate) const API_KEY_ENV: &'static str = "SPOTFINDER_LLM_API_KEY";
    pub(crate) const ENDPOINT_ENV: &'static str = "SPOTFINDER_LLM_ENDPOINT";
    pub(crate) const MODEL_ENV: &'static str = "SPOTFINDER_LLM_MODEL";
    pub(crate) const TIMEOUT_ENV: &'static str = "SPOTFINDER_LLM_TIMEOUT_SECS";
    pub(crate) const RETRIES_ENV: &'static str = "SPOTFINDER_LLM_MAX_RETRIES";
    pub(crate) const API_VERSION_ENV: &'static str = "SPOTFINDER_LLM_API_VERSION";

    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Load settings from environment variables.
    ///
    /// * `SPOTFINDER_LLM_PROVIDER`: provider identifier (default: `noop`).
    /// * `SPOTFINDER_LLM_API_KEY`: API key/token (required unless `noop`).
    /// * `SPOTFINDER_LLM_ENDPOINT`: optional custom endpoint/base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&LlmOverrides::default())
    }

    /// Environment settings with config-file values layered on top.
    pub fn from_env_with(overrides: &LlmOverrides) -> Result<Self> {
        let mut vars: HashMap<String, String> = std::env::vars().collect();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                vars.insert(key.to_string(), value);
            }
        };
        set(Self::PROVIDER_ENV, overrides.provider.clone());
        set(Self::API_KEY_ENV, overrides.api_key.clone());
        set(Self::ENDPOINT_ENV, overrides.endpoint.clone());
        set(Self::MODEL_ENV, overrides.model.clone());
        set(Self::TIMEOUT_ENV, overrides.timeout_secs.map(|v| v.to_string()));
        set(Self::RETRIES_ENV, overrides.max_retries.map(|v| v.to_string()));
        set(Self::API_VERSION_ENV, overrides.api_version.clone());
        Self::from_map(vars)
    }

    fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let provider = get(Self::PROVIDER_ENV).unwrap_or_else(|| "noop".to_string());
        let api_key = match get(Self::API_KEY_ENV) {
            Some(key) => key,
            None if provider.eq_ignore_ascii_case("noop") => String::new(),
            None => bail!(
                "environment variable {} must be set for provider `{}`",
                Self::API_KEY_ENV,
                provider
            ),
        };
        let number = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok());

        Ok(Self {
            provider,
            api_key,
            endpoint: get(Self::ENDPOINT_ENV),
            model: get(Self::MODEL_ENV),
            timeout_secs: number(Self::TIMEOUT_ENV),
            max_retries: number(Self::RETRIES_ENV)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0),
            api_version: get(Self::API_VERSION_ENV),
        })
    }

    pub fn noop() -> Self {
        Self {
            provider: "noop".into(),
            api_key: String::new(),
            endpoint: None,
            model: None,
            timeout_secs: None,
            max_retries: 0,
            api_version: None,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }
}
