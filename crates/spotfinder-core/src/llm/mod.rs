mod gemini;
mod http;
mod perplexity;
mod rig_adapter;
mod settings;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use perplexity::PerplexityClient;
pub use rig_adapter::RigTextGenerator;
pub use settings::{LlmOverrides, LlmSettings};

/// Chat-style text generation: one system instruction, one user message, plain
/// text back.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short provider label for logs.
    fn label(&self) -> &str;

    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Generator used when no provider is configured. Every call fails, which
/// routes queries through the deterministic fallback ranking.
#[derive(Debug, Default, Clone)]
pub struct NoopGenerator;

#[async_trait]
impl TextGenerator for NoopGenerator {
    fn label(&self) -> &str {
        "noop"
    }

    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("no text generator configured; set SPOTFINDER_LLM_PROVIDER to enable one")
    }
}

/// Supported provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Noop,
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" | "none" => Ok(Self::Noop),
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "perplexity" | "pplx" => Ok(Self::Perplexity),
            other => bail!(
                "unknown LLM provider `{other}` (expected noop, openai, anthropic, gemini or perplexity)"
            ),
        }
    }
}

/// Build the generator selected by `settings.provider`.
pub fn build_generator(settings: &LlmSettings) -> Result<Arc<dyn TextGenerator>> {
    let kind: ProviderKind = settings.provider.parse()?;
    let generator: Arc<dyn TextGenerator> = match kind {
        ProviderKind::Noop => Arc::new(NoopGenerator),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(settings)?),
        ProviderKind::Perplexity => Arc::new(PerplexityClient::new(settings)?),
        ProviderKind::OpenAi | ProviderKind::Anthropic => {
            Arc::new(RigTextGenerator::for_kind(kind, settings)?)
        }
    };
    Ok(generator)
}

pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    crate::sources::truncate(input, max_chars)
}
