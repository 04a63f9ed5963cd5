use super::{LlmSettings, ProviderKind, TextGenerator};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::message::AssistantContent;
use rig::completion::CompletionModelDyn;
use rig::providers::{anthropic, openai};
use rig::OneOrMany;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_OUTPUT_TOKENS: u64 = 400;
const TEMPERATURE: f64 = 0.2;

/// Completion-model backed generator for providers rig supports natively.
pub struct RigTextGenerator {
    model: Box<dyn CompletionModelDyn + Send + Sync>,
    provider_label: &'static str,
    model_id: String,
}

impl RigTextGenerator {
    pub fn for_kind(kind: ProviderKind, settings: &LlmSettings) -> Result<Self> {
        match kind {
            ProviderKind::OpenAi => Self::new_openai(settings),
            ProviderKind::Anthropic => Self::new_anthropic(settings),
            ProviderKind::Gemini | ProviderKind::Perplexity | ProviderKind::Noop => {
                bail!("rig adapter does not handle provider `{kind:?}`; use its standalone client")
            }
        }
    }

    fn new_openai(settings: &LlmSettings) -> Result<Self> {
        require_key("OpenAI", settings)?;
        let mut builder = openai::Client::builder(&settings.api_key);
        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.base_url(endpoint);
        }
        let client = builder.build();
        let model_id = resolve_model(settings, DEFAULT_OPENAI_MODEL);
        Ok(Self {
            model: Box::new(client.completion_model(&model_id)),
            provider_label: "openai",
            model_id,
        })
    }

    fn new_anthropic(settings: &LlmSettings) -> Result<Self> {
        require_key("Anthropic", settings)?;
        let mut builder = anthropic::ClientBuilder::new(&settings.api_key);
        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.base_url(endpoint);
        }
        if let Some(version) = settings.api_version.as_deref() {
            builder = builder.anthropic_version(version);
        }
        let client = builder
            .build()
            .context("failed to build Anthropic client")?;
        let model_id = resolve_model(settings, DEFAULT_ANTHROPIC_MODEL);
        Ok(Self {
            model: Box::new(client.completion_model(&model_id)),
            provider_label: "anthropic",
            model_id,
        })
    }
}

fn require_key(provider: &str, settings: &LlmSettings) -> Result<()> {
    if settings.api_key.trim().is_empty() {
        bail!("{provider} API key must be provided via SPOTFINDER_LLM_API_KEY");
    }
    Ok(())
}

fn resolve_model(settings: &LlmSettings, default: &str) -> String {
    settings
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[async_trait]
impl TextGenerator for RigTextGenerator {
    fn label(&self) -> &str {
        self.provider_label
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = self
            .model
            .completion_request(user.to_string().into())
            .preamble(system.to_string())
            .max_tokens(MAX_OUTPUT_TOKENS)
            .temperature(TEMPERATURE)
            .build();

        let response = self
            .model
            .completion(request)
            .await
            .map_err(anyhow::Error::new)
            .with_context(|| {
                format!(
                    "{} completion failed for model {}",
                    self.provider_label, self.model_id
                )
            })?;

        let text = text_from_choice(response.choice);
        if text.trim().is_empty() {
            bail!(
                "rig {} response from model {} did not include textual content",
                self.provider_label,
                self.model_id
            );
        }
        Ok(text)
    }
}

/// Join every textual segment of an assistant turn.
fn text_from_choice(choice: OneOrMany<AssistantContent>) -> String {
    choice
        .into_iter()
        .filter_map(|segment| match segment {
            AssistantContent::Text(text) => Some(text.text),
            AssistantContent::Reasoning(_) => None,
            AssistantContent::ToolCall(tool) => {
                serde_json::to_string(&tool.function.arguments).ok()
            }
        })
        .filter(|value| !value.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig::completion::message::Text;

    fn openai_settings() -> LlmSettings {
        LlmSettings {
            provider: "openai".into(),
            api_key: "test-key".into(),
            endpoint: Some("https://example.com".into()),
            model: Some("gpt-test".into()),
            timeout_secs: Some(30),
            max_retries: 0,
            api_version: None,
        }
    }

    #[test]
    fn openai_builder_requires_api_key() {
        let mut settings = openai_settings();
        settings.api_key.clear();
        let result = RigTextGenerator::for_kind(ProviderKind::OpenAi, &settings);
        let message = result.err().expect("missing key should error").to_string();
        assert!(message.contains("API key"));
    }

    #[test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "reqwest default TLS stack unavailable in sandbox"
    )]
    fn openai_builder_sets_model_id() {
        let generator = RigTextGenerator::for_kind(ProviderKind::OpenAi, &openai_settings())
            .expect("generator should be constructed");
        assert_eq!(generator.label(), "openai");
        assert_eq!(generator.model_id, "gpt-test");
    }

    #[test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "reqwest default TLS stack unavailable in sandbox"
    )]
    fn openai_builder_defaults_model_when_missing() {
        let mut settings = openai_settings();
        settings.model = None;
        let generator = RigTextGenerator::for_kind(ProviderKind::OpenAi, &settings).unwrap();
        assert_eq!(generator.model_id, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn rejects_standalone_providers() {
        let err = RigTextGenerator::for_kind(ProviderKind::Gemini, &openai_settings())
            .err()
            .expect("gemini is not routed through rig");
        assert!(err.to_string().contains("standalone"));
    }

    #[test]
    fn text_from_choice_joins_text_segments() {
        let choice = OneOrMany::one(AssistantContent::Text(Text {
            text: "[{\"name\":\"Evans\"}]".into(),
        }));
        assert_eq!(text_from_choice(choice), "[{\"name\":\"Evans\"}]");
    }

    #[test]
    fn text_from_choice_skips_blank_segments() {
        let choice = OneOrMany::one(AssistantContent::Text(Text { text: "   ".into() }));
        assert!(text_from_choice(choice).is_empty());
    }
}
