use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::ProviderHttp;
use super::{LlmSettings, TextGenerator};

const DEFAULT_BASE: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

/// OpenAI-compatible `/chat/completions` client, defaulting to Perplexity.
#[derive(Debug, Clone)]
pub struct PerplexityClient {
    http: ProviderHttp,
    url: String,
    api_key: String,
    model: String,
}

impl PerplexityClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let http = ProviderHttp::new("Perplexity", settings)?;
        let base = settings.endpoint.as_deref().unwrap_or(DEFAULT_BASE);
        Ok(Self {
            http,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl TextGenerator for PerplexityClient {
    fn label(&self) -> &str {
        "perplexity"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Turn {
                    role: "system",
                    content: system,
                },
                Turn {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
            max_tokens: 400,
        };

        let reply: ChatReply = self
            .http
            .send_json(|client| client.post(&self.url).bearer_auth(&self.api_key).json(&body))
            .await?;

        reply
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .find(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("Perplexity response missing message content"))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Turn<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}
