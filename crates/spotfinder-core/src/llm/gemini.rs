use anyhow::{ensure, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::ProviderHttp;
use super::{LlmSettings, TextGenerator};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Standalone `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: ProviderHttp,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let http = ProviderHttp::new("Gemini", settings)?;
        let base = settings.endpoint.as_deref().unwrap_or(DEFAULT_BASE);
        let model = settings.model.as_deref().unwrap_or(DEFAULT_MODEL);
        Ok(Self {
            http,
            url: format!(
                "{}/v1beta/models/{model}:generateContent",
                base.trim_end_matches('/')
            ),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn label(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = GenerateContent {
            system_instruction: Content::text(None, system),
            contents: vec![Content::text(Some("user"), user)],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 400,
            },
        };

        let reply: GenerateContentReply = self
            .http
            .send_json(|client| {
                client
                    .post(&self.url)
                    .query(&[("key", &self.api_key)])
                    .json(&body)
            })
            .await?;

        let text: String = reply
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .filter_map(|part| part.text)
            .collect();
        ensure!(!text.trim().is_empty(), "Gemini response missing text content");
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContent {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}
