//! HTTP client for completion endpoints.
//!
//! Speaks the OpenAI chat completions API (which LiteLLM and vLLM gateways also expose) and
//! Ollama's native generate API. JSON mode asks the server to constrain output to a JSON object.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{LlmProvider, LlmSettings};

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str, json_mode: bool) -> Result<String>;

    fn model_name(&self) -> &str;
}

pub struct LlmClient {
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        Self::with_model(settings, &settings.model)
    }

    /// Same endpoint and credentials, different model.
    pub fn with_model(settings: &LlmSettings, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            provider: settings.provider,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi if self.base_url.ends_with("/v1") => {
                format!("{}/chat/completions", self.base_url)
            }
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }

    async fn complete_openai(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = check_status(builder.send().await?).await?;
        let body: ChatResponse = response.json().await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Llm("Completion response contained no message".to_string()))
    }

    async fn complete_ollama(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: json_mode.then_some("json"),
            options: OllamaOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let response = check_status(self.client.post(self.endpoint()).json(&request).send().await?).await?;
        let body: OllamaResponse = response.json().await?;
        Ok(body.response)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Llm(format!(
        "Completion endpoint returned {}: {}",
        status,
        body.chars().take(500).collect::<String>()
    )))
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let started = std::time::Instant::now();
        let text = match self.provider {
            LlmProvider::OpenAi => self.complete_openai(prompt, json_mode).await?,
            LlmProvider::Ollama => self.complete_ollama(prompt, json_mode).await?,
        };
        log::debug!(
            "{} answered in {:.2}s ({} chars)",
            self.model,
            started.elapsed().as_secs_f64(),
            text.len()
        );
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: LlmProvider, base_url: &str) -> LlmClient {
        let settings = LlmSettings {
            provider,
            base_url: base_url.to_string(),
            ..Default::default()
        };
        LlmClient::new(&settings).unwrap()
    }

    #[test]
    fn endpoints_per_provider() {
        assert_eq!(
            client(LlmProvider::OpenAi, "http://localhost:8000/").endpoint(),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            client(LlmProvider::OpenAi, "https://api.openai.com/v1").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client(LlmProvider::Ollama, "http://localhost:11434").endpoint(),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn json_mode_sets_response_format() {
        let request = ChatRequest {
            model: "llama4:latest",
            messages: vec![ChatRequestMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.1,
            max_tokens: 16,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn parses_chat_response() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"answer\":\"7\"}"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.choices[0].message.content.as_deref(),
            Some("{\"answer\":\"7\"}")
        );
    }
}
