use super::{GenerationParams, LLMError, Message, MessageRole, TextGenerator};
use crate::config::{Config, LLMConfig};
use async_trait::async_trait;
use sdk::errors::AgentError;
use serde_json::json;

pub struct GeminiProvider {
    config: LLMConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: LLMConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the provider from config, reading the key from the environment
    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let api_key = config.llm_api_key()?;
        Ok(Self::new(config.llm.clone(), api_key))
    }

    /// Defaults from config, overridden by the per-request params
    fn generation_config(&self, params: GenerationParams) -> serde_json::Value {
        json!({
            "temperature": params.temperature.unwrap_or(self.config.temperature),
            "maxOutputTokens": params.max_output_tokens.unwrap_or(self.config.max_output_tokens),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/models/{}", self.config.base_url, self.config.model);
        match self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.config.timeout())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(&self, messages: &[Message], params: GenerationParams) -> super::Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let mut contents = Vec::new();
        let mut system_instruction = None;

        for msg in messages {
            if msg.role == MessageRole::System {
                system_instruction = Some(json!({
                    "parts": [{"text": msg.content}]
                }));
                continue;
            }

            contents.push(json!({
                "role": "user",
                "parts": [{"text": msg.content}]
            }));
        }

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));
        payload.insert(
            "generationConfig".to_string(),
            self.generation_config(params),
        );

        if let Some(sys) = system_instruction {
            payload.insert("systemInstruction".to_string(), sys);
        }

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                400 | 404 => LLMError::InvalidRequest(text),
                401 | 403 => LLMError::AuthenticationFailed(text),
                408 => LLMError::Timeout,
                429 => LLMError::RateLimitExceeded,
                _ => LLMError::ProviderUnavailable(format!(
                    "Gemini API error ({}): {}",
                    status, text
                )),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        if let Some(reason) = data
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(|r| r.as_str())
        {
            return Err(LLMError::InvalidRequest(format!("Prompt blocked: {}", reason)));
        }

        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No candidates in response".to_string()))?;

        let content_item = candidate
            .get("content")
            .ok_or_else(|| LLMError::ParseError("No content in candidate".to_string()))?;

        let parts = content_item
            .get("parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No parts in candidate content".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        if full_text.trim().is_empty() {
            return Err(LLMError::ParseError("Empty response text".to_string()));
        }

        Ok(full_text)
    }
}
