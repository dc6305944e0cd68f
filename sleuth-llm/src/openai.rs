use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sleuth_common::{Result, SleuthError};
use sleuth_http::{HttpClient, HttpError};

/// Groq's OpenAI-compatible endpoint, used for the prompt guard by default.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1/";

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiClient {
    client: HttpClient,
    api_key: String,
    model: String,
    top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReply,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text of the first choice, if the provider returned one.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

impl OpenAiClient {
    /// Create a client for Groq's endpoint.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base(GROQ_API_BASE, api_key, model)
    }

    /// Create a client against an arbitrary OpenAI-compatible base URL.
    ///
    /// The base must end with a `/` so that `chat/completions` joins under it.
    pub fn with_base(base: &str, api_key: String, model: String) -> Result<Self> {
        let client = HttpClient::new(base)
            .map_err(|e| SleuthError::Config(format!("HttpClient init failed: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            top_p: None,
        })
    }

    /// Nucleus sampling value sent with every request.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: None,
            max_completion_tokens: None,
            top_p: self.top_p,
            stream: false,
        }
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(
            model = %req.model,
            messages = req.messages.len(),
            "openai.chat"
        );
        self.client
            .post_json("chat/completions", Some(&self.api_key), req)
            .await
            .map_err(http_to_sleuth)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let mut req = self.request(messages);
        req.max_completion_tokens = max_tokens;
        req.temperature = temperature;

        let resp = self.chat(&req).await?;
        let text = resp
            .first_text()
            .ok_or_else(|| SleuthError::Agent("No choices returned from chat completion".into()))?
            .to_string();

        Ok(LlmResponse {
            text,
            model: resp.model.or_else(|| Some(self.model.clone())),
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        match self.generate("Respond with just 'OK'", None, Some(5), None).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("OpenAI-compatible health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

fn http_to_sleuth(e: HttpError) -> SleuthError {
    SleuthError::Agent(format!("{e}"))
}
