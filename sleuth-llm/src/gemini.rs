use crate::agent::{FunctionCall, Message, ModelTurn, ToolDeclaration, ToolModel};
use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sleuth_common::{Result, SleuthError};
use sleuth_http::{Auth, HttpClient, HttpError, RequestOpts};
use std::borrow::Cow;
use std::time::Duration;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Google Gemini API client.
///
/// Requires a valid API key and internet access. Implements [`LlmClient`]
/// for plain completions and [`ToolModel`] for the agent loop.
pub struct GeminiClient {
    client: HttpClient,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a new client using the provided API key and model.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base(GEMINI_BASE_URL, api_key, model)
    }

    pub fn with_base(base: &str, api_key: String, model: String) -> Result<Self> {
        let client = HttpClient::new(base)
            .map_err(|e| SleuthError::Config(format!("Failed to create HTTP client: {e}")))?
            .with_timeout(Duration::from_secs(120));

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    fn safety_settings() -> Vec<GeminiSafetySetting> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| GeminiSafetySetting {
            category,
            threshold: "BLOCK_MEDIUM_AND_ABOVE",
        })
        .collect()
    }

    async fn generate_content(&self, request: &GeminiRequest) -> Result<GeminiResponse> {
        let path = format!("models/{}:generateContent", self.model);
        tracing::debug!(model = %self.model, contents = request.contents.len(), "gemini.generate_content");

        let opts = RequestOpts {
            auth: Some(Auth::Query {
                name: "key",
                value: Cow::Borrowed(self.api_key.as_str()),
            }),
            ..Default::default()
        };

        self.client
            .post_json_opts(&path, request, opts)
            .await
            .map_err(http_to_sleuth)
    }

    /// First candidate, rejecting safety blocks and empty responses.
    fn first_candidate(resp: GeminiResponse) -> Result<(GeminiCandidate, Option<u32>)> {
        let tokens = resp.usage_metadata.and_then(|u| u.total_token_count);
        let Some(candidate) = resp.candidates.into_iter().next() else {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!(" (prompt blocked: {r})"))
                .unwrap_or_default();
            return Err(SleuthError::Agent(format!(
                "No candidates returned from Gemini{reason}"
            )));
        };

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(SleuthError::Agent(
                "Content blocked by Gemini safety filters".to_string(),
            ));
        }
        Ok((candidate, tokens))
    }
}

fn to_contents(history: &[Message]) -> Vec<GeminiContent> {
    history
        .iter()
        .map(|msg| match msg {
            Message::User(text) => GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart {
                    text: Some(text.clone()),
                    ..Default::default()
                }],
            },
            Message::Model { text, calls } => {
                let mut parts = Vec::with_capacity(calls.len() + 1);
                if let Some(text) = text.as_ref().filter(|t| !t.is_empty()) {
                    parts.push(GeminiPart {
                        text: Some(text.clone()),
                        ..Default::default()
                    });
                }
                parts.extend(calls.iter().map(|c| GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        name: c.name.clone(),
                        args: c.args.clone(),
                    }),
                    ..Default::default()
                }));
                GeminiContent {
                    role: Some("model".into()),
                    parts,
                }
            }
            Message::ToolResults(results) => GeminiContent {
                role: Some("user".into()),
                parts: results
                    .iter()
                    .map(|r| GeminiPart {
                        function_response: Some(GeminiFunctionResponse {
                            name: r.name.clone(),
                            // functionResponse.response must be a JSON object
                            response: if r.response.is_object() {
                                r.response.clone()
                            } else {
                                json!({ "result": r.response })
                            },
                        }),
                        ..Default::default()
                    })
                    .collect(),
            },
        })
        .collect()
}

fn system_instruction(system_prompt: Option<&str>) -> Option<GeminiContent> {
    system_prompt.map(|s| GeminiContent {
        role: None,
        parts: vec![GeminiPart {
            text: Some(s.to_string()),
            ..Default::default()
        }],
    })
}

fn split_parts(content: Option<GeminiContent>) -> ModelTurn {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            texts.push(text);
        }
        if let Some(call) = part.function_call {
            calls.push(FunctionCall {
                name: call.name,
                args: call.args,
            });
        }
    }
    let text = if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    };
    ModelTurn { text, calls }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let generation_config = if max_tokens.is_some() || temperature.is_some() {
            Some(GeminiGenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            })
        } else {
            None
        };

        let request = GeminiRequest {
            contents: to_contents(&[Message::User(prompt.to_string())]),
            system_instruction: system_instruction(system_prompt),
            generation_config,
            tools: Vec::new(),
            safety_settings: Self::safety_settings(),
        };

        let resp = self.generate_content(&request).await?;
        let (candidate, tokens_used) = Self::first_candidate(resp)?;
        let text = split_parts(candidate.content).text.ok_or_else(|| {
            SleuthError::Agent("No content parts in Gemini response".to_string())
        })?;

        Ok(LlmResponse {
            text,
            model: Some(self.model.clone()),
            tokens_used,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self
            .generate("Respond with just 'OK'", None, Some(5), Some(0.1))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ToolModel for GeminiClient {
    async fn turn(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDeclaration],
        temperature: Option<f32>,
    ) -> Result<ModelTurn> {
        let tools = if tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools {
                function_declarations: tools.to_vec(),
            }]
        };

        let request = GeminiRequest {
            contents: to_contents(history),
            system_instruction: system_instruction(system_prompt),
            generation_config: temperature.map(|t| GeminiGenerationConfig {
                temperature: Some(t),
                max_output_tokens: None,
            }),
            tools,
            safety_settings: Self::safety_settings(),
        };

        let resp = self.generate_content(&request).await?;
        let (candidate, tokens) = Self::first_candidate(resp)?;
        tracing::debug!(
            finish_reason = ?candidate.finish_reason,
            tokens = ?tokens,
            "gemini.turn"
        );
        Ok(split_parts(candidate.content))
    }
}

fn http_to_sleuth(e: HttpError) -> SleuthError {
    SleuthError::Agent(format!("Gemini request failed: {e}"))
}
