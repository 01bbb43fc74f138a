//! Gemini native provider implementation.
//!
//! Uses the `generateContent` API:
//! - API key as a query parameter
//! - System directive as the top-level `systemInstruction`
//! - Roles are `user` and `model`; tool use via `functionCall` and
//!   `functionResponse` parts
//! - Function calls carry no ids, so one is synthesized per call

use async_trait::async_trait;
use resguard_core::error::ProviderError;
use resguard_core::message::{Message, MessageToolCall, Role};
use resguard_core::provider::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::openai_compat::{check_status, http_client};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: http_client(),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert the history to Gemini contents.
    ///
    /// Tool results are addressed by function name, so call ids seen on
    /// earlier assistant turns are remembered. Consecutive tool results merge
    /// into one `user` content.
    fn to_api_contents(messages: &[Message]) -> Vec<GeminiContent> {
        let mut call_names: HashMap<&str, &str> = HashMap::new();
        let mut result: Vec<GeminiContent> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => result.push(GeminiContent {
                    role: "user".into(),
                    parts: vec![GeminiPart::text(&msg.content)],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(GeminiPart::text(&msg.content));
                    }
                    for tc in &msg.tool_calls {
                        call_names.insert(tc.id.as_str(), tc.name.as_str());
                        let args: serde_json::Value = serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        parts.push(GeminiPart {
                            function_call: Some(FunctionCall {
                                name: tc.name.clone(),
                                args,
                            }),
                            ..GeminiPart::default()
                        });
                    }
                    if parts.is_empty() {
                        parts.push(GeminiPart::text(""));
                    }
                    result.push(GeminiContent {
                        role: "model".into(),
                        parts,
                    });
                }
                Role::Tool => {
                    let name = msg
                        .tool_call_id
                        .as_deref()
                        .and_then(|id| call_names.get(id).copied())
                        .unwrap_or("unknown")
                        .to_string();
                    let response = match serde_json::from_str::<serde_json::Value>(&msg.content)
                    {
                        Ok(v @ serde_json::Value::Object(_)) => v,
                        Ok(other) => serde_json::json!({ "content": other }),
                        Err(_) => serde_json::json!({ "content": msg.content }),
                    };
                    let part = GeminiPart {
                        function_response: Some(FunctionResponse { name, response }),
                        ..GeminiPart::default()
                    };

                    match result.last_mut() {
                        Some(last)
                            if last.role == "user"
                                && last.parts.iter().all(|p| p.function_response.is_some()) =>
                        {
                            last.parts.push(part);
                        }
                        _ => result.push(GeminiContent {
                            role: "user".into(),
                            parts: vec![part],
                        }),
                    }
                }
                // The directive travels as systemInstruction
                Role::System => {}
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
        if tools.is_empty() {
            return Vec::new();
        }
        vec![GeminiTool {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut generation_config = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&request.messages),
            "generationConfig": generation_config,
        });

        if let Some(ref sys) = request.system_prompt {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": sys }] });
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn response_to_provider_response(
        resp: GeminiResponse,
        model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No candidates in response".into(),
            })?;

        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                text_content.push_str(&text);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(MessageToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: call.name,
                    arguments: serde_json::to_string(&call.args)
                        .unwrap_or_else(|_| "{}".into()),
                });
            }
        }

        let usage = resp.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            message: Message::assistant_with_tool_calls(text_content, tool_calls),
            usage,
            model: resp.model_version.unwrap_or_else(|| model.to_string()),
        })
    }
}

#[async_trait]
impl resguard_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = Self::build_body(&request);

        debug!(provider = "gemini", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(&self.name, response).await?;

        let api_resp: GeminiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Gemini response: {e}"),
            })?;

        Self::response_to_provider_response(api_resp, &request.model)
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
