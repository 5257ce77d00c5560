use async_trait::async_trait;
use serde_json::json;

use crate::{
    ContentPart, FinishReason, Message, ProviderAdapter, Request, Response, Role, ToolCallResult,
    ToolDefinition, Usage,
};
use reqflow_types::ReqflowError;

const PROVIDER: &str = "google";

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    embed_model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
            embed_model: "text-embedding-004".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_embed_model(mut self, model: String) -> Self {
        self.embed_model = model;
        self
    }

    /// Reads `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), plus optional
    /// `LLM_MODEL` and `EMBED_MODEL` overrides.
    pub fn from_env() -> Result<Self, ReqflowError> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| ReqflowError::AuthError {
                provider: PROVIDER.into(),
            })?;
        let mut adapter = Self::new(key);
        if let Ok(model) = std::env::var("LLM_MODEL") {
            adapter = adapter.with_model(model);
        }
        if let Ok(model) = std::env::var("EMBED_MODEL") {
            adapter = adapter.with_embed_model(model);
        }
        Ok(adapter)
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let system_texts: Vec<String> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
            .collect();

        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        let mut body = json!({ "contents": contents });

        if !system_texts.is_empty() {
            let parts: Vec<serde_json::Value> =
                system_texts.iter().map(|t| json!({ "text": t })).collect();
            body["systemInstruction"] = json!({ "parts": parts });
        }

        if !request.tools.is_empty() {
            let declarations: Vec<serde_json::Value> =
                request.tools.iter().map(convert_tool_definition).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        let mut gen_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            gen_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            gen_config["temperature"] = json!(temp);
        }
        if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
            body["generationConfig"] = gen_config;
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Response, ReqflowError> {
        let candidate = json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| malformed("Missing candidates in response"))?;

        let finish_reason = match candidate["finishReason"].as_str() {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("STOP_SEQUENCE") => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCallResult> = Vec::new();

        if let Some(parts) = candidate["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str() {
                    text_parts.push(text.to_string());
                }
                if let Some(fc) = part.get("functionCall") {
                    tool_calls.push(ToolCallResult {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: fc["name"].as_str().unwrap_or_default().to_string(),
                        arguments: fc["args"].clone(),
                    });
                }
            }
        }

        let usage_meta = &json["usageMetadata"];
        let input_tokens = usage_meta["promptTokenCount"].as_u64().unwrap_or(0);
        let output_tokens = usage_meta["candidatesTokenCount"].as_u64().unwrap_or(0);
        let usage = Usage {
            input_tokens,
            output_tokens,
            total_tokens: usage_meta["totalTokenCount"]
                .as_u64()
                .unwrap_or(input_tokens + output_tokens),
        };

        let finish_reason = if tool_calls.is_empty() {
            finish_reason
        } else {
            FinishReason::ToolUse
        };

        Ok(Response {
            id: uuid::Uuid::new_v4().to_string(),
            text: text_parts.join(""),
            tool_calls,
            usage,
            model: String::new(),
            finish_reason,
        })
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, ReqflowError> {
        let resp = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        serde_json::from_str(&response_body).map_err(|e| ReqflowError::ProviderError {
            provider: PROVIDER.into(),
            status: status.as_u16(),
            message: format!("Failed to parse response JSON: {e}"),
            retryable: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Message conversion helpers
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::Assistant => "model",
        Role::User | Role::Tool | Role::System => "user",
    };

    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .map(|p| match p {
            ContentPart::Text { text } => json!({ "text": text }),
            ContentPart::ToolCall {
                name, arguments, ..
            } => json!({
                "functionCall": { "name": name, "args": arguments }
            }),
            ContentPart::ToolResult { name, content, .. } => json!({
                "functionResponse": {
                    "name": name,
                    "response": { "content": content }
                }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

fn convert_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters
    })
}

fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>, ReqflowError> {
    json["embedding"]["values"]
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect()
        })
        .ok_or_else(|| malformed("Missing embedding values in response"))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> ReqflowError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => ReqflowError::RateLimited {
            provider: PROVIDER.into(),
            retry_after_ms: 1000,
        },
        401 | 403 => ReqflowError::AuthError {
            provider: PROVIDER.into(),
        },
        _ => ReqflowError::ProviderError {
            provider: PROVIDER.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: matches!(status_u16, 500 | 503),
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn transport_error(e: reqwest::Error) -> ReqflowError {
    ReqflowError::ProviderError {
        provider: PROVIDER.into(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    }
}

fn malformed(message: &str) -> ReqflowError {
    ReqflowError::ProviderError {
        provider: PROVIDER.into(),
        status: 0,
        message: message.into(),
        retryable: false,
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, ReqflowError> {
        let body = self.build_request_body(request);
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let json = self.post(&url, &body).await?;

        let mut response = self.parse_response(json)?;
        response.model = model.to_string();
        Ok(response)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ReqflowError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.embed_model, self.api_key
        );
        let body = json!({ "content": { "parts": [{ "text": text }] } });
        let json = self.post(&url, &body).await?;
        parse_embedding(&json)
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_tools(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
