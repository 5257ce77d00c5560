use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ---------------------------------------------------------------------------
// ContentPart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: None,
        }
    }

    /// The tool name travels with the result because Gemini correlates
    /// function responses by name rather than by call id.
    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let id_str = id.into();
        Self {
            role: Role::Tool,
            content: vec![ContentPart::ToolResult {
                tool_call_id: id_str.clone(),
                name: name.into(),
                content: content.into(),
                is_error,
            }],
            tool_call_id: Some(id_str),
        }
    }

    /// Concatenated text parts of this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// Empty means "use the provider's default model".
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub provider: Option<String>,
}

impl Request {
    /// A single-turn prompt with an optional system instruction.
    pub fn prompt(prompt: &str, system_instruction: Option<&str>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_instruction {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));
        Self {
            messages,
            max_tokens: Some(1024),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub text: String,
    pub tool_calls: Vec<ToolCallResult>,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

// ---------------------------------------------------------------------------
// Tool types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_tool_result_constructor() {
        let msg = Message::tool_result("call_123", "analyze", "result text", false);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
        match &msg.content[0] {
            ContentPart::ToolResult {
                tool_call_id,
                name,
                content,
                is_error,
            } => {
                assert_eq!(tool_call_id, "call_123");
                assert_eq!(name, "analyze");
                assert_eq!(content, "result text");
                assert!(!is_error);
            }
            _ => panic!("expected ToolResult content part"),
        }
    }

    #[test]
    fn content_part_serializes_as_tagged_union() {
        let tool = ContentPart::ToolCall {
            id: "t1".into(),
            name: "ingest".into(),
            arguments: serde_json::json!({"text": "Story: A"}),
        };
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["name"], "ingest");
    }

    #[test]
    fn prompt_request_puts_system_first() {
        let req = Request::prompt("analyze this", Some("You are a requirements engineer."));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].text(), "analyze this");
        assert!(req.model.is_empty());
    }

    #[test]
    fn prompt_request_without_system() {
        let req = Request::prompt("hello", None);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
    }
}
