//! Chat frames exchanged over `/ws/chat`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Command,
    Error,
    System,
    Typing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "now")]
    pub timestamp: String,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl WsMessage {
    fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: Map::new(),
            timestamp: now(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, content)
    }

    pub fn typing(is_typing: bool) -> Self {
        let mut msg = Self::new(MessageKind::Typing, "");
        msg.metadata.insert("is_typing".into(), Value::Bool(is_typing));
        msg
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        let mut msg = Self::new(MessageKind::Error, message);
        if let Some(code) = code {
            msg.metadata.insert("error_code".into(), Value::String(code.into()));
        }
        msg
    }

    /// Clients may send a bare string instead of a frame; anything that does
    /// not parse is treated as plain text.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::text(raw))
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and JSON values always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_shape() {
        let v: Value = serde_json::from_str(&WsMessage::text("hi").to_json()).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["content"], "hi");
        assert!(v["metadata"].as_object().unwrap().is_empty());
        assert!(v["timestamp"].as_str().is_some());
    }

    #[test]
    fn typing_and_error_metadata() {
        assert_eq!(WsMessage::typing(true).metadata["is_typing"], Value::Bool(true));
        let err = WsMessage::error("Binary frames are not supported", Some("unsupported"));
        assert_eq!(err.kind, MessageKind::Error);
        assert_eq!(err.metadata["error_code"], "unsupported");
        assert!(WsMessage::error("x", None).metadata.is_empty());
    }

    #[test]
    fn parses_frames_and_falls_back_to_text() {
        let msg = WsMessage::from_json(r#"{"type":"command","content":"/help"}"#);
        assert_eq!(msg.kind, MessageKind::Command);
        assert_eq!(msg.content, "/help");

        let msg = WsMessage::from_json("Story: plain text");
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.content, "Story: plain text");
    }
}
