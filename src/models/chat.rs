use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the running transcript shown by the console and web surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MessageContent {
    Text(String),
    Query(String),
    Rows { markdown: String, row_count: usize },
    Answer(String),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    pub created_at: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: MessageContent) -> Self {
        ChatMessage {
            role,
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
