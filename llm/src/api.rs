use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Assistant,
    System,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One incremental fragment of an assistant reply.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatChunk {
    pub role: Role,
    pub content: String,
}

impl ChatChunk {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatChunk {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub(crate) messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// A stateless single-turn request: one fixed system instruction plus
    /// one user message. History, if any, lives with the caller.
    pub fn single_turn(system: impl Into<String>, user: impl Into<String>) -> Self {
        ChatRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
