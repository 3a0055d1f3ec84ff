//! Conversation history and the per-widget request phase machine
//!
//! A conversation is append-only except for its tail: while a request is in
//! flight the last turn is an assistant placeholder whose content is replaced
//! wholesale on every received chunk. At most one turn is in progress at a
//! time; everything before it is committed and never touched again.

/// Shown in place of the assistant reply when the client-side fetch or body
/// read fails. Relay-side failures arrive in-band and never trigger this.
pub const TRANSPORT_ERROR_MESSAGE: &str = "❌ 网络错误或服务异常。";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Request lifecycle for one widget instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Request issued, placeholder assistant turn appended, no bytes yet.
    Sending,
    /// Response body is being read.
    Streaming,
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    phase: Phase,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a request is outstanding; submissions are rejected until
    /// the stream closes.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Accept a user message for sending.
    ///
    /// Returns the message to send, or `None` when the submission is
    /// rejected (blank input, or a request already in flight). On acceptance
    /// the user turn and an empty assistant placeholder are appended and the
    /// phase moves to `Sending`.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        if text.trim().is_empty() || self.is_busy() {
            return None;
        }

        self.turns.push(ConversationTurn {
            role: Role::User,
            content: text.to_string(),
        });
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: String::new(),
        });
        self.phase = Phase::Sending;

        Some(text.to_string())
    }

    /// First chunk arrived: the response body is now being read.
    pub fn begin_streaming(&mut self) {
        if self.phase == Phase::Sending {
            self.phase = Phase::Streaming;
        }
    }

    /// Replace the in-progress assistant turn's content with the full
    /// accumulated text. A no-op when nothing is in flight.
    pub fn set_tail(&mut self, content: String) {
        if !self.is_busy() {
            return;
        }
        if let Some(tail) = self.turns.last_mut() {
            tail.content = content;
        }
    }

    /// Commit the in-progress turn and return to `Idle`.
    pub fn complete(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Terminate the in-progress turn with a fixed error message and return
    /// to `Idle`. The placeholder never stays empty forever.
    pub fn fail(&mut self, message: &str) {
        if self.is_busy() {
            if let Some(tail) = self.turns.last_mut() {
                tail.content = message.to_string();
            }
        }
        self.phase = Phase::Idle;
    }
}
