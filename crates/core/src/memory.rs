//! Conversation memory: the session's append-only turn log.
//!
//! Every completed exchange is appended as a user turn followed by an
//! assistant turn, and the whole log is replayed into each model request.
//! Nothing is trimmed, summarized, or persisted; the log dies with the process.
//!
//! The type itself has no interior locking. Callers that share one memory
//! between concurrent requests wrap it in a mutex (the gateway does).

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// One message of a completed exchange. Only user and assistant turns exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Convert into a provider message for replay.
    pub fn to_message(&self) -> Message {
        match self.role {
            Role::Assistant => Message::assistant(&self.content),
            _ => Message::user(&self.content),
        }
    }
}

/// Ordered, append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one turn at the end of the log.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append a completed exchange: the user turn, then the assistant turn.
    pub fn record_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.append(Turn::user(user));
        self.append(Turn::assistant(assistant));
    }

    /// All turns appended so far, in insertion order.
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// The history as provider messages, in insertion order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
