//! Conversation-related types.
//!
//! A session keeps two views of the same turns: the transcript that is
//! shown to the user, and the memory that is fed back to the model. Both
//! only ever grow, and they are always appended to together.

use std::fmt::{self, Display};

/// The fixed identifier the conversation memory is stored under.
pub const MEMORY_KEY: &str = "chat_history";

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person typing into the shell.
    User,
    /// The agent.
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A message in the transcript. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Creates a new message.
    #[inline]
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Returns the author of this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this message.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Decides how much of the memory is exposed to the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemoryPolicy {
    /// Every completed turn is sent.
    #[default]
    Unbounded,
    /// Only the most recent `n` completed turns are sent.
    LastTurns(usize),
}

/// The running memory buffer of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    /// Returns the identifier this memory is stored under.
    #[inline]
    pub fn key(&self) -> &'static str {
        MEMORY_KEY
    }

    /// Returns every remembered message, oldest first.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of completed turns.
    #[inline]
    pub fn turns(&self) -> usize {
        self.messages.len() / 2
    }

    /// Returns `true` if nothing has been remembered yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the messages the model may see under `policy`.
    ///
    /// Only complete user/assistant pairs are ever returned.
    pub fn window(&self, policy: MemoryPolicy) -> &[Message] {
        let complete = self.messages.len() - self.messages.len() % 2;
        let start = match policy {
            MemoryPolicy::Unbounded => 0,
            MemoryPolicy::LastTurns(n) => {
                complete.saturating_sub(n.saturating_mul(2))
            }
        };
        &self.messages[start..complete]
    }
}

/// Errors from [`SessionState`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The message would break user/assistant alternation.
    #[error("expected a {expected} message, got a {got} message")]
    OutOfTurn {
        /// The role the next message has to have.
        expected: Role,
        /// The role that was offered.
        got: Role,
    },
}

/// The mutable store of one session.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    transcript: Vec<Message>,
    memory: ConversationMemory,
}

impl SessionState {
    /// Creates an empty session state.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the role the next appended message must have.
    #[inline]
    pub fn next_role(&self) -> Role {
        if self.transcript.len() % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        }
    }

    /// Appends a single message to both the transcript and the memory.
    pub fn append<S: Into<String>>(
        &mut self,
        role: Role,
        content: S,
    ) -> Result<&Message, SessionError> {
        let expected = self.next_role();
        if role != expected {
            return Err(SessionError::OutOfTurn {
                expected,
                got: role,
            });
        }
        Ok(self.push(Message::new(role, content)))
    }

    /// Appends a whole turn, returning the assistant message.
    ///
    /// Nothing is appended if a user message is still waiting for its
    /// answer.
    pub fn record_turn<U, A>(
        &mut self,
        user: U,
        assistant: A,
    ) -> Result<&Message, SessionError>
    where
        U: Into<String>,
        A: Into<String>,
    {
        if self.next_role() != Role::User {
            return Err(SessionError::OutOfTurn {
                expected: Role::Assistant,
                got: Role::User,
            });
        }
        self.push(Message::user(user));
        Ok(self.push(Message::assistant(assistant)))
    }

    /// Returns the transcript in display order.
    #[inline]
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Returns the conversation memory.
    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    fn push(&mut self, msg: Message) -> &Message {
        self.memory.messages.push(msg.clone());
        self.transcript.push(msg);
        &self.transcript[self.transcript.len() - 1]
    }
}
