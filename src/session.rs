use std::collections::HashMap;
use std::fmt;

/// Identifies one conversation thread inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKey {
    Chat,
    Pdf,
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadKey::Chat => write!(f, "chat"),
            ThreadKey::Pdf => write!(f, "pdf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Role name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One role-tagged message. Fields are private so an appended turn cannot
/// be edited through a shared reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self { role: Role::Model, content: content.into() }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Empty,
    HasHistory,
}

/// Append-only log of turns for one mode.
///
/// `revision` changes on every mutation so that a reply computed against an
/// older snapshot can be detected and refused.
#[derive(Debug, Default)]
pub struct ConversationThread {
    turns: Vec<Turn>,
    revision: u64,
}

impl ConversationThread {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn state(&self) -> ThreadState {
        if self.turns.is_empty() {
            ThreadState::Empty
        } else {
            ThreadState::HasHistory
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Appends a completed exchange. Only the dispatcher calls this, and only
    /// with both halves present.
    pub(crate) fn append_exchange(&mut self, user: Turn, reply: Turn) -> &Turn {
        self.turns.push(user);
        self.turns.push(reply);
        self.revision += 1;
        &self.turns[self.turns.len() - 1]
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.revision += 1;
    }
}

/// All conversation threads of one session. Threads are created lazily and
/// live as long as the store.
#[derive(Debug, Default)]
pub struct SessionStore {
    threads: HashMap<ThreadKey, ConversationThread>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_thread(&mut self, key: ThreadKey) -> &mut ConversationThread {
        self.threads.entry(key).or_insert_with(|| {
            tracing::debug!(thread = %key, "creating conversation thread");
            ConversationThread::default()
        })
    }

    /// Read-only lookup that does not create the thread.
    pub fn thread(&self, key: ThreadKey) -> Option<&ConversationThread> {
        self.threads.get(&key)
    }

    /// Empties the thread in place. Clearing a thread that was never used
    /// creates it empty.
    pub fn clear(&mut self, key: ThreadKey) {
        let thread = self.get_or_create_thread(key);
        let dropped = thread.len();
        thread.clear();
        tracing::info!(thread = %key, dropped, "cleared conversation");
    }
}
