use serde::{Deserialize, Serialize};
use std::fmt;

pub const PLAIN_TEXT: &str = "text/plain";
pub const UNREAD_LABEL: &str = "UNREAD";
pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown";
pub const UNKNOWN_RECIPIENT: &str = "unknown";
pub const NOTHING_TO_DO: &str = "No thread responses provided to create drafts for.";

/// One node of a message's MIME tree as delivered by the provider.
///
/// `data` is still in the provider's transport encoding; decoding happens
/// when the body is extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageNode {
    Leaf {
        media_type: String,
        data: Option<String>,
    },
    Multipart {
        media_type: String,
        parts: Vec<MessageNode>,
    },
}

impl MessageNode {
    pub fn leaf(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Leaf {
            media_type: media_type.into(),
            data: Some(data.into()),
        }
    }

    pub fn empty(media_type: impl Into<String>) -> Self {
        Self::Leaf {
            media_type: media_type.into(),
            data: None,
        }
    }

    pub fn multipart(media_type: impl Into<String>, parts: Vec<MessageNode>) -> Self {
        Self::Multipart {
            media_type: media_type.into(),
            parts,
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Self::Leaf { media_type, .. } | Self::Multipart { media_type, .. } => media_type,
        }
    }

    pub fn is_plain_text(&self) -> bool {
        self.media_type().eq_ignore_ascii_case(PLAIN_TEXT)
    }

    /// Encoded inline body, if this node carries one.
    pub fn inline_data(&self) -> Option<&str> {
        match self {
            Self::Leaf { data, .. } => data.as_deref(),
            Self::Multipart { .. } => None,
        }
    }

    pub fn parts(&self) -> &[MessageNode] {
        match self {
            Self::Leaf { .. } => &[],
            Self::Multipart { parts, .. } => parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub id: String,
    pub headers: Vec<Header>,
    pub payload: MessageNode,
}

impl ThreadMessage {
    /// Value of the first header with this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<ThreadMessage>,
}

impl Thread {
    pub fn first_message(&self) -> Option<&ThreadMessage> {
        self.messages.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    /// Cleaned conversation text, one block per message joined by `"\n---\n"`.
    #[serde(alias = "history")]
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub thread_id: String,
    #[serde(alias = "response")]
    pub reply: String,
}

impl DraftRequest {
    pub fn new(thread_id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            reply: reply.into(),
        }
    }
}

/// A plain-text message ready to be encoded by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRef {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub thread_id: String,
    pub succeeded: bool,
    pub line: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn nothing_to_do() -> Self {
        Self::default()
    }

    pub fn is_nothing_to_do(&self) -> bool {
        self.items.is_empty()
    }

    pub fn record_success(&mut self, thread_id: &str, line: String) {
        self.succeeded += 1;
        self.items.push(ItemOutcome {
            thread_id: thread_id.to_string(),
            succeeded: true,
            line,
        });
    }

    pub fn record_failure(&mut self, thread_id: &str, line: String) {
        self.items.push(ItemOutcome {
            thread_id: thread_id.to_string(),
            succeeded: false,
            line,
        });
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.line.as_str())
    }

    pub fn summary(&self) -> String {
        if self.is_nothing_to_do() {
            return NOTHING_TO_DO.to_string();
        }
        let mut out = format!(
            "Successfully created {} draft replies and marked corresponding emails as read.",
            self.succeeded
        );
        for line in self.lines() {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DraftDispatch {
    Sent { thread_id: String, draft_id: String },
    NoDraft { thread_id: String },
}

impl fmt::Display for DraftDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { thread_id, .. } => {
                write!(f, "Successfully sent draft for thread ID: {thread_id}")
            }
            Self::NoDraft { thread_id } => write!(f, "No draft found for thread ID: {thread_id}"),
        }
    }
}

impl fmt::Display for ThreadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread ID: {}\nSubject: {}\nConversation:\n{}",
            self.thread_id, self.subject, self.transcript
        )
    }
}
