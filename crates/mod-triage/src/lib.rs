pub mod body;
pub mod format;
pub mod quote;
pub mod reply;
pub mod service;
pub mod transcript;

pub use body::extract_body;
pub use format::Format;
pub use quote::strip_quotes;
pub use reply::{ReplyEngine, ReplyPrompt};
pub use service::{reply_subject, TriageService, DEFAULT_QUERY};
pub use transcript::{reconstruct, SEPARATOR};
