use triage_domain::{MessageNode, ThreadMessage};

use crate::body::extract_body;
use crate::quote::strip_quotes;

pub const SEPARATOR: &str = "\n---\n";

/// Decoded and quote-stripped body of one message.
///
/// Messages whose body is missing, undecodable, or empty once quotes are
/// removed yield `None`.
pub fn clean_body(node: &MessageNode) -> Option<String> {
    extract_body(node)
        .map(|body| strip_quotes(&body))
        .filter(|body| !body.is_empty())
}

/// Joins the cleaned bodies of a thread's messages, in thread order.
pub fn reconstruct(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| clean_body(&m.payload))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
