use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use triage_domain::MessageNode;
use tracing::warn;

/// Plain-text body of a message node, or `None` when there is nothing to show.
///
/// An inline body wins. Otherwise the first direct child declared as
/// `text/plain` is used; grandchildren are never searched. Undecodable data
/// counts as "no body" so callers can simply skip the message.
pub fn extract_body(node: &MessageNode) -> Option<String> {
    if let Some(data) = node.inline_data() {
        return decode_body(data);
    }

    node.parts()
        .iter()
        .find(|part| part.is_plain_text())
        .and_then(MessageNode::inline_data)
        .and_then(decode_body)
}

/// Decodes base64url transport data (padded or not) into UTF-8 text.
pub fn decode_body(data: &str) -> Option<String> {
    let bytes = match URL_SAFE
        .decode(data.as_bytes())
        .or_else(|_| URL_SAFE_NO_PAD.decode(data.as_bytes()))
    {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "body is not valid base64url, skipping");
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "body is not valid UTF-8, skipping");
            None
        }
    }
}
