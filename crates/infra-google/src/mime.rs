use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, SinglePart};
use triage_domain::OutgoingMessage;
use triage_error::TriageError;

/// RFC 5322 text/plain message encoded as Gmail's base64url `raw` field.
pub fn encode_raw(from: &str, message: &OutgoingMessage) -> Result<String, TriageError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| TriageError::internal(format!("invalid from '{from}': {e}")))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| TriageError::invalid_input(format!("invalid to '{}': {e}", message.to)))?;

    let email = lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str())
        .singlepart(
            SinglePart::builder()
                .content_type(ContentType::TEXT_PLAIN)
                .body(message.body.clone()),
        )
        .map_err(|e| TriageError::internal(format!("email build: {e}")))?;

    Ok(URL_SAFE_NO_PAD.encode(email.formatted()))
}
