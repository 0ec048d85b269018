use std::sync::Arc;

use triage_domain::*;
use triage_error::TriageError;
use tracing::{debug, info, warn};

use crate::reply::{ReplyEngine, ReplyPrompt};
use crate::transcript::reconstruct;

pub const DEFAULT_QUERY: &str =
    "is:unread in:inbox -category:social -category:promotions -category:updates";

pub struct TriageService {
    mail: Arc<dyn MailConnector>,
    replies: ReplyEngine,
    prompt: ReplyPrompt,
}

impl TriageService {
    pub fn new(mail: Arc<dyn MailConnector>, replies: ReplyEngine, prompt: ReplyPrompt) -> Self {
        Self {
            mail,
            replies,
            prompt,
        }
    }

    pub fn replies(&self) -> &ReplyEngine {
        &self.replies
    }

    /// Unread threads matching `query`, each with its cleaned transcript.
    ///
    /// A failing list call fails the whole fetch. A thread that fails to load
    /// is logged and left out; the remaining threads are still returned.
    pub async fn fetch_unread(&self, query: &str) -> Result<Vec<ThreadRecord>, TriageError> {
        let provider = self.mail.connect().await?;
        let thread_ids = provider.list_threads(query).await?;

        if thread_ids.is_empty() {
            info!(query, "no unread threads found");
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(thread_ids.len());
        for thread_id in &thread_ids {
            match provider.get_thread(thread_id).await {
                Ok(thread) => {
                    let record = build_record(thread_id, &thread);
                    debug!(
                        %thread_id,
                        subject = %record.subject,
                        messages = thread.messages.len(),
                        "reconstructed thread"
                    );
                    records.push(record);
                }
                Err(e) => warn!(%thread_id, %e, "skipping thread that failed to load"),
            }
        }

        info!(
            query,
            listed = thread_ids.len(),
            fetched = records.len(),
            "fetched unread threads"
        );
        Ok(records)
    }

    /// Creates one threaded draft per request and marks each thread read.
    ///
    /// Items run strictly in order. A failing item becomes a failure line in
    /// the outcome and never stops the items after it; only failing to
    /// connect aborts the batch.
    pub async fn create_drafts(
        &self,
        requests: &[DraftRequest],
    ) -> Result<BatchOutcome, TriageError> {
        if requests.is_empty() {
            return Ok(BatchOutcome::nothing_to_do());
        }

        let provider = self.mail.connect().await?;
        let mut outcome = BatchOutcome::default();

        for request in requests {
            let thread_id = request.thread_id.as_str();
            match draft_reply(provider.as_ref(), request).await {
                Ok(draft_id) => {
                    info!(thread_id, %draft_id, "draft created, thread marked read");
                    outcome.record_success(
                        thread_id,
                        format!("Draft created and thread marked as read for thread ID: {thread_id}"),
                    );
                }
                Err(e) => {
                    warn!(thread_id, %e, "draft failed");
                    outcome.record_failure(thread_id, failure_line(thread_id, &e));
                }
            }
        }

        info!(
            requested = requests.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failed(),
            "draft batch finished"
        );
        Ok(outcome)
    }

    /// Sends a new message in the thread, then marks the thread read.
    pub async fn send_reply(
        &self,
        thread_id: &str,
        reply: &str,
        to: &str,
        subject: &str,
    ) -> Result<String, TriageError> {
        validate_not_empty(thread_id, "thread_id")?;
        validate_not_empty(to, "to")?;

        let provider = self.mail.connect().await?;
        let message = OutgoingMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: reply.to_string(),
        };
        let message_id = provider.send_message(thread_id, &message).await?;
        provider.modify_thread(thread_id, &[UNREAD_LABEL]).await?;

        info!(thread_id, %message_id, "reply sent, thread marked read");
        Ok(message_id)
    }

    pub async fn send_draft(&self, draft_id: &str) -> Result<(), TriageError> {
        validate_not_empty(draft_id, "draft_id")?;

        let provider = self.mail.connect().await?;
        provider.send_draft(draft_id).await?;
        info!(draft_id, "draft sent");
        Ok(())
    }

    /// Sends the first draft found in the thread. A thread without drafts is
    /// reported as [`DraftDispatch::NoDraft`], not as an error.
    pub async fn send_thread_draft(&self, thread_id: &str) -> Result<DraftDispatch, TriageError> {
        validate_not_empty(thread_id, "thread_id")?;

        let provider = self.mail.connect().await?;
        let drafts = provider.list_drafts(thread_id).await?;

        let Some(draft) = drafts.first() else {
            info!(thread_id, "no draft to send");
            return Ok(DraftDispatch::NoDraft {
                thread_id: thread_id.to_string(),
            });
        };

        provider.send_draft(&draft.id).await?;
        info!(thread_id, draft_id = %draft.id, "draft sent");
        Ok(DraftDispatch::Sent {
            thread_id: thread_id.to_string(),
            draft_id: draft.id.clone(),
        })
    }

    pub async fn generate_reply(&self, record: &ThreadRecord) -> Result<String, TriageError> {
        let prompt = self.prompt.render(record);
        let reply = self.replies.generate(&prompt).await?;
        info!(thread_id = %record.thread_id, chars = reply.len(), "reply generated");
        Ok(reply)
    }
}

pub fn reply_subject(subject: &str) -> String {
    format!("Re: {subject}")
}

fn build_record(thread_id: &str, thread: &Thread) -> ThreadRecord {
    let first = thread.first_message();
    let subject = first
        .and_then(|m| m.header("Subject"))
        .unwrap_or(NO_SUBJECT)
        .to_string();
    let sender = first
        .and_then(|m| m.header("From"))
        .unwrap_or(UNKNOWN_SENDER)
        .to_string();

    ThreadRecord {
        thread_id: thread_id.to_string(),
        subject,
        sender,
        transcript: reconstruct(&thread.messages),
    }
}

async fn draft_reply(
    provider: &dyn MailProvider,
    request: &DraftRequest,
) -> Result<String, TriageError> {
    if request.thread_id.trim().is_empty() {
        return Err(TriageError::missing_field("thread_id"));
    }

    let thread = provider.get_thread(&request.thread_id).await?;
    let first = thread.first_message().ok_or_else(|| {
        TriageError::missing_field(format!("thread {} has no messages", request.thread_id))
    })?;

    let message = OutgoingMessage {
        to: first.header("From").unwrap_or(UNKNOWN_RECIPIENT).to_string(),
        subject: reply_subject(first.header("Subject").unwrap_or(NO_SUBJECT)),
        body: request.reply.clone(),
    };

    let draft_id = provider.create_draft(&request.thread_id, &message).await?;
    provider
        .modify_thread(&request.thread_id, &[UNREAD_LABEL])
        .await?;
    Ok(draft_id)
}

fn failure_line(thread_id: &str, err: &TriageError) -> String {
    match err {
        e if e.is_provider() => {
            format!("Mail provider error occurred for thread ID {thread_id}: {e}. Skipping this thread.")
        }
        TriageError::MissingField(_) => {
            format!("Missing field for thread ID {thread_id}: {err}. Skipping this entry.")
        }
        e => format!("An unexpected error occurred for thread ID {thread_id}: {e}. Skipping this thread."),
    }
}

fn validate_not_empty(val: &str, name: &str) -> Result<(), TriageError> {
    if val.trim().is_empty() {
        return Err(TriageError::invalid_input(format!("{name} cannot be empty")));
    }
    Ok(())
}
