use std::sync::Arc;

use async_trait::async_trait;
use triage_error::TriageError;

use crate::entities::{DraftRef, OutgoingMessage, Thread};

/// Acquires a fresh provider handle for one operation.
///
/// Every orchestrator call connects once and owns the returned handle until it
/// returns; handles are never shared between calls.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MailProvider>, TriageError>;
}

/// Remote mail operations. Each call is one atomic unit of work.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list_threads(&self, query: &str) -> Result<Vec<String>, TriageError>;

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, TriageError>;

    async fn modify_thread(
        &self,
        thread_id: &str,
        remove_labels: &[&str],
    ) -> Result<(), TriageError>;

    /// Creates a draft threaded under `thread_id` and returns the draft id.
    async fn create_draft(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError>;

    async fn send_draft(&self, draft_id: &str) -> Result<(), TriageError>;

    /// Sends a message threaded under `thread_id` and returns the sent message id.
    async fn send_message(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError>;

    /// Drafts belonging to `thread_id`, in provider order.
    async fn list_drafts(&self, thread_id: &str) -> Result<Vec<DraftRef>, TriageError>;
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A bearer token valid for at least the next request, refreshed if needed.
    async fn access_token(&self) -> Result<String, TriageError>;

    async fn refresh(&self) -> Result<String, TriageError>;
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, TriageError>;
}
