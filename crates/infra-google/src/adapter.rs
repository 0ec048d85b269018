use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;
use triage_domain::*;
use triage_error::TriageError;

use crate::api::{DraftList, ErrorEnvelope, GmailThread, IdOnly, Profile, ThreadList};
use crate::mime::encode_raw;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Hands out one authenticated Gmail session per orchestrator call.
pub struct GmailConnector {
    credentials: Arc<dyn CredentialProvider>,
    client: Client,
    base_url: String,
}

impl GmailConnector {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            client: Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MailConnector for GmailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailProvider>, TriageError> {
        let token = self.credentials.access_token().await?;
        let session: Arc<dyn MailProvider> = Arc::new(GmailAdapter {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token,
            sender: OnceCell::new(),
        });
        Ok(session)
    }
}

pub struct GmailAdapter {
    client: Client,
    base_url: String,
    token: String,
    sender: OnceCell<String>,
}

impl GmailAdapter {
    /// Each segment is percent-encoded, so ids cannot escape their path slot.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TriageError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TriageError::configuration(format!("invalid gmail base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TriageError::configuration("gmail base url cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn api_get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, &str)],
    ) -> Result<T, TriageError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "gmail GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("gmail request failed: {e}")))?;
        parse_gmail_response(resp).await
    }

    async fn api_post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &Value,
    ) -> Result<T, TriageError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "gmail POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("gmail request failed: {e}")))?;
        parse_gmail_response(resp).await
    }

    /// Authenticated address, used as the From of composed messages.
    async fn sender(&self) -> Result<&str, TriageError> {
        let address = self
            .sender
            .get_or_try_init(|| async {
                let profile: Profile = self.api_get(&["profile"], &[]).await?;
                Ok::<_, TriageError>(profile.email_address)
            })
            .await?;
        Ok(address.as_str())
    }

    async fn raw_for(&self, message: &OutgoingMessage) -> Result<String, TriageError> {
        let from = self.sender().await?;
        encode_raw(from, message)
    }
}

#[async_trait]
impl MailProvider for GmailAdapter {
    async fn list_threads(&self, query: &str) -> Result<Vec<String>, TriageError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: ThreadList = {
                let mut params = vec![("q", query)];
                if let Some(token) = page_token.as_deref() {
                    params.push(("pageToken", token));
                }
                self.api_get(&["threads"], &params).await?
            };
            ids.extend(page.threads.into_iter().map(|t| t.id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(query, count = ids.len(), "listed threads");
        Ok(ids)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, TriageError> {
        let thread: GmailThread = self
            .api_get(&["threads", thread_id], &[("format", "full")])
            .await?;
        Ok(thread.into())
    }

    async fn modify_thread(
        &self,
        thread_id: &str,
        remove_labels: &[&str],
    ) -> Result<(), TriageError> {
        let _: Value = self
            .api_post(
                &["threads", thread_id, "modify"],
                &json!({ "removeLabelIds": remove_labels }),
            )
            .await?;
        Ok(())
    }

    async fn create_draft(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError> {
        let raw = self.raw_for(message).await?;
        let draft: IdOnly = self
            .api_post(
                &["drafts"],
                &json!({ "message": { "raw": raw, "threadId": thread_id } }),
            )
            .await?;
        Ok(draft.id)
    }

    async fn send_draft(&self, draft_id: &str) -> Result<(), TriageError> {
        let _: Value = self.api_post(&["drafts", "send"], &json!({ "id": draft_id })).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError> {
        let raw = self.raw_for(message).await?;
        let sent: IdOnly = self
            .api_post(
                &["messages", "send"],
                &json!({ "raw": raw, "threadId": thread_id }),
            )
            .await?;
        Ok(sent.id)
    }

    async fn list_drafts(&self, thread_id: &str) -> Result<Vec<DraftRef>, TriageError> {
        let mut drafts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut page: DraftList = {
                let mut params = Vec::new();
                if let Some(token) = page_token.as_deref() {
                    params.push(("pageToken", token));
                }
                self.api_get(&["drafts"], &params).await?
            };
            drafts.extend(page.for_thread(thread_id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(thread_id, count = drafts.len(), "listed drafts");
        Ok(drafts)
    }
}

async fn parse_gmail_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, TriageError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TriageError::auth(format!("gmail rejected credentials ({status}): {detail}"))
            }
            StatusCode::NOT_FOUND => TriageError::not_found(format!("gmail ({status}): {detail}")),
            _ => TriageError::provider(format!("gmail http error ({status}): {detail}")),
        });
    }
    resp.json()
        .await
        .map_err(|e| TriageError::provider(format!("gmail response parse failed: {e}")))
}
