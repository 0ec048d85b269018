use serde::Deserialize;
use triage_domain::{DraftRef, Header, MessageNode, Thread, ThreadMessage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThreadList {
    #[serde(default)]
    pub threads: Vec<IdOnly>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdOnly {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GmailThread {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<GmailMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GmailMessage {
    pub id: String,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<PartHeader>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartBody {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DraftList {
    #[serde(default)]
    pub drafts: Vec<DraftEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DraftEntry {
    pub id: String,
    pub message: Option<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageRef {
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Profile {
    pub email_address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

impl MessagePart {
    /// Inline data wins over children; a part with neither is an empty leaf.
    pub fn into_node(self) -> MessageNode {
        let data = self.body.and_then(|b| b.data);
        match data {
            Some(data) => MessageNode::leaf(self.mime_type, data),
            None if !self.parts.is_empty() => MessageNode::multipart(
                self.mime_type,
                self.parts.into_iter().map(MessagePart::into_node).collect(),
            ),
            None => MessageNode::empty(self.mime_type),
        }
    }
}

impl From<GmailMessage> for ThreadMessage {
    fn from(msg: GmailMessage) -> Self {
        let (headers, payload) = match msg.payload {
            Some(mut part) => {
                let headers = std::mem::take(&mut part.headers)
                    .into_iter()
                    .map(|h| Header::new(h.name, h.value))
                    .collect();
                (headers, part.into_node())
            }
            None => (Vec::new(), MessageNode::empty("")),
        };
        ThreadMessage {
            id: msg.id,
            headers,
            payload,
        }
    }
}

impl From<GmailThread> for Thread {
    fn from(thread: GmailThread) -> Self {
        Thread {
            id: thread.id,
            messages: thread.messages.into_iter().map(Into::into).collect(),
        }
    }
}

impl DraftList {
    pub fn for_thread(&mut self, thread_id: &str) -> Vec<DraftRef> {
        std::mem::take(&mut self.drafts)
            .into_iter()
            .filter_map(|d| {
                let owner = d.message?.thread_id?;
                (owner == thread_id).then(|| DraftRef {
                    id: d.id,
                    thread_id: owner,
                })
            })
            .collect()
    }
}
