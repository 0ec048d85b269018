use std::sync::Arc;

use triage_domain::{ReplyGenerator, ThreadRecord};
use triage_error::TriageError;
use tracing::{error, info};

/// Reply generation as configured at startup.
///
/// A generator that failed to initialize stays unavailable for the life of the
/// process: every call reports the original failure instead of retrying.
pub enum ReplyEngine {
    Ready(Arc<dyn ReplyGenerator>),
    Unavailable(String),
}

impl ReplyEngine {
    pub fn ready(generator: Arc<dyn ReplyGenerator>) -> Self {
        Self::Ready(generator)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn from_init(result: Result<Arc<dyn ReplyGenerator>, TriageError>) -> Self {
        match result {
            Ok(generator) => {
                info!("reply generation ready");
                Self::Ready(generator)
            }
            Err(e) => {
                error!(%e, "reply generation disabled");
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, TriageError> {
        match self {
            Self::Ready(generator) => generator.generate(prompt).await,
            Self::Unavailable(reason) => Err(TriageError::configuration(format!(
                "reply generation unavailable: {reason}"
            ))),
        }
    }
}

pub struct ReplyPrompt {
    organization: String,
}

impl ReplyPrompt {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
        }
    }

    pub fn render(&self, record: &ThreadRecord) -> String {
        format!(
            "You are a professional customer service agent for {org}. You have access to the company's knowledge base and services through a file search tool.

Your task: Respond to the following customer inquiry using ONLY the information from the company knowledge base provided via file search.

Customer Email:
Subject: {subject}
From: {sender}
Previous conversation history:
{history}

IMPORTANT INSTRUCTIONS:
1. SEARCH the knowledge base for information relevant to the customer's question
2. USE specific details from the knowledge base in your response - include exact quotes or paraphrasing from the knowledge base
3. Reference specific programs, support mechanisms, and services mentioned in the knowledge base
4. Be professional, empathetic, and provide concrete information
5. Answer ONLY what the customer asked - don't add unnecessary information
6. If information is not in the knowledge base, acknowledge and suggest contacting support
7. Always maintain a professional tone and end with a call to action or helpful closing

Generate a professional response to the customer's last message using the knowledge base.
Return ONLY the reply text, no other formatting or explanations.",
            org = self.organization,
            subject = record.subject,
            sender = record.sender,
            history = record.transcript,
        )
    }
}
