use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use triage_core::{ReplyEngine, ReplyPrompt, TriageService};
use triage_domain::*;
use triage_error::TriageError;

#[derive(Default)]
struct FakeMail {
    listed: Vec<String>,
    threads: HashMap<String, Thread>,
    drafts: Vec<DraftRef>,
    fail_list: bool,
    fail_connect: bool,
    fail_create_for: HashSet<String>,
    fail_modify_for: HashSet<String>,
    connects: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeMail {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn with_thread(mut self, thread: Thread) -> Self {
        self.threads.insert(thread.id.clone(), thread);
        self
    }
}

struct FakeConnector(Arc<FakeMail>);

#[async_trait]
impl MailConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn MailProvider>, TriageError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_connect {
            return Err(TriageError::auth("token revoked"));
        }
        let provider: Arc<dyn MailProvider> = self.0.clone();
        Ok(provider)
    }
}

#[async_trait]
impl MailProvider for FakeMail {
    async fn list_threads(&self, query: &str) -> Result<Vec<String>, TriageError> {
        self.record(format!("list_threads:{query}"));
        if self.fail_list {
            return Err(TriageError::provider("quota exceeded"));
        }
        Ok(self.listed.clone())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, TriageError> {
        self.record(format!("get_thread:{thread_id}"));
        self.threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| TriageError::not_found(format!("thread {thread_id}")))
    }

    async fn modify_thread(
        &self,
        thread_id: &str,
        remove_labels: &[&str],
    ) -> Result<(), TriageError> {
        self.record(format!("modify_thread:{thread_id}:{}", remove_labels.join(",")));
        if self.fail_modify_for.contains(thread_id) {
            return Err(TriageError::provider("label update rejected"));
        }
        Ok(())
    }

    async fn create_draft(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError> {
        self.record(format!(
            "create_draft:{thread_id}:{}:{}:{}",
            message.to, message.subject, message.body
        ));
        if self.fail_create_for.contains(thread_id) {
            return Err(TriageError::provider("invalid recipient"));
        }
        Ok(format!("draft-{thread_id}"))
    }

    async fn send_draft(&self, draft_id: &str) -> Result<(), TriageError> {
        self.record(format!("send_draft:{draft_id}"));
        Ok(())
    }

    async fn send_message(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, TriageError> {
        self.record(format!(
            "send_message:{thread_id}:{}:{}",
            message.to, message.subject
        ));
        Ok(format!("msg-{thread_id}"))
    }

    async fn list_drafts(&self, thread_id: &str) -> Result<Vec<DraftRef>, TriageError> {
        self.record(format!("list_drafts:{thread_id}"));
        Ok(self
            .drafts
            .iter()
            .filter(|d| d.thread_id == thread_id)
            .cloned()
            .collect())
    }
}

fn service(mail: &Arc<FakeMail>) -> TriageService {
    TriageService::new(
        Arc::new(FakeConnector(mail.clone())),
        ReplyEngine::unavailable("GEMINI_API_KEY not set"),
        ReplyPrompt::new("Acme"),
    )
}

fn body(text: &str) -> MessageNode {
    MessageNode::leaf(PLAIN_TEXT, URL_SAFE.encode(text.as_bytes()))
}

fn thread(id: &str, from: &str, subject: &str, bodies: &[MessageNode]) -> Thread {
    Thread {
        id: id.to_string(),
        messages: bodies
            .iter()
            .enumerate()
            .map(|(i, payload)| ThreadMessage {
                id: format!("{id}-m{i}"),
                headers: vec![Header::new("From", from), Header::new("Subject", subject)],
                payload: payload.clone(),
            })
            .collect(),
    }
}

fn simple_thread(id: &str) -> Thread {
    thread(
        id,
        &format!("{id}@example.com"),
        &format!("Question {id}"),
        &[body("Hello?")],
    )
}

#[tokio::test]
async fn empty_batch_touches_nothing() {
    let mail = Arc::new(FakeMail::default());
    let outcome = service(&mail).create_drafts(&[]).await.expect("batch");

    assert!(outcome.is_nothing_to_do());
    assert_eq!(outcome.summary(), NOTHING_TO_DO);
    assert_eq!(mail.connects.load(Ordering::SeqCst), 0);
    assert!(mail.calls().is_empty());
}

#[tokio::test]
async fn failing_item_does_not_stop_the_batch() {
    let mail = Arc::new(
        FakeMail::default()
            .with_thread(simple_thread("t1"))
            .with_thread(simple_thread("t3")),
    );
    let requests = [
        DraftRequest::new("t1", "Reply one"),
        DraftRequest::new("missing", "Reply two"),
        DraftRequest::new("t3", "Reply three"),
    ];

    let outcome = service(&mail).create_drafts(&requests).await.expect("batch");

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.items.len(), 3);
    let ids: Vec<&str> = outcome.items.iter().map(|i| i.thread_id.as_str()).collect();
    assert_eq!(ids, ["t1", "missing", "t3"]);
    assert!(outcome.items[0].succeeded);
    assert!(!outcome.items[1].succeeded);
    assert!(outcome.items[2].succeeded);
    assert_eq!(
        outcome.items[0].line,
        "Draft created and thread marked as read for thread ID: t1"
    );
    assert!(outcome.items[1].line.contains("thread ID missing"));
    assert!(outcome.items[1].line.contains("not found"));

    let summary = outcome.summary();
    assert!(summary.starts_with("Successfully created 2 draft replies"));
    assert_eq!(summary.lines().count(), 4);
    assert_eq!(mail.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn draft_is_addressed_to_first_sender_with_reply_subject() {
    let mail = Arc::new(FakeMail::default().with_thread(thread(
        "t1",
        "Ann <ann@example.com>",
        "Pricing",
        &[body("How much?"), body("Any update?")],
    )));

    service(&mail)
        .create_drafts(&[DraftRequest::new("t1", "It is free.")])
        .await
        .expect("batch");

    assert_eq!(
        mail.calls(),
        [
            "get_thread:t1",
            "create_draft:t1:Ann <ann@example.com>:Re: Pricing:It is free.",
            "modify_thread:t1:UNREAD",
        ]
    );
}

#[tokio::test]
async fn missing_headers_fall_back_to_sentinels() {
    let bare = Thread {
        id: "t1".to_string(),
        messages: vec![ThreadMessage {
            id: "m1".to_string(),
            headers: vec![],
            payload: body("hi"),
        }],
    };
    let mail = Arc::new(FakeMail::default().with_thread(bare));

    let outcome = service(&mail)
        .create_drafts(&[DraftRequest::new("t1", "Hello")])
        .await
        .expect("batch");

    assert_eq!(outcome.succeeded, 1);
    assert!(mail
        .calls()
        .contains(&"create_draft:t1:unknown:Re: No Subject:Hello".to_string()));
}

#[tokio::test]
async fn thread_stays_unread_when_draft_creation_fails() {
    let mut fake = FakeMail::default()
        .with_thread(simple_thread("t1"))
        .with_thread(simple_thread("t2"));
    fake.fail_create_for.insert("t1".to_string());
    let mail = Arc::new(fake);

    let outcome = service(&mail)
        .create_drafts(&[DraftRequest::new("t1", "a"), DraftRequest::new("t2", "b")])
        .await
        .expect("batch");

    assert_eq!(outcome.succeeded, 1);
    assert!(outcome.items[0]
        .line
        .starts_with("Mail provider error occurred for thread ID t1"));
    let calls = mail.calls();
    assert!(!calls.contains(&"modify_thread:t1:UNREAD".to_string()));
    assert!(calls.contains(&"modify_thread:t2:UNREAD".to_string()));
}

#[tokio::test]
async fn mark_read_failure_fails_the_item_only() {
    let mut fake = FakeMail::default()
        .with_thread(simple_thread("t1"))
        .with_thread(simple_thread("t2"));
    fake.fail_modify_for.insert("t1".to_string());
    let mail = Arc::new(fake);

    let outcome = service(&mail)
        .create_drafts(&[DraftRequest::new("t1", "a"), DraftRequest::new("t2", "b")])
        .await
        .expect("batch");

    assert_eq!(outcome.succeeded, 1);
    assert!(!outcome.items[0].succeeded);
    assert!(outcome.items[0].line.contains("label update rejected"));
    assert!(outcome.items[1].succeeded);
    let calls = mail.calls();
    assert!(calls.contains(&"modify_thread:t1:UNREAD".to_string()));
    assert!(calls.contains(&"modify_thread:t2:UNREAD".to_string()));
}

#[tokio::test]
async fn blank_thread_id_is_recorded_without_provider_calls() {
    let mail = Arc::new(FakeMail::default().with_thread(simple_thread("t2")));

    let outcome = service(&mail)
        .create_drafts(&[DraftRequest::new("  ", "a"), DraftRequest::new("t2", "b")])
        .await
        .expect("batch");

    assert_eq!(outcome.succeeded, 1);
    assert!(outcome.items[0].line.starts_with("Missing field"));
    assert_eq!(mail.calls()[0], "get_thread:t2");
}

#[tokio::test]
async fn connect_failure_aborts_the_batch() {
    let mail = Arc::new(FakeMail {
        fail_connect: true,
        ..Default::default()
    });

    let err = service(&mail)
        .create_drafts(&[DraftRequest::new("t1", "a")])
        .await
        .expect_err("must fail");

    assert!(matches!(err, TriageError::Auth(_)));
    assert!(mail.calls().is_empty());
}

#[tokio::test]
async fn fetch_with_no_matches_is_empty_not_error() {
    let mail = Arc::new(FakeMail::default());
    let records = service(&mail).fetch_unread("is:unread").await.expect("fetch");

    assert!(records.is_empty());
    assert_eq!(mail.calls(), ["list_threads:is:unread"]);
}

#[tokio::test]
async fn fetch_surfaces_list_failure() {
    let mail = Arc::new(FakeMail {
        fail_list: true,
        ..Default::default()
    });

    let err = service(&mail)
        .fetch_unread("is:unread")
        .await
        .expect_err("must fail");
    assert!(matches!(err, TriageError::Provider(_)));
}

#[tokio::test]
async fn fetch_builds_records_and_skips_broken_threads() {
    let headerless = Thread {
        id: "t2".to_string(),
        messages: vec![ThreadMessage {
            id: "m1".to_string(),
            headers: vec![],
            payload: MessageNode::empty("multipart/mixed"),
        }],
    };
    let mut fake = FakeMail::default()
        .with_thread(thread(
            "t1",
            "Ann <ann@example.com>",
            "Refund",
            &[
                body("Can I get a refund?"),
                body("Following up.\nOn Mon, Jan 1 Ann wrote:\n\n> Can I get a refund?"),
            ],
        ))
        .with_thread(headerless);
    fake.listed = vec!["t1".to_string(), "gone".to_string(), "t2".to_string()];
    let mail = Arc::new(fake);

    let records = service(&mail).fetch_unread("q").await.expect("fetch");

    assert_eq!(
        records,
        [
            ThreadRecord {
                thread_id: "t1".to_string(),
                subject: "Refund".to_string(),
                sender: "Ann <ann@example.com>".to_string(),
                transcript: "Can I get a refund?\n---\nFollowing up.".to_string(),
            },
            ThreadRecord {
                thread_id: "t2".to_string(),
                subject: NO_SUBJECT.to_string(),
                sender: UNKNOWN_SENDER.to_string(),
                transcript: String::new(),
            },
        ]
    );
}

#[tokio::test]
async fn send_reply_marks_read_after_sending() {
    let mail = Arc::new(FakeMail::default());

    let id = service(&mail)
        .send_reply("t1", "Thanks!", "ann@example.com", "Re: Refund")
        .await
        .expect("send");

    assert_eq!(id, "msg-t1");
    assert_eq!(
        mail.calls(),
        [
            "send_message:t1:ann@example.com:Re: Refund",
            "modify_thread:t1:UNREAD",
        ]
    );
}

#[tokio::test]
async fn send_reply_rejects_blank_recipient() {
    let mail = Arc::new(FakeMail::default());
    let err = service(&mail)
        .send_reply("t1", "Thanks!", " ", "Re: x")
        .await
        .expect_err("must fail");
    assert!(matches!(err, TriageError::InvalidInput(_)));
    assert_eq!(mail.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn thread_without_draft_is_reported_not_failed() {
    let mail = Arc::new(FakeMail::default());

    let dispatch = service(&mail).send_thread_draft("t1").await.expect("dispatch");

    assert_eq!(
        dispatch,
        DraftDispatch::NoDraft {
            thread_id: "t1".to_string()
        }
    );
    assert_eq!(dispatch.to_string(), "No draft found for thread ID: t1");
    assert_eq!(mail.calls(), ["list_drafts:t1"]);
}

#[tokio::test]
async fn first_draft_in_thread_is_sent() {
    let mail = Arc::new(FakeMail {
        drafts: vec![
            DraftRef {
                id: "d-other".to_string(),
                thread_id: "t9".to_string(),
            },
            DraftRef {
                id: "d1".to_string(),
                thread_id: "t1".to_string(),
            },
            DraftRef {
                id: "d2".to_string(),
                thread_id: "t1".to_string(),
            },
        ],
        ..Default::default()
    });

    let dispatch = service(&mail).send_thread_draft("t1").await.expect("dispatch");

    assert_eq!(
        dispatch,
        DraftDispatch::Sent {
            thread_id: "t1".to_string(),
            draft_id: "d1".to_string()
        }
    );
    assert_eq!(mail.calls(), ["list_drafts:t1", "send_draft:d1"]);
}

#[tokio::test]
async fn draft_is_sent_by_id() {
    let mail = Arc::new(FakeMail::default());

    service(&mail).send_draft("d5").await.expect("send");
    assert_eq!(mail.calls(), ["send_draft:d5"]);

    let err = service(&mail).send_draft("").await.expect_err("blank id");
    assert!(matches!(err, TriageError::InvalidInput(_)));
    assert_eq!(mail.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generation_without_backend_is_a_configuration_error() {
    let mail = Arc::new(FakeMail::default());
    let record = ThreadRecord {
        thread_id: "t1".to_string(),
        subject: "s".to_string(),
        sender: "a".to_string(),
        transcript: "hi".to_string(),
    };

    let err = service(&mail)
        .generate_reply(&record)
        .await
        .expect_err("must fail");
    assert!(matches!(err, TriageError::Configuration(_)));
}
