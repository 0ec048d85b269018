use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use triage_domain::ReplyGenerator;
use triage_error::TriageError;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_STORE_NAME: &str = "TriageKnowledgeStore";

pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub knowledge_file: PathBuf,
    pub store_display_name: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, knowledge_file: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            knowledge_file: knowledge_file.into(),
            store_display_name: DEFAULT_STORE_NAME.to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Store {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Gemini `generateContent` bound to a file-search store holding the
/// knowledge file.
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    store: String,
}

impl GeminiGenerator {
    pub async fn connect(config: GeminiConfig) -> Result<Self, TriageError> {
        Self::connect_to(GEMINI_API_BASE, config).await
    }

    /// Creates the store, uploads the knowledge file and waits for indexing.
    /// Every failure here is reported as a configuration error.
    pub async fn connect_to(
        base_url: impl Into<String>,
        config: GeminiConfig,
    ) -> Result<Self, TriageError> {
        if config.api_key.trim().is_empty() {
            return Err(TriageError::configuration("GEMINI_API_KEY not set"));
        }
        let knowledge = tokio::fs::read(&config.knowledge_file).await.map_err(|e| {
            TriageError::configuration(format!(
                "knowledge file {} unreadable: {e}",
                config.knowledge_file.display()
            ))
        })?;

        let mut generator = Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            store: String::new(),
        };
        generator.store = generator
            .prepare_store(&config, knowledge)
            .await
            .map_err(|e| TriageError::configuration(format!("knowledge store setup failed: {e}")))?;

        info!(store = %generator.store, model = %generator.model, "knowledge store ready");
        Ok(generator)
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    async fn prepare_store(
        &self,
        config: &GeminiConfig,
        knowledge: Vec<u8>,
    ) -> Result<String, TriageError> {
        let store: Store = self
            .api_post(
                "v1beta/fileSearchStores",
                &json!({ "displayName": config.store_display_name }),
            )
            .await?;
        debug!(store = %store.name, "file search store created");

        let url = format!(
            "{}/upload/v1beta/{}:uploadToFileSearchStore",
            self.base_url, store.name
        );
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "text/plain")
            .query(&[("uploadType", "media")])
            .body(knowledge)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("gemini upload failed: {e}")))?;
        let mut operation: Operation = parse_gemini_response(resp).await?;

        let mut polls = 0;
        while !operation.done {
            if polls >= config.max_polls {
                return Err(TriageError::provider(format!(
                    "knowledge file still processing after {polls} checks"
                )));
            }
            debug!(operation = %operation.name, "waiting for knowledge file processing");
            tokio::time::sleep(config.poll_interval).await;
            operation = self.api_get(&format!("v1beta/{}", operation.name)).await?;
            polls += 1;
        }
        if let Some(err) = operation.error {
            return Err(TriageError::provider(format!("knowledge file import failed: {err}")));
        }

        Ok(store.name)
    }

    async fn api_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TriageError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url, "gemini GET");
        let resp = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("gemini request failed: {e}")))?;
        parse_gemini_response(resp).await
    }

    async fn api_post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, TriageError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url, "gemini POST");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("gemini request failed: {e}")))?;
        parse_gemini_response(resp).await
    }
}

#[async_trait]
impl ReplyGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, TriageError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "file_search": { "file_search_store_names": [self.store] } }]
        });
        let resp: GenerateResponse = self
            .api_post(&format!("v1beta/models/{}:generateContent", self.model), &body)
            .await?;
        resp.text()
            .ok_or_else(|| TriageError::provider("gemini returned no reply text"))
    }
}

async fn parse_gemini_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, TriageError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TriageError::auth(format!("gemini rejected api key ({status}): {body}"))
            }
            _ => TriageError::provider(format!("gemini http error ({status}): {body}")),
        });
    }
    resp.json()
        .await
        .map_err(|e| TriageError::provider(format!("gemini response parse failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn knowledge() -> NamedTempFile {
        let file = NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), "Resume reviews take two days.").expect("write");
        file
    }

    fn config(file: &NamedTempFile) -> GeminiConfig {
        GeminiConfig {
            poll_interval: Duration::from_millis(5),
            max_polls: 3,
            ..GeminiConfig::new("key-1", file.path())
        }
    }

    async fn mount_store(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1beta/fileSearchStores"))
            .and(header("x-goog-api-key", "key-1"))
            .and(body_partial_json(json!({"displayName": DEFAULT_STORE_NAME})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "fileSearchStores/kb-1",
                "displayName": DEFAULT_STORE_NAME
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_upload(server: &MockServer, done: bool) {
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/fileSearchStores/kb-1:uploadToFileSearchStore"))
            .and(query_param("uploadType", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "fileSearchStores/kb-1/operations/op-1",
                "done": done
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn connect_waits_for_indexing_then_generates() {
        let server = MockServer::start().await;
        mount_store(&server).await;
        mount_upload(&server, false).await;
        Mock::given(method("GET"))
            .and(path("/v1beta/fileSearchStores/kb-1/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "fileSearchStores/kb-1/operations/op-1",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(body_partial_json(json!({
                "tools": [{"file_search": {"file_search_store_names": ["fileSearchStores/kb-1"]}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Reviews take "}, {"text": "two days."}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = knowledge();
        let generator = GeminiGenerator::connect_to(server.uri(), config(&file))
            .await
            .expect("connect");
        assert_eq!(generator.store_name(), "fileSearchStores/kb-1");
        assert_eq!(
            generator.generate("How long?").await.expect("generate"),
            "Reviews take two days."
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_configuration_error() {
        let file = knowledge();
        let cfg = GeminiConfig {
            api_key: String::new(),
            ..config(&file)
        };
        let err = GeminiGenerator::connect_to("http://127.0.0.1:9", cfg)
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, TriageError::Configuration(ref m) if m.contains("GEMINI_API_KEY")));
    }

    #[tokio::test]
    async fn missing_knowledge_file_is_configuration_error() {
        let cfg = GeminiConfig::new("key-1", "/nonexistent/knowledge.txt");
        let err = GeminiGenerator::connect_to("http://127.0.0.1:9", cfg)
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, TriageError::Configuration(_)));
    }

    #[tokio::test]
    async fn indexing_that_never_finishes_fails_connect() {
        let server = MockServer::start().await;
        mount_store(&server).await;
        mount_upload(&server, false).await;
        Mock::given(method("GET"))
            .and(path("/v1beta/fileSearchStores/kb-1/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "fileSearchStores/kb-1/operations/op-1"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let file = knowledge();
        let err = GeminiGenerator::connect_to(server.uri(), config(&file))
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, TriageError::Configuration(ref m) if m.contains("still processing")));
    }

    #[tokio::test]
    async fn store_creation_rejection_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/fileSearchStores"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let file = knowledge();
        let err = GeminiGenerator::connect_to(server.uri(), config(&file))
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, TriageError::Configuration(ref m) if m.contains("API key not valid")));
    }

    #[tokio::test]
    async fn empty_candidate_is_provider_error() {
        let server = MockServer::start().await;
        mount_store(&server).await;
        mount_upload(&server, true).await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let file = knowledge();
        let generator = GeminiGenerator::connect_to(server.uri(), config(&file))
            .await
            .expect("connect");
        let err = generator.generate("hi").await.expect_err("must fail");
        assert!(matches!(err, TriageError::Provider(_)));
    }
}
