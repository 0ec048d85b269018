use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use triage_domain::CredentialProvider;
use triage_error::TriageError;
use uuid::Uuid;

pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_SKEW_SECS: i64 = 60;
const LOGIN_HINT: &str = "run `triage auth gmail`";

pub struct GoogleAuthConfig {
    pub client_secrets: PathBuf,
    pub token_path: PathBuf,
    pub redirect_port: u16,
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Token file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(self.expires_in),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// Installed-app OAuth credentials for Gmail, backed by a token file.
pub struct OAuthCredentials {
    secrets: ClientSecrets,
    token_path: PathBuf,
    redirect_port: u16,
    client: Client,
    token: Mutex<Option<StoredToken>>,
}

impl OAuthCredentials {
    pub fn load(config: &GoogleAuthConfig) -> Result<Self, TriageError> {
        let secrets = read_client_secrets(&config.client_secrets)?;
        let token = read_token(&config.token_path)?;
        debug!(
            token_path = %config.token_path.display(),
            has_token = token.is_some(),
            "loaded gmail credentials"
        );
        Ok(Self {
            secrets,
            token_path: config.token_path.clone(),
            redirect_port: config.redirect_port,
            client: Client::new(),
            token: Mutex::new(token),
        })
    }

    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, TriageError> {
        Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", GMAIL_MODIFY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map(String::from)
        .map_err(|e| TriageError::configuration(format!("invalid auth_uri: {e}")))
    }

    /// Loopback consent flow: prints the consent URL, waits for the browser
    /// redirect on 127.0.0.1, exchanges the code and saves the token file.
    pub async fn interactive_login(&self) -> Result<StoredToken, TriageError> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .map_err(|e| {
                TriageError::configuration(format!(
                    "cannot listen on 127.0.0.1:{}: {e}",
                    self.redirect_port
                ))
            })?;
        let redirect_uri = format!("http://localhost:{}/", self.redirect_port);
        let state = Uuid::new_v4().to_string();
        let url = self.authorization_url(&redirect_uri, &state)?;

        eprintln!("Open this URL in your browser to authorize Gmail access:");
        eprintln!();
        eprintln!("{url}");
        eprintln!();
        info!(port = self.redirect_port, "waiting for OAuth redirect");

        let code = accept_redirect(&listener, &state).await?;
        let token = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("client_id", &self.secrets.client_id),
                ("client_secret", &self.secrets.client_secret),
                ("redirect_uri", &redirect_uri),
            ])
            .await?
            .into_stored(None, Utc::now());

        if token.refresh_token.is_none() {
            warn!("token response carried no refresh token");
        }
        self.persist(&token).await?;
        *self.token.lock().await = Some(token.clone());
        info!(path = %self.token_path.display(), "gmail token saved");
        Ok(token)
    }

    async fn refresh_locked(&self, slot: &mut Option<StoredToken>) -> Result<String, TriageError> {
        let refresh_token = slot
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| TriageError::auth(format!("no refresh token available; {LOGIN_HINT}")))?;

        let token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.secrets.client_id),
                ("client_secret", &self.secrets.client_secret),
            ])
            .await?
            .into_stored(Some(refresh_token), Utc::now());

        self.persist(&token).await?;
        let access = token.access_token.clone();
        *slot = Some(token);
        info!("gmail access token refreshed");
        Ok(access)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TriageError> {
        let resp = self
            .client
            .post(&self.secrets.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| TriageError::network(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TriageError::auth(format!(
                "token endpoint rejected request ({status}): {body}; {LOGIN_HINT}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| TriageError::auth(format!("token response parse failed: {e}")))
    }

    async fn persist(&self, token: &StoredToken) -> Result<(), TriageError> {
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| TriageError::internal(format!("token encode: {e}")))?;
        tokio::fs::write(&self.token_path, json).await.map_err(|e| {
            TriageError::internal(format!(
                "cannot write token file {}: {e}",
                self.token_path.display()
            ))
        })
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    async fn access_token(&self) -> Result<String, TriageError> {
        let mut guard = self.token.lock().await;
        let Some(token) = guard.as_ref() else {
            return Err(TriageError::auth(format!(
                "no Gmail token at {}; {LOGIN_HINT}",
                self.token_path.display()
            )));
        };
        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token.clone());
        }
        debug!("access token expired, refreshing");
        self.refresh_locked(&mut guard).await
    }

    async fn refresh(&self) -> Result<String, TriageError> {
        let mut guard = self.token.lock().await;
        self.refresh_locked(&mut guard).await
    }
}

fn read_client_secrets(path: &Path) -> Result<ClientSecrets, TriageError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        TriageError::configuration(format!("cannot read client secrets {}: {e}", path.display()))
    })?;
    let file: SecretsFile = serde_json::from_str(&raw).map_err(|e| {
        TriageError::configuration(format!("invalid client secrets {}: {e}", path.display()))
    })?;
    file.installed.or(file.web).ok_or_else(|| {
        TriageError::configuration(format!(
            "client secrets {} has neither an `installed` nor a `web` section",
            path.display()
        ))
    })
}

fn read_token(path: &Path) -> Result<Option<StoredToken>, TriageError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        TriageError::auth(format!("cannot read token file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map(Some).map_err(|e| {
        TriageError::auth(format!(
            "invalid token file {}: {e}; {LOGIN_HINT}",
            path.display()
        ))
    })
}

async fn accept_redirect(listener: &TcpListener, expected_state: &str) -> Result<String, TriageError> {
    loop {
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|e| TriageError::network(format!("accept redirect: {e}")))?;

        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| TriageError::network(format!("read redirect: {e}")))?;
        let request = String::from_utf8_lossy(&buf[..n]);
        let target = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/")
            .to_string();

        // Browsers also ask for /favicon.ico and the like.
        if !target.contains("code=") && !target.contains("error=") {
            debug!(%peer, %target, "ignoring unrelated request");
            respond(&mut stream, "404 Not Found", "").await;
            continue;
        }

        let result = parse_callback(&target, expected_state);
        let body = match &result {
            Ok(_) => "Authorization complete. You can close this window.",
            Err(_) => "Authorization failed. Check the terminal for details.",
        };
        respond(&mut stream, "200 OK", body).await;
        return result;
    }
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!(%e, "failed to answer redirect request");
    }
}

/// Authorization code from a redirect request target, after checking `state`.
pub fn parse_callback(target: &str, expected_state: &str) -> Result<String, TriageError> {
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| TriageError::auth(format!("malformed redirect: {e}")))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(err) = params.get("error") {
        return Err(TriageError::auth(format!("consent denied: {err}")));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(TriageError::auth("OAuth state mismatch"));
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| TriageError::auth("redirect carried no authorization code"))
}
