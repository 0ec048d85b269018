mod mcp;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use triage_core::format::format_threads;
use triage_core::{Format, ReplyEngine, ReplyPrompt, TriageService, DEFAULT_QUERY};
use triage_domain::{MailConnector, ReplyGenerator};
use triage_gemini::{GeminiConfig, GeminiGenerator};
use triage_google::{GmailConnector, GoogleAuthConfig, OAuthCredentials};
use tracing::{error, info};

const DEFAULT_ORGANIZATION: &str = "our company";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("triage=info")),
        )
        .compact()
        .init();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn load_gmail_config() -> Result<GoogleAuthConfig, String> {
    let redirect_port = env_or("TRIAGE_OAUTH_PORT", "8000")
        .parse()
        .map_err(|e| format!("invalid TRIAGE_OAUTH_PORT: {e}"))?;
    let client_secrets = PathBuf::from(env_or("TRIAGE_GMAIL_CLIENT_SECRETS", "credentials.json"));
    if !client_secrets.exists() {
        return Err(format!(
            "client secrets {} not found (set TRIAGE_GMAIL_CLIENT_SECRETS)",
            client_secrets.display()
        ));
    }
    Ok(GoogleAuthConfig {
        client_secrets,
        token_path: PathBuf::from(env_or("TRIAGE_GMAIL_TOKEN", "token.json")),
        redirect_port,
    })
}

fn load_gemini_config() -> Result<GeminiConfig, String> {
    let api_key = env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| "GEMINI_API_KEY env var not set".to_string())?;
    let mut config = GeminiConfig::new(api_key, env_or("TRIAGE_KNOWLEDGE_FILE", "knowledge.txt"));
    config.model = env_or("GEMINI_MODEL", triage_gemini::DEFAULT_MODEL);
    config.store_display_name = env_or("TRIAGE_KNOWLEDGE_STORE", triage_gemini::DEFAULT_STORE_NAME);
    Ok(config)
}

fn load_gmail_credentials() -> Result<Arc<OAuthCredentials>, Box<dyn std::error::Error>> {
    let config = load_gmail_config()?;
    Ok(Arc::new(OAuthCredentials::load(&config)?))
}

fn gmail_connector() -> Result<Arc<dyn MailConnector>, Box<dyn std::error::Error>> {
    let credentials = load_gmail_credentials()?;
    info!("gmail configured");
    Ok(Arc::new(GmailConnector::new(credentials)))
}

async fn reply_engine() -> ReplyEngine {
    match load_gemini_config() {
        Ok(cfg) => ReplyEngine::from_init(
            GeminiGenerator::connect(cfg)
                .await
                .map(|g| Arc::new(g) as Arc<dyn ReplyGenerator>),
        ),
        Err(e) => {
            info!("reply generation not configured: {e}");
            ReplyEngine::unavailable(e)
        }
    }
}

fn reply_prompt() -> ReplyPrompt {
    ReplyPrompt::new(env_or("TRIAGE_ORGANIZATION", DEFAULT_ORGANIZATION))
}

async fn run_auth_gmail() -> Result<(), Box<dyn std::error::Error>> {
    let credentials = load_gmail_credentials()?;

    eprintln!("Triage - Gmail Authorization");
    eprintln!("============================");
    eprintln!();

    let token = credentials.interactive_login().await?;

    eprintln!();
    eprintln!("Authorized with scopes: {}", token.scopes.join(" "));
    eprintln!("Token saved. You can now run `triage mcp`");
    Ok(())
}

async fn run_fetch(format: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let service = TriageService::new(
        gmail_connector()?,
        ReplyEngine::unavailable("not used by fetch"),
        reply_prompt(),
    );
    let query = env_or("TRIAGE_QUERY", DEFAULT_QUERY);
    let records = service.fetch_unread(&query).await?;
    println!("{}", format_threads(&records, Format::parse(format)));
    Ok(())
}

async fn run_mcp_server() -> Result<(), Box<dyn std::error::Error>> {
    let service = TriageService::new(gmail_connector()?, reply_engine().await, reply_prompt());
    let query = env_or("TRIAGE_QUERY", DEFAULT_QUERY);

    let server = mcp::McpServer::new(service, query);
    server.run().await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("mcp");

    let result = match cmd {
        "auth" => {
            let provider = args.get(2).map(|s| s.as_str()).unwrap_or("gmail");
            match provider {
                "gmail" | "google" => run_auth_gmail().await,
                other => {
                    eprintln!("Unknown provider for auth: {other}");
                    eprintln!("Usage: triage auth [gmail]");
                    return;
                }
            }
        }
        "fetch" => run_fetch(args.get(2).map(|s| s.as_str())).await,
        "mcp" => run_mcp_server().await,
        "help" | "--help" | "-h" => {
            eprintln!("Triage - inbox triage tools for support mailboxes");
            eprintln!();
            eprintln!("Usage:");
            eprintln!("  triage auth gmail       Authorize Gmail access (opens a browser consent flow)");
            eprintln!("  triage fetch [full]     Print unread threads with cleaned conversations");
            eprintln!("  triage mcp              Start MCP server (stdio)");
            eprintln!("  triage help             Show this help");
            eprintln!();
            eprintln!("Environment variables:");
            eprintln!("  TRIAGE_GMAIL_CLIENT_SECRETS  OAuth client secrets (default: credentials.json)");
            eprintln!("  TRIAGE_GMAIL_TOKEN           Saved OAuth token (default: token.json)");
            eprintln!("  TRIAGE_OAUTH_PORT            Loopback port for `auth gmail` (default: 8000)");
            eprintln!("  TRIAGE_QUERY                 Gmail search for unread threads");
            eprintln!("  TRIAGE_ORGANIZATION          Organization named in generated replies");
            eprintln!("  GEMINI_API_KEY               Gemini API key (enables generate_reply)");
            eprintln!("  GEMINI_MODEL                 Gemini model (default: gemini-2.0-flash)");
            eprintln!("  TRIAGE_KNOWLEDGE_FILE        Knowledge base text file (default: knowledge.txt)");
            eprintln!("  TRIAGE_KNOWLEDGE_STORE       Display name of the file search store");
            eprintln!("  RUST_LOG                     Log level (default: triage=info)");
            Ok(())
        }
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run `triage help` for usage");
            return;
        }
    };

    if let Err(e) = result {
        error!(%e, "fatal error");
        std::process::exit(1);
    }
}
