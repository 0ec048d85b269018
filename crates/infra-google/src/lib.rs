pub mod adapter;
mod api;
pub mod auth;
pub mod mime;

pub use adapter::{GmailAdapter, GmailConnector, GMAIL_API_BASE};
pub use auth::{GoogleAuthConfig, OAuthCredentials, StoredToken};
