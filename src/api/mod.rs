pub mod auth;
pub mod messages;
pub mod users;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::FetchFailure;
use crate::session::Session;

/// HTTP client for the REST collaborators: authentication, user
/// directory and message history.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Session) -> Self {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_timeout(base_url: impl Into<String>, session: Session, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build http client with timeout: {e}");
                Client::new()
            });
        Self::with_client(client, base_url, session)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, session: Session) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.session.access_token() {
            builder.header("Authorization", format!("Bearer {token}"))
        } else {
            builder
        }
    }

    /// Send an authenticated request and turn non-success statuses into a
    /// `FetchFailure`. A 401 drops the session so the caller logs in again.
    async fn send_checked(&self, builder: RequestBuilder) -> Result<Response, FetchFailure> {
        let resp = self
            .apply_auth(builder)
            .send()
            .await
            .map_err(|e| FetchFailure::transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("collaborator answered 401, session must log in again");
            self.session.invalidate();
        }
        let body = resp.text().await.unwrap_or_default();
        Err(FetchFailure::status(status.as_u16(), body))
    }
}
