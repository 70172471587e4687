use std::sync::Arc;

use arc_swap::ArcSwapOption;
use data_encoding::BASE64URL_NOPAD;

use crate::models::user::{LoginResponse, User, UserId};

/// Credentials and identity of the logged-in user.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Session context shared by the realtime channel and the HTTP
/// collaborators. In-memory only; dropping the last clone forgets it.
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<ArcSwapOption<SessionState>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("identity", &self.identity())
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for a token obtained out of band, without a user record.
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.state.store(Some(Arc::new(SessionState {
            access_token: token.into(),
            refresh_token: None,
            user: None,
        })));
        session
    }

    pub fn establish(&self, login: LoginResponse) {
        self.state.store(Some(Arc::new(SessionState {
            access_token: login.access_token,
            refresh_token: login.refresh_token,
            user: Some(login.user),
        })));
    }

    pub fn invalidate(&self) {
        if self.state.swap(None).is_some() {
            tracing::info!("session invalidated");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.load().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.load().as_ref().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state
            .load()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.state.load().as_ref().and_then(|s| s.user.clone())
    }

    /// Local identity: the stored user id, else a numeric claim from the
    /// token payload.
    pub fn identity(&self) -> Option<UserId> {
        let guard = self.state.load();
        let state = guard.as_ref()?;
        if let Some(ref user) = state.user {
            return Some(user.id);
        }
        identity_from_token(&state.access_token)
    }
}

const IDENTITY_CLAIMS: [&str; 4] = ["id", "userId", "user_id", "sub"];

/// Read the user id out of a JWT payload without verifying it. The server
/// verifies; the client only needs the id for self/other classification.
pub fn identity_from_token(token: &str) -> Option<UserId> {
    let payload = token.split('.').nth(1)?;
    let bytes = BASE64URL_NOPAD
        .decode(payload.trim_end_matches('=').as_bytes())
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

    IDENTITY_CLAIMS.iter().find_map(|claim| match claims.get(*claim)? {
        serde_json::Value::Number(n) => n.as_i64().map(UserId),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    })
}
