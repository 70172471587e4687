use super::ApiClient;
use crate::error::{ChatError, Result};
use crate::models::user::{LoginRequest, LoginResponse, User};

impl ApiClient {
    /// `POST /auth/login`. On success the session holds the new tokens.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(|e| ChatError::Authentication(format!("login request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Authentication(format!(
                "login rejected with {status}: {body}"
            )));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::Decode(format!("login response: {e}")))?;
        let user = login.user.clone();
        self.session.establish(login);
        tracing::info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    /// `POST /auth/logout`, best-effort. The local session is cleared even
    /// when the server cannot be reached.
    pub async fn logout(&self) {
        if !self.session.is_authenticated() {
            return;
        }
        let builder = self.client.post(self.url("/auth/logout"));
        match self.apply_auth(builder).send().await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!("logout returned {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("logout request failed: {e}"),
        }
        self.session.invalidate();
    }
}
