use super::ApiClient;
use crate::error::{ChatError, FetchFailure, Result};
use crate::models::user::DirectoryUser;

impl ApiClient {
    /// `GET /api/users` with the local identity filtered out.
    pub async fn peers(&self) -> Result<Vec<DirectoryUser>> {
        let resp = self
            .send_checked(self.client.get(self.url("/api/users")))
            .await
            .map_err(ChatError::DirectoryFetch)?;

        let users: Vec<DirectoryUser> = resp
            .json()
            .await
            .map_err(|e| ChatError::DirectoryFetch(FetchFailure::transport(e.to_string())))?;

        let me = self.session.identity();
        Ok(users
            .into_iter()
            .filter(|u| Some(u.id) != me)
            .collect())
    }

    /// Peer list for display: a failed fetch is logged and shows as empty.
    pub async fn peers_or_empty(&self) -> Vec<DirectoryUser> {
        match self.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!("{e}, showing an empty peer list");
                Vec::new()
            }
        }
    }
}
