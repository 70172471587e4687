use super::ApiClient;
use crate::error::{ChatError, FetchFailure, Result};
use crate::models::message::{ChatMessage, InboundFrame};
use crate::models::user::UserId;

impl ApiClient {
    /// `GET /api/messages/{other}`: the stored conversation with one peer,
    /// classified against the local identity.
    pub async fn history(&self, other: UserId) -> Result<Vec<ChatMessage>> {
        let resp = self
            .send_checked(self.client.get(self.url(&format!("/api/messages/{other}"))))
            .await
            .map_err(ChatError::HistoryFetch)?;

        let frames: Vec<InboundFrame> = resp
            .json()
            .await
            .map_err(|e| ChatError::HistoryFetch(FetchFailure::transport(e.to_string())))?;

        let me = self.session.identity();
        Ok(frames.into_iter().map(|f| f.normalize(me)).collect())
    }

    pub async fn history_or_empty(&self, other: UserId) -> Vec<ChatMessage> {
        match self.history(other).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(peer = %other, "{e}, showing an empty conversation");
                Vec::new()
            }
        }
    }
}
