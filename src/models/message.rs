use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// Message record as the server sends it, both over the realtime
/// channel and from the history endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub id: i64,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
    pub receiver_id: UserId,
    #[serde(default)]
    pub receiver_name: Option<String>,
    pub message: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

/// Outbound payload. The server assigns id and timestamp and echoes the
/// stored record back on the sender's inbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub receiver_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "self")]
    Own,
    #[serde(rename = "other")]
    Other,
}

/// Inbound message classified against the local identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub origin: Origin,
    pub sender_id: UserId,
    pub sender_name: String,
    pub receiver_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// The other participant of the conversation this message belongs to.
    pub fn peer(&self) -> UserId {
        match self.origin {
            Origin::Own => self.receiver_id,
            Origin::Other => self.sender_id,
        }
    }
}

impl InboundFrame {
    pub fn normalize(self, identity: Option<UserId>) -> ChatMessage {
        let origin = if Some(self.sender_id) == identity {
            Origin::Own
        } else {
            Origin::Other
        };
        ChatMessage {
            id: self.id,
            origin,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            receiver_id: self.receiver_id,
            body: self.message,
            timestamp: self.created_at,
        }
    }
}

/// `createdAt` arrives as RFC 3339, as a zone-less local date-time, or as
/// epoch milliseconds depending on the backend's serializer settings.
/// Zone-less values are taken as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
            Raw::Text(text) => parse(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {text}"))),
        }
    }
}
