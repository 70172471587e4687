use std::time::Duration;

use reqwest::Url;

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_INBOX_DESTINATION: &str = "/user/queue/messages";
const DEFAULT_SEND_DESTINATION: &str = "/app/chat.send";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
const DEFAULT_HEARTBEAT_MS: u64 = 4000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Settings consumed by the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub ws_url: String,
    pub inbox_destination: String,
    pub send_destination: String,
    pub reconnect_delay: Duration,
    /// Upper bound for the doubling backoff. Equal to `reconnect_delay`
    /// means every reconnect waits the same fixed delay.
    pub reconnect_max_delay: Duration,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
    /// Upgrade plus CONNECT/CONNECTED plus SUBSCRIBE must finish within this.
    pub handshake_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            inbox_destination: DEFAULT_INBOX_DESTINATION.to_string(),
            send_destination: DEFAULT_SEND_DESTINATION.to_string(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            heartbeat_outgoing: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            heartbeat_incoming: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        }
    }

    /// Fixed reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self.reconnect_max_delay = delay;
        self
    }

    /// Doubling backoff from `initial` up to `max`.
    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.reconnect_max_delay = max.max(initial);
        self
    }

    pub fn with_heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Delay to wait before reconnect attempt number `attempt` (0-based).
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let max_delay = self.reconnect_max_delay.max(self.reconnect_delay);
        let mut delay = self.reconnect_delay;
        for _ in 0..attempt {
            if delay >= max_delay {
                break;
            }
            delay = (delay * 2).min(max_delay);
        }
        delay
    }
}

pub struct Config {
    pub api_url: String,
    pub http_timeout: Duration,
    pub channel: ChannelConfig,
}

fn env_millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

/// Derive the transport endpoint from the API base: swap the scheme for
/// its websocket counterpart and point at `/ws`.
pub fn derive_ws_url(api_url: &str) -> Option<String> {
    let mut url = Url::parse(api_url).ok()?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    url.set_path("/ws");
    url.set_query(None);
    Some(url.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let api_url = std::env::var("DESKCHAT_API_URL")
            .ok()
            .filter(|v| Url::parse(v).is_ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let ws_url = std::env::var("DESKCHAT_WS_URL")
            .ok()
            .or_else(|| derive_ws_url(&api_url))
            .unwrap_or_else(|| "ws://localhost:8080/ws".to_string());

        let reconnect_delay = env_millis("DESKCHAT_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS);
        let reconnect_max_delay = env_millis(
            "DESKCHAT_RECONNECT_MAX_DELAY_MS",
            reconnect_delay.as_millis() as u64,
        )
        .max(reconnect_delay);

        let channel = ChannelConfig {
            ws_url,
            inbox_destination: std::env::var("DESKCHAT_INBOX_DESTINATION")
                .unwrap_or_else(|_| DEFAULT_INBOX_DESTINATION.to_string()),
            send_destination: std::env::var("DESKCHAT_SEND_DESTINATION")
                .unwrap_or_else(|_| DEFAULT_SEND_DESTINATION.to_string()),
            reconnect_delay,
            reconnect_max_delay,
            heartbeat_outgoing: env_millis("DESKCHAT_HEARTBEAT_OUTGOING_MS", DEFAULT_HEARTBEAT_MS),
            heartbeat_incoming: env_millis("DESKCHAT_HEARTBEAT_INCOMING_MS", DEFAULT_HEARTBEAT_MS),
            handshake_timeout: env_millis(
                "DESKCHAT_HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            ),
        };

        Self {
            api_url,
            http_timeout: Duration::from_secs(
                std::env::var("DESKCHAT_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            channel,
        }
    }
}
