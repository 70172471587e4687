/// Frame commands.
pub mod command {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const SEND: &str = "SEND";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
    pub const DISCONNECT: &str = "DISCONNECT";
}

/// Header names.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const VERSION: &str = "version";
    pub const HOST: &str = "host";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const DESTINATION: &str = "destination";
    pub const ID: &str = "id";
    pub const ACK: &str = "ack";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const MESSAGE: &str = "message";
    pub const RECEIPT_ID: &str = "receipt-id";
}

pub const PROTOCOL_VERSION: &str = "1.2";
pub const JSON_CONTENT_TYPE: &str = "application/json";
