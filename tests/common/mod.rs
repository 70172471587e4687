#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use deskchat::config::ChannelConfig;
use deskchat::stomp::commands::{command, header};
use deskchat::stomp::{decode, Frame};

pub const VALID_TOKEN: &str = "valid-token";
pub const LOCAL_ID: i64 = 42;
pub const PEER_ID: i64 = 7;
pub const EMAIL: &str = "agent@example.com";
pub const PASSWORD: &str = "hunter22";

/// Broker-side observations and controls shared with the handlers.
#[derive(Clone, Default)]
pub struct MockState {
    /// Every frame clients sent, across all connections.
    pub received: Arc<Mutex<Vec<Frame>>>,
    pub connections: Arc<AtomicUsize>,
    pub handshakes: Arc<AtomicUsize>,
    pub logouts: Arc<AtomicUsize>,
    /// Sockets that ended, whichever side closed them.
    pub closed: Arc<AtomicUsize>,
    /// Bare-EOL keep-alives received from clients.
    pub heartbeats: Arc<AtomicUsize>,
    /// `heart-beat` header sent in CONNECTED; `0,0` when unset.
    pub heart_beat: Arc<Mutex<Option<String>>>,
    /// Read CONNECT but never answer it.
    pub stall_handshake: Arc<AtomicBool>,
    /// Check the bearer token on the HTTP upgrade and answer 401.
    pub guard_upgrade: Arc<AtomicBool>,
    /// Tokens the broker and REST routes accept.
    pub accepted_tokens: Arc<Mutex<Vec<String>>>,
    push: Arc<Mutex<Option<broadcast::Sender<Push>>>>,
}

#[derive(Debug, Clone)]
enum Push {
    Message(serde_json::Value),
    Raw(String),
    Drop,
}

impl MockState {
    fn push_tx(&self) -> broadcast::Sender<Push> {
        let mut push = self.push.lock().unwrap();
        push.get_or_insert_with(|| broadcast::channel(64).0).clone()
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
            return false;
        };
        self.accepts_bearer(value)
    }

    fn accepts_bearer(&self, value: &str) -> bool {
        value
            .strip_prefix("Bearer ")
            .map(|token| self.accepted_tokens.lock().unwrap().iter().any(|t| t == token))
            .unwrap_or(false)
    }

    pub fn advertise_heart_beat(&self, value: &str) {
        *self.heart_beat.lock().unwrap() = Some(value.to_string());
    }

    pub fn revoke_all_tokens(&self) {
        self.accepted_tokens.lock().unwrap().clear();
    }

    pub fn frames(&self, cmd: &str) -> Vec<Frame> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.is(cmd))
            .cloned()
            .collect()
    }
}

pub struct TestServer {
    pub state: MockState,
    pub http_url: String,
    pub ws_url: String,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let state = MockState::default();
        state
            .accepted_tokens
            .lock()
            .unwrap()
            .push(VALID_TOKEN.to_string());

        let app = Router::new()
            .route("/ws", get(ws_upgrade))
            .route("/auth/login", post(login))
            .route("/auth/logout", post(logout))
            .route("/api/users", get(users))
            .route("/api/messages/{other}", get(history))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            http_url: format!("http://127.0.0.1:{}", addr.port()),
            ws_url: format!("ws://127.0.0.1:{}/ws", addr.port()),
        }
    }

    /// Channel settings with delays short enough for tests.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.ws_url.clone())
            .with_reconnect_delay(Duration::from_millis(50))
            .with_heartbeat(Duration::ZERO, Duration::ZERO)
    }

    /// Deliver a chat record to every subscribed client.
    pub fn push_message(&self, id: i64, sender: i64, receiver: i64, text: &str) {
        let _ = self.state.push_tx().send(Push::Message(json!({
            "id": id,
            "senderId": sender,
            "senderName": format!("user {sender}"),
            "receiverId": receiver,
            "receiverName": format!("user {receiver}"),
            "message": text,
            "createdAt": "2024-05-01T09:00:00"
        })));
    }

    /// Send raw text to every connected client.
    pub fn push_raw(&self, text: &str) {
        let _ = self.state.push_tx().send(Push::Raw(text.to_string()));
    }

    /// Close every client socket without a STOMP goodbye.
    pub fn drop_connections(&self) {
        let _ = self.state.push_tx().send(Push::Drop);
    }
}

/// Poll `check` until it holds or a couple of seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

async fn ws_upgrade(
    State(state): State<MockState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.guard_upgrade.load(Ordering::SeqCst) && !state.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state.clone()).await;
        state.closed.fetch_add(1, Ordering::SeqCst);
    })
}

async fn handle_socket(socket: WebSocket, state: MockState) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut push_rx = state.push_tx().subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut subscription: Option<String> = None;
    let mut authenticated = false;

    loop {
        tokio::select! {
            push = push_rx.recv() => match push {
                Ok(Push::Message(body)) => {
                    let Some(ref sub) = subscription else { continue };
                    let frame = Frame::new(command::MESSAGE)
                        .header(header::SUBSCRIPTION, sub.clone())
                        .header(header::DESTINATION, "/user/queue/messages")
                        .header("message-id", body["id"].to_string())
                        .body(body.to_string());
                    if sink.send(Message::Text(frame.encode().into())).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Raw(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Drop) => break,
                Err(_) => {}
            },
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                if text.as_str().trim_matches(['\r', '\n']).is_empty() {
                    state.heartbeats.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                let Ok(frames) = decode(text.as_str()) else { continue };
                for frame in frames {
                    state.received.lock().unwrap().push(frame.clone());
                    match frame.command.as_str() {
                        command::CONNECT if state.stall_handshake.load(Ordering::SeqCst) => {}
                        command::CONNECT => {
                            let heart_beat = state
                                .heart_beat
                                .lock()
                                .unwrap()
                                .clone()
                                .unwrap_or_else(|| "0,0".to_string());
                            let ok = frame
                                .get(header::AUTHORIZATION)
                                .map(|v| state.accepts_bearer(v))
                                .unwrap_or(false);
                            let reply = if ok {
                                authenticated = true;
                                state.handshakes.fetch_add(1, Ordering::SeqCst);
                                Frame::new(command::CONNECTED)
                                    .header(header::VERSION, "1.2")
                                    .header(header::HEART_BEAT, heart_beat)
                            } else {
                                Frame::new(command::ERROR)
                                    .header(header::MESSAGE, "Invalid token")
                            };
                            let _ = sink.send(Message::Text(reply.encode().into())).await;
                            if !ok {
                                let _ = sink.close().await;
                                return;
                            }
                        }
                        command::SUBSCRIBE if authenticated => {
                            subscription = frame.get(header::ID).map(str::to_string);
                        }
                        command::SEND if authenticated => {
                            // Persist-and-route: echo the stored record back to the sender.
                            if let Ok(payload) = serde_json::from_str::<serde_json::Value>(&frame.body) {
                                let echo = json!({
                                    "id": 1000 + state.frames(command::SEND).len() as i64,
                                    "senderId": LOCAL_ID,
                                    "senderName": "Agent",
                                    "receiverId": payload["receiverId"],
                                    "message": payload["message"],
                                    "createdAt": "2024-05-01T09:05:00Z"
                                });
                                if let Some(ref sub) = subscription {
                                    let reply = Frame::new(command::MESSAGE)
                                        .header(header::SUBSCRIPTION, sub.clone())
                                        .body(echo.to_string());
                                    let _ = sink.send(Message::Text(reply.encode().into())).await;
                                }
                            }
                        }
                        command::DISCONNECT => {
                            let _ = sink.close().await;
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

async fn login(State(state): State<MockState>, Json(body): Json<serde_json::Value>) -> Response {
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "bad credentials"})),
        )
            .into_response();
    }
    let token = state
        .accepted_tokens
        .lock()
        .unwrap()
        .first()
        .cloned()
        .unwrap_or_default();
    Json(json!({
        "accessToken": token,
        "refreshToken": "refresh-token",
        "user": {"id": LOCAL_ID, "fullName": "Agent Smith", "email": EMAIL, "role": "AGENT"}
    }))
    .into_response()
}

async fn logout(State(state): State<MockState>, headers: HeaderMap) -> StatusCode {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    if state.accepts(&headers) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn users(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if !state.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        {"id": LOCAL_ID, "fullName": "Agent Smith", "email": EMAIL, "active": true},
        {"id": PEER_ID, "name": "Grace", "surname": "Hopper", "email": "grace@example.com", "active": true},
        {"id": 8, "fullName": "Linus T", "email": "linus@example.com", "active": false},
        {"id": 9, "name": "Ada", "email": "ada@example.com", "active": true}
    ]))
    .into_response()
}

async fn history(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(other): Path<i64>,
) -> Response {
    if !state.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if other == 500 {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!([
        {"id": 1, "senderId": other, "senderName": "Grace Hopper", "receiverId": LOCAL_ID,
         "receiverName": "Agent Smith", "message": "printer is on fire", "createdAt": "2024-05-01T08:00:00"},
        {"id": 2, "senderId": LOCAL_ID, "senderName": "Agent Smith", "receiverId": other,
         "receiverName": "Grace Hopper", "message": "on my way", "createdAt": "2024-05-01T08:01:00"}
    ]))
    .into_response()
}
