use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Command, ConnectionState, Shared};
use crate::error::{ChatError, Result};
use crate::models::message::InboundFrame;
use crate::stomp::commands::{command, header, PROTOCOL_VERSION};
use crate::stomp::heartbeat::{self, Heartbeat};
use crate::stomp::{self as frames, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An authenticated, subscribed broker connection.
struct Established {
    ws: WsStream,
    heartbeat: Heartbeat,
    subscription_id: String,
}

/// Why a serving loop ended.
enum Exit {
    /// Orderly teardown requested by the channel.
    Shutdown,
    /// A newer generation took over; leave without touching shared state.
    Stale,
    /// Transport lost; reconnect.
    Dropped(String),
}

/// Outcome of one handshake attempt.
enum Handshake {
    Ready(Established),
    Failed(ChatError),
    /// Shutdown arrived mid-handshake; the half-open socket has been dropped.
    Cancelled,
}

/// Connection task: handshake, then serve and reconnect until shutdown or
/// an authentication failure.
pub(super) async fn run(
    shared: Arc<Shared>,
    generation: u64,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut established = match handshake(&shared, &mut commands).await {
        Handshake::Ready(established) => established,
        Handshake::Failed(e) => {
            tracing::warn!("connect failed: {e}");
            shared.finish(generation, Some(e.clone()));
            let _ = ready.send(Err(e));
            return;
        }
        Handshake::Cancelled => {
            tracing::debug!("disconnected during handshake");
            let _ = ready.send(Err(ChatError::NotConnected));
            return;
        }
    };
    shared.set_state(generation, ConnectionState::Connected);
    let _ = ready.send(Ok(()));

    loop {
        match serve(&shared, generation, established, &mut commands).await {
            Exit::Shutdown | Exit::Stale => return,
            Exit::Dropped(reason) => {
                tracing::warn!("connection dropped: {reason}");
            }
        }

        established = match reconnect(&shared, generation, &mut commands).await {
            Some(established) => established,
            None => return,
        };
        shared.set_state(generation, ConnectionState::Connected);
    }
}

/// Run `establish` under the handshake timeout while watching for
/// shutdown. Sends queued meanwhile are dropped.
async fn handshake(shared: &Shared, commands: &mut mpsc::UnboundedReceiver<Command>) -> Handshake {
    let limit = shared.config.handshake_timeout;
    let attempt = tokio::time::timeout(limit, establish(shared));
    tokio::pin!(attempt);
    loop {
        tokio::select! {
            result = &mut attempt => {
                return match result {
                    Ok(Ok(established)) => Handshake::Ready(established),
                    Ok(Err(e)) => Handshake::Failed(e),
                    Err(_) => Handshake::Failed(ChatError::Transport(format!(
                        "handshake timed out after {limit:?}"
                    ))),
                };
            }
            cmd = commands.recv() => match cmd {
                Some(Command::Frame(_)) => tracing::debug!("dropping send queued during handshake"),
                Some(Command::Shutdown) | None => return Handshake::Cancelled,
            },
        }
    }
}

/// Retry the handshake under the configured delay policy. Returns `None`
/// when the task should stop.
async fn reconnect(
    shared: &Shared,
    generation: u64,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<Established> {
    let mut attempt = 0;
    loop {
        if !shared.is_current(generation) {
            return None;
        }
        shared.set_state(generation, ConnectionState::Connecting);

        let delay = shared.config.reconnect_delay_for(attempt);
        tracing::info!(attempt, ?delay, "reconnecting");
        if !wait_discarding(delay, commands).await || !shared.is_current(generation) {
            return None;
        }

        match handshake(shared, commands).await {
            Handshake::Ready(established) => {
                if !discard_pending(commands) {
                    return None;
                }
                tracing::info!(attempt, "reconnected");
                return Some(established);
            }
            Handshake::Cancelled => return None,
            Handshake::Failed(e @ (ChatError::Authentication(_) | ChatError::Protocol(_))) => {
                tracing::error!("reconnect cannot authenticate: {e}");
                shared.finish(generation, Some(e));
                return None;
            }
            Handshake::Failed(e) => {
                tracing::warn!(attempt, "reconnect failed: {e}");
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Sleep for `delay`, dropping any sends queued meanwhile. Returns `false`
/// on shutdown.
async fn wait_discarding(delay: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(Command::Frame(_)) => tracing::debug!("dropping send queued while disconnected"),
                Some(Command::Shutdown) | None => return false,
            },
        }
    }
}

/// Drop sends left over from before a reconnect. Returns `false` on
/// shutdown.
fn discard_pending(commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Frame(_)) => tracing::debug!("dropping send queued while disconnected"),
            Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
            Err(TryRecvError::Empty) => return true,
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(frame.encode().into())).await?;
    Ok(())
}

/// Open the websocket, authenticate with CONNECT and subscribe to the inbox.
async fn establish(shared: &Shared) -> Result<Established> {
    let token = shared
        .session
        .access_token()
        .ok_or_else(|| ChatError::Authentication("session has no access token".to_string()))?;
    let bearer = format!("Bearer {token}");

    let mut request = shared.config.ws_url.as_str().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&bearer)
            .map_err(|_| ChatError::Authentication("token is not a valid header value".to_string()))?,
    );

    let (mut ws, _) = connect_async(request).await?;
    tracing::debug!(url = %shared.config.ws_url, "transport open");

    let host = Url::parse(&shared.config.ws_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());
    let connect = Frame::new(command::CONNECT)
        .header(header::ACCEPT_VERSION, PROTOCOL_VERSION)
        .header(header::HOST, host)
        .header(
            header::HEART_BEAT,
            heartbeat::offer(shared.config.heartbeat_outgoing, shared.config.heartbeat_incoming),
        )
        .header(header::AUTHORIZATION, bearer);
    send_frame(&mut ws, &connect).await?;

    let connected = await_connected(&mut ws).await?;
    let heartbeat = heartbeat::negotiate(
        shared.config.heartbeat_outgoing,
        shared.config.heartbeat_incoming,
        connected.get(header::HEART_BEAT),
    );
    tracing::debug!(
        version = connected.get(header::VERSION).unwrap_or("?"),
        ?heartbeat,
        "handshake accepted"
    );

    let subscription_id = format!("sub-{}", uuid::Uuid::new_v4().simple());
    let subscribe = Frame::new(command::SUBSCRIBE)
        .header(header::ID, subscription_id.clone())
        .header(header::DESTINATION, shared.config.inbox_destination.clone())
        .header(header::ACK, "auto");
    send_frame(&mut ws, &subscribe).await?;
    tracing::info!(destination = %shared.config.inbox_destination, "subscribed");

    Ok(Established {
        ws,
        heartbeat,
        subscription_id,
    })
}

async fn await_connected(ws: &mut WsStream) -> Result<Frame> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                for frame in frames::decode(text.as_str())? {
                    if frame.is(command::CONNECTED) {
                        return Ok(frame);
                    }
                    if frame.is(command::ERROR) {
                        return Err(ChatError::Protocol(frame.error_reason()));
                    }
                    tracing::debug!(command = %frame.command, "ignoring frame before CONNECTED");
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ChatError::Transport(
                    "connection closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

fn ticker(period: Option<Duration>) -> Option<Interval> {
    period.map(|p| interval_at(Instant::now() + p, p))
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn serve(
    shared: &Shared,
    generation: u64,
    established: Established,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Exit {
    let Established {
        ws,
        heartbeat,
        subscription_id,
    } = established;
    let (mut sink, mut stream) = ws.split();

    let mut beat = ticker(heartbeat.send_every);
    let deadline = heartbeat.inbound_deadline();
    let mut watchdog = ticker(heartbeat.expect_every);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Frame(frame)) => {
                    tracing::debug!(command = %frame.command, "sending frame");
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        return Exit::Dropped(format!("send failed: {e}"));
                    }
                }
                Some(Command::Shutdown) | None => {
                    close(&mut sink).await;
                    return Exit::Shutdown;
                }
            },
            _ = tick(&mut beat) => {
                if sink.send(Message::Text("\n".into())).await.is_err() {
                    return Exit::Dropped("heart-beat send failed".to_string());
                }
            }
            _ = tick(&mut watchdog) => {
                if let Some(deadline) = deadline {
                    if last_inbound.elapsed() > deadline {
                        return Exit::Dropped("no heart-beat from server".to_string());
                    }
                }
            }
            msg = stream.next() => {
                last_inbound = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(exit) = handle_text(shared, generation, &subscription_id, text.as_str()) {
                            if matches!(exit, Exit::Stale) {
                                close(&mut sink).await;
                            }
                            return exit;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Exit::Dropped("closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Dropped(e.to_string()),
                }
            }
        }
    }
}

/// Dispatch the frames in one text message. Returns an exit when the loop
/// must stop.
fn handle_text(shared: &Shared, generation: u64, subscription_id: &str, text: &str) -> Option<Exit> {
    let frames = match frames::decode(text) {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!("skipping undecodable message: {e}");
            return None;
        }
    };

    for frame in frames {
        match frame.command.as_str() {
            command::MESSAGE => {
                if let Some(sub) = frame.get(header::SUBSCRIPTION) {
                    if sub != subscription_id {
                        tracing::debug!(subscription = sub, "ignoring frame for another subscription");
                        continue;
                    }
                }
                let inbound: InboundFrame = match serde_json::from_str(&frame.body) {
                    Ok(inbound) => inbound,
                    Err(e) => {
                        tracing::warn!("skipping malformed message body: {e}");
                        continue;
                    }
                };
                let message = inbound.normalize(shared.session.identity());
                tracing::debug!(id = message.id, origin = ?message.origin, "inbound message");
                if !shared.observers.dispatch(generation, &message) {
                    return Some(Exit::Stale);
                }
            }
            command::ERROR => {
                return Some(Exit::Dropped(format!("broker error: {}", frame.error_reason())));
            }
            command::RECEIPT => {
                tracing::debug!(receipt = frame.get(header::RECEIPT_ID).unwrap_or("?"), "receipt");
            }
            other => tracing::debug!(command = other, "ignoring frame"),
        }
    }
    None
}

/// Orderly close: DISCONNECT then a websocket close.
async fn close<S>(sink: &mut S)
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let _ = send_frame(sink, &Frame::new(command::DISCONNECT)).await;
    let _ = sink.close().await;
}
