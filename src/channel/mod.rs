//! The realtime message channel: one authenticated broker connection per
//! session, subscribed to the user's inbox.

mod connection;
pub mod observers;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ChannelConfig;
use crate::error::{ChatError, Result};
use crate::models::message::{ChatMessage, OutboundMessage};
use crate::models::user::UserId;
use crate::session::Session;
use crate::stomp::commands::{command, header, JSON_CONTENT_TYPE};
use crate::stomp::Frame;

pub use observers::Subscription;
pub use state::ConnectionState;

use observers::Observers;

/// Work handed to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    Frame(Frame),
    Shutdown,
}

/// The live connection task and the generation it was started under.
struct Link {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

pub(crate) struct Shared {
    pub(crate) config: ChannelConfig,
    pub(crate) session: Session,
    pub(crate) observers: Arc<Observers>,
    state_tx: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
    last_error: Mutex<Option<ChatError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.observers.generation() == generation
    }

    /// State updates from a connection task are ignored once a teardown
    /// has moved past its generation.
    pub(crate) fn set_state(&self, generation: u64, state: ConnectionState) {
        if !self.is_current(generation) {
            return;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!("channel {previous} -> {state}");
        }
    }

    /// Called by a connection task that is giving up for good.
    pub(crate) fn finish(&self, generation: u64, error: Option<ChatError>) {
        {
            let mut link = lock(&self.link);
            if link.as_ref().map(|l| l.generation) == Some(generation) {
                link.take();
            }
        }
        if !self.is_current(generation) {
            return;
        }
        if let Some(e) = error {
            *lock(&self.last_error) = Some(e);
        }
        self.set_state(generation, ConnectionState::Disconnected);
    }
}

/// Handle to the realtime message channel.
///
/// At most one connection is active per channel. Dropping the channel
/// aborts its connection task.
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    pub fn new(config: ChannelConfig, session: Session) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                session,
                observers: Arc::new(Observers::default()),
                state_tx,
                link: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Error that ended the most recent connection, if it ended on one.
    pub fn last_error(&self) -> Option<ChatError> {
        lock(&self.shared.last_error).clone()
    }

    /// Open the connection and subscribe to the inbox.
    ///
    /// Resolves once the subscription is in place. A call while a
    /// connection is already starting or live does nothing.
    pub async fn connect(&self) -> Result<()> {
        let (generation, ready) = {
            let mut link = lock(&self.shared.link);
            if link.is_some() {
                tracing::debug!(state = %self.state(), "connect called on an active channel, ignoring");
                return Ok(());
            }
            if self.shared.session.access_token().is_none() {
                return Err(ChatError::Authentication(
                    "no session token, log in first".to_string(),
                ));
            }

            let generation = self.shared.observers.generation();
            *lock(&self.shared.last_error) = None;
            self.shared.set_state(generation, ConnectionState::Connecting);

            let (commands, rx) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            let task = tokio::spawn(connection::run(
                Arc::clone(&self.shared),
                generation,
                rx,
                ready_tx,
            ));
            *link = Some(Link {
                generation,
                commands,
                task,
            });
            (generation, ready_rx)
        };

        match ready.await {
            // A disconnect that raced the handshake wins.
            Ok(Ok(())) if !self.shared.is_current(generation) => Err(ChatError::NotConnected),
            Ok(result) => result,
            Err(_) => Err(ChatError::Transport(
                "connection task ended before the handshake completed".to_string(),
            )),
        }
    }

    /// Close the connection and drop every registered observer. Safe to
    /// call when already disconnected.
    pub fn disconnect(&self) {
        let link = lock(&self.shared.link).take();
        let generation = self.shared.observers.clear();

        if let Some(link) = link {
            // The task closes the socket; if it is already gone the send
            // fails and there is nothing left to release.
            let _ = link.commands.send(Command::Shutdown);
            tracing::info!("channel disconnected");
        }
        self.shared
            .set_state(generation, ConnectionState::Disconnected);
    }

    /// Publish a message to `receiver`. Fire-and-forget: the stored record
    /// comes back as an inbound echo.
    pub fn send_message(&self, receiver: UserId, body: impl Into<String>) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        let payload = serde_json::to_string(&OutboundMessage {
            receiver_id: receiver,
            message: body.into(),
        })?;
        let frame = Frame::new(command::SEND)
            .header(header::DESTINATION, self.shared.config.send_destination.clone())
            .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload);

        let link = lock(&self.shared.link);
        let link = link.as_ref().ok_or(ChatError::NotConnected)?;
        link.commands
            .send(Command::Frame(frame))
            .map_err(|_| ChatError::NotConnected)
    }

    /// Register an observer for every inbound message, invoked in
    /// registration order on the connection task.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = self.shared.observers.register(Arc::new(callback));
        Subscription::new(id, &self.shared.observers)
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shared.observers.clear();
        if let Some(link) = lock(&self.shared.link).take() {
            link.task.abort();
        }
    }
}
