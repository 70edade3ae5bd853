//! Per-connection state machine and read/write loops.
//!
//! A [`ConnectionHandle`] is what the [`Hub`] stores: identity, role, the
//! sending half of a bounded mailbox, and the lifecycle state. The socket
//! itself is owned by [`run_connection`], which splits it into a writer
//! task (mailbox, heartbeat pings) and a reader loop (validation, liveness).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::hub::Hub;
use super::messages::{ControlFrame, DEFAULT_MAX_FRAME_BYTES, InboundKind, validate_frame};
use crate::domain::{Role, UserId};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Upgraded but not yet registered.
    Connecting,
    /// Registered and routable.
    Active,
    /// Shutting down; no longer routable.
    Closing,
    /// Loops finished and unregistered.
    Closed,
}

/// Timing and sizing for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Frames that may wait in the outbound mailbox.
    pub mailbox_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Connection is dropped after this long without inbound traffic.
    pub liveness_timeout: Duration,
    /// Inbound frames above this size are answered with an error frame.
    pub max_frame_bytes: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(60),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Routable side of a live connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: Uuid,
    user_id: UserId,
    role: Role,
    mailbox: mpsc::Sender<String>,
    state: watch::Sender<ConnectionState>,
}

/// Why a frame could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Mailbox is at capacity.
    Full,
    /// Connection is closing or closed.
    Closed,
}

impl ConnectionHandle {
    /// Creates a handle in the `Connecting` state together with the
    /// receiving half of its mailbox.
    #[must_use]
    pub fn new(user_id: UserId, role: Role, capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (mailbox, rx) = mpsc::channel(capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            role,
            mailbox,
            state,
        });
        (handle, rx)
    }

    /// Unique ID of this connection instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Identity that owns the connection.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Role of the owner.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `Active` if still `Connecting`.
    pub fn activate(&self) {
        self.advance(ConnectionState::Active);
    }

    /// Asks the connection to shut down. Idempotent.
    pub fn close(&self) {
        self.advance(ConnectionState::Closing);
    }

    /// Marks the connection as fully closed.
    pub fn mark_closed(&self) {
        self.advance(ConnectionState::Closed);
    }

    /// Whether the writer side has gone away and dropped the mailbox.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.mailbox.is_closed()
    }

    fn advance(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current < next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Enqueues a serialized frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] when the mailbox is at capacity and
    /// [`EnqueueError::Closed`] once the connection is shutting down.
    pub fn try_enqueue(&self, frame: String) -> Result<(), EnqueueError> {
        if self.state() >= ConnectionState::Closing {
            return Err(EnqueueError::Closed);
        }
        self.mailbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Resolves once `state` reaches `Closing` (or the handle is gone).
async fn closing(state: &mut watch::Receiver<ConnectionState>) {
    loop {
        if *state.borrow_and_update() >= ConnectionState::Closing {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Drives one WebSocket until it closes, then unregisters it.
pub async fn run_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    handle: Arc<ConnectionHandle>,
    mailbox: mpsc::Receiver<String>,
    settings: ConnectionSettings,
) {
    let (ws_tx, ws_rx) = socket.split();
    hub.register(Arc::clone(&handle)).await;

    let writer = tokio::spawn(write_loop(
        ws_tx,
        mailbox,
        Arc::clone(&handle),
        settings.heartbeat_interval,
    ));
    read_loop(ws_rx, &handle, &settings).await;

    handle.close();
    if let Err(e) = writer.await {
        tracing::error!(user_id = %handle.user_id(), error = %e, "ws writer task failed");
    }
    hub.unregister(&handle).await;
}

/// Drains the mailbox onto the socket and sends heartbeat pings. Any send
/// failure closes the connection so the reader stops too.
async fn write_loop<S>(
    mut ws_tx: S,
    mut mailbox: mpsc::Receiver<String>,
    handle: Arc<ConnectionHandle>,
    heartbeat: Duration,
) where
    S: Sink<Message> + Unpin,
{
    let mut state = handle.watch_state();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    loop {
        tokio::select! {
            frame = mailbox.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::text(frame)).await.is_err() {
                    tracing::debug!(user_id = %handle.user_id(), "ws write failed");
                    break;
                }
            }
            _ = ticker.tick() => {
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    tracing::debug!(user_id = %handle.user_id(), "ws ping failed");
                    break;
                }
            }
            () = closing(&mut state) => break,
        }
    }
    handle.close();
    drop(mailbox);
    let _ = ws_tx.send(Message::Close(None)).await;
    let _ = ws_tx.close().await;
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    handle: &ConnectionHandle,
    settings: &ConnectionSettings,
) {
    let mut state = handle.watch_state();
    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(settings.liveness_timeout, ws_rx.next()) => next,
            () = closing(&mut state) => break,
        };
        let Ok(next) = next else {
            tracing::info!(user_id = %handle.user_id(), "ws liveness timeout");
            break;
        };
        match next {
            Some(Ok(Message::Text(text))) => handle_text(handle, text.as_str(), settings),
            Some(Ok(Message::Binary(_))) => {
                reply(handle, ControlFrame::error("binary frames are not supported").to_frame());
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(user_id = %handle.user_id(), error = %e, "ws read error");
                break;
            }
        }
    }
}

fn handle_text(handle: &ConnectionHandle, text: &str, settings: &ConnectionSettings) {
    match validate_frame(text, settings.max_frame_bytes) {
        Ok(frame) if frame.kind == InboundKind::Ping => {
            reply(handle, ControlFrame::pong().to_frame());
        }
        Ok(frame) => {
            tracing::debug!(
                user_id = %handle.user_id(),
                frame_type = frame.kind.as_str(),
                "ws frame received"
            );
        }
        Err(e) => {
            tracing::debug!(user_id = %handle.user_id(), error = %e, "ws frame rejected");
            reply(handle, ControlFrame::error(e.to_string()).to_frame());
        }
    }
}

fn reply(handle: &ConnectionHandle, frame: String) {
    if let Err(e) = handle.try_enqueue(frame) {
        tracing::debug!(user_id = %handle.user_id(), reason = ?e, "ws reply dropped");
    }
}
